//! Structure preparation: turns a raw PDB file into a solvated, hydrogen-complete,
//! fully parameterizable simulation box.
//!
//! The pipeline order is fixed: load, replace modified residues, detect and build missing
//! terminal residues, detect missing atoms, repair, protonate, solvate and neutralize, adjust ionic strength, and check
//! forcefield coverage. Heavy lifting (repair, hydrogen placement, solvent packing and
//! topology perception) is delegated to `bio-forge` through [`bridge`].

pub mod bridge;
pub mod fixer;
pub mod report;

use crate::core::forcefield::parameterization::{ParameterizationError, Parameterizer};
use crate::core::forcefield::params::Forcefield;
use crate::core::io::pdb::{PdbError, PdbFile};
use crate::core::io::traits::MolecularFile;
use crate::core::models::periodic::PeriodicBox;
use crate::core::models::residue::ResidueCategory;
use crate::core::models::system::MolecularSystem;
use crate::core::topology::templates::IonSpecies;
use bio_forge as bf;
use bridge::BridgeError;
use report::ResidueGapKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub use report::PreparationReport;

const WATER_SPACING: f64 = 3.1;
const SOLVENT_VDW_CUTOFF: f64 = 2.4;
const DISULFIDE_CUTOFF: f64 = 2.2;

#[derive(Debug, Error)]
pub enum PrepError {
    #[error("Failed to read structure '{path}': {source}")]
    Input { path: PathBuf, source: PdbError },
    #[error("Invalid preparation option '{key}': {reason}")]
    InvalidOption { key: &'static str, reason: String },
    #[error(transparent)]
    Parameterization(#[from] ParameterizationError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("Failed to write prepared structure '{path}': {source}")]
    Output { path: PathBuf, source: PdbError },
}

/// Options controlling how a raw structure becomes a simulation box.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparationOptions {
    pub ph: f64,
    /// Minimum solvent distance between the solute and the box faces, in Å.
    pub padding: f64,
    pub water_model: String,
    pub positive_ion: IonSpecies,
    pub negative_ion: IonSpecies,
    /// Target ionic strength in mol/L.
    pub ionic_strength: f64,
    pub seed: u64,
}

impl Default for PreparationOptions {
    fn default() -> Self {
        Self {
            ph: 7.0,
            padding: 10.0,
            water_model: "tip3p".to_string(),
            positive_ion: IonSpecies::Sodium,
            negative_ion: IonSpecies::Chloride,
            ionic_strength: 0.0,
            seed: 0,
        }
    }
}

impl PreparationOptions {
    pub fn validate(&self) -> Result<(), PrepError> {
        let invalid = |key, reason: &str| PrepError::InvalidOption {
            key,
            reason: reason.to_string(),
        };
        if !(self.ph.is_finite() && self.ph >= 0.0) {
            return Err(invalid("ph", "must be a non-negative number"));
        }
        if !(self.padding.is_finite() && self.padding > 0.0) {
            return Err(invalid("padding", "must be strictly positive"));
        }
        if !(self.ionic_strength.is_finite() && self.ionic_strength >= 0.0) {
            return Err(invalid("ionic_strength", "must be a non-negative number"));
        }
        if self.water_model.trim().is_empty() {
            return Err(invalid("water_model", "must not be empty"));
        }
        if !self.positive_ion.is_cation() {
            return Err(invalid("positive_ion", "must be a cation"));
        }
        if self.negative_ion.is_cation() {
            return Err(invalid("negative_ion", "must be an anion"));
        }
        Ok(())
    }
}

/// A prepared simulation box. Immutable once produced.
#[derive(Debug, Clone)]
pub struct PreparedSystem {
    pub system: MolecularSystem,
    pub report: PreparationReport,
}

pub struct BoxBuilder<'a> {
    forcefield: &'a Forcefield,
    options: PreparationOptions,
}

impl<'a> BoxBuilder<'a> {
    pub fn new(forcefield: &'a Forcefield, options: PreparationOptions) -> Self {
        Self {
            forcefield,
            options,
        }
    }

    pub fn options(&self) -> &PreparationOptions {
        &self.options
    }

    /// Runs the full preparation pipeline on `structure_file`, optionally writing the
    /// result to `out_file`.
    #[instrument(skip_all, name = "box_builder", fields(input = %structure_file.display()))]
    pub fn build(
        &self,
        structure_file: &Path,
        out_file: Option<&Path>,
    ) -> Result<PreparedSystem, PrepError> {
        self.options.validate()?;
        if self.forcefield.water_model(&self.options.water_model).is_none() {
            return Err(ParameterizationError::MissingWaterModel(self.options.water_model.clone()).into());
        }
        let cation = bridge::to_bf_cation(self.options.positive_ion)?;
        let anion = bridge::to_bf_anion(self.options.negative_ion)?;

        let (mut system, metadata) =
            PdbFile::read_from_path(structure_file).map_err(|source| PrepError::Input {
                path: structure_file.to_path_buf(),
                source,
            })?;
        info!(
            atoms = system.atom_count(),
            "Loaded structure '{}'.",
            structure_file.display()
        );

        let mut report = PreparationReport {
            replaced_residues: fixer::replace_nonstandard_residues(&mut system),
            ..Default::default()
        };
        for replaced in &report.replaced_residues {
            info!(
                "Replaced non-standard residue {} {} (chain {}) with {}.",
                replaced.original, replaced.residue_number, replaced.chain_id, replaced.replacement
            );
        }

        report.missing_residues = fixer::find_missing_residues(&system, &metadata.seqres);
        report.residues_built = fixer::build_missing_terminal_residues(
            &mut system,
            &report.missing_residues,
            self.options.seed,
        );
        if report.residues_built > 0 {
            info!("Built {} missing terminal residue(s).", report.residues_built);
        }
        for gap in &report.missing_residues {
            if gap.kind == ResidueGapKind::Internal || gap.names.len() != gap.count {
                warn!(
                    chain = %gap.chain_id,
                    kind = ?gap.kind,
                    first = gap.first_number,
                    count = gap.count,
                    "Residues are missing from the model and will not be built."
                );
            }
        }
        report.missing_atoms = fixer::find_missing_atoms(&system);
        if !report.missing_atoms.is_empty() {
            info!(
                "Adding {} missing heavy atom(s) in {} residue(s).",
                report.missing_atom_count(),
                report.missing_atoms.len()
            );
        }

        let solute_hydrogens = count_solute_hydrogens(&system);
        let waters_before = system.count_residues(ResidueCategory::Water);

        let mut structure = bridge::to_bio_structure(&system)?;
        bf::ops::repair_structure(&mut structure).map_err(BridgeError::from)?;
        bf::ops::add_hydrogens(
            &mut structure,
            &bf::ops::HydroConfig {
                target_ph: Some(self.options.ph),
                remove_existing_h: false,
                his_strategy: bf::ops::HisStrategy::HbNetwork,
                his_salt_bridge_protonation: true,
            },
        )
        .map_err(BridgeError::from)?;
        debug!("Repair and protonation complete.");

        bf::ops::solvate_structure(
            &mut structure,
            &bf::ops::SolvateConfig {
                margin: self.options.padding,
                water_spacing: WATER_SPACING,
                vdw_cutoff: SOLVENT_VDW_CUTOFF,
                remove_existing: false,
                cations: vec![cation],
                anions: vec![anion],
                target_charge: 0,
                rng_seed: Some(self.options.seed),
            },
        )
        .map_err(BridgeError::from)?;

        let topology = bf::ops::TopologyBuilder::new()
            .disulfide_cutoff(DISULFIDE_CUTOFF)
            .build(structure)
            .map_err(BridgeError::from)?;
        let mut system = bridge::from_bio_topology(&topology)?;

        if system.periodic_box().is_none() {
            let cell = bounding_box(&system, self.options.padding);
            warn!(
                "Solvation produced no periodic cell; using the padded bounding box {:.2} x {:.2} x {:.2}.",
                cell.lengths.x, cell.lengths.y, cell.lengths.z
            );
            system.set_periodic_box(Some(cell));
        }

        if self.options.ionic_strength > 0.0 {
            let pairs = fixer::apply_ionic_strength(
                &mut system,
                self.options.ionic_strength,
                self.options.positive_ion,
                self.options.negative_ion,
                self.options.seed,
            );
            info!(
                pairs,
                ionic_strength = self.options.ionic_strength,
                "Replaced water molecules with ion pairs."
            );
        }

        let parameterizer = Parameterizer::new(self.forcefield, &self.options.water_model);
        parameterizer.check_coverage(&system)?;
        parameterizer.parameterize_system(&system)?;

        report.hydrogens_added = count_solute_hydrogens(&system).saturating_sub(solute_hydrogens);
        report.waters_added = system
            .count_residues(ResidueCategory::Water)
            .saturating_sub(waters_before);
        let (cations, anions) = count_ions(&system);
        report.cations_added = cations;
        report.anions_added = anions;
        report.box_lengths = system
            .periodic_box()
            .map(|cell| [cell.lengths.x, cell.lengths.y, cell.lengths.z]);

        info!(
            atoms = system.atom_count(),
            hydrogens = report.hydrogens_added,
            waters = report.waters_added,
            cations = report.cations_added,
            anions = report.anions_added,
            "Preparation complete."
        );

        if let Some(path) = out_file {
            PdbFile::write_system_to_path(&system, path).map_err(|source| PrepError::Output {
                path: path.to_path_buf(),
                source,
            })?;
            info!("Prepared structure written to '{}'.", path.display());
        }

        Ok(PreparedSystem { system, report })
    }
}

fn count_solute_hydrogens(system: &MolecularSystem) -> usize {
    system
        .residues_iter()
        .filter(|(_, r)| matches!(r.category, ResidueCategory::Standard | ResidueCategory::Hetero))
        .flat_map(|(_, r)| r.atoms().iter())
        .filter(|&&id| system.atom(id).is_some_and(|a| a.is_hydrogen()))
        .count()
}

fn count_ions(system: &MolecularSystem) -> (usize, usize) {
    system
        .residues_iter()
        .filter(|(_, r)| r.category == ResidueCategory::Ion)
        .filter_map(|(_, r)| r.atoms().first().and_then(|&id| system.atom(id)))
        .fold((0, 0), |(cations, anions), atom| {
            match atom.element.parse::<IonSpecies>().map(|ion| ion.is_cation()) {
                Ok(true) => (cations + 1, anions),
                Ok(false) => (cations, anions + 1),
                Err(_) => (cations, anions),
            }
        })
}

fn bounding_box(system: &MolecularSystem, padding: f64) -> PeriodicBox {
    let positions = system.positions();
    let mut extent = [0.0f64; 3];
    for axis in 0..3 {
        let (lo, hi) = positions
            .iter()
            .map(|p| p[axis])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        extent[axis] = if hi >= lo { hi - lo } else { 0.0 };
    }
    PeriodicBox::new(
        extent[0] + 2.0 * padding,
        extent[1] + 2.0 * padding,
        extent[2] + 2.0 * padding,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const TRIPEPTIDE: &str =
        concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/tripeptide.pdb");

    #[test]
    fn default_options_are_valid() {
        let options = PreparationOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.water_model, "tip3p");
        assert_eq!(options.positive_ion, IonSpecies::Sodium);
        assert_eq!(options.negative_ion, IonSpecies::Chloride);
    }

    #[test]
    fn invalid_options_name_the_offending_key() {
        let cases = [
            PreparationOptions { padding: 0.0, ..Default::default() },
            PreparationOptions { ph: -1.0, ..Default::default() },
            PreparationOptions { ionic_strength: -0.1, ..Default::default() },
            PreparationOptions { positive_ion: IonSpecies::Chloride, ..Default::default() },
        ];
        let keys: Vec<_> = cases
            .iter()
            .map(|options| match options.validate() {
                Err(PrepError::InvalidOption { key, .. }) => key,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(keys, vec!["padding", "ph", "ionic_strength", "positive_ion"]);
    }

    #[test]
    fn missing_structure_file_is_an_input_error_with_the_path() {
        let ff = Forcefield::generic().unwrap();
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent.pdb");
        let out = dir.path().join("out.pdb");

        let result = BoxBuilder::new(&ff, PreparationOptions::default()).build(&missing, Some(&out));

        match result {
            Err(PrepError::Input { path, .. }) => assert_eq!(path, missing),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!out.exists());
    }

    #[test]
    fn unknown_water_model_fails_before_reading_the_structure() {
        let ff = Forcefield::generic().unwrap();
        let options = PreparationOptions {
            water_model: "tip5p".into(),
            ..Default::default()
        };
        let result = BoxBuilder::new(&ff, options).build(Path::new("does/not/matter.pdb"), None);
        assert!(matches!(
            result,
            Err(PrepError::Parameterization(ParameterizationError::MissingWaterModel(_)))
        ));
    }

    #[test]
    fn builds_a_solvated_box_including_the_missing_terminal_residue() {
        let ff = Forcefield::generic().unwrap();
        let dir = tempdir().unwrap();
        let out = dir.path().join("prepared.pdb");
        let options = PreparationOptions {
            padding: 6.0,
            ..Default::default()
        };

        let prepared = BoxBuilder::new(&ff, options)
            .build(Path::new(TRIPEPTIDE), Some(&out))
            .unwrap();
        let report = &prepared.report;

        assert_eq!(report.missing_residues.len(), 1);
        assert_eq!(report.missing_residues[0].kind, ResidueGapKind::CTerminal);
        assert_eq!(report.missing_residues[0].names, vec!["SER"]);
        assert_eq!(report.residues_built, 1);
        let serine = report
            .missing_atoms
            .iter()
            .find(|m| m.residue_name == "SER")
            .unwrap();
        assert_eq!(serine.residue_number, 4);
        assert_eq!(serine.atoms, vec!["CB", "OG", "OXT"]);
        assert!(report.hydrogens_added > 0);
        assert!(report.waters_added > 0);
        assert!(prepared.system.periodic_box().is_some());

        let residues: Vec<(isize, String)> = prepared
            .system
            .residues_iter()
            .filter(|(_, r)| r.category == ResidueCategory::Standard)
            .map(|(_, r)| (r.residue_number, r.name.clone()))
            .collect();
        let numbers: Vec<isize> = residues.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(residues[3].1, "SER");
        let serine = prepared
            .system
            .residues_iter()
            .find(|(_, r)| r.residue_number == 4 && r.category == ResidueCategory::Standard)
            .map(|(_, r)| r)
            .unwrap();
        for atom in ["N", "CA", "C", "O", "CB", "OG", "OXT"] {
            assert!(serine.has_atom(atom), "SER 4 lacks {atom}");
        }

        let text = fs::read_to_string(&out).unwrap();
        assert!(text.contains("CRYST1"));
        assert!(text.contains("CONECT"));
        let (reread, _) = PdbFile::read_from_path(&out).unwrap();
        assert_eq!(reread.atom_count(), prepared.system.atom_count());
    }

    #[test]
    fn identical_inputs_give_identical_boxes() {
        let ff = Forcefield::generic().unwrap();
        let options = PreparationOptions {
            padding: 5.0,
            ionic_strength: 0.15,
            seed: 3,
            ..Default::default()
        };
        let first = BoxBuilder::new(&ff, options.clone())
            .build(Path::new(TRIPEPTIDE), None)
            .unwrap();
        let second = BoxBuilder::new(&ff, options)
            .build(Path::new(TRIPEPTIDE), None)
            .unwrap();
        assert_eq!(first.system.positions(), second.system.positions());
        assert_eq!(first.report, second.report);
    }
}
