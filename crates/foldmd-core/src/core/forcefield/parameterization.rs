use super::params::Forcefield;
use crate::core::models::{
    atom::Atom,
    ids::ResidueId,
    residue::{Residue, ResidueCategory},
    system::MolecularSystem,
};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParameterizationError {
    #[error(
        "Residue '{residue_name}' {residue_number} in chain '{chain_id}' has no template in the forcefield"
    )]
    UnknownResidue {
        residue_name: String,
        residue_number: isize,
        chain_id: char,
    },
    #[error(
        "Missing atom type for element '{element}' in atom '{atom_name}' of residue {residue_name}"
    )]
    MissingAtomType {
        element: String,
        atom_name: String,
        residue_name: String,
    },
    #[error(
        "Missing bond parameters for '{elements}' between atoms '{atom1}' and '{atom2}' (residue {residue_name})"
    )]
    MissingBondParams {
        elements: String,
        atom1: String,
        atom2: String,
        residue_name: String,
    },
    #[error("Water model '{0}' is not defined in the forcefield")]
    MissingWaterModel(String),
    #[error("Water model '{model}' has no charge for element '{element}'")]
    IncompleteWaterModel { model: String, element: String },
    #[error("Missing ion parameters for element '{element}' (residue {residue_name})")]
    MissingIonParams {
        element: String,
        residue_name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicBond {
    pub i: usize,
    pub j: usize,
    pub length: f64,
    pub k: f64,
}

/// Harmonic angle around the center atom `j`; `theta0` in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicAngle {
    pub i: usize,
    pub j: usize,
    pub k_atom: usize,
    pub theta0: f64,
    pub k: f64,
}

/// A 1-4 pair with its scaled, premixed Lennard-Jones and Coulomb parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledPair {
    pub i: usize,
    pub j: usize,
    pub sigma: f64,
    pub epsilon: f64,
    pub charge_product: f64,
}

/// Per-atom and per-term parameters in canonical atom order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemParameters {
    pub masses: Vec<f64>,
    pub charges: Vec<f64>,
    pub sigmas: Vec<f64>,
    pub epsilons: Vec<f64>,
    pub bonds: Vec<HarmonicBond>,
    pub angles: Vec<HarmonicAngle>,
    pub pairs_14: Vec<ScaledPair>,
    /// Sorted 1-2, 1-3 and 1-4 partners of every atom; excluded from the cutoff nonbonded sum.
    pub exclusions: Vec<Vec<usize>>,
    /// Bonded molecules as sorted atom index lists.
    pub molecules: Vec<Vec<usize>>,
    pub reaction_field_dielectric: f64,
}

impl SystemParameters {
    pub fn atom_count(&self) -> usize {
        self.masses.len()
    }

    pub fn is_excluded(&self, i: usize, j: usize) -> bool {
        self.exclusions[i].binary_search(&j).is_ok()
    }
}

pub struct Parameterizer<'a> {
    forcefield: &'a Forcefield,
    water_model: &'a str,
}

struct AtomParams {
    mass: f64,
    charge: f64,
    sigma: f64,
    epsilon: f64,
}

impl<'a> Parameterizer<'a> {
    pub fn new(forcefield: &'a Forcefield, water_model: &'a str) -> Self {
        Self {
            forcefield,
            water_model,
        }
    }

    /// Checks that every residue is covered by a template, the water model or an ion entry.
    pub fn check_coverage(&self, system: &MolecularSystem) -> Result<(), ParameterizationError> {
        for (_, residue) in system.residues_iter() {
            self.check_residue(system, residue)?;
        }
        Ok(())
    }

    fn check_residue(
        &self,
        system: &MolecularSystem,
        residue: &Residue,
    ) -> Result<(), ParameterizationError> {
        match residue.category {
            ResidueCategory::Water => {
                self.forcefield
                    .water_model(self.water_model)
                    .ok_or_else(|| ParameterizationError::MissingWaterModel(self.water_model.into()))?;
            }
            ResidueCategory::Ion => {
                for &atom_id in residue.atoms() {
                    if let Some(atom) = system.atom(atom_id) {
                        if self.forcefield.ion(&atom.element).is_none() {
                            return Err(ParameterizationError::MissingIonParams {
                                element: atom.element.clone(),
                                residue_name: residue.name.clone(),
                            });
                        }
                    }
                }
            }
            ResidueCategory::Standard | ResidueCategory::Hetero => {
                if !self.forcefield.has_residue(&residue.name) {
                    let chain_id = system.chain(residue.chain_id).map(|c| c.id).unwrap_or(' ');
                    return Err(ParameterizationError::UnknownResidue {
                        residue_name: residue.name.clone(),
                        residue_number: residue.residue_number,
                        chain_id,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn parameterize_system(
        &self,
        system: &MolecularSystem,
    ) -> Result<SystemParameters, ParameterizationError> {
        self.check_coverage(system)?;

        let atom_ids = system.atom_ids_in_order();
        let n = atom_ids.len();
        let mut params = SystemParameters {
            masses: Vec::with_capacity(n),
            charges: Vec::with_capacity(n),
            sigmas: Vec::with_capacity(n),
            epsilons: Vec::with_capacity(n),
            reaction_field_dielectric: self.forcefield.globals.reaction_field_dielectric,
            ..Default::default()
        };

        let mut atoms: Vec<(&Atom, &Residue)> = Vec::with_capacity(n);
        for &atom_id in &atom_ids {
            let Some(atom) = system.atom(atom_id) else {
                continue;
            };
            let Some(residue) = system.residue(atom.residue_id) else {
                continue;
            };
            let p = self.assign_atom_params(atom, residue)?;
            params.masses.push(p.mass);
            params.charges.push(p.charge);
            params.sigmas.push(p.sigma);
            params.epsilons.push(p.epsilon);
            atoms.push((atom, residue));
        }

        let bond_pairs = system.bond_index_pairs();
        let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); n];
        for &(i, j) in &bond_pairs {
            let (a, ra) = atoms[i];
            let (b, _) = atoms[j];
            let bond = self.forcefield.bond(&a.element, &b.element).ok_or_else(|| {
                ParameterizationError::MissingBondParams {
                    elements: format!("{}-{}", a.element, b.element),
                    atom1: a.name.clone(),
                    atom2: b.name.clone(),
                    residue_name: ra.name.clone(),
                }
            })?;
            params.bonds.push(HarmonicBond {
                i,
                j,
                length: bond.length,
                k: bond.k,
            });
            neighbors[i].push(j);
            neighbors[j].push(i);
        }
        for list in &mut neighbors {
            list.sort_unstable();
            list.dedup();
        }

        let mut missing_angles = 0usize;
        for (center, list) in neighbors.iter().enumerate() {
            for (x, &i) in list.iter().enumerate() {
                for &k_atom in &list[x + 1..] {
                    let e = |idx: usize| atoms[idx].0.element.as_str();
                    match self.forcefield.angle(e(i), e(center), e(k_atom)) {
                        Some(angle) => params.angles.push(HarmonicAngle {
                            i,
                            j: center,
                            k_atom,
                            theta0: angle.angle.to_radians(),
                            k: angle.k,
                        }),
                        None => missing_angles += 1,
                    }
                }
            }
        }
        if missing_angles > 0 {
            debug!(
                "{} angles have no parameters and are left unrestrained.",
                missing_angles
            );
        }

        let (exclusions, pairs) = exclusions_and_14_pairs(&neighbors);
        let globals = &self.forcefield.globals;
        params.pairs_14 = pairs
            .into_iter()
            .map(|(i, j)| ScaledPair {
                i,
                j,
                sigma: 0.5 * (params.sigmas[i] + params.sigmas[j]),
                epsilon: globals.lj_14_scale * (params.epsilons[i] * params.epsilons[j]).sqrt(),
                charge_product: globals.coulomb_14_scale * params.charges[i] * params.charges[j],
            })
            .collect();
        params.exclusions = exclusions;
        params.molecules = system.molecules();

        Ok(params)
    }

    fn assign_atom_params(
        &self,
        atom: &Atom,
        residue: &Residue,
    ) -> Result<AtomParams, ParameterizationError> {
        let atom_type = self.forcefield.atom_type(&atom.element).ok_or_else(|| {
            ParameterizationError::MissingAtomType {
                element: atom.element.clone(),
                atom_name: atom.name.clone(),
                residue_name: residue.name.clone(),
            }
        })?;
        let mut p = AtomParams {
            mass: atom_type.mass,
            charge: 0.0,
            sigma: atom_type.sigma,
            epsilon: atom_type.epsilon,
        };

        match residue.category {
            ResidueCategory::Water => {
                let model = self
                    .forcefield
                    .water_model(self.water_model)
                    .ok_or_else(|| ParameterizationError::MissingWaterModel(self.water_model.into()))?;
                p.charge = *model.charges.get(&atom.element).ok_or_else(|| {
                    ParameterizationError::IncompleteWaterModel {
                        model: self.water_model.into(),
                        element: atom.element.clone(),
                    }
                })?;
                if let Some(lj) = model.lj.get(&atom.element) {
                    p.sigma = lj.sigma;
                    p.epsilon = lj.epsilon;
                }
            }
            ResidueCategory::Ion => {
                let ion = self.forcefield.ion(&atom.element).ok_or_else(|| {
                    ParameterizationError::MissingIonParams {
                        element: atom.element.clone(),
                        residue_name: residue.name.clone(),
                    }
                })?;
                p.charge = ion.charge;
                p.sigma = ion.sigma.unwrap_or(p.sigma);
                p.epsilon = ion.epsilon.unwrap_or(p.epsilon);
            }
            ResidueCategory::Standard | ResidueCategory::Hetero => {
                if let Some(template) = self.forcefield.residues.get(&residue.name) {
                    p.charge = template.charges.get(&atom.name).copied().unwrap_or(0.0);
                }
            }
        }
        Ok(p)
    }
}

/// Builds per-atom exclusion lists (1-2, 1-3, 1-4) and the list of true 1-4 pairs.
fn exclusions_and_14_pairs(neighbors: &[Vec<usize>]) -> (Vec<Vec<usize>>, Vec<(usize, usize)>) {
    let n = neighbors.len();
    let mut exclusions: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    let mut close: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];

    for i in 0..n {
        for &j in &neighbors[i] {
            close[i].insert(j);
            for &k in &neighbors[j] {
                if k != i {
                    close[i].insert(k);
                }
            }
        }
    }

    let mut pairs = BTreeSet::new();
    for i in 0..n {
        for &j in &neighbors[i] {
            for &k in &neighbors[j] {
                if k == i {
                    continue;
                }
                for &l in &neighbors[k] {
                    if l != i && l != j && !close[i].contains(&l) {
                        pairs.insert((i.min(l), i.max(l)));
                    }
                }
            }
        }
        exclusions[i].extend(close[i].iter().copied());
    }
    for &(i, l) in &pairs {
        exclusions[i].insert(l);
        exclusions[l].insert(i);
    }

    (
        exclusions
            .into_iter()
            .map(|s| s.into_iter().collect())
            .collect(),
        pairs.into_iter().collect(),
    )
}

/// Human-readable residue label such as `ALA12 (chain A)`.
pub fn residue_label(system: &MolecularSystem, residue_id: ResidueId) -> Option<String> {
    let residue = system.residue(residue_id)?;
    let chain = system.chain(residue.chain_id)?;
    Some(format!(
        "{}{}{} (chain {})",
        residue.name,
        residue.residue_number,
        residue.insertion_code.map(String::from).unwrap_or_default(),
        chain.id
    ))
}
