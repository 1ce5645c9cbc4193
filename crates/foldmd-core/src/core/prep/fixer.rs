use super::report::{MissingAtoms, MissingResidues, ReplacedResidue, ResidueGapKind};
use crate::core::models::atom::Atom;
use crate::core::models::chain::ChainType;
use crate::core::models::ids::{ChainId, ResidueId};
use crate::core::models::residue::ResidueCategory;
use crate::core::models::system::MolecularSystem;
use crate::core::topology::templates::{
    IonSpecies, is_amino_acid, nonstandard_atom_renames, nonstandard_parent, standard_heavy_atoms,
};
use nalgebra::{Point3, Vector3};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, UnitSphere};
use std::collections::BTreeMap;

const BOND_C_N: f64 = 1.33;
const BOND_N_CA: f64 = 1.46;
const BOND_CA_C: f64 = 1.52;
const BOND_C_O: f64 = 1.23;
/// Deflection of each backbone bond from the strand axis.
const STRAND_HALF_ANGLE: f64 = std::f64::consts::FRAC_PI_6;

/// Converts modified residues (MSE, SEP, ...) to their standard parents.
///
/// Atoms absent from the parent template are dropped, including hydrogens; renamed
/// atoms take the element of their new name.
pub fn replace_nonstandard_residues(system: &mut MolecularSystem) -> Vec<ReplacedResidue> {
    let candidates: Vec<(ResidueId, &'static str)> = system
        .residues_iter()
        .filter_map(|(id, r)| nonstandard_parent(&r.name).map(|parent| (id, parent)))
        .collect();

    let mut replaced = Vec::with_capacity(candidates.len());
    for (residue_id, parent) in candidates {
        let Some(residue) = system.residue(residue_id) else {
            continue;
        };
        let original = residue.name.clone();
        let chain_id = residue.chain_id;
        let number = residue.residue_number;

        for &(from, to) in nonstandard_atom_renames(&original) {
            if let Some(atom_id) = system.residue(residue_id).and_then(|r| r.get_atom_id_by_name(from)) {
                system.rename_atom(atom_id, to);
                if let Some(atom) = system.atom_mut(atom_id) {
                    atom.element = to[..1].to_string();
                }
            }
        }

        let template = standard_heavy_atoms(parent).unwrap_or(&[]);
        let to_drop: Vec<_> = system
            .residue(residue_id)
            .map(|r| r.atoms().to_vec())
            .unwrap_or_default()
            .into_iter()
            .filter(|&atom_id| {
                system
                    .atom(atom_id)
                    .is_some_and(|a| a.name != "OXT" && !template.contains(&a.name.as_str()))
            })
            .collect();
        for atom_id in to_drop {
            system.remove_atom(atom_id);
        }

        if let Some(residue) = system.residue_mut(residue_id) {
            residue.name = parent.to_string();
            residue.category = ResidueCategory::Standard;
        }
        let chain_char = match system.chain_mut(chain_id) {
            Some(chain) => {
                if chain.chain_type == ChainType::Ligand {
                    chain.chain_type = ChainType::Protein;
                }
                chain.id
            }
            None => ' ',
        };
        replaced.push(ReplacedResidue {
            chain_id: chain_char,
            residue_number: number,
            original,
            replacement: parent.to_string(),
        });
    }
    replaced
}

/// Finds residues absent from the model: internal numbering gaps in each protein chain,
/// and terminal residues declared by SEQRES beyond those observed.
pub fn find_missing_residues(
    system: &MolecularSystem,
    seqres: &BTreeMap<char, Vec<String>>,
) -> Vec<MissingResidues> {
    let mut missing = Vec::new();
    for (_, chain) in system.chains_iter() {
        let residues: Vec<_> = chain
            .residues()
            .iter()
            .filter_map(|&id| system.residue(id))
            .filter(|r| r.category == ResidueCategory::Standard && is_amino_acid(&r.name))
            .collect();
        let (Some(first), Some(last)) = (residues.first(), residues.last()) else {
            continue;
        };

        for pair in residues.windows(2) {
            let (a, b) = (pair[0].residue_number, pair[1].residue_number);
            if b > a + 1 {
                missing.push(MissingResidues {
                    chain_id: chain.id,
                    kind: ResidueGapKind::Internal,
                    first_number: a + 1,
                    names: Vec::new(),
                    count: (b - a - 1) as usize,
                });
            }
        }

        let Some(declared) = seqres.get(&chain.id) else {
            continue;
        };
        let spanned = (last.residue_number - first.residue_number + 1).max(0) as usize;
        let Some(excess) = declared.len().checked_sub(spanned).filter(|&e| e > 0) else {
            continue;
        };
        let leading = ((first.residue_number - 1).max(0) as usize).min(excess);
        let trailing = excess - leading;
        if leading > 0 {
            missing.push(MissingResidues {
                chain_id: chain.id,
                kind: ResidueGapKind::NTerminal,
                first_number: first.residue_number - leading as isize,
                names: declared[..leading].to_vec(),
                count: leading,
            });
        }
        if trailing > 0 {
            missing.push(MissingResidues {
                chain_id: chain.id,
                kind: ResidueGapKind::CTerminal,
                first_number: last.residue_number + 1,
                names: declared[declared.len() - trailing..].to_vec(),
                count: trailing,
            });
        }
    }
    missing
}

/// Builds the backbone of terminal residues that SEQRES names but the model lacks.
///
/// Each run is laid out as an extended strand continuing from the nearest observed
/// residue, in a plane drawn from `seed`. Side chains and the terminal oxygen are left
/// to template repair. Internal gaps and runs whose names are unknown are skipped.
/// Returns the number of residues added.
pub fn build_missing_terminal_residues(
    system: &mut MolecularSystem,
    gaps: &[MissingResidues],
    seed: u64,
) -> usize {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut built = 0;
    for gap in gaps {
        let toward_c = match gap.kind {
            ResidueGapKind::CTerminal => true,
            ResidueGapKind::NTerminal => false,
            ResidueGapKind::Internal => continue,
        };
        if gap.names.len() != gap.count {
            continue;
        }
        let Some(chain_id) = system.find_chain_by_id(gap.chain_id) else {
            continue;
        };
        let anchor_number = if toward_c {
            gap.first_number - 1
        } else {
            gap.first_number + gap.count as isize
        };
        let Some(anchor) = system.find_residue(chain_id, anchor_number, None) else {
            continue;
        };
        built += extend_strand(system, chain_id, anchor, gap, toward_c, &mut rng);
    }
    built
}

/// Zigzag walk along a fixed axis; successive bonds bend to alternate sides.
struct Strand {
    axis: Vector3<f64>,
    side: Vector3<f64>,
    sign: f64,
}

impl Strand {
    /// The next atom `length` Å away, with the side it bulges towards.
    fn step(&mut self, from: Point3<f64>, length: f64) -> (Point3<f64>, f64) {
        let sign = self.sign;
        self.sign = -sign;
        let bond = self.axis * STRAND_HALF_ANGLE.cos() + self.side * (sign * STRAND_HALF_ANGLE.sin());
        (from + bond * length, sign)
    }

    fn carbonyl_oxygen(&self, carbon: Point3<f64>, bulge: f64) -> Point3<f64> {
        carbon + self.side * (bulge * BOND_C_O)
    }
}

fn extend_strand(
    system: &mut MolecularSystem,
    chain_id: ChainId,
    anchor: ResidueId,
    gap: &MissingResidues,
    toward_c: bool,
    rng: &mut ChaCha8Rng,
) -> usize {
    let position = |system: &MolecularSystem, name: &str| {
        system
            .residue(anchor)
            .and_then(|r| r.get_atom_id_by_name(name))
            .and_then(|id| system.atom(id))
            .map(|a| a.position)
    };
    let growing_end = if toward_c { "C" } else { "N" };
    let (Some(ca), Some(mut tip)) = (position(system, "CA"), position(system, growing_end)) else {
        return 0;
    };
    let Some(axis) = (tip - ca).try_normalize(1e-6) else {
        return 0;
    };
    let mut strand = Strand {
        axis,
        side: random_perpendicular(&axis, rng),
        sign: 1.0,
    };
    let Some(mut slot) = system
        .chain(chain_id)
        .and_then(|c| c.residues().iter().position(|&id| id == anchor))
    else {
        return 0;
    };
    if toward_c {
        slot += 1;
    }

    let order: Vec<usize> = if toward_c {
        (0..gap.count).collect()
    } else {
        (0..gap.count).rev().collect()
    };
    let mut built = 0;
    for k in order {
        let number = gap.first_number + k as isize;
        if system.find_residue(chain_id, number, None).is_some() {
            break;
        }
        let backbone = if toward_c {
            let (n, _) = strand.step(tip, BOND_C_N);
            let (ca, _) = strand.step(n, BOND_N_CA);
            let (c, bulge) = strand.step(ca, BOND_CA_C);
            tip = c;
            [("N", n), ("CA", ca), ("C", c), ("O", strand.carbonyl_oxygen(c, bulge))]
        } else {
            let (c, bulge) = strand.step(tip, BOND_C_N);
            let (ca, _) = strand.step(c, BOND_CA_C);
            let (n, _) = strand.step(ca, BOND_N_CA);
            tip = n;
            [("N", n), ("CA", ca), ("C", c), ("O", strand.carbonyl_oxygen(c, bulge))]
        };

        let Some(residue) =
            system.add_residue(chain_id, number, None, &gap.names[k], ResidueCategory::Standard)
        else {
            break;
        };
        for (name, point) in backbone {
            system.add_atom_to_residue(residue, Atom::new(name, &name[..1], residue, point));
        }
        if let Some(chain) = system.chain_mut(chain_id) {
            chain.residues.retain(|&id| id != residue);
            chain.residues.insert(slot.min(chain.residues.len()), residue);
        }
        if toward_c {
            slot += 1;
        }
        built += 1;
    }
    built
}

fn random_perpendicular(axis: &Vector3<f64>, rng: &mut ChaCha8Rng) -> Vector3<f64> {
    loop {
        let v: [f64; 3] = UnitSphere.sample(rng);
        let v = Vector3::from(v);
        if let Some(side) = (v - axis * v.dot(axis)).try_normalize(1e-3) {
            return side;
        }
    }
}

/// Lists template heavy atoms absent from each amino acid, plus the terminal OXT of the
/// last residue of every protein chain.
pub fn find_missing_atoms(system: &MolecularSystem) -> Vec<MissingAtoms> {
    let mut missing = Vec::new();
    for (_, chain) in system.chains_iter() {
        let amino_acids: Vec<_> = chain
            .residues()
            .iter()
            .filter_map(|&id| system.residue(id))
            .filter(|r| is_amino_acid(&r.name))
            .collect();
        let count = amino_acids.len();
        for (k, residue) in amino_acids.into_iter().enumerate() {
            let mut atoms: Vec<String> = standard_heavy_atoms(&residue.name)
                .unwrap_or(&[])
                .iter()
                .filter(|name| !residue.has_atom(name))
                .map(|name| name.to_string())
                .collect();
            if k + 1 == count && !residue.has_atom("OXT") {
                atoms.push("OXT".to_string());
            }
            if !atoms.is_empty() {
                missing.push(MissingAtoms {
                    chain_id: chain.id,
                    residue_number: residue.residue_number,
                    residue_name: residue.name.clone(),
                    atoms,
                });
            }
        }
    }
    missing
}

/// Number of ion pairs that brings `n_water` waters to the given ionic strength.
pub fn ion_pairs_for_ionic_strength(ionic_strength: f64, n_water: usize) -> usize {
    (ionic_strength * n_water as f64 / 55.4).round() as usize
}

/// Replaces randomly chosen water molecules with cation/anion pairs.
///
/// The choice is a pure function of `seed`. Each replaced water keeps its residue slot:
/// hydrogens are removed and the oxygen becomes the ion. Returns the number of pairs placed.
pub fn apply_ionic_strength(
    system: &mut MolecularSystem,
    ionic_strength: f64,
    cation: IonSpecies,
    anion: IonSpecies,
    seed: u64,
) -> usize {
    let waters: Vec<ResidueId> = system
        .residues_iter()
        .filter(|(_, r)| r.category == ResidueCategory::Water)
        .map(|(id, _)| id)
        .collect();
    let pairs = ion_pairs_for_ionic_strength(ionic_strength, waters.len()).min(waters.len() / 2);
    if pairs == 0 {
        return 0;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut chosen = rand::seq::index::sample(&mut rng, waters.len(), 2 * pairs).into_vec();
    chosen.sort_unstable();
    let (cation_slots, anion_slots): (Vec<_>, Vec<_>) =
        chosen.into_iter().enumerate().partition(|(k, _)| k % 2 == 0);

    for (slots, ion) in [(cation_slots, cation), (anion_slots, anion)] {
        for (_, index) in slots {
            water_to_ion(system, waters[index], ion);
        }
    }
    pairs
}

fn water_to_ion(system: &mut MolecularSystem, residue_id: ResidueId, ion: IonSpecies) {
    let Some(atom_ids) = system.residue(residue_id).map(|r| r.atoms().to_vec()) else {
        return;
    };
    let oxygen = atom_ids
        .iter()
        .copied()
        .find(|&id| system.atom(id).is_some_and(|a| a.element == "O"));
    let Some(oxygen) = oxygen else {
        return;
    };
    for id in atom_ids.into_iter().filter(|&id| id != oxygen) {
        system.remove_atom(id);
    }
    let ion_name = ion.residue_name();
    system.rename_atom(oxygen, ion_name);
    if let Some(atom) = system.atom_mut(oxygen) {
        atom.element = ion.element().to_string();
    }
    if let Some(residue) = system.residue_mut(residue_id) {
        residue.name = ion_name.to_string();
        residue.category = ResidueCategory::Ion;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::topology::BondOrder;

    fn add_residue(
        system: &mut MolecularSystem,
        chain: char,
        number: isize,
        name: &str,
        atoms: &[&str],
    ) -> ResidueId {
        let category = if is_amino_acid(name) {
            ResidueCategory::Standard
        } else {
            ResidueCategory::Hetero
        };
        let chain_type = if category == ResidueCategory::Standard {
            ChainType::Protein
        } else {
            ChainType::Ligand
        };
        let chain_id = system.add_chain(chain, chain_type);
        let res = system
            .add_residue(chain_id, number, None, name, category)
            .unwrap();
        for (k, atom) in atoms.iter().enumerate() {
            let element = if *atom == "SE" { "Se" } else { &atom[..1] };
            system
                .add_atom_to_residue(
                    res,
                    Atom::new(atom, element, res, Point3::new(k as f64, number as f64, 0.0)),
                )
                .unwrap();
        }
        res
    }

    fn water_box(n: usize) -> MolecularSystem {
        let mut system = MolecularSystem::new();
        let chain = system.add_chain('W', ChainType::Solvent);
        for k in 0..n {
            let res = system
                .add_residue(chain, k as isize + 1, None, "HOH", ResidueCategory::Water)
                .unwrap();
            let o = system
                .add_atom_to_residue(res, Atom::new("O", "O", res, Point3::new(3.0 * k as f64, 0.0, 0.0)))
                .unwrap();
            for name in ["H1", "H2"] {
                let h = system
                    .add_atom_to_residue(res, Atom::new(name, "H", res, Point3::new(3.0 * k as f64, 1.0, 0.0)))
                    .unwrap();
                system.add_bond(o, h, BondOrder::Single).unwrap();
            }
        }
        system
    }

    #[test]
    fn selenomethionine_becomes_methionine() {
        let mut system = MolecularSystem::new();
        add_residue(&mut system, 'A', 1, "ALA", &["N", "CA", "C", "O", "CB"]);
        let mse = add_residue(
            &mut system,
            'A',
            2,
            "MSE",
            &["N", "CA", "C", "O", "CB", "CG", "SE", "CE", "HA"],
        );

        let replaced = replace_nonstandard_residues(&mut system);

        assert_eq!(
            replaced,
            vec![ReplacedResidue {
                chain_id: 'A',
                residue_number: 2,
                original: "MSE".into(),
                replacement: "MET".into()
            }]
        );
        let residue = system.residue(mse).unwrap();
        assert_eq!(residue.name, "MET");
        assert_eq!(residue.category, ResidueCategory::Standard);
        assert!(!residue.has_atom("HA"));
        let sd = residue.get_atom_id_by_name("SD").unwrap();
        assert_eq!(system.atom(sd).unwrap().element, "S");
        assert_eq!(residue.atoms().len(), 8);
    }

    #[test]
    fn detects_internal_gap_and_terminal_residues_from_seqres() {
        let mut system = MolecularSystem::new();
        let backbone = ["N", "CA", "C", "O"];
        add_residue(&mut system, 'A', 2, "GLY", &backbone);
        add_residue(&mut system, 'A', 3, "GLY", &backbone);
        add_residue(&mut system, 'A', 6, "GLY", &backbone);

        let mut seqres = BTreeMap::new();
        seqres.insert(
            'A',
            ["MET", "GLY", "GLY", "SER", "SER", "GLY", "LYS"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );

        let missing = find_missing_residues(&system, &seqres);
        assert_eq!(missing.len(), 3);
        assert_eq!(missing[0].kind, ResidueGapKind::Internal);
        assert_eq!((missing[0].first_number, missing[0].count), (4, 2));
        assert_eq!(missing[1].kind, ResidueGapKind::NTerminal);
        assert_eq!(missing[1].names, vec!["MET"]);
        assert_eq!(missing[1].first_number, 1);
        assert_eq!(missing[2].kind, ResidueGapKind::CTerminal);
        assert_eq!(missing[2].names, vec!["LYS"]);
        assert_eq!(missing[2].first_number, 7);
    }

    #[test]
    fn complete_chain_without_seqres_has_no_missing_residues() {
        let mut system = MolecularSystem::new();
        add_residue(&mut system, 'A', 1, "GLY", &["N", "CA", "C", "O"]);
        add_residue(&mut system, 'A', 2, "GLY", &["N", "CA", "C", "O"]);
        assert!(find_missing_residues(&system, &BTreeMap::new()).is_empty());
    }

    fn backbone_position(system: &MolecularSystem, number: isize, atom: &str) -> Point3<f64> {
        let chain = system.find_chain_by_id('A').unwrap();
        let residue = system.find_residue(chain, number, None).unwrap();
        let id = system.residue(residue).unwrap().get_atom_id_by_name(atom).unwrap();
        system.atom(id).unwrap().position
    }

    fn gapped_dipeptide() -> (MolecularSystem, Vec<MissingResidues>) {
        let mut system = MolecularSystem::new();
        let backbone = ["N", "CA", "C", "O"];
        add_residue(&mut system, 'A', 2, "GLY", &backbone);
        add_residue(&mut system, 'A', 3, "ALA", &backbone);
        let gaps = vec![
            MissingResidues {
                chain_id: 'A',
                kind: ResidueGapKind::NTerminal,
                first_number: 1,
                names: vec!["MET".into()],
                count: 1,
            },
            MissingResidues {
                chain_id: 'A',
                kind: ResidueGapKind::CTerminal,
                first_number: 4,
                names: vec!["SER".into(), "LYS".into()],
                count: 2,
            },
        ];
        (system, gaps)
    }

    #[test]
    fn terminal_residues_are_built_in_chain_order() {
        let (mut system, gaps) = gapped_dipeptide();

        assert_eq!(build_missing_terminal_residues(&mut system, &gaps, 5), 3);

        let chain = system.find_chain_by_id('A').unwrap();
        let order: Vec<(isize, String)> = system
            .chain(chain)
            .unwrap()
            .residues()
            .iter()
            .map(|&id| system.residue(id).unwrap())
            .map(|r| (r.residue_number, r.name.clone()))
            .collect();
        let names: Vec<(isize, &str)> = order.iter().map(|(n, s)| (*n, s.as_str())).collect();
        assert_eq!(
            names,
            vec![(1, "MET"), (2, "GLY"), (3, "ALA"), (4, "SER"), (5, "LYS")]
        );
        for number in [1, 4, 5] {
            let residue = system.find_residue(chain, number, None).unwrap();
            let residue = system.residue(residue).unwrap();
            assert_eq!(residue.category, ResidueCategory::Standard);
            assert_eq!(residue.atoms().len(), 4);
        }

        let peptide = |c: isize, n: isize| {
            (backbone_position(&system, c, "C") - backbone_position(&system, n, "N")).norm()
        };
        assert!((peptide(1, 2) - BOND_C_N).abs() < 1e-9);
        assert!((peptide(3, 4) - BOND_C_N).abs() < 1e-9);
        assert!((peptide(4, 5) - BOND_C_N).abs() < 1e-9);
        let carbonyl = (backbone_position(&system, 5, "C") - backbone_position(&system, 5, "O")).norm();
        assert!((carbonyl - BOND_C_O).abs() < 1e-9);
    }

    #[test]
    fn built_residues_depend_only_on_the_seed() {
        let build = |seed| {
            let (mut system, gaps) = gapped_dipeptide();
            build_missing_terminal_residues(&mut system, &gaps, seed);
            system.positions()
        };
        assert_eq!(build(5), build(5));
        assert_ne!(build(5), build(6));
    }

    #[test]
    fn internal_and_unnamed_gaps_are_left_alone() {
        let (mut system, _) = gapped_dipeptide();
        let atoms = system.atom_count();
        let gaps = vec![
            MissingResidues {
                chain_id: 'A',
                kind: ResidueGapKind::Internal,
                first_number: 4,
                names: Vec::new(),
                count: 2,
            },
            MissingResidues {
                chain_id: 'B',
                kind: ResidueGapKind::CTerminal,
                first_number: 4,
                names: vec!["GLY".into()],
                count: 1,
            },
        ];
        assert_eq!(build_missing_terminal_residues(&mut system, &gaps, 1), 0);
        assert_eq!(system.atom_count(), atoms);
    }

    #[test]
    fn detects_missing_heavy_atoms_and_terminal_oxygen() {
        let mut system = MolecularSystem::new();
        add_residue(&mut system, 'A', 1, "SER", &["N", "CA", "C", "O"]);
        add_residue(&mut system, 'A', 2, "GLY", &["N", "CA", "C", "O"]);

        let missing = find_missing_atoms(&system);
        assert_eq!(missing.len(), 2);
        assert_eq!(missing[0].residue_name, "SER");
        assert_eq!(missing[0].atoms, vec!["CB", "OG"]);
        assert_eq!(missing[1].residue_name, "GLY");
        assert_eq!(missing[1].atoms, vec!["OXT"]);
    }

    #[test]
    fn ion_pair_count_follows_water_molarity() {
        assert_eq!(ion_pairs_for_ionic_strength(0.0, 1000), 0);
        assert_eq!(ion_pairs_for_ionic_strength(0.15, 1000), 3);
        assert_eq!(ion_pairs_for_ionic_strength(1.0, 554), 10);
    }

    #[test]
    fn ionic_strength_replacement_is_seeded_and_counted() {
        let run = |seed| {
            let mut system = water_box(400);
            let pairs = apply_ionic_strength(
                &mut system,
                0.5,
                IonSpecies::Sodium,
                IonSpecies::Chloride,
                seed,
            );
            let ions: Vec<(isize, String)> = system
                .residues_iter()
                .filter(|(_, r)| r.category == ResidueCategory::Ion)
                .map(|(_, r)| (r.residue_number, r.name.clone()))
                .collect();
            (pairs, ions, system)
        };

        let (pairs, ions, system) = run(11);
        assert_eq!(pairs, 4);
        assert_eq!(ions.len(), 8);
        assert_eq!(ions.iter().filter(|(_, n)| n == "NA").count(), 4);
        assert_eq!(ions.iter().filter(|(_, n)| n == "CL").count(), 4);
        assert_eq!(system.count_residues(ResidueCategory::Water), 392);
        assert_eq!(system.atom_count(), 392 * 3 + 8);
        assert_eq!(run(11).1, ions);
    }
}
