use crate::core::io::pdb::PdbFile;
use crate::core::io::traits::MolecularFile;
use crate::core::models::atom::{Atom, normalize_element};
use crate::core::models::ids::AtomId;
use crate::core::models::periodic::PeriodicBox;
use crate::core::models::residue::ResidueCategory;
use crate::core::models::system::MolecularSystem;
use crate::core::models::topology::BondOrder;
use crate::core::topology::templates::{IonSpecies, chain_type_for};
use bio_forge as bf;
use nalgebra::Point3;
use std::collections::HashMap;
use std::io::Cursor;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("bio-forge could not read the structure: {0}")]
    Io(String),
    #[error("bio-forge preparation failed: {0}")]
    Ops(String),
    #[error("failed to convert the prepared structure: {0}")]
    Conversion(String),
    #[error("ion '{0}' is not supported by the solvation engine")]
    UnsupportedIon(IonSpecies),
}

impl From<bf::io::Error> for BridgeError {
    fn from(e: bf::io::Error) -> Self {
        BridgeError::Io(e.to_string())
    }
}

impl From<bf::ops::Error> for BridgeError {
    fn from(e: bf::ops::Error) -> Self {
        BridgeError::Ops(e.to_string())
    }
}

/// Hands the system to bio-forge through an in-memory PDB so that residue aliases and
/// standard-residue assignment follow its own reader.
pub fn to_bio_structure(system: &MolecularSystem) -> Result<bf::Structure, BridgeError> {
    let mut buffer = Vec::new();
    PdbFile::write_system_to(system, &mut buffer)
        .map_err(|e| BridgeError::Conversion(e.to_string()))?;
    let context = bf::io::IoContext::new_default();
    let structure = bf::io::read_pdb_structure(Cursor::new(buffer), &context)?;
    Ok(structure)
}

pub fn to_bf_cation(ion: IonSpecies) -> Result<bf::ops::Cation, BridgeError> {
    match ion {
        IonSpecies::Sodium => Ok(bf::ops::Cation::Na),
        IonSpecies::Potassium => Ok(bf::ops::Cation::K),
        IonSpecies::Lithium => Ok(bf::ops::Cation::Li),
        other => Err(BridgeError::UnsupportedIon(other)),
    }
}

pub fn to_bf_anion(ion: IonSpecies) -> Result<bf::ops::Anion, BridgeError> {
    match ion {
        IonSpecies::Chloride => Ok(bf::ops::Anion::Cl),
        IonSpecies::Bromide => Ok(bf::ops::Anion::Br),
        IonSpecies::Iodide => Ok(bf::ops::Anion::I),
        IonSpecies::Fluoride => Ok(bf::ops::Anion::F),
        other => Err(BridgeError::UnsupportedIon(other)),
    }
}

fn convert_category(residue: &bf::Residue) -> ResidueCategory {
    if residue.standard_name == Some(bf::StandardResidue::HOH) {
        return ResidueCategory::Water;
    }
    match residue.category {
        bf::ResidueCategory::Standard => ResidueCategory::Standard,
        bf::ResidueCategory::Hetero => ResidueCategory::Hetero,
        bf::ResidueCategory::Ion => ResidueCategory::Ion,
    }
}

fn convert_bond_order(order: bf::BondOrder) -> BondOrder {
    match order {
        bf::BondOrder::Single => BondOrder::Single,
        bf::BondOrder::Double => BondOrder::Double,
        bf::BondOrder::Triple => BondOrder::Triple,
        bf::BondOrder::Aromatic => BondOrder::Aromatic,
    }
}

/// Converts a bio-forge topology back into a [`MolecularSystem`], keeping chain ids,
/// residue numbers and insertion codes.
pub fn from_bio_topology(topology: &bf::Topology) -> Result<MolecularSystem, BridgeError> {
    let structure = topology.structure();
    let mut system = MolecularSystem::new();
    let mut atom_ids: Vec<AtomId> = Vec::with_capacity(structure.atom_count());
    let mut seen_residues: HashMap<(char, isize, Option<char>), usize> = HashMap::new();
    let mut residue_serial = 0usize;
    let mut last_key = None;

    for (chain, residue, bio_atom) in structure.iter_atoms_with_context() {
        if matches!(bio_atom.element, bf::Element::Unknown) {
            return Err(BridgeError::Conversion(format!(
                "atom '{}' has an unknown element",
                bio_atom.name
            )));
        }
        let chain_char = chain.id.chars().next().unwrap_or(' ');
        let residue_name = residue.name.to_string();
        let residue_number = residue.id as isize;
        let key = (chain_char, residue_number, residue.insertion_code);

        if last_key != Some(key) {
            residue_serial += 1;
            if seen_residues.insert(key, residue_serial).is_some() {
                return Err(BridgeError::Conversion(format!(
                    "residue {} {} appears twice in chain '{}'",
                    residue_name, residue_number, chain_char
                )));
            }
            last_key = Some(key);
        }

        let category = convert_category(residue);
        let chain_id = system.add_chain(chain_char, chain_type_for(category, &residue_name));
        let residue_id = system
            .add_residue(
                chain_id,
                residue_number,
                residue.insertion_code,
                &residue_name,
                category,
            )
            .ok_or_else(|| BridgeError::Conversion("chain vanished".into()))?;

        let element = normalize_element(bio_atom.element.symbol());
        let position = Point3::new(bio_atom.pos.x, bio_atom.pos.y, bio_atom.pos.z);
        let atom = Atom::new(&bio_atom.name.to_string(), &element, residue_id, position);
        let atom_id = system
            .add_atom_to_residue(residue_id, atom)
            .ok_or_else(|| BridgeError::Conversion("residue vanished".into()))?;
        atom_ids.push(atom_id);
    }

    for bond in topology.bonds() {
        let (Some(&a), Some(&b)) = (atom_ids.get(bond.a1_idx), atom_ids.get(bond.a2_idx)) else {
            return Err(BridgeError::Conversion(format!(
                "bond ({}, {}) references a missing atom",
                bond.a1_idx, bond.a2_idx
            )));
        };
        system.add_bond(a, b, convert_bond_order(bond.order));
    }

    if let Some(rows) = structure.box_vectors {
        let cell = PeriodicBox::from_matrix_rows(rows).ok_or_else(|| {
            BridgeError::Conversion("the solvated box is not orthorhombic".into())
        })?;
        system.set_periodic_box(Some(cell));
    }

    Ok(system)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ion_species_map_to_solvation_ions() {
        assert!(matches!(to_bf_cation(IonSpecies::Sodium), Ok(bf::ops::Cation::Na)));
        assert!(matches!(to_bf_anion(IonSpecies::Chloride), Ok(bf::ops::Anion::Cl)));
        assert!(matches!(
            to_bf_cation(IonSpecies::Cesium),
            Err(BridgeError::UnsupportedIon(IonSpecies::Cesium))
        ));
        assert!(to_bf_anion(IonSpecies::Sodium).is_err());
    }

    #[test]
    fn converts_structure_with_water_and_bonds() {
        let mut water = bf::Residue::new(
            7,
            None,
            "HOH",
            Some(bf::StandardResidue::HOH),
            bf::ResidueCategory::Hetero,
        );
        water.add_atom(bf::Atom::new("O", bf::Element::O, bf::Point::new(1.0, 2.0, 3.0)));
        water.add_atom(bf::Atom::new("H1", bf::Element::H, bf::Point::new(1.9, 2.0, 3.0)));
        let mut chain = bf::Chain::new("W");
        chain.add_residue(water);
        let mut structure = bf::Structure::new();
        structure.add_chain(chain);
        structure.box_vectors = Some([[20.0, 0.0, 0.0], [0.0, 21.0, 0.0], [0.0, 0.0, 22.0]]);
        let topology = bf::Topology::new(structure, vec![bf::Bond::new(0, 1, bf::BondOrder::Single)]);

        let system = from_bio_topology(&topology).unwrap();
        assert_eq!(system.atom_count(), 2);
        assert_eq!(system.count_residues(ResidueCategory::Water), 1);
        assert_eq!(system.bond_index_pairs(), vec![(0, 1)]);
        assert_eq!(system.periodic_box(), Some(&PeriodicBox::new(20.0, 21.0, 22.0)));
        let (_, residue) = system.residues_iter().next().unwrap();
        assert_eq!(residue.residue_number, 7);
    }
}
