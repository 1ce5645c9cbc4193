use super::ids::{AtomId, ChainId};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Broad classification of a residue, used when deciding how the forcefield
/// covers it and how it is written back to structure files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResidueCategory {
    /// A standard polymer residue (amino acid or nucleotide).
    #[default]
    Standard,
    /// Any other molecule (ligands, unrecognized residues).
    Hetero,
    /// A solvent water molecule.
    Water,
    /// A monatomic ion.
    Ion,
}

impl ResidueCategory {
    /// Whether atoms of this category are written as `HETATM` records.
    pub fn is_hetero_record(&self) -> bool {
        !matches!(self, ResidueCategory::Standard)
    }
}

#[derive(Debug, Error)]
#[error("Invalid residue category string")]
pub struct ParseResidueCategoryError;

impl FromStr for ResidueCategory {
    type Err = ParseResidueCategoryError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "hetero" => Ok(Self::Hetero),
            "water" => Ok(Self::Water),
            "ion" => Ok(Self::Ion),
            _ => Err(ParseResidueCategoryError),
        }
    }
}

impl fmt::Display for ResidueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Standard => "Standard",
                Self::Hetero => "Hetero",
                Self::Water => "Water",
                Self::Ion => "Ion",
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Residue {
    pub residue_number: isize,              // Residue sequence number from source file
    pub insertion_code: Option<char>,       // PDB insertion code, if any
    pub name: String,                       // Name of the residue (e.g., "ALA", "HOH")
    pub category: ResidueCategory,          // Classification used by preparation and I/O
    pub chain_id: ChainId,                  // ID of the parent chain
    pub(crate) atoms: Vec<AtomId>,          // Atoms in file order
    atom_name_map: HashMap<String, AtomId>, // Map from atom name to its stable ID
}

impl Residue {
    pub(crate) fn new(
        residue_number: isize,
        insertion_code: Option<char>,
        name: &str,
        category: ResidueCategory,
        chain_id: ChainId,
    ) -> Self {
        Self {
            residue_number,
            insertion_code,
            name: name.to_string(),
            category,
            chain_id,
            atoms: Vec::new(),
            atom_name_map: HashMap::new(),
        }
    }

    pub(crate) fn add_atom(&mut self, atom_name: &str, atom_id: AtomId) {
        self.atoms.push(atom_id);
        self.atom_name_map.insert(atom_name.to_string(), atom_id);
    }

    pub(crate) fn remove_atom(&mut self, atom_name: &str, atom_id: AtomId) {
        self.atoms.retain(|&id| id != atom_id);
        if self.atom_name_map.get(atom_name) == Some(&atom_id) {
            self.atom_name_map.remove(atom_name);
        }
    }

    pub(crate) fn rename_atom(&mut self, old_name: &str, new_name: &str) {
        if let Some(id) = self.atom_name_map.remove(old_name) {
            self.atom_name_map.insert(new_name.to_string(), id);
        }
    }

    pub fn atoms(&self) -> &[AtomId] {
        &self.atoms
    }

    pub fn get_atom_id_by_name(&self, name: &str) -> Option<AtomId> {
        self.atom_name_map.get(name).copied()
    }

    pub fn has_atom(&self, name: &str) -> bool {
        self.atom_name_map.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ids::{AtomId, ChainId};
    use slotmap::KeyData;

    fn dummy_atom_id(n: u64) -> AtomId {
        AtomId::from(KeyData::from_ffi(n))
    }

    fn dummy_chain_id(n: u64) -> ChainId {
        ChainId::from(KeyData::from_ffi(n))
    }

    #[test]
    fn new_residue_initializes_fields_correctly() {
        let chain_id = dummy_chain_id(1);
        let residue = Residue::new(10, Some('A'), "GLY", ResidueCategory::Standard, chain_id);
        assert_eq!(residue.residue_number, 10);
        assert_eq!(residue.insertion_code, Some('A'));
        assert_eq!(residue.name, "GLY");
        assert_eq!(residue.chain_id, chain_id);
        assert!(residue.atoms().is_empty());
        assert!(!residue.has_atom("CA"));
    }

    #[test]
    fn add_and_remove_atom_keep_name_map_in_sync() {
        let mut residue = Residue::new(5, None, "ALA", ResidueCategory::Standard, dummy_chain_id(2));
        let ca = dummy_atom_id(42);
        let cb = dummy_atom_id(43);
        residue.add_atom("CA", ca);
        residue.add_atom("CB", cb);
        assert_eq!(residue.atoms(), &[ca, cb]);
        assert_eq!(residue.get_atom_id_by_name("CB"), Some(cb));

        residue.remove_atom("CB", cb);
        assert_eq!(residue.atoms(), &[ca]);
        assert!(!residue.has_atom("CB"));
    }

    #[test]
    fn rename_atom_moves_the_mapping() {
        let mut residue = Residue::new(1, None, "MSE", ResidueCategory::Hetero, dummy_chain_id(3));
        let se = dummy_atom_id(7);
        residue.add_atom("SE", se);
        residue.rename_atom("SE", "SD");
        assert_eq!(residue.get_atom_id_by_name("SD"), Some(se));
        assert!(residue.get_atom_id_by_name("SE").is_none());
    }

    #[test]
    fn category_parses_and_displays() {
        assert_eq!("water".parse::<ResidueCategory>().unwrap(), ResidueCategory::Water);
        assert_eq!("ION".parse::<ResidueCategory>().unwrap(), ResidueCategory::Ion);
        assert!("ligand".parse::<ResidueCategory>().is_err());
        assert_eq!(ResidueCategory::Hetero.to_string(), "Hetero");
        assert!(ResidueCategory::Water.is_hetero_record());
        assert!(!ResidueCategory::Standard.is_hetero_record());
    }
}
