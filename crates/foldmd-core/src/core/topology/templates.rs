use crate::core::models::chain::ChainType;
use crate::core::models::residue::ResidueCategory;
use phf::{Map, Set, phf_map, phf_set};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Heavy atoms (no hydrogens, no terminal OXT) of each standard amino acid, including
/// the common protonation-state variants used by Amber-style forcefields.
static STANDARD_HEAVY_ATOMS: Map<&'static str, &'static [&'static str]> = phf_map! {
    "ALA" => &["N", "CA", "C", "O", "CB"],
    "ARG" => &["N", "CA", "C", "O", "CB", "CG", "CD", "NE", "CZ", "NH1", "NH2"],
    "ASN" => &["N", "CA", "C", "O", "CB", "CG", "OD1", "ND2"],
    "ASP" => &["N", "CA", "C", "O", "CB", "CG", "OD1", "OD2"],
    "ASH" => &["N", "CA", "C", "O", "CB", "CG", "OD1", "OD2"],
    "CYS" => &["N", "CA", "C", "O", "CB", "SG"],
    "CYX" => &["N", "CA", "C", "O", "CB", "SG"],
    "CYM" => &["N", "CA", "C", "O", "CB", "SG"],
    "GLN" => &["N", "CA", "C", "O", "CB", "CG", "CD", "OE1", "NE2"],
    "GLU" => &["N", "CA", "C", "O", "CB", "CG", "CD", "OE1", "OE2"],
    "GLH" => &["N", "CA", "C", "O", "CB", "CG", "CD", "OE1", "OE2"],
    "GLY" => &["N", "CA", "C", "O"],
    "HIS" => &["N", "CA", "C", "O", "CB", "CG", "ND1", "CD2", "CE1", "NE2"],
    "HID" => &["N", "CA", "C", "O", "CB", "CG", "ND1", "CD2", "CE1", "NE2"],
    "HIE" => &["N", "CA", "C", "O", "CB", "CG", "ND1", "CD2", "CE1", "NE2"],
    "HIP" => &["N", "CA", "C", "O", "CB", "CG", "ND1", "CD2", "CE1", "NE2"],
    "ILE" => &["N", "CA", "C", "O", "CB", "CG1", "CG2", "CD1"],
    "LEU" => &["N", "CA", "C", "O", "CB", "CG", "CD1", "CD2"],
    "LYS" => &["N", "CA", "C", "O", "CB", "CG", "CD", "CE", "NZ"],
    "LYN" => &["N", "CA", "C", "O", "CB", "CG", "CD", "CE", "NZ"],
    "MET" => &["N", "CA", "C", "O", "CB", "CG", "SD", "CE"],
    "PHE" => &["N", "CA", "C", "O", "CB", "CG", "CD1", "CD2", "CE1", "CE2", "CZ"],
    "PRO" => &["N", "CA", "C", "O", "CB", "CG", "CD"],
    "SER" => &["N", "CA", "C", "O", "CB", "OG"],
    "THR" => &["N", "CA", "C", "O", "CB", "OG1", "CG2"],
    "TRP" => &["N", "CA", "C", "O", "CB", "CG", "CD1", "CD2", "NE1", "CE2", "CE3", "CZ2", "CZ3", "CH2"],
    "TYR" => &["N", "CA", "C", "O", "CB", "CG", "CD1", "CD2", "CE1", "CE2", "CZ", "OH"],
    "VAL" => &["N", "CA", "C", "O", "CB", "CG1", "CG2"],
};

static NUCLEIC_RESIDUES: Set<&'static str> = phf_set! {
    "A", "C", "G", "U", "I", "DA", "DC", "DG", "DT", "DI",
};

static WATER_RESIDUES: Set<&'static str> = phf_set! {
    "HOH", "WAT", "H2O", "SOL", "TIP", "TIP3", "TP3", "SPC", "DOD",
};

/// Monatomic ion residue names and the element they carry.
static ION_RESIDUES: Map<&'static str, &'static str> = phf_map! {
    "NA" => "Na", "NA+" => "Na", "SOD" => "Na",
    "K" => "K", "K+" => "K", "POT" => "K",
    "LI" => "Li", "LI+" => "Li",
    "CS" => "Cs", "RB" => "Rb",
    "CL" => "Cl", "CL-" => "Cl", "CLA" => "Cl",
    "BR" => "Br", "IOD" => "I", "F" => "F",
    "MG" => "Mg", "CA" => "Ca", "ZN" => "Zn",
};

/// Modified residues and the standard residue they are replaced with.
static NONSTANDARD_PARENTS: Map<&'static str, &'static str> = phf_map! {
    "MSE" => "MET", "FME" => "MET",
    "SEP" => "SER",
    "TPO" => "THR",
    "PTR" => "TYR", "TYS" => "TYR",
    "HYP" => "PRO",
    "MLY" => "LYS", "M3L" => "LYS", "KCX" => "LYS", "LLP" => "LYS", "ALY" => "LYS",
    "CSO" => "CYS", "CSD" => "CYS", "CME" => "CYS", "OCS" => "CYS", "CSS" => "CYS", "CSX" => "CYS",
    "MEN" => "ASN",
    "HIC" => "HIS", "NEP" => "HIS",
    "PCA" => "GLU", "CGU" => "GLU",
    "DAL" => "ALA", "AIB" => "ALA",
    "MLE" => "LEU", "NLE" => "LEU",
    "MVA" => "VAL", "DVA" => "VAL",
    "SAR" => "GLY",
    "PHI" => "PHE", "PHL" => "PHE",
    "TRO" => "TRP",
    "ASA" => "ASP",
};

/// Atoms of modified residues that keep their identity under a different name in the parent.
static NONSTANDARD_ATOM_RENAMES: Map<&'static str, &'static [(&'static str, &'static str)]> = phf_map! {
    "MSE" => &[("SE", "SD")],
};

/// Returns the template heavy atoms of a standard amino acid.
pub fn standard_heavy_atoms(residue_name: &str) -> Option<&'static [&'static str]> {
    STANDARD_HEAVY_ATOMS.get(residue_name).copied()
}

pub fn is_amino_acid(residue_name: &str) -> bool {
    STANDARD_HEAVY_ATOMS.contains_key(residue_name)
}

pub fn is_nucleic_acid(residue_name: &str) -> bool {
    NUCLEIC_RESIDUES.contains(residue_name)
}

pub fn is_water(residue_name: &str) -> bool {
    WATER_RESIDUES.contains(residue_name)
}

/// Element carried by a monatomic ion residue.
pub fn ion_element(residue_name: &str) -> Option<&'static str> {
    ION_RESIDUES.get(residue_name.to_ascii_uppercase().as_str()).copied()
}

/// Standard parent of a modified residue.
pub fn nonstandard_parent(residue_name: &str) -> Option<&'static str> {
    NONSTANDARD_PARENTS.get(residue_name).copied()
}

/// Atom renames applied when a modified residue is converted to its parent.
pub fn nonstandard_atom_renames(residue_name: &str) -> &'static [(&'static str, &'static str)] {
    NONSTANDARD_ATOM_RENAMES
        .get(residue_name)
        .copied()
        .unwrap_or(&[])
}

/// Classifies a residue by name.
///
/// Single-atom residues named like ions are only treated as ions when `atom_count` is 1,
/// so that a calcium ion ("CA") is never confused with residues that merely share a name.
pub fn classify_residue(residue_name: &str, atom_count: usize) -> ResidueCategory {
    let name = residue_name.trim();
    if is_amino_acid(name) || is_nucleic_acid(name) {
        ResidueCategory::Standard
    } else if is_water(name) {
        ResidueCategory::Water
    } else if atom_count <= 1 && ion_element(name).is_some() {
        ResidueCategory::Ion
    } else {
        ResidueCategory::Hetero
    }
}

/// Chain type implied by the first residue that creates a chain.
pub fn chain_type_for(category: ResidueCategory, residue_name: &str) -> ChainType {
    match category {
        ResidueCategory::Standard if is_nucleic_acid(residue_name) => ChainType::NucleicAcid,
        ResidueCategory::Standard => ChainType::Protein,
        ResidueCategory::Water | ResidueCategory::Ion => ChainType::Solvent,
        ResidueCategory::Hetero => ChainType::Ligand,
    }
}

/// A monatomic ion species as named in preparation options ("Na+", "Cl-", "K+").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IonSpecies {
    Sodium,
    Potassium,
    Lithium,
    Cesium,
    Rubidium,
    Chloride,
    Bromide,
    Iodide,
    Fluoride,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown ion species '{0}'")]
pub struct ParseIonSpeciesError(pub String);

impl IonSpecies {
    pub fn element(&self) -> &'static str {
        match self {
            Self::Sodium => "Na",
            Self::Potassium => "K",
            Self::Lithium => "Li",
            Self::Cesium => "Cs",
            Self::Rubidium => "Rb",
            Self::Chloride => "Cl",
            Self::Bromide => "Br",
            Self::Iodide => "I",
            Self::Fluoride => "F",
        }
    }

    pub fn charge(&self) -> i32 {
        match self {
            Self::Sodium | Self::Potassium | Self::Lithium | Self::Cesium | Self::Rubidium => 1,
            Self::Chloride | Self::Bromide | Self::Iodide | Self::Fluoride => -1,
        }
    }

    pub fn is_cation(&self) -> bool {
        self.charge() > 0
    }

    /// Residue name used when writing the ion to a structure file.
    pub fn residue_name(&self) -> &'static str {
        match self {
            Self::Sodium => "NA",
            Self::Potassium => "K",
            Self::Lithium => "LI",
            Self::Cesium => "CS",
            Self::Rubidium => "RB",
            Self::Chloride => "CL",
            Self::Bromide => "BR",
            Self::Iodide => "IOD",
            Self::Fluoride => "F",
        }
    }
}

impl FromStr for IonSpecies {
    type Err = ParseIonSpeciesError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bare = s.trim().trim_end_matches(['+', '-']).to_ascii_lowercase();
        match bare.as_str() {
            "na" | "sodium" => Ok(Self::Sodium),
            "k" | "potassium" => Ok(Self::Potassium),
            "li" | "lithium" => Ok(Self::Lithium),
            "cs" | "cesium" => Ok(Self::Cesium),
            "rb" | "rubidium" => Ok(Self::Rubidium),
            "cl" | "chloride" => Ok(Self::Chloride),
            "br" | "bromide" => Ok(Self::Bromide),
            "i" | "iodide" => Ok(Self::Iodide),
            "f" | "fluoride" => Ok(Self::Fluoride),
            _ => Err(ParseIonSpeciesError(s.to_string())),
        }
    }
}

impl fmt::Display for IonSpecies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_cation() { '+' } else { '-' };
        write!(f, "{}{}", self.element(), sign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_recognizes_each_category() {
        assert_eq!(classify_residue("ALA", 10), ResidueCategory::Standard);
        assert_eq!(classify_residue("HIE", 17), ResidueCategory::Standard);
        assert_eq!(classify_residue("DA", 30), ResidueCategory::Standard);
        assert_eq!(classify_residue("HOH", 3), ResidueCategory::Water);
        assert_eq!(classify_residue("NA", 1), ResidueCategory::Ion);
        assert_eq!(classify_residue("CA", 1), ResidueCategory::Ion);
        assert_eq!(classify_residue("MSE", 8), ResidueCategory::Hetero);
        assert_eq!(classify_residue("LIG", 25), ResidueCategory::Hetero);
    }

    #[test]
    fn multi_atom_residue_named_like_an_ion_is_hetero() {
        assert_eq!(classify_residue("CL", 4), ResidueCategory::Hetero);
    }

    #[test]
    fn heavy_atom_templates_cover_backbone() {
        for name in ["ALA", "GLY", "TRP", "HIP", "CYX"] {
            let atoms = standard_heavy_atoms(name).unwrap();
            for backbone in ["N", "CA", "C", "O"] {
                assert!(atoms.contains(&backbone), "{name} lacks {backbone}");
            }
        }
        assert!(standard_heavy_atoms("HOH").is_none());
    }

    #[test]
    fn modified_residues_map_to_parents() {
        assert_eq!(nonstandard_parent("MSE"), Some("MET"));
        assert_eq!(nonstandard_parent("SEP"), Some("SER"));
        assert_eq!(nonstandard_parent("ALA"), None);
        assert_eq!(nonstandard_atom_renames("MSE"), &[("SE", "SD")]);
        assert!(nonstandard_atom_renames("SEP").is_empty());
    }

    #[test]
    fn ion_species_parse_from_common_spellings() {
        assert_eq!("Na+".parse::<IonSpecies>().unwrap(), IonSpecies::Sodium);
        assert_eq!("CL-".parse::<IonSpecies>().unwrap(), IonSpecies::Chloride);
        assert_eq!("k".parse::<IonSpecies>().unwrap(), IonSpecies::Potassium);
        assert!("Xe".parse::<IonSpecies>().is_err());
        assert_eq!(IonSpecies::Chloride.to_string(), "Cl-");
        assert_eq!(IonSpecies::Sodium.charge(), 1);
        assert!(!IonSpecies::Bromide.is_cation());
    }

    #[test]
    fn ion_element_is_case_insensitive() {
        assert_eq!(ion_element("na"), Some("Na"));
        assert_eq!(ion_element("Cl-"), Some("Cl"));
        assert_eq!(ion_element("HOH"), None);
    }
}
