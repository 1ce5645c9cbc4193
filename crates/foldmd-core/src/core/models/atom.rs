use super::ids::ResidueId;
use nalgebra::Point3;

/// Represents an atom in a molecular structure.
///
/// Atoms carry the identity read from (or written to) structure files together with
/// their Cartesian position. Force field parameters are not stored here; they are
/// resolved per simulation by the [`Parameterizer`](crate::core::forcefield::parameterization::Parameterizer).
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// The name of the atom (e.g., "CA", "N", "OW").
    pub name: String,
    /// Chemical element symbol in canonical capitalization (e.g., "C", "Na", "Cl").
    pub element: String,
    /// Serial number from the source file; `None` for atoms added during preparation.
    pub serial: Option<usize>,
    /// The ID of the parent residue this atom belongs to.
    pub residue_id: ResidueId,
    /// The 3D coordinates of the atom in Angstroms.
    pub position: Point3<f64>,
}

impl Atom {
    /// Creates a new `Atom` without a source serial number.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the atom.
    /// * `element` - The element symbol; normalized with [`normalize_element`].
    /// * `residue_id` - The ID of the residue this atom belongs to.
    /// * `position` - The 3D coordinates of the atom.
    pub fn new(name: &str, element: &str, residue_id: ResidueId, position: Point3<f64>) -> Self {
        Self {
            name: name.to_string(),
            element: normalize_element(element),
            serial: None,
            residue_id,
            position,
        }
    }

    pub fn with_serial(mut self, serial: usize) -> Self {
        self.serial = Some(serial);
        self
    }

    pub fn is_hydrogen(&self) -> bool {
        self.element == "H"
    }
}

/// Normalizes an element symbol to its canonical capitalization ("CL" -> "Cl").
pub fn normalize_element(symbol: &str) -> String {
    let trimmed = symbol.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => {
            let mut out = first.to_ascii_uppercase().to_string();
            out.extend(chars.map(|c| c.to_ascii_lowercase()));
            out
        }
        None => String::new(),
    }
}

/// Guesses the element of an atom from its PDB atom name.
///
/// Used when the element columns of a structure file are blank. Two-letter elements
/// are recognized only when the residue is itself an ion or the name is left-aligned
/// in the way PDB writers align two-letter element names.
pub fn infer_element(atom_name: &str, residue_name: &str) -> String {
    const ION_ELEMENTS: &[&str] = &["NA", "CL", "K", "MG", "CA", "ZN", "LI", "BR", "F", "I"];

    let name = atom_name.trim().to_ascii_uppercase();
    let res = residue_name
        .trim()
        .trim_end_matches(['+', '-'])
        .to_ascii_uppercase();
    if ION_ELEMENTS.contains(&res.as_str()) && name.starts_with(&res) {
        return normalize_element(&res);
    }

    let letters: String = name.chars().filter(|c| c.is_ascii_alphabetic()).collect();
    match letters.chars().next() {
        Some('H') | Some('D') => "H".to_string(),
        Some(c) => normalize_element(&c.to_string()),
        None => String::new(),
    }
}
