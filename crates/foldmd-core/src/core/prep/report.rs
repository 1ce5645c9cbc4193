use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplacedResidue {
    pub chain_id: char,
    pub residue_number: isize,
    pub original: String,
    pub replacement: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResidueGapKind {
    NTerminal,
    Internal,
    CTerminal,
}

/// A run of residues absent from the model. `names` is empty when SEQRES does not say
/// what the residues were.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingResidues {
    pub chain_id: char,
    pub kind: ResidueGapKind,
    pub first_number: isize,
    pub names: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingAtoms {
    pub chain_id: char,
    pub residue_number: isize,
    pub residue_name: String,
    pub atoms: Vec<String>,
}

/// What preparation changed relative to the input structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreparationReport {
    pub replaced_residues: Vec<ReplacedResidue>,
    pub missing_residues: Vec<MissingResidues>,
    /// Terminal residues from `missing_residues` whose backbone was built.
    pub residues_built: usize,
    pub missing_atoms: Vec<MissingAtoms>,
    pub hydrogens_added: usize,
    pub waters_added: usize,
    pub cations_added: usize,
    pub anions_added: usize,
    pub box_lengths: Option<[f64; 3]>,
}

impl PreparationReport {
    pub fn missing_residue_count(&self) -> usize {
        self.missing_residues.iter().map(|m| m.count).sum()
    }

    /// Missing residues that remain absent from the prepared box.
    pub fn unbuilt_residue_count(&self) -> usize {
        self.missing_residue_count().saturating_sub(self.residues_built)
    }

    pub fn missing_atom_count(&self) -> usize {
        self.missing_atoms.iter().map(|m| m.atoms.len()).sum()
    }
}
