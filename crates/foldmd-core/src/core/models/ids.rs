use slotmap::new_key_type;

new_key_type! {
    /// Stable handle of an atom inside a [`MolecularSystem`](super::system::MolecularSystem).
    pub struct AtomId;
    /// Stable handle of a residue.
    pub struct ResidueId;
    /// Stable handle of a chain.
    pub struct ChainId;
}
