use super::atom::Atom;
use super::chain::{Chain, ChainType};
use super::ids::{AtomId, ChainId, ResidueId};
use super::periodic::PeriodicBox;
use super::residue::{Residue, ResidueCategory};
use super::topology::{Bond, BondOrder};
use nalgebra::Point3;
use slotmap::{SecondaryMap, SlotMap};
use std::collections::HashMap;

type ResidueKey = (ChainId, isize, Option<char>);

/// Represents a complete molecular system with atoms, residues, chains, bonds and
/// an optional periodic cell.
///
/// Storage uses slot maps so that atoms can be removed during preparation without
/// invalidating other handles. The *canonical order* (chains in insertion order, then
/// residues, then atoms, each in file order) defines the dense atom indices used by
/// the simulation engine and by collective-variable definitions.
#[derive(Debug, Clone, Default)]
pub struct MolecularSystem {
    /// Primary storage for atoms.
    atoms: SlotMap<AtomId, Atom>,
    /// Primary storage for residues.
    residues: SlotMap<ResidueId, Residue>,
    /// Primary storage for chains.
    chains: SlotMap<ChainId, Chain>,
    /// Chains in the order they were first added.
    chain_order: Vec<ChainId>,
    /// List of all bonds in the system.
    bonds: Vec<Bond>,
    /// Lookup map for residues by chain, residue number and insertion code.
    residue_id_map: HashMap<ResidueKey, ResidueId>,
    /// Lookup map for chains by their single-character identifier.
    chain_id_map: HashMap<char, ChainId>,
    /// Cached adjacency list for bond connectivity, indexed by atom ID.
    bond_adjacency: SecondaryMap<AtomId, Vec<AtomId>>,
    /// Periodic cell, if the system is periodic.
    periodic_box: Option<PeriodicBox>,
}

impl MolecularSystem {
    /// Creates a new, empty molecular system.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn atom(&self, id: AtomId) -> Option<&Atom> {
        self.atoms.get(id)
    }

    pub fn atom_mut(&mut self, id: AtomId) -> Option<&mut Atom> {
        self.atoms.get_mut(id)
    }

    /// Returns an iterator over all atoms in storage order (not canonical order).
    pub fn atoms_iter(&self) -> impl Iterator<Item = (AtomId, &Atom)> {
        self.atoms.iter()
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn residue(&self, id: ResidueId) -> Option<&Residue> {
        self.residues.get(id)
    }

    pub fn residue_mut(&mut self, id: ResidueId) -> Option<&mut Residue> {
        self.residues.get_mut(id)
    }

    /// Returns an iterator over all residues in canonical order.
    pub fn residues_iter(&self) -> impl Iterator<Item = (ResidueId, &Residue)> {
        self.chain_order
            .iter()
            .filter_map(|cid| self.chains.get(*cid))
            .flat_map(|chain| chain.residues.iter())
            .filter_map(|rid| self.residues.get(*rid).map(|r| (*rid, r)))
    }

    pub fn chain(&self, id: ChainId) -> Option<&Chain> {
        self.chains.get(id)
    }

    pub fn chain_mut(&mut self, id: ChainId) -> Option<&mut Chain> {
        self.chains.get_mut(id)
    }

    /// Returns an iterator over all chains in insertion order.
    pub fn chains_iter(&self) -> impl Iterator<Item = (ChainId, &Chain)> {
        self.chain_order
            .iter()
            .filter_map(|cid| self.chains.get(*cid).map(|c| (*cid, c)))
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn periodic_box(&self) -> Option<&PeriodicBox> {
        self.periodic_box.as_ref()
    }

    pub fn set_periodic_box(&mut self, cell: Option<PeriodicBox>) {
        self.periodic_box = cell;
    }

    pub fn find_chain_by_id(&self, id: char) -> Option<ChainId> {
        self.chain_id_map.get(&id).copied()
    }

    /// Finds a residue by chain, residue number and insertion code.
    pub fn find_residue(
        &self,
        chain_id: ChainId,
        residue_number: isize,
        insertion_code: Option<char>,
    ) -> Option<ResidueId> {
        self.residue_id_map
            .get(&(chain_id, residue_number, insertion_code))
            .copied()
    }

    /// Adds a new chain to the system or returns the existing one with the same identifier.
    pub fn add_chain(&mut self, id: char, chain_type: ChainType) -> ChainId {
        if let Some(existing) = self.chain_id_map.get(&id) {
            return *existing;
        }
        let chain_id = self.chains.insert(Chain::new(id, chain_type));
        self.chain_id_map.insert(id, chain_id);
        self.chain_order.push(chain_id);
        chain_id
    }

    /// Adds a new residue to a chain, or returns the existing residue with the same
    /// number and insertion code.
    ///
    /// Returns `None` if the chain does not exist.
    pub fn add_residue(
        &mut self,
        chain_id: ChainId,
        residue_number: isize,
        insertion_code: Option<char>,
        name: &str,
        category: ResidueCategory,
    ) -> Option<ResidueId> {
        let chain = self.chains.get_mut(chain_id)?;
        let key = (chain_id, residue_number, insertion_code);

        let residue_id = *self.residue_id_map.entry(key).or_insert_with(|| {
            let residue = Residue::new(residue_number, insertion_code, name, category, chain_id);
            self.residues.insert(residue)
        });

        if !chain.residues.contains(&residue_id) {
            chain.residues.push(residue_id);
        }

        Some(residue_id)
    }

    /// Adds an atom to a residue. Returns `None` if the residue does not exist.
    pub fn add_atom_to_residue(&mut self, residue_id: ResidueId, mut atom: Atom) -> Option<AtomId> {
        if !self.residues.contains_key(residue_id) {
            return None;
        }
        atom.residue_id = residue_id;
        let name = atom.name.clone();

        let atom_id = self.atoms.insert(atom);
        self.bond_adjacency.insert(atom_id, Vec::new());
        self.residues.get_mut(residue_id)?.add_atom(&name, atom_id);

        Some(atom_id)
    }

    /// Adds a bond between two atoms. Adding an existing bond is a no-op.
    ///
    /// Returns `None` if either atom does not exist or both ends are the same atom.
    pub fn add_bond(&mut self, atom1_id: AtomId, atom2_id: AtomId, order: BondOrder) -> Option<()> {
        if atom1_id == atom2_id
            || !self.atoms.contains_key(atom1_id)
            || !self.atoms.contains_key(atom2_id)
        {
            return None;
        }

        if self
            .bond_adjacency
            .get(atom1_id)
            .is_some_and(|neighbors| neighbors.contains(&atom2_id))
        {
            return Some(());
        }

        self.bonds.push(Bond::new(atom1_id, atom2_id, order));
        self.bond_adjacency.get_mut(atom1_id)?.push(atom2_id);
        self.bond_adjacency.get_mut(atom2_id)?.push(atom1_id);
        Some(())
    }

    /// Renames an atom, keeping the residue's name lookup in sync.
    pub fn rename_atom(&mut self, atom_id: AtomId, new_name: &str) -> Option<()> {
        let atom = self.atoms.get_mut(atom_id)?;
        let old_name = std::mem::replace(&mut atom.name, new_name.to_string());
        let residue_id = atom.residue_id;
        self.residues
            .get_mut(residue_id)?
            .rename_atom(&old_name, new_name);
        Some(())
    }

    /// Removes an atom together with its bonds.
    pub fn remove_atom(&mut self, atom_id: AtomId) -> Option<Atom> {
        let atom = self.atoms.remove(atom_id)?;

        if let Some(residue) = self.residues.get_mut(atom.residue_id) {
            residue.remove_atom(&atom.name, atom_id);
        }

        self.bonds.retain(|bond| !bond.contains(atom_id));

        let neighbors = self.bond_adjacency.remove(atom_id).unwrap_or_default();
        for neighbor_id in neighbors {
            if let Some(adjacency) = self.bond_adjacency.get_mut(neighbor_id) {
                adjacency.retain(|&id| id != atom_id);
            }
        }

        Some(atom)
    }

    /// Removes a residue and all of its atoms.
    pub fn remove_residue(&mut self, residue_id: ResidueId) -> Option<Residue> {
        let atom_ids = self.residues.get(residue_id)?.atoms().to_vec();
        for atom_id in atom_ids {
            self.remove_atom(atom_id);
        }

        let residue = self.residues.remove(residue_id)?;
        if let Some(chain) = self.chains.get_mut(residue.chain_id) {
            chain.residues.retain(|&id| id != residue_id);
        }
        self.residue_id_map.remove(&(
            residue.chain_id,
            residue.residue_number,
            residue.insertion_code,
        ));

        Some(residue)
    }

    pub fn get_bonded_neighbors(&self, atom_id: AtomId) -> Option<&[AtomId]> {
        self.bond_adjacency.get(atom_id).map(|v| v.as_slice())
    }

    /// Atom handles in canonical order; position `i` is the dense atom index `i`.
    pub fn atom_ids_in_order(&self) -> Vec<AtomId> {
        self.residues_iter()
            .flat_map(|(_, residue)| residue.atoms.iter().copied())
            .collect()
    }

    /// Maps each atom handle to its dense canonical index.
    pub fn atom_index_map(&self) -> SecondaryMap<AtomId, usize> {
        let mut map = SecondaryMap::new();
        for (index, id) in self.atom_ids_in_order().into_iter().enumerate() {
            map.insert(id, index);
        }
        map
    }

    /// Positions in canonical order.
    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.atom_ids_in_order()
            .into_iter()
            .filter_map(|id| self.atoms.get(id).map(|a| a.position))
            .collect()
    }

    /// Overwrites positions in canonical order. Returns `None` on a length mismatch.
    pub fn set_positions(&mut self, positions: &[Point3<f64>]) -> Option<()> {
        let ids = self.atom_ids_in_order();
        if ids.len() != positions.len() {
            return None;
        }
        for (id, position) in ids.into_iter().zip(positions) {
            self.atoms.get_mut(id)?.position = *position;
        }
        Some(())
    }

    /// Bonds expressed with dense canonical indices, smaller index first, sorted.
    pub fn bond_index_pairs(&self) -> Vec<(usize, usize)> {
        let index = self.atom_index_map();
        let mut pairs: Vec<(usize, usize)> = self
            .bonds
            .iter()
            .filter_map(|b| {
                let i = *index.get(b.atom1_id)?;
                let j = *index.get(b.atom2_id)?;
                Some((i.min(j), i.max(j)))
            })
            .collect();
        pairs.sort_unstable();
        pairs
    }

    /// Connected components of the bond graph, as sorted lists of dense indices,
    /// ordered by their smallest member.
    pub fn molecules(&self) -> Vec<Vec<usize>> {
        let n = self.atom_count();
        let mut parent: Vec<usize> = (0..n).collect();

        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }

        for (i, j) in self.bond_index_pairs() {
            let ri = find(&mut parent, i);
            let rj = find(&mut parent, j);
            if ri != rj {
                parent[ri.max(rj)] = ri.min(rj);
            }
        }

        let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in 0..n {
            let root = find(&mut parent, i);
            groups.entry(root).or_default().push(i);
        }
        let mut molecules: Vec<Vec<usize>> = groups.into_values().collect();
        molecules.sort_by_key(|m| m[0]);
        molecules
    }

    /// Counts residues of a category.
    pub fn count_residues(&self, category: ResidueCategory) -> usize {
        self.residues
            .values()
            .filter(|r| r.category == category)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    mod core_functionality {
        use super::*;

        struct TestRefs {
            chain_a_id: ChainId,
            gly_id: ResidueId,
            gly_n_id: AtomId,
            gly_ca_id: AtomId,
            ala_id: ResidueId,
            ala_ca_id: AtomId,
        }

        fn create_standard_test_system() -> (MolecularSystem, TestRefs) {
            let mut system = MolecularSystem::new();
            let chain_a_id = system.add_chain('A', ChainType::Protein);

            let gly_id = system
                .add_residue(chain_a_id, 1, None, "GLY", ResidueCategory::Standard)
                .unwrap();
            let gly_n_id = system
                .add_atom_to_residue(gly_id, Atom::new("N", "N", gly_id, Point3::origin()))
                .unwrap();
            let gly_ca_id = system
                .add_atom_to_residue(
                    gly_id,
                    Atom::new("CA", "C", gly_id, Point3::new(1.4, 0.0, 0.0)),
                )
                .unwrap();
            system
                .add_bond(gly_n_id, gly_ca_id, BondOrder::Single)
                .unwrap();

            let ala_id = system
                .add_residue(chain_a_id, 2, None, "ALA", ResidueCategory::Standard)
                .unwrap();
            let ala_ca_id = system
                .add_atom_to_residue(
                    ala_id,
                    Atom::new("CA", "C", ala_id, Point3::new(2.0, 1.0, 0.0)),
                )
                .unwrap();
            system
                .add_bond(gly_ca_id, ala_ca_id, BondOrder::Single)
                .unwrap();

            let refs = TestRefs {
                chain_a_id,
                gly_id,
                gly_n_id,
                gly_ca_id,
                ala_id,
                ala_ca_id,
            };
            (system, refs)
        }

        #[test]
        fn system_creation_and_access() {
            let (system, refs) = create_standard_test_system();

            assert_eq!(system.atom_count(), 3);
            assert_eq!(system.residues_iter().count(), 2);
            assert_eq!(system.chains_iter().count(), 1);
            assert_eq!(system.bonds().len(), 2);
            assert!(system.find_chain_by_id('B').is_none());
            assert_eq!(
                system.find_residue(refs.chain_a_id, 1, None),
                Some(refs.gly_id)
            );
            assert_eq!(
                system.find_residue(refs.chain_a_id, 2, None),
                Some(refs.ala_id)
            );
            assert!(system.find_residue(refs.chain_a_id, 2, Some('A')).is_none());
        }

        #[test]
        fn canonical_order_follows_chains_residues_atoms() {
            let (system, refs) = create_standard_test_system();
            assert_eq!(
                system.atom_ids_in_order(),
                vec![refs.gly_n_id, refs.gly_ca_id, refs.ala_ca_id]
            );
            assert_eq!(system.bond_index_pairs(), vec![(0, 1), (1, 2)]);
        }

        #[test]
        fn atom_removal_updates_bonds_and_adjacency() {
            let (mut system, refs) = create_standard_test_system();
            let removed = system.remove_atom(refs.gly_n_id).unwrap();

            assert_eq!(removed.name, "N");
            assert_eq!(system.atom_count(), 2);
            assert_eq!(system.bonds().len(), 1);
            assert!(!system.bond_adjacency.contains_key(refs.gly_n_id));
            assert_eq!(
                system.get_bonded_neighbors(refs.gly_ca_id).unwrap(),
                &[refs.ala_ca_id]
            );
            assert_eq!(system.residue(refs.gly_id).unwrap().atoms().len(), 1);
        }

        #[test]
        fn residue_removal_drops_atoms_and_lookup() {
            let (mut system, refs) = create_standard_test_system();
            system.remove_residue(refs.ala_id).unwrap();

            assert_eq!(system.atom_count(), 2);
            assert!(system.find_residue(refs.chain_a_id, 2, None).is_none());
            assert_eq!(system.bonds().len(), 1);
        }

        #[test]
        fn add_bond_is_idempotent_and_rejects_self_bonds() {
            let (mut system, refs) = create_standard_test_system();
            system
                .add_bond(refs.gly_ca_id, refs.gly_n_id, BondOrder::Single)
                .unwrap();
            assert_eq!(system.bonds().len(), 2);
            assert!(
                system
                    .add_bond(refs.gly_n_id, refs.gly_n_id, BondOrder::Single)
                    .is_none()
            );
        }

        #[test]
        fn rename_atom_keeps_lookup_consistent() {
            let (mut system, refs) = create_standard_test_system();
            system.rename_atom(refs.ala_ca_id, "CX").unwrap();
            let residue = system.residue(refs.ala_id).unwrap();
            assert_eq!(residue.get_atom_id_by_name("CX"), Some(refs.ala_ca_id));
            assert!(!residue.has_atom("CA"));
        }
    }

    mod positions_and_molecules {
        use super::*;

        fn two_waters_and_an_ion() -> MolecularSystem {
            let mut system = MolecularSystem::new();
            let w = system.add_chain('W', ChainType::Solvent);
            for (n, x) in [(1, 0.0), (2, 5.0)] {
                let res = system
                    .add_residue(w, n, None, "HOH", ResidueCategory::Water)
                    .unwrap();
                let o = system
                    .add_atom_to_residue(res, Atom::new("O", "O", res, Point3::new(x, 0.0, 0.0)))
                    .unwrap();
                let h1 = system
                    .add_atom_to_residue(
                        res,
                        Atom::new("H1", "H", res, Point3::new(x + 0.96, 0.0, 0.0)),
                    )
                    .unwrap();
                let h2 = system
                    .add_atom_to_residue(
                        res,
                        Atom::new("H2", "H", res, Point3::new(x, 0.96, 0.0)),
                    )
                    .unwrap();
                system.add_bond(o, h1, BondOrder::Single).unwrap();
                system.add_bond(o, h2, BondOrder::Single).unwrap();
            }
            let ion_chain = system.add_chain('I', ChainType::Solvent);
            let na = system
                .add_residue(ion_chain, 1, None, "NA", ResidueCategory::Ion)
                .unwrap();
            system
                .add_atom_to_residue(na, Atom::new("NA", "Na", na, Point3::new(9.0, 9.0, 9.0)))
                .unwrap();
            system
        }

        #[test]
        fn molecules_are_connected_components_in_index_order() {
            let system = two_waters_and_an_ion();
            assert_eq!(
                system.molecules(),
                vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]
            );
            assert_eq!(system.count_residues(ResidueCategory::Water), 2);
            assert_eq!(system.count_residues(ResidueCategory::Ion), 1);
        }

        #[test]
        fn set_positions_requires_matching_length() {
            let mut system = two_waters_and_an_ion();
            let mut positions = system.positions();
            positions[6] = Point3::new(1.0, 2.0, 3.0);
            system.set_positions(&positions).unwrap();
            assert_eq!(system.positions()[6], Point3::new(1.0, 2.0, 3.0));
            assert!(system.set_positions(&positions[..3]).is_none());
        }
    }
}
