//! # Core Models Module
//!
//! Data structures representing molecular systems: atoms, residues, chains, bonds and
//! the periodic cell that encloses a solvated system.
//!
//! ## Overview
//!
//! The models are deliberately free of simulation parameters. A [`system::MolecularSystem`]
//! describes *what* is simulated (identity, connectivity, coordinates); force field
//! parameters are resolved separately when a simulation is configured.
//!
//! ## Key Components
//!
//! - [`atom`] - Atom identity, element and position
//! - [`residue`] - Residues with their category (standard, hetero, water, ion)
//! - [`chain`] - Chain organization
//! - [`system`] - The complete system, its canonical atom order and connectivity queries
//! - [`topology`] - Bonds
//! - [`periodic`] - Orthorhombic periodic cell and minimum-image helpers
//! - [`ids`] - Stable identifier types
//!
//! ## Atom indices
//!
//! Collective-variable definitions and the simulation engine address atoms by dense
//! zero-based indices. These follow the canonical order of [`system::MolecularSystem::atom_ids_in_order`],
//! which is also the order in which atoms are written to structure files.

pub mod atom;
pub mod chain;
pub mod ids;
pub mod periodic;
pub mod residue;
pub mod system;
pub mod topology;
