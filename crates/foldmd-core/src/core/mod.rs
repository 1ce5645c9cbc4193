//! # Core Module
//!
//! Stateless building blocks shared by the simulation engine and the workflows.
//!
//! - **Molecular Representation** ([`models`]) - Atoms, residues, chains, bonds and the periodic cell
//! - **File I/O** ([`io`]) - PDB reading/writing and compressed XTC trajectory frames
//! - **Residue Knowledge** ([`topology`]) - Static residue tables used for classification and repair
//! - **Forcefield** ([`forcefield`]) - Parameter files and per-atom parameterization
//! - **Preparation** ([`prep`]) - The pipeline that turns a raw structure into a solvated box
//!
//! Nothing in this layer owns mutable simulation state; the [`crate::engine`] layer builds
//! on these types.

pub mod forcefield;
pub mod io;
pub mod models;
pub mod prep;
pub mod topology;
