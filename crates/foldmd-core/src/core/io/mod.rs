//! Provides input/output functionality for molecular file formats.
//!
//! Structure files (PDB) go through the [`traits::MolecularFile`] interface, which
//! offers buffered path-based helpers on top of the format-specific reader and writer.
//! Trajectory output (XTC) is a streaming writer in [`xtc`].

pub mod pdb;
pub mod traits;
pub mod xtc;
