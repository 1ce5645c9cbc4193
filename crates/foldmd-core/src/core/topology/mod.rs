//! # Topology Module
//!
//! Static chemical knowledge about residues: which residue names are standard amino
//! acids, which heavy atoms each standard residue must contain, which modified residues
//! map onto which standard parents, and how water and ion residues are named.
//!
//! ## Key Components
//!
//! - [`templates`] - Compile-time residue tables and residue classification helpers
//!
//! The tables are used both when reading structure files (to classify residues) and
//! during structure preparation (to detect missing atoms and replace modified residues).

pub mod templates;
