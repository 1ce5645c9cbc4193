//! # Force Field Module
//!
//! Parameter sets and their assignment to molecular systems.
//!
//! - [`params`] - The TOML parameter schema ([`params::Forcefield`]) and the bundled
//!   generic set.
//! - [`parameterization`] - Resolves per-atom masses, charges and Lennard-Jones
//!   parameters, harmonic bond and angle terms, exclusions and scaled 1-4 pairs into a
//!   [`parameterization::SystemParameters`] in canonical atom order.
//!
//! Parameters are element-based: bonds and angles are looked up by the elements of the
//! atoms involved, charges by residue template and atom name. Water and ions take their
//! parameters from the water model and ion tables.

pub mod parameterization;
pub mod params;
