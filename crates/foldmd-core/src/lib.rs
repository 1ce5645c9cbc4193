//! # foldmd Core Library
//!
//! Preparation, simulation and orchestration of molecular dynamics runs for predicted
//! protein structures.
//!
//! ## Architectural Philosophy
//!
//! The library is split into three layers with a strict dependency direction.
//!
//! - **[`core`]: The Foundation.** Stateless data models (`MolecularSystem`), structure
//!   file I/O (PDB, XTC), forcefield parameters and parameterization, and the `BoxBuilder`
//!   that turns a raw structure into a solvated, neutralized simulation box.
//!
//! - **[`engine`]: The Stateful Layer.** Compute platforms and force kernels, the Langevin
//!   integrator and Monte Carlo barostat, reporters, checkpoints, and the
//!   `SimulationDriver` state machine that ties them into a run.
//!
//! - **[`workflows`]: The Public API.** Configuration documents, single-structure jobs and
//!   the fold, select and simulate pipeline over many representative structures.

pub mod core;
pub mod engine;
pub mod workflows;
