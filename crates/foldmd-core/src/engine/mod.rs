//! # Engine Module
//!
//! The stateful layer that turns a prepared system into a running trajectory.
//!
//! ## Overview
//!
//! A [`driver::SimulationDriver`] owns one [`context::ComputeContext`], which couples a
//! force kernel created by a [`platform::Platform`] with the Langevin integrator, an
//! optional Monte Carlo barostat and the [`state::TrajectoryState`] they advance. Reporters
//! observe the trajectory at fixed intervals; checkpoints capture it exactly.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Typed run parameters validated once at construction
//! - **Error Handling** ([`error`]) - The engine error taxonomy
//! - **Progress Monitoring** ([`progress`]) - Observational progress events
//! - **Physics** ([`forces`], [`integrator`], [`barostat`], [`minimizer`], [`units`]) -
//!   Force field evaluation, Langevin dynamics, pressure control and energy minimization
//! - **Platforms** ([`platform`]) - Pluggable compute backends and their registry
//! - **Lifecycle** ([`context`], [`checkpoint`], [`driver`]) - Integration state,
//!   checkpoint/restart and the run state machine
//! - **Reporters** ([`reporters`]) - Collective-variable logs and trajectory frames

pub mod barostat;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod forces;
pub mod integrator;
pub mod minimizer;
pub mod platform;
pub mod progress;
pub mod reporters;
pub mod state;
pub mod units;
