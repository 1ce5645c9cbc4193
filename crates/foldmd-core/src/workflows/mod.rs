//! # Workflows Module
//!
//! The user-facing layer that turns configuration documents into finished simulations.
//!
//! ## Overview
//!
//! Configuration arrives as partial documents, is merged over the defaults and validated
//! once here. Components below this layer only ever see typed, validated settings.
//!
//! ## Architecture
//!
//! - **Job Configuration** ([`config`]) - Partial JSON/TOML documents, deep-merged defaults
//!   and validation into a [`config::JobConfig`]
//! - **Single Job** ([`job`]) - Preparation, minimization, dynamics and output persistence
//!   for one structure
//! - **Multi-Structure Pipeline** ([`pipeline`]) - Structure prediction, conformation
//!   selection and independent parallel simulation of every representative

pub mod config;
pub mod job;
pub mod pipeline;
