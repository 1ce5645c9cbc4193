use thiserror::Error;

use super::config::ConfigError;
use crate::core::forcefield::parameterization::ParameterizationError;
use crate::core::forcefield::params::ParamLoadError;
use crate::core::io::pdb::PdbError;
use crate::core::io::xtc::XtcError;
use crate::core::prep::PrepError;
use std::path::PathBuf;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Input error for '{path}': {reason}")]
    Input { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Parameterization failed: {source}")]
    Parameterization {
        #[from]
        source: ParameterizationError,
    },

    #[error("No usable compute platform (tried: {})", tried.join(", "))]
    BackendUnavailable { tried: Vec<String> },

    #[error("Integration failed after step {step}: {reason}")]
    Integration { step: u64, reason: String },

    #[error("Checkpoint error for '{path}': {reason}")]
    Checkpoint { path: PathBuf, reason: String },

    #[error("External tool '{tool}' failed: {reason}")]
    Collaborator { tool: String, reason: String },

    #[error(transparent)]
    Preparation(#[from] PrepError),

    #[error(transparent)]
    Forcefield(#[from] ParamLoadError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    pub fn input(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Input {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn from_pdb(path: impl Into<PathBuf>, source: PdbError) -> Self {
        Self::input(path, source)
    }

    pub(crate) fn from_xtc(path: impl Into<PathBuf>, source: XtcError) -> Self {
        Self::input(path, source)
    }

    /// True for errors raised while validating input before any work starts.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Config(_))
    }
}
