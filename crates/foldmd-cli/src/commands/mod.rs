pub mod prepare;
pub mod restart;
pub mod run;
pub mod workflow;

use crate::error::{CliError, Result};
use foldmd::core::forcefield::params::Forcefield;
use foldmd::engine::platform::PlatformRegistry;
use std::path::Path;
use tracing::info;

/// Loads the forcefield at `path`, or the bundled generic parameter set.
fn load_forcefield(path: Option<&Path>) -> Result<Forcefield> {
    match path {
        Some(path) => {
            info!("Loading forcefield from {:?}", path);
            Forcefield::load(path).map_err(|e| CliError::FileParsing {
                path: path.to_path_buf(),
                source: e.into(),
            })
        }
        None => {
            info!("Using the bundled generic forcefield.");
            Forcefield::generic().map_err(|e| CliError::Other(e.into()))
        }
    }
}

fn platforms() -> PlatformRegistry {
    PlatformRegistry::with_defaults()
}
