use super::barostat::BarostatState;
use super::context::ComputeContext;
use super::error::EngineError;
use super::state::TrajectoryState;
use crate::core::models::periodic::PeriodicBox;
use nalgebra::{Point3, Vector3};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const FORMAT_VERSION: u32 = 1;

/// The exact integration state of a context, tagged with the platform that produced it.
///
/// Stored as a bincode blob. Restoring on the same platform continues the trajectory
/// bit for bit; other platforms accept it but may diverge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    version: u32,
    pub platform: String,
    pub atom_count: usize,
    pub step: u64,
    pub time: f64,
    pub positions: Vec<Point3<f64>>,
    pub velocities: Vec<Vector3<f64>>,
    pub cell: Option<PeriodicBox>,
    pub rng: ChaCha8Rng,
    pub barostat: Option<BarostatState>,
}

impl Checkpoint {
    pub fn capture(context: &ComputeContext) -> Self {
        let state = context.state();
        Self {
            version: FORMAT_VERSION,
            platform: context.platform_name().to_string(),
            atom_count: state.atom_count(),
            step: state.step,
            time: state.time,
            positions: state.positions.clone(),
            velocities: state.velocities.clone(),
            cell: state.cell,
            rng: state.rng.clone(),
            barostat: context.barostat_state(),
        }
    }

    pub fn into_state(self) -> (TrajectoryState, Option<BarostatState>) {
        let state = TrajectoryState {
            step: self.step,
            time: self.time,
            positions: self.positions,
            velocities: self.velocities,
            cell: self.cell,
            rng: self.rng,
        };
        (state, self.barostat)
    }

    /// Writes beside `path` first and renames over it, so an interrupted save leaves the
    /// previous checkpoint readable.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let data = bincode::serialize(self).map_err(|e| checkpoint_error(path, e))?;
        let mut staging = path.as_os_str().to_owned();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);
        std::fs::write(&staging, data).map_err(|e| checkpoint_error(path, e))?;
        std::fs::rename(&staging, path).map_err(|e| checkpoint_error(path, e))
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let data = std::fs::read(path).map_err(|e| checkpoint_error(path, e))?;
        let checkpoint: Self = bincode::deserialize(&data).map_err(|e| checkpoint_error(path, e))?;
        if checkpoint.version != FORMAT_VERSION {
            return Err(checkpoint_error(
                path,
                format!("unsupported checkpoint version {}", checkpoint.version),
            ));
        }
        if checkpoint.positions.len() != checkpoint.atom_count
            || checkpoint.velocities.len() != checkpoint.atom_count
        {
            return Err(checkpoint_error(path, "atom count does not match stored arrays"));
        }
        Ok(checkpoint)
    }
}

fn checkpoint_error(path: &Path, reason: impl ToString) -> EngineError {
    EngineError::Checkpoint {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
