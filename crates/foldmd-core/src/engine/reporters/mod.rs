//! Periodic observers of a running trajectory.
//!
//! The driver asks every reporter how many steps remain until its next report, advances
//! to the nearest one, and hands each due reporter a [`StateSnapshot`]. Reporters own
//! their output handles for the duration of one run.

pub mod cv;
pub mod trajectory;

use super::error::EngineError;
use super::state::{ReportRequest, StateSnapshot};
use crate::core::models::system::MolecularSystem;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

pub use cv::{CvReporter, CvSpec};
pub use trajectory::{TrajectoryFormat, TrajectoryReporter, TrajectorySpec};

pub trait Reporter: Send {
    /// What the reporter needs at its next report, counted from `step`.
    fn describe_next_report(&self, step: u64) -> ReportRequest;

    fn report(&mut self, snapshot: &StateSnapshot<'_>) -> Result<(), EngineError>;

    /// Flushes and releases the output. Called once at the end of a run, on success and
    /// on failure.
    fn close(&mut self) -> Result<(), EngineError>;
}

/// A reporter that has not been opened yet.
#[derive(Debug, Clone, PartialEq)]
pub enum ReporterSpec {
    Cv(CvSpec),
    Trajectory(TrajectorySpec),
}

impl ReporterSpec {
    pub fn validate(&self, atom_count: usize) -> Result<(), EngineError> {
        match self {
            Self::Cv(spec) => spec.validate(Some(atom_count)),
            Self::Trajectory(spec) => spec.validate().map(|_| ()),
        }
    }

    /// Makes later opens append to what earlier runs wrote.
    pub(crate) fn keep_appending(&mut self) {
        match self {
            Self::Cv(spec) => spec.append = true,
            Self::Trajectory(spec) => spec.append = true,
        }
    }

    /// Validates the definition and opens its output without touching existing content.
    pub fn reserve(&self) -> Result<ReservedOutput, EngineError> {
        match self {
            Self::Cv(spec) => {
                spec.validate(None)?;
                ReservedOutput::reserve(&spec.path, spec.append)
            }
            Self::Trajectory(spec) => {
                spec.validate()?;
                ReservedOutput::reserve(&spec.path, spec.append)
            }
        }
    }

    /// Turns a reservation made by [`reserve`](Self::reserve) into a live reporter.
    pub fn start(
        &self,
        output: ReservedOutput,
        system: &MolecularSystem,
    ) -> Result<Box<dyn Reporter>, EngineError> {
        Ok(match self {
            Self::Cv(spec) => Box::new(CvReporter::start(spec, output)?),
            Self::Trajectory(spec) => Box::new(TrajectoryReporter::start(spec, output, system)?),
        })
    }

    pub fn open(&self, system: &MolecularSystem) -> Result<Box<dyn Reporter>, EngineError> {
        self.start(self.reserve()?, system)
    }

    /// Opens every output, or none of them.
    ///
    /// All files are reserved first. If any reservation fails, the files created so far
    /// are removed and no existing file has been truncated.
    pub fn open_all(
        specs: &[ReporterSpec],
        system: &MolecularSystem,
    ) -> Result<Vec<Box<dyn Reporter>>, EngineError> {
        let mut reserved = Vec::with_capacity(specs.len());
        for spec in specs {
            match spec.reserve() {
                Ok(output) => reserved.push(output),
                Err(e) => {
                    reserved.into_iter().for_each(ReservedOutput::release);
                    return Err(e);
                }
            }
        }
        specs
            .iter()
            .zip(reserved)
            .map(|(spec, output)| spec.start(output, system))
            .collect()
    }
}

/// An output file opened for writing whose previous content is still in place.
#[derive(Debug)]
pub struct ReservedOutput {
    path: PathBuf,
    file: File,
    created: bool,
    append: bool,
}

impl ReservedOutput {
    fn reserve(path: &Path, append: bool) -> Result<Self, EngineError> {
        let created = !path.exists();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(false)
            .open(path)
            .map_err(|e| EngineError::input(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            created,
            append,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncates the file unless appending and hands it over for writing.
    pub(crate) fn commit(self) -> Result<File, EngineError> {
        if !self.append {
            self.file
                .set_len(0)
                .map_err(|e| EngineError::input(&self.path, e))?;
        }
        Ok(self.file)
    }

    /// Gives the file up, deleting it if this reservation created it.
    fn release(self) {
        drop(self.file);
        if self.created {
            if let Err(e) = std::fs::remove_file(&self.path) {
                debug!(path = %self.path.display(), error = %e, "Could not remove unused output.");
            }
        }
    }
}

/// Steps until the next multiple of `interval`; a full interval when `step` is one.
pub fn steps_until_next(step: u64, interval: u64) -> u64 {
    interval - step % interval
}
