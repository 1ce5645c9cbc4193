use super::{Reporter, ReporterSpec, ReservedOutput, steps_until_next};
use crate::core::io::pdb::PdbFile;
use crate::core::io::xtc::{XtcFrame, XtcWriter};
use crate::core::models::system::MolecularSystem;
use crate::engine::error::EngineError;
use crate::engine::state::{ReportRequest, StateSnapshot};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const ANGSTROM_PER_NM: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrajectoryFormat {
    Xtc,
    Pdb,
}

impl TrajectoryFormat {
    pub fn from_path(path: &Path) -> Result<Self, EngineError> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("xtc") => Ok(Self::Xtc),
            Some("pdb") => Ok(Self::Pdb),
            _ => Err(EngineError::Configuration(format!(
                "xtc_reporter.xtc_file: unsupported trajectory format '{}' (expected .xtc or .pdb)",
                path.display()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrajectorySpec {
    pub path: PathBuf,
    pub interval: u64,
    pub append: bool,
}

impl TrajectorySpec {
    pub fn new(path: impl Into<PathBuf>, interval: u64, append: bool) -> Self {
        Self {
            path: path.into(),
            interval,
            append,
        }
    }

    pub fn validate(&self) -> Result<TrajectoryFormat, EngineError> {
        if self.interval == 0 {
            return Err(EngineError::Configuration(
                "xtc_reporter.xtc_freq: report interval must be positive".to_string(),
            ));
        }
        TrajectoryFormat::from_path(&self.path)
    }
}

enum Sink {
    Xtc(XtcWriter<BufWriter<File>>),
    Pdb {
        writer: BufWriter<File>,
        system: Box<MolecularSystem>,
        model: usize,
    },
}

/// Writes position frames, wrapped into the periodic cell by molecule.
pub struct TrajectoryReporter {
    path: PathBuf,
    interval: u64,
    sink: Option<Sink>,
}

impl TrajectoryReporter {
    /// Opens the trajectory file. `system` supplies the topology for PDB frames.
    pub fn open(spec: &TrajectorySpec, system: &MolecularSystem) -> Result<Self, EngineError> {
        let output = ReporterSpec::Trajectory(spec.clone()).reserve()?;
        Self::start(spec, output, system)
    }

    pub fn start(
        spec: &TrajectorySpec,
        output: ReservedOutput,
        system: &MolecularSystem,
    ) -> Result<Self, EngineError> {
        let format = spec.validate()?;
        let writer = BufWriter::new(output.commit()?);
        let sink = match format {
            TrajectoryFormat::Xtc => Sink::Xtc(XtcWriter::new(writer)),
            TrajectoryFormat::Pdb => Sink::Pdb {
                writer,
                system: Box::new(system.clone()),
                model: 0,
            },
        };
        debug!(path = %spec.path.display(), ?format, "Opened trajectory.");
        Ok(Self {
            path: spec.path.clone(),
            interval: spec.interval,
            sink: Some(sink),
        })
    }
}

impl Reporter for TrajectoryReporter {
    fn describe_next_report(&self, step: u64) -> ReportRequest {
        ReportRequest::positions_every(steps_until_next(step, self.interval), true)
    }

    fn report(&mut self, snapshot: &StateSnapshot<'_>) -> Result<(), EngineError> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(EngineError::input(&self.path, "trajectory is already closed"));
        };
        match sink {
            Sink::Xtc(writer) => {
                let coords: Vec<[f32; 3]> = snapshot
                    .positions
                    .iter()
                    .map(|p| {
                        [
                            (p.x / ANGSTROM_PER_NM) as f32,
                            (p.y / ANGSTROM_PER_NM) as f32,
                            (p.z / ANGSTROM_PER_NM) as f32,
                        ]
                    })
                    .collect();
                let box_vectors = snapshot
                    .cell
                    .map(|c| c.as_matrix_rows())
                    .unwrap_or_default()
                    .map(|row| row.map(|v| (v / ANGSTROM_PER_NM) as f32));
                let frame = XtcFrame {
                    step: snapshot.step as i32,
                    time: snapshot.time as f32,
                    box_vectors,
                    coords: &coords,
                };
                writer
                    .write_frame(&frame)
                    .map_err(|e| EngineError::from_xtc(&self.path, e))
            }
            Sink::Pdb {
                writer,
                system,
                model,
            } => {
                *model += 1;
                system.set_periodic_box(snapshot.cell.copied());
                PdbFile::write_model(system, snapshot.positions, *model, writer)
                    .map_err(|e| EngineError::from_pdb(&self.path, e))
            }
        }
    }

    fn close(&mut self) -> Result<(), EngineError> {
        match self.sink.take() {
            Some(Sink::Xtc(mut writer)) => writer
                .flush()
                .map_err(|e| EngineError::from_xtc(&self.path, e)),
            Some(Sink::Pdb { mut writer, .. }) => writeln!(writer, "END")
                .and_then(|_| writer.flush())
                .map_err(|e| EngineError::input(&self.path, e)),
            None => Ok(()),
        }
    }
}

impl Drop for TrajectoryReporter {
    fn drop(&mut self) {
        match self.sink.as_mut() {
            Some(Sink::Xtc(writer)) => {
                let _ = writer.flush();
            }
            Some(Sink::Pdb { writer, .. }) => {
                let _ = writer.flush();
            }
            None => {}
        }
    }
}
