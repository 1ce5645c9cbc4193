use super::{Reporter, ReporterSpec, ReservedOutput, steps_until_next};
use crate::engine::error::EngineError;
use crate::engine::state::{ReportRequest, StateSnapshot};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where and how often pairwise distances are logged.
#[derive(Debug, Clone, PartialEq)]
pub struct CvSpec {
    pub path: PathBuf,
    pub interval: u64,
    pub pairs: Vec<(usize, usize)>,
    pub append: bool,
}

impl CvSpec {
    pub fn new(path: impl Into<PathBuf>, interval: u64, pairs: Vec<(usize, usize)>, append: bool) -> Self {
        Self {
            path: path.into(),
            interval,
            pairs,
            append,
        }
    }

    /// Checks the definition, and the atom indices when the atom count is known.
    pub fn validate(&self, atom_count: Option<usize>) -> Result<(), EngineError> {
        if self.pairs.is_empty() {
            return Err(EngineError::Configuration(
                "cv_reporter.list_of_index: no collective variables defined".to_string(),
            ));
        }
        if self.interval == 0 {
            return Err(EngineError::Configuration(
                "cv_reporter.cv_freq: report interval must be positive".to_string(),
            ));
        }
        for &(i, j) in &self.pairs {
            if i == j {
                return Err(EngineError::Configuration(format!(
                    "cv_reporter.list_of_index: pair ({i}, {j}) measures an atom against itself"
                )));
            }
            if let Some(n) = atom_count {
                if i >= n || j >= n {
                    return Err(EngineError::Configuration(format!(
                        "cv_reporter.list_of_index: pair ({i}, {j}) is out of range for {n} atoms"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Writes a PLUMED-style COLVAR file of interatomic distances in Å.
///
/// The first column is the step number. Distances are taken between raw positions,
/// never between periodic images.
pub struct CvReporter {
    path: PathBuf,
    interval: u64,
    pairs: Vec<(usize, usize)>,
    writer: Option<BufWriter<File>>,
    line: String,
}

impl CvReporter {
    /// Validates the definition, then opens the file and writes the header.
    pub fn new(
        path: impl Into<PathBuf>,
        interval: u64,
        pairs: Vec<(usize, usize)>,
        append: bool,
    ) -> Result<Self, EngineError> {
        Self::open(&CvSpec::new(path, interval, pairs, append))
    }

    pub fn open(spec: &CvSpec) -> Result<Self, EngineError> {
        let output = ReporterSpec::Cv(spec.clone()).reserve()?;
        Self::start(spec, output)
    }

    /// Truncates the reserved file unless appending and writes the header.
    pub fn start(spec: &CvSpec, output: ReservedOutput) -> Result<Self, EngineError> {
        let mut writer = BufWriter::new(output.commit()?);

        let labels: Vec<String> = spec
            .pairs
            .iter()
            .map(|(i, j)| format!("dist_{i}_{j}"))
            .collect();
        writeln!(writer, "#! TIME {}", labels.join(" "))
            .map_err(|e| EngineError::input(&spec.path, e))?;
        debug!(path = %spec.path.display(), cvs = spec.pairs.len(), "Opened CV log.");

        Ok(Self {
            path: spec.path.clone(),
            interval: spec.interval,
            pairs: spec.pairs.clone(),
            writer: Some(writer),
            line: String::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Reporter for CvReporter {
    fn describe_next_report(&self, step: u64) -> ReportRequest {
        ReportRequest::positions_every(steps_until_next(step, self.interval), false)
    }

    fn report(&mut self, snapshot: &StateSnapshot<'_>) -> Result<(), EngineError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(EngineError::input(&self.path, "CV log is already closed"));
        };
        self.line.clear();
        // Writing into a String cannot fail.
        let _ = write!(self.line, "{} ", snapshot.step);
        for &(i, j) in &self.pairs {
            let distance = (snapshot.positions[i] - snapshot.positions[j]).norm();
            let _ = write!(self.line, "{:.4} ", distance);
        }
        self.line.push('\n');
        writer
            .write_all(self.line.as_bytes())
            .map_err(|e| EngineError::input(&self.path, e))
    }

    fn close(&mut self) -> Result<(), EngineError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| EngineError::input(&self.path, e))?;
        }
        Ok(())
    }
}

impl Drop for CvReporter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use std::fs;
    use tempfile::tempdir;

    fn snapshot(step: u64, positions: &[Point3<f64>]) -> StateSnapshot<'_> {
        StateSnapshot {
            step,
            time: step as f64 * 0.002,
            positions,
            velocities: None,
            forces: None,
            potential_energy: None,
            kinetic_energy: None,
            cell: None,
        }
    }

    fn four_atoms() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(3.0, 4.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.0, 1.0, 2.5),
        ]
    }

    #[test]
    fn header_and_rows_follow_the_colvar_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("COLVAR.dat");
        let mut reporter = CvReporter::new(&path, 500, vec![(0, 1), (2, 3)], false).unwrap();

        reporter.report(&snapshot(500, &four_atoms())).unwrap();
        reporter.close().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "#! TIME dist_0_1 dist_2_3\n500 5.0000 1.5000 \n");
    }

    #[test]
    fn requests_unwrapped_positions_at_interval_multiples() {
        let dir = tempdir().unwrap();
        let reporter = CvReporter::new(dir.path().join("cv.dat"), 100, vec![(0, 1)], false).unwrap();
        let request = reporter.describe_next_report(250);
        assert_eq!(request.steps, 50);
        assert!(request.positions);
        assert!(!request.wrapped);
        assert!(!request.velocities && !request.forces && !request.energies);
    }

    #[test]
    fn one_row_per_interval_multiple() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cv.dat");
        let mut reporter = CvReporter::new(&path, 300, vec![(0, 1)], false).unwrap();
        let positions = four_atoms();

        let total = 1000;
        let mut step = 0;
        while step < total {
            let next = reporter.describe_next_report(step).steps;
            if step + next > total {
                break;
            }
            step += next;
            reporter.report(&snapshot(step, &positions)).unwrap();
        }
        reporter.close().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let steps: Vec<&str> = text
            .lines()
            .skip(1)
            .map(|l| l.split(' ').next().unwrap())
            .collect();
        assert_eq!(steps, vec!["300", "600", "900"]);
    }

    #[test]
    fn distances_are_symmetric() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cv.dat");
        let mut reporter = CvReporter::new(&path, 1, vec![(1, 3), (3, 1)], false).unwrap();
        reporter.report(&snapshot(1, &four_atoms())).unwrap();
        reporter.close().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let row: Vec<&str> = text.lines().nth(1).unwrap().split_whitespace().collect();
        assert_eq!(row[1], row[2]);
    }

    #[test]
    fn invalid_definitions_are_rejected_before_the_file_is_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cv.dat");

        for (interval, pairs) in [(500, vec![]), (0, vec![(0, 1)]), (500, vec![(2, 2)])] {
            assert!(matches!(
                CvReporter::new(&path, interval, pairs, false),
                Err(EngineError::Configuration(_))
            ));
        }
        assert!(!path.exists());
    }

    #[test]
    fn out_of_range_indices_are_caught_when_the_atom_count_is_known() {
        let spec = CvSpec::new("cv.dat", 10, vec![(0, 4)], false);
        assert!(spec.validate(None).is_ok());
        assert!(spec.validate(Some(5)).is_ok());
        assert!(matches!(
            spec.validate(Some(4)),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn append_mode_keeps_previous_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cv.dat");
        let positions = four_atoms();

        let mut first = CvReporter::new(&path, 10, vec![(0, 1)], false).unwrap();
        first.report(&snapshot(10, &positions)).unwrap();
        first.close().unwrap();

        let mut second = CvReporter::new(&path, 10, vec![(0, 1)], true).unwrap();
        second.report(&snapshot(20, &positions)).unwrap();
        second.close().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let rows: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(rows, vec!["10 5.0000 ", "20 5.0000 "]);

        CvReporter::new(&path, 10, vec![(0, 1)], false)
            .unwrap()
            .close()
            .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "#! TIME dist_0_1\n");
    }

    #[test]
    fn dropping_without_close_flushes_buffered_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cv.dat");
        {
            let mut reporter = CvReporter::new(&path, 5, vec![(0, 1)], false).unwrap();
            reporter.report(&snapshot(5, &four_atoms())).unwrap();
        }
        assert!(fs::read_to_string(&path).unwrap().ends_with("5 5.0000 \n"));
    }
}
