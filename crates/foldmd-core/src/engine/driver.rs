use super::barostat::MonteCarloBarostat;
use super::checkpoint::Checkpoint;
use super::config::RunParameters;
use super::context::ComputeContext;
use super::error::EngineError;
use super::forces::ForceModel;
use super::integrator::LangevinMiddle;
use super::minimizer::MinimizationSummary;
use super::platform::PlatformRegistry;
use super::progress::{Progress, ProgressReporter};
use super::reporters::{Reporter, ReporterSpec, steps_until_next};
use super::state::{ReportRequest, TrajectoryState};
use crate::core::forcefield::parameterization::Parameterizer;
use crate::core::forcefield::params::Forcefield;
use crate::core::io::pdb::PdbFile;
use crate::core::io::traits::MolecularFile;
use crate::core::models::system::MolecularSystem;
use nalgebra::Point3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStatus {
    Unconfigured,
    Built,
    Running,
    Completed,
    Checkpointed,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub steps: u64,
    pub final_step: u64,
    /// Simulation time at the end of the run, in ps.
    pub time_ps: f64,
    pub potential_energy: f64,
    pub temperature: f64,
    pub elapsed: Duration,
    pub ns_per_day: f64,
}

/// Runs one trajectory through its lifecycle: configure, minimize, run, checkpoint and
/// restart.
///
/// The driver owns the compute context and the reporter definitions. Reporter outputs are
/// opened at the start of each [`run`](Self::run) and closed when it ends, whether it
/// succeeds or fails.
pub struct SimulationDriver {
    status: DriverStatus,
    system: MolecularSystem,
    params: RunParameters,
    context: Option<ComputeContext>,
    reporters: Vec<ReporterSpec>,
    seed: Option<u64>,
}

impl Default for SimulationDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationDriver {
    pub fn new() -> Self {
        Self {
            status: DriverStatus::Unconfigured,
            system: MolecularSystem::new(),
            params: RunParameters::default(),
            context: None,
            reporters: Vec::new(),
            seed: None,
        }
    }

    pub fn status(&self) -> DriverStatus {
        self.status
    }

    pub fn context(&self) -> Option<&ComputeContext> {
        self.context.as_ref()
    }

    pub fn system(&self) -> &MolecularSystem {
        &self.system
    }

    /// The seed the integrator stream was started from, once configured.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Steps left before the trajectory reaches step `total_steps`; zero once it has.
    pub fn steps_remaining(&self, total_steps: u64) -> u64 {
        let step = self.context.as_ref().map_or(0, |c| c.state().step);
        total_steps.saturating_sub(step)
    }

    pub fn add_reporter(&mut self, spec: ReporterSpec) {
        self.reporters.push(spec);
    }

    /// Parameterizes `system`, selects a platform and builds the integration context with
    /// Maxwell-Boltzmann velocities.
    #[instrument(skip_all, name = "driver_configure")]
    pub fn configure(
        &mut self,
        system: MolecularSystem,
        forcefield: &Forcefield,
        water_model: &str,
        params: RunParameters,
        platforms: &PlatformRegistry,
    ) -> Result<(), EngineError> {
        if self.status != DriverStatus::Unconfigured {
            return Err(EngineError::Configuration(
                "simulation is already configured".to_string(),
            ));
        }
        params.validate()?;

        let parameters = Parameterizer::new(forcefield, water_model).parameterize_system(&system)?;
        let platform = platforms.select(params.platform.as_deref())?;

        let seed = match params.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::random::<u64>();
                info!(seed, "No seed given; drew one at random.");
                seed
            }
        };

        let cell = system.periodic_box().copied();
        let state = TrajectoryState::new(system.positions(), cell, ChaCha8Rng::seed_from_u64(seed));
        let model = ForceModel::new(Arc::new(parameters), params.cutoff);
        let integrator = LangevinMiddle::new(params.timestep, params.friction, params.temperature);
        let barostat = params
            .barostat_pressure()
            .zip(cell)
            .map(|(pressure, cell)| MonteCarloBarostat::new(pressure, params.temperature, cell.volume()));

        let mut context =
            ComputeContext::new(platform.as_ref(), model, integrator, barostat, state)?;
        context.initialize_velocities(params.temperature);
        info!(
            platform = context.platform_name(),
            atoms = system.atom_count(),
            barostat = context.barostat_state().is_some(),
            "Simulation configured."
        );

        self.system = system;
        self.params = params;
        self.context = Some(context);
        self.seed = Some(seed);
        self.status = DriverStatus::Built;
        Ok(())
    }

    pub fn minimize(
        &mut self,
        max_iterations: usize,
        tolerance: f64,
    ) -> Result<MinimizationSummary, EngineError> {
        if !matches!(self.status, DriverStatus::Built | DriverStatus::Checkpointed) {
            return Err(self.invalid_state("minimize"));
        }
        let context = self.context_mut()?;
        let summary = context.minimize(max_iterations, tolerance);
        info!(
            iterations = summary.iterations,
            initial_energy = summary.initial_energy,
            final_energy = summary.final_energy,
            max_force = summary.max_force,
            converged = summary.converged,
            "Energy minimization finished."
        );
        Ok(summary)
    }

    /// Advances `steps` steps from the current step.
    ///
    /// # Errors
    ///
    /// Reporter definitions are checked against the atom count and every output is opened
    /// before the first step. An [`EngineError::Integration`] leaves the driver `Failed`.
    #[instrument(skip_all, name = "driver_run", fields(steps = steps))]
    pub fn run(&mut self, steps: u64, progress: &ProgressReporter) -> Result<RunSummary, EngineError> {
        if !matches!(
            self.status,
            DriverStatus::Built | DriverStatus::Checkpointed | DriverStatus::Completed
        ) {
            return Err(self.invalid_state("run"));
        }
        let atom_count = self.context_mut()?.state().atom_count();
        for spec in &self.reporters {
            spec.validate(atom_count)?;
        }
        let mut reporters = ReporterSpec::open_all(&self.reporters, &self.system)?;
        self.reporters.iter_mut().for_each(ReporterSpec::keep_appending);

        self.status = DriverStatus::Running;
        let outcome = self.advance(steps, &mut reporters, progress);
        let closed = reporters
            .iter_mut()
            .map(|r| r.close())
            .fold(Ok(()), |acc, r| acc.and(r));

        match (outcome, closed) {
            (Ok(summary), Ok(())) => {
                self.status = DriverStatus::Completed;
                info!(
                    final_step = summary.final_step,
                    ns_per_day = summary.ns_per_day,
                    "Run completed."
                );
                Ok(summary)
            }
            (Err(e), _) | (Ok(_), Err(e)) => {
                self.status = DriverStatus::Failed;
                Err(e)
            }
        }
    }

    fn advance(
        &mut self,
        steps: u64,
        reporters: &mut [Box<dyn Reporter>],
        progress: &ProgressReporter,
    ) -> Result<RunSummary, EngineError> {
        let progress_every = self.params.progress_every;
        let timestep = self.params.timestep;
        let checkpoint_every = self.params.checkpoint_every;
        let checkpoint_path = self.params.checkpoint_path.clone();
        let context = self.context_mut()?;
        let start = context.state().step;
        let end = start + steps;
        let started = Instant::now();
        progress.report(Progress::TaskStart { total_steps: steps });

        while context.state().step < end {
            let step = context.state().step;
            let requests: Vec<ReportRequest> = reporters
                .iter()
                .map(|r| r.describe_next_report(step))
                .collect();
            let until_progress = steps_until_next(step, progress_every);
            let until_checkpoint = checkpoint_path
                .as_ref()
                .map(|_| steps_until_next(step, checkpoint_every));
            let chunk = requests
                .iter()
                .map(|r| r.steps)
                .chain(until_checkpoint)
                .fold(until_progress.min(end - step), u64::min);

            for _ in 0..chunk {
                context.step()?;
            }
            progress.report(Progress::TaskIncrement { steps: chunk });

            let due: Vec<usize> = (0..requests.len())
                .filter(|&k| requests[k].steps == chunk)
                .collect();
            if !due.is_empty() {
                let wrapped: Option<Vec<Point3<f64>>> = due
                    .iter()
                    .any(|&k| requests[k].wrapped)
                    .then(|| context.state().wrapped_positions(context.molecules()));
                for &k in &due {
                    let positions = match (&wrapped, requests[k].wrapped) {
                        (Some(wrapped), true) => wrapped.as_slice(),
                        _ => context.state().positions.as_slice(),
                    };
                    reporters[k].report(&context.snapshot(positions))?;
                }
            }

            if let (Some(path), Some(until)) = (&checkpoint_path, until_checkpoint) {
                if until == chunk {
                    Checkpoint::capture(context).save(path)?;
                    debug!(path = %path.display(), step = context.state().step, "Periodic checkpoint.");
                }
            }

            if until_progress == chunk {
                let state = context.state();
                let rate = ns_per_day(state.step - start, timestep, started.elapsed());
                info!(
                    step = state.step,
                    time_ps = state.time,
                    potential_energy = context.potential_energy(),
                    temperature = context.temperature(),
                    ns_per_day = rate,
                    "Simulation status."
                );
                progress.report(Progress::Status {
                    step: state.step,
                    time_ps: state.time,
                    ns_per_day: rate,
                });
            }
        }
        progress.report(Progress::TaskFinish);

        let elapsed = started.elapsed();
        let state = context.state();
        Ok(RunSummary {
            steps,
            final_step: state.step,
            time_ps: state.time,
            potential_energy: context.potential_energy(),
            temperature: context.temperature(),
            elapsed,
            ns_per_day: ns_per_day(steps, timestep, elapsed),
        })
    }

    /// Writes the exact integration state; the driver is then `Checkpointed`.
    pub fn save_checkpoint(&mut self, path: &Path) -> Result<(), EngineError> {
        if matches!(self.status, DriverStatus::Unconfigured | DriverStatus::Failed) {
            return Err(self.invalid_state("save a checkpoint"));
        }
        let context = self.context_mut()?;
        Checkpoint::capture(context).save(path)?;
        info!(path = %path.display(), step = context.state().step, "Checkpoint saved.");
        self.status = DriverStatus::Checkpointed;
        Ok(())
    }

    /// Writes the current positions, box and topology with the original residue numbering.
    pub fn save_pdb(&self, path: &Path) -> Result<(), EngineError> {
        let context = self
            .context
            .as_ref()
            .ok_or_else(|| self.invalid_state("save a structure"))?;
        let mut system = self.system.clone();
        system
            .set_positions(&context.state().positions)
            .ok_or_else(|| EngineError::Configuration("position count mismatch".to_string()))?;
        system.set_periodic_box(context.state().cell);
        PdbFile::write_system_to_path(&system, path).map_err(|e| EngineError::from_pdb(path, e))?;
        info!(path = %path.display(), "Structure written.");
        Ok(())
    }

    /// Rebuilds a driver from a structure written by [`save_pdb`](Self::save_pdb) and a
    /// checkpoint, ready to continue the trajectory.
    #[instrument(skip_all, name = "driver_restart")]
    pub fn restart(
        structure_file: &Path,
        checkpoint_path: &Path,
        forcefield: &Forcefield,
        water_model: &str,
        params: RunParameters,
        platforms: &PlatformRegistry,
    ) -> Result<Self, EngineError> {
        let (system, _) = PdbFile::read_from_path(structure_file)
            .map_err(|e| EngineError::from_pdb(structure_file, e))?;
        let checkpoint = Checkpoint::load(checkpoint_path)?;
        if checkpoint.atom_count != system.atom_count() {
            return Err(EngineError::Configuration(format!(
                "checkpoint holds {} atoms but '{}' has {}",
                checkpoint.atom_count,
                structure_file.display(),
                system.atom_count()
            )));
        }

        let mut driver = Self::new();
        driver.configure(system, forcefield, water_model, params, platforms)?;
        let context = driver.context_mut()?;
        if checkpoint.platform != context.platform_name() {
            warn!(
                saved = %checkpoint.platform,
                current = context.platform_name(),
                "Checkpoint was written on another platform; the trajectory may diverge."
            );
        }
        let (state, barostat) = checkpoint.into_state();
        context.restore(state, barostat)?;
        info!(step = context.state().step, "Restarted from checkpoint.");
        driver.status = DriverStatus::Checkpointed;
        Ok(driver)
    }

    fn context_mut(&mut self) -> Result<&mut ComputeContext, EngineError> {
        self.context
            .as_mut()
            .ok_or_else(|| EngineError::Configuration("simulation is not configured".to_string()))
    }

    fn invalid_state(&self, action: &str) -> EngineError {
        EngineError::Configuration(format!("cannot {action} while {:?}", self.status))
    }
}

fn ns_per_day(steps: u64, timestep: f64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds <= 0.0 {
        return 0.0;
    }
    steps as f64 * timestep / 1000.0 * SECONDS_PER_DAY / seconds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Atom;
    use crate::core::models::chain::ChainType;
    use crate::core::models::periodic::PeriodicBox;
    use crate::core::models::residue::ResidueCategory;
    use crate::core::models::topology::BondOrder;
    use crate::engine::reporters::{CvSpec, TrajectorySpec};
    use std::sync::Mutex;
    use tempfile::tempdir;

    const SPACING: f64 = 3.1;
    const PER_SIDE: usize = 4;

    fn water_box() -> MolecularSystem {
        let mut system = MolecularSystem::new();
        let chain = system.add_chain('W', ChainType::Solvent);
        let mut number = 0;
        for x in 0..PER_SIDE {
            for y in 0..PER_SIDE {
                for z in 0..PER_SIDE {
                    number += 1;
                    let origin = Point3::new(x as f64, y as f64, z as f64) * SPACING
                        + nalgebra::Vector3::new(0.5, 0.5, 0.5);
                    let res = system
                        .add_residue(chain, number, None, "HOH", ResidueCategory::Water)
                        .unwrap();
                    let o = system
                        .add_atom_to_residue(res, Atom::new("O", "O", res, origin))
                        .unwrap();
                    for (name, offset) in [("H1", (0.9572, 0.0)), ("H2", (-0.24, 0.9266))] {
                        let position = origin + nalgebra::Vector3::new(offset.0, offset.1, 0.0);
                        let h = system
                            .add_atom_to_residue(res, Atom::new(name, "H", res, position))
                            .unwrap();
                        system.add_bond(o, h, BondOrder::Single).unwrap();
                    }
                }
            }
        }
        let edge = PER_SIDE as f64 * SPACING;
        system.set_periodic_box(Some(PeriodicBox::new(edge, edge, edge)));
        system
    }

    fn params() -> RunParameters {
        RunParameters {
            temperature: 300.0,
            pressure: Some(1.0),
            timestep: 0.0005,
            cutoff: 6.0,
            steps: 100,
            progress_every: 20,
            seed: Some(2024),
            ..Default::default()
        }
    }

    fn configured() -> SimulationDriver {
        let forcefield = Forcefield::generic().unwrap();
        let mut driver = SimulationDriver::new();
        driver
            .configure(
                water_box(),
                &forcefield,
                "tip3p",
                params(),
                &PlatformRegistry::with_defaults(),
            )
            .unwrap();
        driver
    }

    #[test]
    fn lifecycle_rejects_out_of_order_calls() {
        let forcefield = Forcefield::generic().unwrap();
        let registry = PlatformRegistry::with_defaults();
        let mut driver = SimulationDriver::new();
        assert!(driver.run(10, &ProgressReporter::new()).is_err());
        assert!(driver.minimize(10, 1.0).is_err());

        driver
            .configure(water_box(), &forcefield, "tip3p", params(), &registry)
            .unwrap();
        assert_eq!(driver.status(), DriverStatus::Built);
        assert_eq!(driver.seed(), Some(2024));
        let again = driver.configure(water_box(), &forcefield, "tip3p", params(), &registry);
        assert!(matches!(again, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn run_reports_progress_and_completes() {
        let mut driver = configured();
        driver.minimize(50, 1.0).unwrap();

        let statuses = Mutex::new(Vec::new());
        let progress = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::Status { step, .. } = event {
                statuses.lock().unwrap().push(step);
            }
        }));
        let summary = driver.run(60, &progress).unwrap();
        drop(progress);

        assert_eq!(summary.final_step, 60);
        assert!((summary.time_ps - 0.03).abs() < 1e-12);
        assert!(summary.potential_energy.is_finite());
        assert_eq!(statuses.into_inner().unwrap(), vec![20, 40, 60]);
        assert_eq!(driver.status(), DriverStatus::Completed);

        let summary = driver.run(10, &ProgressReporter::new()).unwrap();
        assert_eq!(summary.final_step, 70);
    }

    #[test]
    fn out_of_range_cv_indices_fail_before_any_file_is_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("COLVAR.dat");
        let mut driver = configured();
        driver.add_reporter(ReporterSpec::Cv(CvSpec::new(&path, 10, vec![(0, 999)], false)));

        let result = driver.run(20, &ProgressReporter::new());
        assert!(matches!(result, Err(EngineError::Configuration(_))));
        assert!(!path.exists());
        assert_eq!(driver.status(), DriverStatus::Built);
    }

    #[test]
    fn an_unopenable_output_leaves_the_existing_cv_log_untouched() {
        let dir = tempdir().unwrap();
        let cv = dir.path().join("COLVAR.dat");
        let previous = "#! TIME dist_0_1\n500 1.0000 \n1000 1.1000 \n";
        std::fs::write(&cv, previous).unwrap();

        let mut driver = configured();
        driver.add_reporter(ReporterSpec::Cv(CvSpec::new(&cv, 10, vec![(0, 1)], false)));
        driver.add_reporter(ReporterSpec::Trajectory(TrajectorySpec::new(
            dir.path().join("no/such/dir/traj.xtc"),
            10,
            false,
        )));

        let result = driver.run(10, &ProgressReporter::new());
        assert!(matches!(result, Err(EngineError::Input { .. })));
        assert_eq!(driver.status(), DriverStatus::Built);
        assert_eq!(std::fs::read_to_string(&cv).unwrap(), previous);
    }

    #[test]
    fn checkpoints_are_written_at_their_interval_during_a_run() {
        let dir = tempdir().unwrap();
        let checkpoint = dir.path().join("state.chk");
        let forcefield = Forcefield::generic().unwrap();
        let mut driver = SimulationDriver::new();
        let run = RunParameters {
            checkpoint_path: Some(checkpoint.clone()),
            checkpoint_every: 25,
            ..params()
        };
        driver
            .configure(water_box(), &forcefield, "tip3p", run, &PlatformRegistry::with_defaults())
            .unwrap();

        driver.run(60, &ProgressReporter::new()).unwrap();

        assert_eq!(driver.context().unwrap().state().step, 60);
        assert_eq!(Checkpoint::load(&checkpoint).unwrap().step, 50);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn a_run_that_fails_midway_leaves_the_last_periodic_checkpoint() {
        let dir = tempdir().unwrap();
        let checkpoint = dir.path().join("state.chk");
        let trajectory = dir.path().join("traj.pdb");
        std::os::unix::fs::symlink("/dev/full", &trajectory).unwrap();

        let forcefield = Forcefield::generic().unwrap();
        let mut driver = SimulationDriver::new();
        let run = RunParameters {
            checkpoint_path: Some(checkpoint.clone()),
            checkpoint_every: 10,
            ..params()
        };
        driver
            .configure(water_box(), &forcefield, "tip3p", run, &PlatformRegistry::with_defaults())
            .unwrap();
        // One PDB frame of the box overflows the write buffer, so the first report fails.
        driver.add_reporter(ReporterSpec::Trajectory(TrajectorySpec::new(&trajectory, 15, true)));

        assert!(driver.run(40, &ProgressReporter::new()).is_err());
        assert_eq!(driver.status(), DriverStatus::Failed);

        let saved = Checkpoint::load(&checkpoint).unwrap();
        assert_eq!(saved.step, 10);
        assert_eq!(saved.atom_count, 192);
    }

    #[test]
    fn cv_rows_are_written_at_report_steps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("COLVAR.dat");
        let mut driver = configured();
        driver.minimize(50, 1.0).unwrap();
        driver.add_reporter(ReporterSpec::Cv(CvSpec::new(&path, 25, vec![(0, 3), (1, 2)], false)));

        driver.run(100, &ProgressReporter::new()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("#! TIME dist_0_3 dist_1_2"));
        let steps: Vec<&str> = lines.map(|l| l.split(' ').next().unwrap()).collect();
        assert_eq!(steps, vec!["25", "50", "75", "100"]);

        driver.run(25, &ProgressReporter::new()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("#! TIME dist_0_3 dist_1_2\n25 "));
        assert!(text.lines().last().unwrap().starts_with("125 "));
    }

    #[test]
    fn restart_continues_the_uninterrupted_trajectory_exactly() {
        let dir = tempdir().unwrap();
        let checkpoint = dir.path().join("state.chk");
        let structure = dir.path().join("state.pdb");
        let forcefield = Forcefield::generic().unwrap();
        let registry = PlatformRegistry::with_defaults();
        let progress = ProgressReporter::new();

        let mut original = configured();
        original.minimize(50, 1.0).unwrap();
        original.run(30, &progress).unwrap();
        original.save_checkpoint(&checkpoint).unwrap();
        original.save_pdb(&structure).unwrap();
        assert_eq!(original.status(), DriverStatus::Checkpointed);
        original.run(45, &progress).unwrap();

        let mut resumed = SimulationDriver::restart(
            &structure,
            &checkpoint,
            &forcefield,
            "tip3p",
            params(),
            &registry,
        )
        .unwrap();
        assert_eq!(resumed.status(), DriverStatus::Checkpointed);
        assert_eq!(resumed.context().unwrap().state().step, 30);
        resumed.run(45, &progress).unwrap();

        let a = original.context().unwrap();
        let b = resumed.context().unwrap();
        assert_eq!(a.state(), b.state());
        assert_eq!(a.barostat_state(), b.barostat_state());
        assert_eq!(a.potential_energy(), b.potential_energy());
    }

    #[test]
    fn a_restarted_run_finishes_at_the_configured_step_count() {
        let dir = tempdir().unwrap();
        let checkpoint = dir.path().join("state.chk");
        let structure = dir.path().join("state.pdb");

        let mut driver = configured();
        assert_eq!(driver.steps_remaining(params().steps), 100);
        driver.run(40, &ProgressReporter::new()).unwrap();
        driver.save_checkpoint(&checkpoint).unwrap();
        driver.save_pdb(&structure).unwrap();

        let mut resumed = SimulationDriver::restart(
            &structure,
            &checkpoint,
            &Forcefield::generic().unwrap(),
            "tip3p",
            params(),
            &PlatformRegistry::with_defaults(),
        )
        .unwrap();
        let remaining = resumed.steps_remaining(params().steps);
        assert_eq!(remaining, 60);
        let summary = resumed.run(remaining, &ProgressReporter::new()).unwrap();
        assert_eq!(summary.final_step, params().steps);
        assert_eq!(resumed.steps_remaining(params().steps), 0);
        assert_eq!(resumed.steps_remaining(10), 0);
    }

    #[test]
    fn restart_rejects_a_checkpoint_for_another_system() {
        let dir = tempdir().unwrap();
        let checkpoint = dir.path().join("state.chk");
        let structure = dir.path().join("other.pdb");
        let forcefield = Forcefield::generic().unwrap();

        let mut driver = configured();
        driver.save_checkpoint(&checkpoint).unwrap();

        let mut smaller = water_box();
        let last = smaller.atom_ids_in_order()[smaller.atom_count() - 1];
        smaller.remove_atom(last).unwrap();
        PdbFile::write_system_to_path(&smaller, &structure).unwrap();

        let result = SimulationDriver::restart(
            &structure,
            &checkpoint,
            &forcefield,
            "tip3p",
            params(),
            &PlatformRegistry::with_defaults(),
        );
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }
}
