use super::config::{JobConfig, PartialJobConfig};
use crate::core::forcefield::params::Forcefield;
use crate::core::prep::{BoxBuilder, PreparationReport};
use crate::engine::driver::{RunSummary, SimulationDriver};
use crate::engine::error::EngineError;
use crate::engine::minimizer::MinimizationSummary;
use crate::engine::platform::PlatformRegistry;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::reporters::ReporterSpec;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// What one preparation and simulation job produced.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub pdb_file: PathBuf,
    pub atom_count: usize,
    pub platform: String,
    pub seed: u64,
    pub preparation: PreparationReport,
    pub minimization: Option<MinimizationSummary>,
    pub run: RunSummary,
    pub checkpoint: Option<PathBuf>,
    /// The solvated box the checkpoint's atoms refer to.
    pub prepared_structure: Option<PathBuf>,
    pub final_structure: Option<PathBuf>,
}

/// Merges `config` over the defaults, validates it and runs the job.
///
/// No file is created unless validation passes.
pub fn run_job(
    config: PartialJobConfig,
    forcefield: &Forcefield,
    platforms: &PlatformRegistry,
    progress: &ProgressReporter,
) -> Result<JobSummary, EngineError> {
    let job = JobConfig::from_partial(config)?;
    run_validated(&job, forcefield, platforms, progress)
}

/// Runs an already validated job: prepare the box, configure the driver, minimize,
/// simulate, then persist the requested outputs.
#[instrument(skip_all, name = "job", fields(input = %job.pdb_file.display()))]
pub fn run_validated(
    job: &JobConfig,
    forcefield: &Forcefield,
    platforms: &PlatformRegistry,
    progress: &ProgressReporter,
) -> Result<JobSummary, EngineError> {
    if !job.pdb_file.is_file() {
        return Err(EngineError::input(&job.pdb_file, "structure file not found"));
    }
    let run = &job.system.run;
    let water_model = job.system.preparation.water_model.as_str();

    for path in job.output_paths() {
        ensure_parent_dir(path)?;
    }

    let prepared = progress.phase("Preparation", || {
        BoxBuilder::new(forcefield, job.system.preparation.clone())
            .build(&job.pdb_file, job.prepared_pdb.as_deref())
    })?;
    let atom_count = prepared.system.atom_count();

    let mut driver = SimulationDriver::new();
    progress.phase("Configuration", || {
        driver.configure(prepared.system, forcefield, water_model, run.clone(), platforms)
    })?;
    if let Some(cv) = &job.cv {
        driver.add_reporter(ReporterSpec::Cv(cv.clone()));
    }
    driver.add_reporter(ReporterSpec::Trajectory(job.trajectory.clone()));

    let minimization = if run.minimize_iterations > 0 {
        Some(progress.phase("Minimization", || {
            driver.minimize(run.minimize_iterations, run.minimize_tolerance)
        })?)
    } else {
        None
    };

    let summary = progress.phase("Dynamics", || driver.run(run.steps, progress))?;

    if let Some(path) = &run.checkpoint_path {
        driver.save_checkpoint(path)?;
    }
    if let Some(path) = &run.final_structure_path {
        driver.save_pdb(path)?;
    }

    let platform = driver
        .context()
        .map(|c| c.platform_name().to_string())
        .unwrap_or_default();
    let seed = driver.seed().unwrap_or_default();
    progress.report(Progress::Message(format!(
        "{} finished at step {}",
        job.pdb_file.display(),
        summary.final_step
    )));
    info!(
        atoms = atom_count,
        steps = summary.steps,
        ns_per_day = summary.ns_per_day,
        "Job complete."
    );

    Ok(JobSummary {
        pdb_file: job.pdb_file.clone(),
        atom_count,
        platform,
        seed,
        preparation: prepared.report,
        minimization,
        run: summary,
        checkpoint: run.checkpoint_path.clone(),
        prepared_structure: job.prepared_pdb.clone(),
        final_structure: run.final_structure_path.clone(),
    })
}

fn ensure_parent_dir(path: &Path) -> Result<(), EngineError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::input(parent, e))
        }
        _ => Ok(()),
    }
}
