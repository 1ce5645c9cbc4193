use super::{load_forcefield, platforms};
use crate::cli::RestartArgs;
use crate::config::load_job_config;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use foldmd::engine::driver::SimulationDriver;
use foldmd::engine::progress::ProgressReporter;
use foldmd::engine::reporters::ReporterSpec;
use foldmd::workflows::config::JobConfig;
use tracing::info;

pub fn run(args: RestartArgs) -> Result<()> {
    let mut partial = load_job_config(&args.config, &args.set_values)?;
    partial.pdb_file = Some(args.structure.clone());
    if let Some(platform) = args.engine.platform {
        partial.platform = Some(platform);
    }
    let job = JobConfig::from_partial(partial)?;
    let forcefield = load_forcefield(args.engine.forcefield.as_deref())?;
    let run = job.system.run.clone();

    println!(
        "Restarting from {} and {}...",
        args.structure.display(),
        args.checkpoint.display()
    );
    let mut driver = SimulationDriver::restart(
        &args.structure,
        &args.checkpoint,
        &forcefield,
        &job.system.preparation.water_model,
        run.clone(),
        &platforms(),
    )?;

    // `steps` in the config is the length of the whole trajectory, not of this leg.
    let steps = args
        .steps
        .unwrap_or_else(|| driver.steps_remaining(run.steps));
    if steps == 0 {
        println!(
            "✓ Trajectory already reached step {}; nothing to run.",
            run.steps
        );
        return Ok(());
    }

    // A continued trajectory extends the existing reporter files.
    if let Some(mut cv) = job.cv {
        cv.append = true;
        driver.add_reporter(ReporterSpec::Cv(cv));
    }
    let mut trajectory = job.trajectory;
    trajectory.append = true;
    driver.add_reporter(ReporterSpec::Trajectory(trajectory));

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());
    info!(steps, "Continuing trajectory.");
    let summary = reporter.phase("Dynamics", || driver.run(steps, &reporter))?;

    if let Some(path) = &run.checkpoint_path {
        driver.save_checkpoint(path)?;
        println!("  Checkpoint written to: {}", path.display());
    }
    if let Some(path) = &run.final_structure_path {
        driver.save_pdb(path)?;
        println!("  Final structure written to: {}", path.display());
    }
    println!(
        "✓ Continued to step {} ({:.2} ps, {:.2} ns/day).",
        summary.final_step, summary.time_ps, summary.ns_per_day
    );
    Ok(())
}
