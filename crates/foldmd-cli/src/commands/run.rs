use super::{load_forcefield, platforms};
use crate::cli::RunArgs;
use crate::config::load_job_config;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use foldmd::engine::progress::ProgressReporter;
use foldmd::workflows::job::run_job;
use tracing::info;

pub fn run(args: RunArgs) -> Result<()> {
    let mut partial = load_job_config(&args.config, &args.set_values)?;
    if let Some(input) = args.input {
        partial.pdb_file = Some(input);
    }
    if let Some(steps) = args.steps {
        partial.steps = Some(steps);
    }
    if let Some(platform) = args.engine.platform {
        partial.platform = Some(platform);
    }
    let forcefield = load_forcefield(args.engine.forcefield.as_deref())?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Starting molecular dynamics job...");
    info!("Invoking the job workflow...");
    let summary = run_job(partial, &forcefield, &platforms(), &reporter)?;

    println!(
        "✓ {} atoms simulated for {} steps on {} ({:.2} ns/day, seed {}).",
        summary.atom_count,
        summary.run.steps,
        summary.platform,
        summary.run.ns_per_day,
        summary.seed
    );
    println!(
        "  Final potential energy {:.2} kcal/mol, temperature {:.1} K.",
        summary.run.potential_energy, summary.run.temperature
    );
    if let Some(path) = &summary.checkpoint {
        println!("  Checkpoint written to: {}", path.display());
    }
    if let Some(path) = &summary.prepared_structure {
        println!("  Prepared structure for restarts: {}", path.display());
    }
    if let Some(path) = &summary.final_structure {
        println!("  Final structure written to: {}", path.display());
    }
    Ok(())
}
