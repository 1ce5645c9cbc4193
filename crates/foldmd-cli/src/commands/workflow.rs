use super::{load_forcefield, platforms};
use crate::cli::WorkflowArgs;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use foldmd::engine::progress::ProgressReporter;
use foldmd::workflows::pipeline::{ColabFold, CommandSelector, WorkflowConfig, run_workflow};
use tracing::{info, warn};

pub fn run(args: WorkflowArgs) -> Result<()> {
    let mut config = WorkflowConfig::from_file(&args.config)?;
    if let Some(platform) = args.engine.platform {
        config.md.platform = Some(platform);
    }
    let forcefield = load_forcefield(args.engine.forcefield.as_deref())?;
    let predictor = ColabFold::new(args.colabfold);
    let selector = CommandSelector::new(args.selector).with_args(args.selector_args);

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Starting workflow '{}'...", config.job_name);
    info!("Invoking the fold, select and simulate workflow...");
    let summary = run_workflow(
        &config,
        &predictor,
        &selector,
        &forcefield,
        &platforms(),
        &reporter,
    )?;

    println!(
        "{} structure(s) predicted, {} representative(s) simulated.",
        summary.predictions.len(),
        summary.representatives.len()
    );
    for outcome in &summary.representatives {
        match &outcome.result {
            Ok(job) => println!(
                "  ✓ {} -> {} ({} steps)",
                outcome.structure.display(),
                outcome.output_dir.display(),
                job.run.final_step
            ),
            Err(e) => println!("  ✗ {}: {}", outcome.structure.display(), e),
        }
    }
    println!("Summary written to: {}", summary.summary_csv.display());

    if summary.failed() > 0 {
        warn!(failed = summary.failed(), "Not every representative completed.");
        return Err(CliError::Other(anyhow::anyhow!(
            "{} of {} representative simulation(s) failed",
            summary.failed(),
            summary.representatives.len()
        )));
    }
    Ok(())
}
