use super::load_forcefield;
use crate::cli::PrepareArgs;
use crate::config::{apply_set_values, load_job_config};
use crate::error::{CliError, Result};
use foldmd::core::prep::BoxBuilder;
use foldmd::engine::error::EngineError;
use foldmd::workflows::config::{JobConfig, PartialJobConfig};
use tracing::info;

pub fn run(args: PrepareArgs) -> Result<()> {
    let mut partial = match &args.config {
        Some(path) => load_job_config(path, &args.set_values)?,
        None => {
            let mut partial = PartialJobConfig::default();
            apply_set_values(&mut partial, &args.set_values)?;
            partial
        }
    };
    partial.pdb_file = Some(args.input.clone());
    let job = JobConfig::from_partial(partial)?;
    let forcefield = load_forcefield(args.engine.forcefield.as_deref())?;

    println!("Preparing {}...", args.input.display());
    info!(options = ?job.system.preparation, "Building simulation box.");
    let prepared = BoxBuilder::new(&forcefield, job.system.preparation)
        .build(&args.input, Some(&args.output))
        .map_err(EngineError::from)?;
    let report = &prepared.report;

    println!(
        "✓ Prepared structure written to: {} ({} atoms)",
        args.output.display(),
        prepared.system.atom_count()
    );
    println!(
        "  Added {} hydrogens, {} waters, {} cations, {} anions.",
        report.hydrogens_added, report.waters_added, report.cations_added, report.anions_added
    );
    if report.residues_built > 0 {
        println!(
            "  Built {} missing terminal residue(s) declared by SEQRES.",
            report.residues_built
        );
    }
    if report.unbuilt_residue_count() > 0 {
        println!(
            "  Warning: {} residue(s) are missing from the model and were not built.",
            report.unbuilt_residue_count()
        );
    }

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(report)
            .map_err(|e| CliError::Other(e.into()))?;
        std::fs::write(path, json)?;
        println!("  Preparation report written to: {}", path.display());
    }
    Ok(())
}
