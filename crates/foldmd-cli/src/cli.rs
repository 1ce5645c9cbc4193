use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "foldmd - prepare, simulate and orchestrate molecular dynamics of predicted protein structures.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Prepare a structure and run a molecular dynamics job described by a config file.
    Run(RunArgs),
    /// Build a solvated, neutralized simulation box without running dynamics.
    Prepare(PrepareArgs),
    /// Continue a trajectory from a saved structure and checkpoint.
    Restart(RestartArgs),
    /// Fold a sequence, select representative conformations and simulate each one.
    Workflow(WorkflowArgs),
}

/// Options shared by every command that evaluates forces.
#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Forcefield parameter file (TOML). Defaults to the bundled generic parameter set.
    #[arg(long, value_name = "PATH")]
    pub forcefield: Option<PathBuf>,

    /// Compute platform to use (e.g. 'CPU', 'Reference'). Defaults to the fastest available.
    #[arg(long, value_name = "NAME")]
    pub platform: Option<String>,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Job configuration file (.json or .toml).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Override `pdb_file` from the config file.
    #[arg(short, long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Override the number of steps to simulate.
    #[arg(short = 'n', long, value_name = "INT")]
    pub steps: Option<u64>,

    #[command(flatten)]
    pub engine: EngineArgs,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S xtc_reporter.xtc_freq=1000
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `prepare` subcommand.
#[derive(Args, Debug)]
pub struct PrepareArgs {
    /// Input structure (PDB).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Output path for the prepared structure (PDB).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Job configuration file whose `box_builder` group supplies preparation options.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write the preparation report as JSON.
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    #[command(flatten)]
    pub engine: EngineArgs,

    /// Set a specific configuration value. Example: -S box_builder.padding=12
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `restart` subcommand.
#[derive(Args, Debug)]
pub struct RestartArgs {
    /// Structure written by a previous run (`save_pdb`).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub structure: PathBuf,

    /// Checkpoint written by a previous run (`save_checkpoint`).
    #[arg(long, required = true, value_name = "PATH")]
    pub checkpoint: PathBuf,

    /// Job configuration file of the original run.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Number of additional steps. Defaults to whatever is left to reach `steps` from the
    /// config file.
    #[arg(short = 'n', long, value_name = "INT")]
    pub steps: Option<u64>,

    #[command(flatten)]
    pub engine: EngineArgs,

    /// Set a specific configuration value, overriding the config file.
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `workflow` subcommand.
#[derive(Args, Debug)]
pub struct WorkflowArgs {
    /// Workflow configuration file (.json or .toml).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Path to the `colabfold_batch` executable.
    #[arg(long, value_name = "PATH", default_value = "colabfold_batch")]
    pub colabfold: PathBuf,

    /// Program that filters and clusters predicted structures.
    #[arg(long, required = true, value_name = "PROGRAM")]
    pub selector: PathBuf,

    /// Extra argument passed to the selector before the generated ones. Repeatable.
    #[arg(long = "selector-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub selector_args: Vec<String>,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_apply_to_every_subcommand() {
        let cli = Cli::parse_from([
            "foldmd", "restart", "-s", "final.pdb", "--checkpoint", "state.chk", "-c", "job.toml",
            "-vv", "-j", "4", "--log-file", "run.log",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.threads, Some(4));
        assert_eq!(cli.log_file, Some(PathBuf::from("run.log")));
        let Commands::Restart(args) = cli.command else {
            panic!("Expected 'restart' subcommand");
        };
        assert_eq!(args.steps, None);
        assert_eq!(args.checkpoint, PathBuf::from("state.chk"));
    }

    #[test]
    fn workflow_passes_selector_arguments_through() {
        let cli = Cli::parse_from([
            "foldmd",
            "workflow",
            "-c",
            "wf.toml",
            "--selector",
            "python3",
            "--selector-arg",
            "select.py",
            "--selector-arg",
            "--fast",
            "--platform",
            "Reference",
        ]);
        let Commands::Workflow(args) = cli.command else {
            panic!("Expected 'workflow' subcommand");
        };
        assert_eq!(args.colabfold, PathBuf::from("colabfold_batch"));
        assert_eq!(args.selector_args, vec!["select.py", "--fast"]);
        assert_eq!(args.engine.platform.as_deref(), Some("Reference"));
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["foldmd", "-q", "-v", "run", "-c", "job.toml"]).is_err());
    }
}
