use super::config::{JobConfig, PartialJobConfig, load_document};
use super::job::{JobSummary, run_validated};
use crate::core::forcefield::params::Forcefield;
use crate::engine::error::EngineError;
use crate::engine::platform::PlatformRegistry;
use crate::engine::progress::{Progress, ProgressReporter};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use tracing::{debug, error, info, instrument, warn};

/// Alignment depth given to the structure predictor, written `max_seq:max_extra_seq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsaRange {
    pub max_seq: usize,
    pub max_extra_seq: usize,
}

impl FromStr for MsaRange {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            EngineError::Configuration(format!(
                "msa: invalid range '{s}' (expected e.g. '8:16')"
            ))
        };
        let (max_seq, max_extra_seq) = s.split_once(':').ok_or_else(invalid)?;
        let max_seq = max_seq.trim().parse::<usize>().map_err(|_| invalid())?;
        let max_extra_seq = max_extra_seq.trim().parse::<usize>().map_err(|_| invalid())?;
        if max_seq == 0 || max_extra_seq == 0 {
            return Err(invalid());
        }
        Ok(Self {
            max_seq,
            max_extra_seq,
        })
    }
}

impl fmt::Display for MsaRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.max_seq, self.max_extra_seq)
    }
}

fn default_msa() -> String {
    "8:16".to_string()
}
fn default_num_seeds() -> u32 {
    128
}
fn default_num_recycles() -> u32 {
    1
}
fn default_num_models() -> u32 {
    5
}
fn default_homooligomer() -> String {
    "1".to_string()
}
fn default_selection() -> String {
    "name CA".to_string()
}
fn default_rmsd_cutoff() -> f64 {
    10.0
}

/// The fold, select and simulate workflow for one sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    /// Amino-acid sequence; `:` separates the chains of a complex.
    pub sequence: String,
    pub job_name: String,
    pub output_dir: PathBuf,
    #[serde(default = "default_msa")]
    pub msa: String,
    #[serde(default = "default_num_seeds")]
    pub num_seeds: u32,
    #[serde(default = "default_num_recycles")]
    pub num_recycles: u32,
    #[serde(default = "default_num_models")]
    pub num_models: u32,
    /// Copies of each chain, either one count for all chains or one per chain (`"2:1"`).
    #[serde(default = "default_homooligomer")]
    pub homooligomer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_pdb: Option<PathBuf>,
    #[serde(default = "default_selection")]
    pub rmsd_selection: String,
    #[serde(default = "default_rmsd_cutoff")]
    pub rmsd_cutoff: f64,
    #[serde(default = "default_selection")]
    pub cluster_selection: String,
    /// Template for every representative's MD job; `pdb_file` is filled per structure.
    #[serde(default)]
    pub md: PartialJobConfig,
}

impl WorkflowConfig {
    pub fn new(
        sequence: impl Into<String>,
        job_name: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sequence: sequence.into(),
            job_name: job_name.into(),
            output_dir: output_dir.into(),
            msa: default_msa(),
            num_seeds: default_num_seeds(),
            num_recycles: default_num_recycles(),
            num_models: default_num_models(),
            homooligomer: default_homooligomer(),
            reference_pdb: None,
            rmsd_selection: default_selection(),
            rmsd_cutoff: default_rmsd_cutoff(),
            cluster_selection: default_selection(),
            md: PartialJobConfig::default(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        load_document(path)
    }

    pub fn msa_range(&self) -> Result<MsaRange, EngineError> {
        self.msa.parse()
    }

    /// The prediction query: each chain repeated per `homooligomer`, chains joined by `:`.
    pub fn query(&self) -> Result<String, EngineError> {
        let chains: Vec<String> = self
            .sequence
            .split(':')
            .map(|c| c.chars().filter(|ch| !ch.is_whitespace()).collect::<String>())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if chains.iter().any(|c| c.is_empty() || !c.chars().all(|ch| ch.is_ascii_alphabetic())) {
            return Err(EngineError::Configuration(
                "sequence: expected one-letter residue codes with ':' between chains".to_string(),
            ));
        }

        let copies = self
            .homooligomer
            .split(':')
            .map(|n| n.trim().parse::<usize>().ok().filter(|&n| n > 0))
            .collect::<Option<Vec<usize>>>()
            .ok_or_else(|| {
                EngineError::Configuration(format!(
                    "homooligomer: invalid value '{}'",
                    self.homooligomer
                ))
            })?;
        let copies = match copies.len() {
            1 => vec![copies[0]; chains.len()],
            n if n == chains.len() => copies,
            n => {
                return Err(EngineError::Configuration(format!(
                    "homooligomer: {n} counts given for {} chains",
                    chains.len()
                )));
            }
        };

        Ok(chains
            .iter()
            .zip(copies)
            .flat_map(|(chain, n)| std::iter::repeat_n(chain.as_str(), n))
            .collect::<Vec<_>>()
            .join(":"))
    }

    /// Checks every option, including the MD template, before any work starts.
    pub fn validate(&self) -> Result<PredictionRequest, EngineError> {
        if self.job_name.trim().is_empty() || self.job_name.contains(['/', '\\']) {
            return Err(EngineError::Configuration(
                "job_name: must be a non-empty file name".to_string(),
            ));
        }
        let msa = self.msa_range()?;
        let query = self.query()?;
        if self.num_seeds == 0 {
            return Err(EngineError::Configuration("num_seeds: must be positive".to_string()));
        }
        if self.num_recycles == 0 {
            return Err(EngineError::Configuration(
                "num_recycles: must be positive".to_string(),
            ));
        }
        if !(1..=5).contains(&self.num_models) {
            return Err(EngineError::Configuration(
                "num_models: must be between 1 and 5".to_string(),
            ));
        }
        if !(self.rmsd_cutoff.is_finite() && self.rmsd_cutoff > 0.0) {
            return Err(EngineError::Configuration(
                "rmsd_cutoff: must be strictly positive".to_string(),
            ));
        }
        if let Some(reference) = &self.reference_pdb {
            if !reference.is_file() {
                return Err(EngineError::input(reference, "reference structure not found"));
            }
        }
        let mut template = self.md.clone();
        template.pdb_file = Some(PathBuf::from("representative.pdb"));
        JobConfig::from_partial(template)?;

        Ok(PredictionRequest {
            job_name: self.job_name.clone(),
            query,
            msa,
            num_seeds: self.num_seeds,
            num_recycles: self.num_recycles,
            num_models: self.num_models,
        })
    }

    fn criteria(&self) -> SelectionCriteria {
        SelectionCriteria {
            reference_pdb: self.reference_pdb.clone(),
            rmsd_selection: self.rmsd_selection.clone(),
            rmsd_cutoff: self.rmsd_cutoff,
            cluster_selection: self.cluster_selection.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRequest {
    pub job_name: String,
    pub query: String,
    pub msa: MsaRange,
    pub num_seeds: u32,
    pub num_recycles: u32,
    pub num_models: u32,
}

impl PredictionRequest {
    pub fn is_complex(&self) -> bool {
        self.query.contains(':')
    }

    pub fn fasta(&self) -> String {
        format!(">{}\n{}\n", self.job_name, self.query)
    }
}

/// Turns a sequence into candidate structure files.
pub trait StructurePredictor: Send + Sync {
    fn name(&self) -> &str;

    fn predict(
        &self,
        request: &PredictionRequest,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, EngineError>;
}

/// Runs a local `colabfold_batch` installation.
#[derive(Debug, Clone)]
pub struct ColabFold {
    executable: PathBuf,
}

impl Default for ColabFold {
    fn default() -> Self {
        Self::new("colabfold_batch")
    }
}

impl ColabFold {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    fn arguments(&self, request: &PredictionRequest, fasta: &Path, output_dir: &Path) -> Vec<String> {
        vec![
            "--num-seeds".to_string(),
            request.num_seeds.to_string(),
            "--num-recycle".to_string(),
            request.num_recycles.to_string(),
            "--num-models".to_string(),
            request.num_models.to_string(),
            "--max-msa".to_string(),
            request.msa.to_string(),
            fasta.display().to_string(),
            output_dir.display().to_string(),
        ]
    }
}

impl StructurePredictor for ColabFold {
    fn name(&self) -> &str {
        "colabfold_batch"
    }

    #[instrument(skip_all, name = "colabfold", fields(job = %request.job_name))]
    fn predict(
        &self,
        request: &PredictionRequest,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, EngineError> {
        std::fs::create_dir_all(output_dir).map_err(|e| EngineError::input(output_dir, e))?;
        let fasta = output_dir.join(format!("{}.fasta", request.job_name));
        std::fs::write(&fasta, request.fasta()).map_err(|e| EngineError::input(&fasta, e))?;
        info!(
            complex = request.is_complex(),
            seeds = request.num_seeds,
            msa = %request.msa,
            "Predicting structures."
        );

        let output = Command::new(&self.executable)
            .args(self.arguments(request, &fasta, output_dir))
            .output()
            .map_err(|e| collaborator_error(self.name(), e))?;
        if !output.status.success() {
            return Err(collaborator_error(
                self.name(),
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }

        let structures = pdb_files_in(output_dir)?;
        if structures.is_empty() {
            return Err(collaborator_error(self.name(), "produced no structures"));
        }
        info!(count = structures.len(), "Prediction finished.");
        Ok(structures)
    }
}

/// How candidate structures are filtered against the reference and clustered.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionCriteria {
    pub reference_pdb: Option<PathBuf>,
    pub rmsd_selection: String,
    pub rmsd_cutoff: f64,
    pub cluster_selection: String,
}

/// Filters and clusters candidate structures, returning one representative per cluster.
pub trait ConformationSelector: Send + Sync {
    fn name(&self) -> &str;

    fn select(
        &self,
        candidates: &[PathBuf],
        criteria: &SelectionCriteria,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, EngineError>;
}

/// Delegates selection to an external program.
///
/// The program receives its fixed arguments, then `--rmsd-selection`, `--rmsd-cutoff`,
/// `--cluster-selection`, `--output-dir` and optionally `--reference`, then the candidate
/// paths. It prints one representative path per line on stdout.
#[derive(Debug, Clone)]
pub struct CommandSelector {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandSelector {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl ConformationSelector for CommandSelector {
    fn name(&self) -> &str {
        self.program
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("selector")
    }

    fn select(
        &self,
        candidates: &[PathBuf],
        criteria: &SelectionCriteria,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, EngineError> {
        std::fs::create_dir_all(output_dir).map_err(|e| EngineError::input(output_dir, e))?;
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--rmsd-selection")
            .arg(&criteria.rmsd_selection)
            .arg("--rmsd-cutoff")
            .arg(criteria.rmsd_cutoff.to_string())
            .arg("--cluster-selection")
            .arg(&criteria.cluster_selection)
            .arg("--output-dir")
            .arg(output_dir);
        if let Some(reference) = &criteria.reference_pdb {
            command.arg("--reference").arg(reference);
        }
        command.args(candidates);
        debug!(program = %self.program.display(), candidates = candidates.len(), "Running selector.");

        let output = command
            .output()
            .map_err(|e| collaborator_error(self.name(), e))?;
        if !output.status.success() {
            return Err(collaborator_error(
                self.name(),
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }

        let mut representatives = Vec::new();
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let path = PathBuf::from(line);
            if !path.is_file() {
                return Err(collaborator_error(
                    self.name(),
                    format!("reported '{}', which does not exist", path.display()),
                ));
            }
            representatives.push(path);
        }
        Ok(representatives)
    }
}

/// Outcome of one representative's simulation.
#[derive(Debug)]
pub struct RepresentativeOutcome {
    pub structure: PathBuf,
    pub output_dir: PathBuf,
    pub result: Result<JobSummary, EngineError>,
}

#[derive(Debug)]
pub struct WorkflowSummary {
    pub predictions: Vec<PathBuf>,
    pub representatives: Vec<RepresentativeOutcome>,
    pub summary_csv: PathBuf,
}

impl WorkflowSummary {
    pub fn succeeded(&self) -> usize {
        self.representatives.iter().filter(|r| r.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.representatives.len() - self.succeeded()
    }
}

#[derive(Serialize)]
struct SummaryRow {
    representative: String,
    status: &'static str,
    steps: Option<u64>,
    ns_per_day: Option<f64>,
    error: Option<String>,
}

/// Folds the sequence, selects representatives and simulates each one.
///
/// Representatives run in parallel and independently; a failed simulation is recorded in
/// the summary and does not stop the others. Configuration and collaborator failures
/// before the simulations abort the workflow.
#[instrument(skip_all, name = "workflow", fields(job = %config.job_name))]
pub fn run_workflow(
    config: &WorkflowConfig,
    predictor: &dyn StructurePredictor,
    selector: &dyn ConformationSelector,
    forcefield: &Forcefield,
    platforms: &PlatformRegistry,
    progress: &ProgressReporter,
) -> Result<WorkflowSummary, EngineError> {
    let request = config.validate()?;
    let output_dir = &config.output_dir;

    let predictions = progress.phase("Structure prediction", || {
        predictor.predict(&request, &output_dir.join("prediction"))
    })?;
    let representatives = progress.phase("Conformation selection", || {
        selector.select(&predictions, &config.criteria(), &output_dir.join("selection"))
    })?;
    if representatives.is_empty() {
        return Err(collaborator_error(selector.name(), "selected no representatives"));
    }
    info!(
        candidates = predictions.len(),
        representatives = representatives.len(),
        "Selected representative structures."
    );

    let md_root = output_dir.join("md");
    let jobs: Vec<(PathBuf, PathBuf)> = representative_dirs(&representatives, &md_root);

    progress.report(Progress::PhaseStart { name: "Simulation" });
    progress.report(Progress::TaskStart {
        total_steps: jobs.len() as u64,
    });
    let simulate = |(structure, dir): &(PathBuf, PathBuf)| {
        let result = simulate_representative(config, structure, dir, forcefield, platforms);
        match &result {
            Ok(summary) => info!(
                structure = %structure.display(),
                final_step = summary.run.final_step,
                "Representative finished."
            ),
            Err(e) => error!(structure = %structure.display(), "Representative failed: {e}"),
        }
        progress.report(Progress::TaskIncrement { steps: 1 });
        RepresentativeOutcome {
            structure: structure.clone(),
            output_dir: dir.clone(),
            result,
        }
    };
    #[cfg(feature = "parallel")]
    let outcomes: Vec<RepresentativeOutcome> = jobs.par_iter().map(simulate).collect();
    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<RepresentativeOutcome> = jobs.iter().map(simulate).collect();
    progress.report(Progress::TaskFinish);
    progress.report(Progress::PhaseFinish);

    let summary_csv = output_dir.join("summary.csv");
    write_summary(&summary_csv, &outcomes)?;

    let summary = WorkflowSummary {
        predictions,
        representatives: outcomes,
        summary_csv,
    };
    if summary.failed() > 0 {
        warn!(
            failed = summary.failed(),
            succeeded = summary.succeeded(),
            "Some representatives failed."
        );
    }
    Ok(summary)
}

fn simulate_representative(
    config: &WorkflowConfig,
    structure: &Path,
    dir: &Path,
    forcefield: &Forcefield,
    platforms: &PlatformRegistry,
) -> Result<JobSummary, EngineError> {
    let mut partial = config.md.clone();
    partial.pdb_file = Some(structure.to_path_buf());
    let job = JobConfig::from_partial(partial)?.with_output_dir(dir);
    std::fs::create_dir_all(dir).map_err(|e| EngineError::input(dir, e))?;
    run_validated(&job, forcefield, platforms, &ProgressReporter::new())
}

/// One output directory per representative, named after its file stem.
fn representative_dirs(representatives: &[PathBuf], md_root: &Path) -> Vec<(PathBuf, PathBuf)> {
    let mut taken = HashSet::new();
    representatives
        .iter()
        .enumerate()
        .map(|(k, path)| {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("representative")
                .to_string();
            let name = if taken.insert(stem.clone()) {
                stem
            } else {
                format!("{stem}_{k}")
            };
            (path.clone(), md_root.join(name))
        })
        .collect()
}

fn write_summary(path: &Path, outcomes: &[RepresentativeOutcome]) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| EngineError::input(parent, e))?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(|e| EngineError::input(path, e))?;
    for outcome in outcomes {
        let row = match &outcome.result {
            Ok(summary) => SummaryRow {
                representative: outcome.structure.display().to_string(),
                status: "completed",
                steps: Some(summary.run.final_step),
                ns_per_day: Some(summary.run.ns_per_day),
                error: None,
            },
            Err(e) => SummaryRow {
                representative: outcome.structure.display().to_string(),
                status: "failed",
                steps: None,
                ns_per_day: None,
                error: Some(e.to_string()),
            },
        };
        writer.serialize(row).map_err(|e| EngineError::input(path, e))?;
    }
    writer.flush().map_err(|e| EngineError::input(path, e))
}

fn collaborator_error(tool: &str, reason: impl ToString) -> EngineError {
    EngineError::Collaborator {
        tool: tool.to_string(),
        reason: reason.to_string(),
    }
}

fn pdb_files_in(dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| EngineError::input(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("pdb"))
        })
        .collect();
    files.sort();
    Ok(files)
}
