use crate::core::topology::templates::IonSpecies;
use crate::engine::config::{SystemConfiguration, SystemConfigurationBuilder};
use crate::engine::error::EngineError;
use crate::engine::reporters::{CvSpec, TrajectorySpec};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Fills keys that are absent in `self` from `defaults`; present keys are kept.
trait FillMissing {
    fn fill_missing(&mut self, defaults: &Self);
}

fn fill<T: Clone>(slot: &mut Option<T>, default: &Option<T>) {
    if slot.is_none() {
        *slot = default.clone();
    }
}

fn fill_group<T: Clone + FillMissing>(slot: &mut Option<T>, default: &Option<T>) {
    match (slot.as_mut(), default) {
        (Some(group), Some(default)) => group.fill_missing(default),
        (None, Some(default)) => *slot = Some(default.clone()),
        _ => {}
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialCvReporterConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_of_index: Option<Vec<(usize, usize)>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv_freq: Option<u64>,
}

impl FillMissing for PartialCvReporterConfig {
    fn fill_missing(&mut self, defaults: &Self) {
        fill(&mut self.list_of_index, &defaults.list_of_index);
        fill(&mut self.cv_file, &defaults.cv_file);
        fill(&mut self.cv_freq, &defaults.cv_freq);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialXtcReporterConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xtc_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xtc_freq: Option<u64>,
}

impl FillMissing for PartialXtcReporterConfig {
    fn fill_missing(&mut self, defaults: &Self) {
        fill(&mut self.xtc_file, &defaults.xtc_file);
        fill(&mut self.xtc_freq, &defaults.xtc_freq);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialBoxBuilderConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ph: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub water_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positive_ion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_ion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ionic_strength: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl FillMissing for PartialBoxBuilderConfig {
    fn fill_missing(&mut self, defaults: &Self) {
        fill(&mut self.ph, &defaults.ph);
        fill(&mut self.padding, &defaults.padding);
        fill(&mut self.water_model, &defaults.water_model);
        fill(&mut self.positive_ion, &defaults.positive_ion);
        fill(&mut self.negative_ion, &defaults.negative_ion);
        fill(&mut self.ionic_strength, &defaults.ionic_strength);
        fill(&mut self.seed, &defaults.seed);
    }
}

/// Reads a serde document, choosing JSON or TOML by extension.
///
/// Unreadable and malformed files are both reported as input errors carrying the path.
pub(crate) fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T, EngineError> {
    debug!("Loading configuration from {:?}", path);
    let content = std::fs::read_to_string(path).map_err(|e| EngineError::input(path, e))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content).map_err(|e| EngineError::input(path, e)),
        Some("toml") => toml::from_str(&content).map_err(|e| EngineError::input(path, e)),
        _ => Err(EngineError::input(
            path,
            "configuration must be a .json or .toml file",
        )),
    }
}

/// A job document as written by the user: every key optional, unknown keys rejected.
///
/// Reads from JSON or TOML. [`fill_missing`](Self::fill_missing) deep-merges the defaults
/// in, and [`JobConfig::from_partial`] validates the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialJobConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdb_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cutoff: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub append: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_every: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_checkpoint: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_freq: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_pdb: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimize_iterations: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prepared_pdb: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv_reporter: Option<PartialCvReporterConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xtc_reporter: Option<PartialXtcReporterConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub box_builder: Option<PartialBoxBuilderConfig>,
}

impl PartialJobConfig {
    /// The default document. `pdb_file` and the optional outputs are absent.
    pub fn defaults() -> Self {
        Self {
            pdb_file: None,
            temp: Some(310.0),
            pressure: Some(1.0),
            dt: Some(0.002),
            cutoff: Some(10.0),
            steps: Some(50_000_000),
            append: Some(false),
            progress_every: Some(1000),
            save_checkpoint: None,
            checkpoint_freq: Some(10_000),
            save_pdb: None,
            friction: Some(1.0),
            seed: None,
            platform: None,
            minimize_iterations: Some(1000),
            prepared_pdb: None,
            cv_reporter: Some(PartialCvReporterConfig {
                list_of_index: None,
                cv_file: Some(PathBuf::from("COLVAR.dat")),
                cv_freq: Some(500),
            }),
            xtc_reporter: Some(PartialXtcReporterConfig {
                xtc_file: Some(PathBuf::from("traj.xtc")),
                xtc_freq: Some(5000),
            }),
            box_builder: Some(PartialBoxBuilderConfig {
                ph: Some(7.0),
                padding: Some(10.0),
                water_model: Some("tip3p".to_string()),
                positive_ion: Some("Na+".to_string()),
                negative_ion: Some("Cl-".to_string()),
                ionic_strength: Some(0.0),
                seed: Some(0),
            }),
        }
    }

    /// Reads a `.json` or `.toml` job document.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        load_document(path)
    }

    pub fn from_json_str(content: &str) -> Result<Self, EngineError> {
        serde_json::from_str(content).map_err(|e| EngineError::Configuration(e.to_string()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, EngineError> {
        toml::from_str(content).map_err(|e| EngineError::Configuration(e.to_string()))
    }

    pub fn fill_missing(&mut self, defaults: &Self) {
        fill(&mut self.pdb_file, &defaults.pdb_file);
        fill(&mut self.temp, &defaults.temp);
        fill(&mut self.pressure, &defaults.pressure);
        fill(&mut self.dt, &defaults.dt);
        fill(&mut self.cutoff, &defaults.cutoff);
        fill(&mut self.steps, &defaults.steps);
        fill(&mut self.append, &defaults.append);
        fill(&mut self.progress_every, &defaults.progress_every);
        fill(&mut self.save_checkpoint, &defaults.save_checkpoint);
        fill(&mut self.checkpoint_freq, &defaults.checkpoint_freq);
        fill(&mut self.save_pdb, &defaults.save_pdb);
        fill(&mut self.friction, &defaults.friction);
        fill(&mut self.seed, &defaults.seed);
        fill(&mut self.platform, &defaults.platform);
        fill(&mut self.minimize_iterations, &defaults.minimize_iterations);
        fill(&mut self.prepared_pdb, &defaults.prepared_pdb);
        fill_group(&mut self.cv_reporter, &defaults.cv_reporter);
        fill_group(&mut self.xtc_reporter, &defaults.xtc_reporter);
        fill_group(&mut self.box_builder, &defaults.box_builder);
    }
}

/// A validated job: typed configuration plus reporter definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    pub pdb_file: PathBuf,
    pub system: SystemConfiguration,
    /// Absent when no collective variables are defined.
    pub cv: Option<CvSpec>,
    pub trajectory: TrajectorySpec,
    /// Where the prepared box is written before dynamics, if anywhere.
    pub prepared_pdb: Option<PathBuf>,
}

impl JobConfig {
    /// Merges the defaults into `partial` and validates every value.
    ///
    /// # Errors
    ///
    /// A missing `pdb_file` or any invalid value is reported as a configuration error
    /// naming the offending key.
    pub fn from_partial(mut partial: PartialJobConfig) -> Result<Self, EngineError> {
        if let Some(cv) = &partial.cv_reporter {
            if cv.list_of_index.is_none() {
                return Err(EngineError::Configuration(
                    "cv_reporter.list_of_index: required when cv_reporter is given".to_string(),
                ));
            }
        }
        partial.fill_missing(&PartialJobConfig::defaults());

        let pdb_file = partial
            .pdb_file
            .ok_or_else(|| EngineError::Configuration("pdb_file: required".to_string()))?;

        let box_builder = partial.box_builder.unwrap_or_default();
        let ion = |key: &str, value: Option<String>| -> Result<Option<IonSpecies>, EngineError> {
            value
                .map(|v| {
                    v.parse::<IonSpecies>()
                        .map_err(|e| EngineError::Configuration(format!("box_builder.{key}: {e}")))
                })
                .transpose()
        };

        let mut builder = SystemConfigurationBuilder::new().pressure(partial.pressure);
        if let Some(ph) = box_builder.ph {
            builder = builder.ph(ph);
        }
        if let Some(padding) = box_builder.padding {
            builder = builder.padding(padding);
        }
        if let Some(model) = box_builder.water_model {
            builder = builder.water_model(model);
        }
        if let Some(cation) = ion("positive_ion", box_builder.positive_ion)? {
            builder = builder.positive_ion(cation);
        }
        if let Some(anion) = ion("negative_ion", box_builder.negative_ion)? {
            builder = builder.negative_ion(anion);
        }
        if let Some(strength) = box_builder.ionic_strength {
            builder = builder.ionic_strength(strength);
        }
        if let Some(seed) = box_builder.seed {
            builder = builder.preparation_seed(seed);
        }
        if let Some(temp) = partial.temp {
            builder = builder.temperature(temp);
        }
        if let Some(dt) = partial.dt {
            builder = builder.timestep(dt);
        }
        if let Some(friction) = partial.friction {
            builder = builder.friction(friction);
        }
        if let Some(cutoff) = partial.cutoff {
            builder = builder.cutoff(cutoff);
        }
        if let Some(steps) = partial.steps {
            builder = builder.steps(steps);
        }
        if let Some(every) = partial.progress_every {
            builder = builder.progress_every(every);
        }
        if let Some(append) = partial.append {
            builder = builder.append(append);
        }
        if let Some(path) = partial.save_checkpoint {
            builder = builder.checkpoint_path(path);
        }
        if let Some(every) = partial.checkpoint_freq {
            builder = builder.checkpoint_every(every);
        }
        if let Some(path) = partial.save_pdb {
            builder = builder.final_structure_path(path);
        }
        if let Some(platform) = partial.platform {
            builder = builder.platform(platform);
        }
        if let Some(seed) = partial.seed {
            builder = builder.seed(seed);
        }
        if let Some(iterations) = partial.minimize_iterations {
            builder = builder.minimize_iterations(iterations);
        }
        let system = builder.build()?;
        let append = system.run.append;

        let cv = match partial.cv_reporter {
            Some(PartialCvReporterConfig {
                list_of_index: Some(pairs),
                cv_file,
                cv_freq,
            }) => {
                let spec = CvSpec::new(
                    cv_file.unwrap_or_else(|| PathBuf::from("COLVAR.dat")),
                    cv_freq.unwrap_or(500),
                    pairs,
                    append,
                );
                spec.validate(None)?;
                Some(spec)
            }
            _ => None,
        };

        let xtc = partial.xtc_reporter.unwrap_or_default();
        let trajectory = TrajectorySpec::new(
            xtc.xtc_file.unwrap_or_else(|| PathBuf::from("traj.xtc")),
            xtc.xtc_freq.unwrap_or(5000),
            append,
        );
        trajectory.validate()?;

        // A checkpoint is only usable with the structure it was taken from.
        let prepared_pdb = partial.prepared_pdb.or_else(|| {
            system
                .run
                .checkpoint_path
                .as_ref()
                .map(|path| path.with_extension("prepared.pdb"))
        });

        Ok(Self {
            pdb_file,
            system,
            cv,
            trajectory,
            prepared_pdb,
        })
    }

    /// Resolves every relative output path against `dir`. The input structure is untouched.
    pub fn with_output_dir(mut self, dir: &Path) -> Self {
        let rebase = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = dir.join(&*path);
            }
        };
        if let Some(cv) = self.cv.as_mut() {
            rebase(&mut cv.path);
        }
        rebase(&mut self.trajectory.path);
        if let Some(path) = self.system.run.checkpoint_path.as_mut() {
            rebase(path);
        }
        if let Some(path) = self.system.run.final_structure_path.as_mut() {
            rebase(path);
        }
        if let Some(path) = self.prepared_pdb.as_mut() {
            rebase(path);
        }
        self
    }

    /// Every file the job may create.
    pub fn output_paths(&self) -> Vec<&Path> {
        let mut paths = vec![self.trajectory.path.as_path()];
        paths.extend(self.cv.as_ref().map(|cv| cv.path.as_path()));
        paths.extend(self.system.run.checkpoint_path.as_deref());
        paths.extend(self.system.run.final_structure_path.as_deref());
        paths.extend(self.prepared_pdb.as_deref());
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::ConfigError;
    use tempfile::tempdir;

    fn user_document() -> PartialJobConfig {
        PartialJobConfig::from_json_str(
            r#"{
                "pdb_file": "protein.pdb",
                "steps": 1000,
                "temp": 300,
                "cv_reporter": { "list_of_index": [[0, 1], [2, 3]], "cv_freq": 100 },
                "box_builder": { "padding": 12.0 }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn merging_into_an_empty_document_yields_the_defaults() {
        let mut empty = PartialJobConfig::default();
        empty.fill_missing(&PartialJobConfig::defaults());
        assert_eq!(empty, PartialJobConfig::defaults());
    }

    #[test]
    fn merging_twice_changes_nothing() {
        let mut once = user_document();
        once.fill_missing(&PartialJobConfig::defaults());
        let mut twice = once.clone();
        twice.fill_missing(&PartialJobConfig::defaults());
        assert_eq!(once, twice);
    }

    #[test]
    fn nested_groups_are_merged_key_by_key() {
        let mut config = user_document();
        config.fill_missing(&PartialJobConfig::defaults());

        assert_eq!(config.steps, Some(1000));
        assert_eq!(config.dt, Some(0.002));
        let cv = config.cv_reporter.unwrap();
        assert_eq!(cv.cv_freq, Some(100));
        assert_eq!(cv.cv_file, Some(PathBuf::from("COLVAR.dat")));
        let box_builder = config.box_builder.unwrap();
        assert_eq!(box_builder.padding, Some(12.0));
        assert_eq!(box_builder.water_model.as_deref(), Some("tip3p"));
    }

    #[test]
    fn toml_and_json_documents_agree() {
        let toml = PartialJobConfig::from_toml_str(
            r#"
            pdb_file = "protein.pdb"
            steps = 1000
            temp = 300.0

            [cv_reporter]
            list_of_index = [[0, 1], [2, 3]]
            cv_freq = 100

            [box_builder]
            padding = 12.0
            "#,
        )
        .unwrap();
        assert_eq!(toml, user_document());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(PartialJobConfig::from_json_str(r#"{"pdb_file": "a.pdb", "temperature": 300}"#).is_err());
        assert!(
            PartialJobConfig::from_json_str(r#"{"xtc_reporter": {"xtc_every": 10}}"#).is_err()
        );
    }

    #[test]
    fn validated_job_carries_typed_settings() {
        let job = JobConfig::from_partial(user_document()).unwrap();
        assert_eq!(job.pdb_file, PathBuf::from("protein.pdb"));
        assert_eq!(job.system.run.steps, 1000);
        assert_eq!(job.system.run.temperature, 300.0);
        assert_eq!(job.system.preparation.padding, 12.0);
        let cv = job.cv.unwrap();
        assert_eq!(cv.pairs, vec![(0, 1), (2, 3)]);
        assert_eq!(cv.interval, 100);
        assert_eq!(job.trajectory.interval, 5000);
    }

    #[test]
    fn missing_pdb_file_names_the_key() {
        let partial = PartialJobConfig::from_json_str(r#"{"steps": 10}"#).unwrap();
        match JobConfig::from_partial(partial) {
            Err(EngineError::Configuration(message)) => assert!(message.starts_with("pdb_file")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_values_name_their_key() {
        let mut partial = user_document();
        partial.dt = Some(-0.001);
        match JobConfig::from_partial(partial) {
            Err(EngineError::Config(e)) => assert_eq!(e.key(), "dt"),
            other => panic!("unexpected {other:?}"),
        }

        let mut partial = user_document();
        partial.box_builder = Some(PartialBoxBuilderConfig {
            positive_ion: Some("Xx+".to_string()),
            ..Default::default()
        });
        assert!(matches!(
            JobConfig::from_partial(partial),
            Err(EngineError::Configuration(_))
        ));

        let mut partial = user_document();
        partial.cv_reporter = Some(PartialCvReporterConfig::default());
        assert!(matches!(
            JobConfig::from_partial(partial),
            Err(EngineError::Configuration(_))
        ));

        let mut partial = user_document();
        partial.steps = Some(0);
        assert!(matches!(
            JobConfig::from_partial(partial),
            Err(EngineError::Config(ConfigError::InvalidValue { key: "steps", .. }))
        ));
    }

    #[test]
    fn relative_outputs_are_rebased() {
        let dir = tempdir().unwrap();
        let mut partial = user_document();
        partial.save_pdb = Some(PathBuf::from("final.pdb"));
        let job = JobConfig::from_partial(partial)
            .unwrap()
            .with_output_dir(dir.path());

        assert_eq!(job.pdb_file, PathBuf::from("protein.pdb"));
        assert_eq!(job.trajectory.path, dir.path().join("traj.xtc"));
        assert_eq!(job.cv.as_ref().unwrap().path, dir.path().join("COLVAR.dat"));
        assert_eq!(
            job.system.run.final_structure_path,
            Some(dir.path().join("final.pdb"))
        );
        assert_eq!(job.output_paths().len(), 3);
    }

    #[test]
    fn a_checkpoint_brings_the_prepared_structure_along() {
        let mut partial = user_document();
        partial.save_checkpoint = Some(PathBuf::from("run/state.chk"));
        partial.checkpoint_freq = Some(2000);
        let job = JobConfig::from_partial(partial).unwrap();
        assert_eq!(job.system.run.checkpoint_every, 2000);
        assert_eq!(job.prepared_pdb, Some(PathBuf::from("run/state.prepared.pdb")));

        let mut partial = user_document();
        partial.save_checkpoint = Some(PathBuf::from("state.chk"));
        partial.prepared_pdb = Some(PathBuf::from("boxed.pdb"));
        let job = JobConfig::from_partial(partial).unwrap();
        assert_eq!(job.prepared_pdb, Some(PathBuf::from("boxed.pdb")));

        let job = JobConfig::from_partial(user_document()).unwrap();
        assert_eq!(job.system.run.checkpoint_every, 10_000);
        assert_eq!(job.prepared_pdb, None);

        let mut partial = user_document();
        partial.checkpoint_freq = Some(0);
        assert!(matches!(
            JobConfig::from_partial(partial),
            Err(EngineError::Config(ConfigError::InvalidValue { key: "checkpoint_freq", .. }))
        ));
    }

    #[test]
    fn files_are_read_by_extension() {
        let dir = tempdir().unwrap();
        let json = dir.path().join("job.json");
        std::fs::write(&json, r#"{"pdb_file": "x.pdb"}"#).unwrap();
        assert_eq!(
            PartialJobConfig::from_file(&json).unwrap().pdb_file,
            Some(PathBuf::from("x.pdb"))
        );

        let yaml = dir.path().join("job.yaml");
        std::fs::write(&yaml, "pdb_file: x.pdb").unwrap();
        assert!(matches!(
            PartialJobConfig::from_file(&yaml),
            Err(EngineError::Input { .. })
        ));
    }
}
