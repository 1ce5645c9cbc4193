use crate::error::{CliError, Result};
use foldmd::workflows::config::PartialJobConfig;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Reads a job document and applies `-S KEY=VALUE` overrides on top of it.
///
/// Defaults are not merged here; that happens once, at validation in the library.
pub fn load_job_config(path: &Path, set_values: &[String]) -> Result<PartialJobConfig> {
    debug!("Loading job configuration from file: {:?}", path);
    let mut config = PartialJobConfig::from_file(path)?;
    apply_set_values(&mut config, set_values)?;
    Ok(config)
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        CliError::Config(format!(
            "Invalid value for {}: '{}' ({} expected)",
            key,
            value,
            std::any::type_name::<T>()
        ))
    })
}

pub fn apply_set_values(config: &mut PartialJobConfig, set_values: &[String]) -> Result<()> {
    for kv_pair in set_values {
        let Some((key, value)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };
        let key = key.trim();
        debug!("Applying override {} = {}", key, value);

        match key {
            "pdb_file" => config.pdb_file = Some(PathBuf::from(value)),
            "temp" => config.temp = Some(parse(key, value)?),
            "pressure" => config.pressure = Some(parse(key, value)?),
            "dt" => config.dt = Some(parse(key, value)?),
            "cutoff" => config.cutoff = Some(parse(key, value)?),
            "steps" => config.steps = Some(parse(key, value)?),
            "append" => config.append = Some(parse(key, value)?),
            "progress_every" => config.progress_every = Some(parse(key, value)?),
            "save_checkpoint" => config.save_checkpoint = Some(PathBuf::from(value)),
            "checkpoint_freq" => config.checkpoint_freq = Some(parse(key, value)?),
            "save_pdb" => config.save_pdb = Some(PathBuf::from(value)),
            "friction" => config.friction = Some(parse(key, value)?),
            "seed" => config.seed = Some(parse(key, value)?),
            "platform" => config.platform = Some(value.to_string()),
            "minimize_iterations" => config.minimize_iterations = Some(parse(key, value)?),
            "prepared_pdb" => config.prepared_pdb = Some(PathBuf::from(value)),
            "cv_reporter.list_of_index" => {
                let pairs: Vec<(usize, usize)> =
                    serde_json::from_str(value).map_err(|e| {
                        CliError::Config(format!(
                            "Invalid value for {}: '{}' (expected e.g. [[0,1],[2,3]]): {}",
                            key, value, e
                        ))
                    })?;
                config
                    .cv_reporter
                    .get_or_insert_with(Default::default)
                    .list_of_index = Some(pairs);
            }
            "cv_reporter.cv_file" => {
                config.cv_reporter.get_or_insert_with(Default::default).cv_file =
                    Some(PathBuf::from(value));
            }
            "cv_reporter.cv_freq" => {
                config.cv_reporter.get_or_insert_with(Default::default).cv_freq =
                    Some(parse(key, value)?);
            }
            "xtc_reporter.xtc_file" => {
                config.xtc_reporter.get_or_insert_with(Default::default).xtc_file =
                    Some(PathBuf::from(value));
            }
            "xtc_reporter.xtc_freq" => {
                config.xtc_reporter.get_or_insert_with(Default::default).xtc_freq =
                    Some(parse(key, value)?);
            }
            "box_builder.ph" => {
                config.box_builder.get_or_insert_with(Default::default).ph =
                    Some(parse(key, value)?);
            }
            "box_builder.padding" => {
                config.box_builder.get_or_insert_with(Default::default).padding =
                    Some(parse(key, value)?);
            }
            "box_builder.water_model" => {
                config.box_builder.get_or_insert_with(Default::default).water_model =
                    Some(value.to_string());
            }
            "box_builder.positive_ion" => {
                config.box_builder.get_or_insert_with(Default::default).positive_ion =
                    Some(value.to_string());
            }
            "box_builder.negative_ion" => {
                config.box_builder.get_or_insert_with(Default::default).negative_ion =
                    Some(value.to_string());
            }
            "box_builder.ionic_strength" => {
                config.box_builder.get_or_insert_with(Default::default).ionic_strength =
                    Some(parse(key, value)?);
            }
            "box_builder.seed" => {
                config.box_builder.get_or_insert_with(Default::default).seed =
                    Some(parse(key, value)?);
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use foldmd::workflows::config::JobConfig;
    use once_cell::sync::Lazy;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    static TEST_DIR: Lazy<TempDir> = Lazy::new(|| tempdir().expect("Failed to create temp dir"));

    fn write_config_file(name: &str, content: &str) -> PathBuf {
        let file_path = TEST_DIR.path().join(name);
        fs::write(&file_path, content).unwrap();
        file_path
    }

    #[test]
    fn file_values_survive_without_overrides() {
        let path = write_config_file(
            "plain.toml",
            r#"
            pdb_file = "protein.pdb"
            steps = 2000

            [xtc_reporter]
            xtc_freq = 100
            "#,
        );
        let config = load_job_config(&path, &[]).unwrap();
        assert_eq!(config.steps, Some(2000));
        assert_eq!(config.xtc_reporter.unwrap().xtc_freq, Some(100));
        assert_eq!(config.temp, None);
    }

    #[test]
    fn set_values_override_file_values_and_nested_groups() {
        let path = write_config_file(
            "override.json",
            r#"{"pdb_file": "protein.pdb", "steps": 2000, "cv_reporter": {"cv_freq": 10}}"#,
        );
        let cli = Cli::parse_from([
            "foldmd",
            "run",
            "-c",
            path.to_str().unwrap(),
            "-S",
            "steps=500",
            "-S",
            "cv_reporter.list_of_index=[[0,1],[2,3]]",
            "-S",
            "box_builder.padding=12.5",
            "-S",
            "checkpoint_freq=250",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("Expected 'run' subcommand");
        };

        let config = load_job_config(&args.config, &args.set_values).unwrap();
        assert_eq!(config.steps, Some(500));
        let cv = config.cv_reporter.clone().unwrap();
        assert_eq!(cv.cv_freq, Some(10));
        assert_eq!(cv.list_of_index, Some(vec![(0, 1), (2, 3)]));
        assert_eq!(config.box_builder.clone().unwrap().padding, Some(12.5));

        let job = JobConfig::from_partial(config).unwrap();
        assert_eq!(job.system.run.steps, 500);
        assert_eq!(job.system.run.checkpoint_every, 250);
        assert_eq!(job.system.preparation.padding, 12.5);
        assert_eq!(job.cv.unwrap().interval, 10);
    }

    #[test]
    fn malformed_overrides_are_rejected() {
        let mut config = PartialJobConfig::default();
        for bad in ["steps", "steps=many", "unknown.key=1", "cv_reporter.list_of_index=0-1"] {
            assert!(
                matches!(
                    apply_set_values(&mut config, &[bad.to_string()]),
                    Err(CliError::Config(_))
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn unknown_file_keys_are_reported_with_the_path() {
        let path = write_config_file("unknown.toml", "pdb_file = \"a.pdb\"\nsteps_total = 5\n");
        let err = load_job_config(&path, &[]).unwrap_err();
        assert!(err.to_string().contains("unknown.toml"));
    }
}
