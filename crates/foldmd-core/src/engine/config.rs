use crate::core::prep::PreparationOptions;
use crate::core::topology::templates::IonSpecies;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

impl ConfigError {
    pub fn key(&self) -> &'static str {
        match self {
            Self::MissingParameter(key) | Self::InvalidValue { key, .. } => key,
        }
    }
}

/// Parameters of one molecular dynamics run. Units: K, atm, ps, 1/ps, Å.
#[derive(Debug, Clone, PartialEq)]
pub struct RunParameters {
    pub temperature: f64,
    /// Target pressure; `None` or zero runs at constant volume.
    pub pressure: Option<f64>,
    pub timestep: f64,
    pub friction: f64,
    pub cutoff: f64,
    pub steps: u64,
    pub progress_every: u64,
    pub append: bool,
    pub checkpoint_path: Option<PathBuf>,
    /// Steps between checkpoints written during a run to `checkpoint_path`.
    pub checkpoint_every: u64,
    pub final_structure_path: Option<PathBuf>,
    /// Platform name; `None` picks the fastest available.
    pub platform: Option<String>,
    /// Seed for velocities and the thermostat; `None` draws one at random.
    pub seed: Option<u64>,
    pub minimize_iterations: usize,
    /// Largest force component (kcal/mol/Å) at which minimization stops early.
    pub minimize_tolerance: f64,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            temperature: 310.0,
            pressure: Some(1.0),
            timestep: 0.002,
            friction: 1.0,
            cutoff: 10.0,
            steps: 50_000_000,
            progress_every: 1000,
            append: false,
            checkpoint_path: None,
            checkpoint_every: 10_000,
            final_structure_path: None,
            platform: None,
            seed: None,
            minimize_iterations: 1000,
            minimize_tolerance: 0.239,
        }
    }
}

impl RunParameters {
    /// Pressure in atm when the barostat should run.
    pub fn barostat_pressure(&self) -> Option<f64> {
        self.pressure.filter(|&p| p > 0.0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("temp", self.temperature)?;
        positive("dt", self.timestep)?;
        positive("cutoff", self.cutoff)?;
        if !(self.friction.is_finite() && self.friction >= 0.0) {
            return Err(invalid("friction", "must be a non-negative number"));
        }
        if let Some(p) = self.pressure {
            if !(p.is_finite() && p >= 0.0) {
                return Err(invalid("pressure", "must be a non-negative number"));
            }
        }
        if self.steps == 0 {
            return Err(invalid("steps", "must be strictly positive"));
        }
        if self.progress_every == 0 {
            return Err(invalid("progress_every", "must be strictly positive"));
        }
        if self.checkpoint_every == 0 {
            return Err(invalid("checkpoint_freq", "must be strictly positive"));
        }
        if !(self.minimize_tolerance.is_finite() && self.minimize_tolerance > 0.0) {
            return Err(invalid("minimize_tolerance", "must be strictly positive"));
        }
        Ok(())
    }
}

fn invalid(key: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        reason: reason.to_string(),
    }
}

fn positive(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(key, "must be strictly positive"))
    }
}

/// Everything needed to go from a structure file to a finished run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SystemConfiguration {
    pub preparation: PreparationOptions,
    pub run: RunParameters,
}

#[derive(Default)]
pub struct SystemConfigurationBuilder {
    ph: Option<f64>,
    padding: Option<f64>,
    water_model: Option<String>,
    positive_ion: Option<IonSpecies>,
    negative_ion: Option<IonSpecies>,
    ionic_strength: Option<f64>,
    preparation_seed: Option<u64>,
    temperature: Option<f64>,
    pressure: Option<Option<f64>>,
    timestep: Option<f64>,
    friction: Option<f64>,
    cutoff: Option<f64>,
    steps: Option<u64>,
    progress_every: Option<u64>,
    append: Option<bool>,
    checkpoint_path: Option<PathBuf>,
    checkpoint_every: Option<u64>,
    final_structure_path: Option<PathBuf>,
    platform: Option<String>,
    seed: Option<u64>,
    minimize_iterations: Option<usize>,
}

impl SystemConfigurationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ph(mut self, ph: f64) -> Self {
        self.ph = Some(ph);
        self
    }
    pub fn padding(mut self, padding: f64) -> Self {
        self.padding = Some(padding);
        self
    }
    pub fn water_model(mut self, model: impl Into<String>) -> Self {
        self.water_model = Some(model.into());
        self
    }
    pub fn positive_ion(mut self, ion: IonSpecies) -> Self {
        self.positive_ion = Some(ion);
        self
    }
    pub fn negative_ion(mut self, ion: IonSpecies) -> Self {
        self.negative_ion = Some(ion);
        self
    }
    pub fn ionic_strength(mut self, molar: f64) -> Self {
        self.ionic_strength = Some(molar);
        self
    }
    pub fn preparation_seed(mut self, seed: u64) -> Self {
        self.preparation_seed = Some(seed);
        self
    }
    pub fn temperature(mut self, kelvin: f64) -> Self {
        self.temperature = Some(kelvin);
        self
    }
    pub fn pressure(mut self, atm: Option<f64>) -> Self {
        self.pressure = Some(atm);
        self
    }
    pub fn timestep(mut self, ps: f64) -> Self {
        self.timestep = Some(ps);
        self
    }
    pub fn friction(mut self, per_ps: f64) -> Self {
        self.friction = Some(per_ps);
        self
    }
    pub fn cutoff(mut self, angstrom: f64) -> Self {
        self.cutoff = Some(angstrom);
        self
    }
    pub fn steps(mut self, steps: u64) -> Self {
        self.steps = Some(steps);
        self
    }
    pub fn progress_every(mut self, steps: u64) -> Self {
        self.progress_every = Some(steps);
        self
    }
    pub fn append(mut self, append: bool) -> Self {
        self.append = Some(append);
        self
    }
    pub fn checkpoint_path(mut self, path: PathBuf) -> Self {
        self.checkpoint_path = Some(path);
        self
    }
    pub fn checkpoint_every(mut self, steps: u64) -> Self {
        self.checkpoint_every = Some(steps);
        self
    }
    pub fn final_structure_path(mut self, path: PathBuf) -> Self {
        self.final_structure_path = Some(path);
        self
    }
    pub fn platform(mut self, name: impl Into<String>) -> Self {
        self.platform = Some(name.into());
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn minimize_iterations(mut self, iterations: usize) -> Self {
        self.minimize_iterations = Some(iterations);
        self
    }

    pub fn build(self) -> Result<SystemConfiguration, ConfigError> {
        let prep_defaults = PreparationOptions::default();
        let preparation = PreparationOptions {
            ph: self.ph.unwrap_or(prep_defaults.ph),
            padding: self.padding.unwrap_or(prep_defaults.padding),
            water_model: self.water_model.unwrap_or(prep_defaults.water_model),
            positive_ion: self.positive_ion.unwrap_or(prep_defaults.positive_ion),
            negative_ion: self.negative_ion.unwrap_or(prep_defaults.negative_ion),
            ionic_strength: self.ionic_strength.unwrap_or(prep_defaults.ionic_strength),
            seed: self.preparation_seed.unwrap_or(prep_defaults.seed),
        };
        preparation.validate().map_err(|e| match e {
            crate::core::prep::PrepError::InvalidOption { key, reason } => {
                ConfigError::InvalidValue { key, reason }
            }
            other => ConfigError::InvalidValue {
                key: "box_builder",
                reason: other.to_string(),
            },
        })?;

        let run_defaults = RunParameters::default();
        let run = RunParameters {
            temperature: self.temperature.unwrap_or(run_defaults.temperature),
            pressure: self.pressure.unwrap_or(run_defaults.pressure),
            timestep: self.timestep.unwrap_or(run_defaults.timestep),
            friction: self.friction.unwrap_or(run_defaults.friction),
            cutoff: self.cutoff.unwrap_or(run_defaults.cutoff),
            steps: self.steps.unwrap_or(run_defaults.steps),
            progress_every: self.progress_every.unwrap_or(run_defaults.progress_every),
            append: self.append.unwrap_or(run_defaults.append),
            checkpoint_path: self.checkpoint_path,
            checkpoint_every: self.checkpoint_every.unwrap_or(run_defaults.checkpoint_every),
            final_structure_path: self.final_structure_path,
            platform: self.platform,
            seed: self.seed,
            minimize_iterations: self
                .minimize_iterations
                .unwrap_or(run_defaults.minimize_iterations),
            minimize_tolerance: run_defaults.minimize_tolerance,
        };
        run.validate()?;

        Ok(SystemConfiguration { preparation, run })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_defaults() {
        let config = SystemConfigurationBuilder::new().build().unwrap();
        assert_eq!(config, SystemConfiguration::default());
        assert_eq!(config.run.temperature, 310.0);
        assert_eq!(config.run.barostat_pressure(), Some(1.0));
        assert_eq!(config.preparation.padding, 10.0);
    }

    #[test]
    fn zero_pressure_disables_the_barostat() {
        let config = SystemConfigurationBuilder::new()
            .pressure(Some(0.0))
            .build()
            .unwrap();
        assert_eq!(config.run.barostat_pressure(), None);
        let config = SystemConfigurationBuilder::new().pressure(None).build().unwrap();
        assert_eq!(config.run.barostat_pressure(), None);
    }

    #[test]
    fn build_rejects_non_positive_values_by_key() {
        let cases: Vec<(SystemConfigurationBuilder, &str)> = vec![
            (SystemConfigurationBuilder::new().steps(0), "steps"),
            (SystemConfigurationBuilder::new().progress_every(0), "progress_every"),
            (SystemConfigurationBuilder::new().checkpoint_every(0), "checkpoint_freq"),
            (SystemConfigurationBuilder::new().timestep(0.0), "dt"),
            (SystemConfigurationBuilder::new().cutoff(-1.0), "cutoff"),
            (SystemConfigurationBuilder::new().temperature(0.0), "temp"),
            (SystemConfigurationBuilder::new().padding(0.0), "padding"),
            (SystemConfigurationBuilder::new().ph(-2.0), "ph"),
            (SystemConfigurationBuilder::new().ionic_strength(-1.0), "ionic_strength"),
            (SystemConfigurationBuilder::new().pressure(Some(-1.0)), "pressure"),
        ];
        for (builder, key) in cases {
            let err = builder.build().unwrap_err();
            assert_eq!(err.key(), key);
        }
    }
}
