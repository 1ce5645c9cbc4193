use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

const GENERIC_FORCEFIELD: &str = include_str!("../../../data/forcefield/generic.toml");

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct GlobalParams {
    pub name: String,
    #[serde(default = "default_lj_14_scale")]
    pub lj_14_scale: f64,
    #[serde(default = "default_coulomb_14_scale")]
    pub coulomb_14_scale: f64,
    #[serde(default = "default_reaction_field_dielectric")]
    pub reaction_field_dielectric: f64,
}

fn default_lj_14_scale() -> f64 {
    0.5
}

fn default_coulomb_14_scale() -> f64 {
    1.0 / 1.2
}

fn default_reaction_field_dielectric() -> f64 {
    78.5
}

/// Mass and Lennard-Jones parameters of an element.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AtomTypeParam {
    pub mass: f64,
    pub sigma: f64,
    pub epsilon: f64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LjParam {
    pub sigma: f64,
    pub epsilon: f64,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ResidueParam {
    /// Partial charges by atom name; atoms not listed are neutral.
    #[serde(default)]
    pub charges: HashMap<String, f64>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct WaterModelParam {
    pub residue_name: String,
    /// Partial charges by element.
    pub charges: HashMap<String, f64>,
    /// Lennard-Jones overrides by element.
    #[serde(default)]
    pub lj: HashMap<String, LjParam>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct IonParam {
    pub charge: f64,
    pub sigma: Option<f64>,
    pub epsilon: Option<f64>,
}

/// Harmonic bond `E = k (r - length)^2`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BondParam {
    pub length: f64,
    pub k: f64,
}

/// Harmonic angle `E = k (theta - angle)^2`, angle in degrees.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AngleParam {
    pub angle: f64,
    pub k: f64,
}

/// A parsed forcefield parameter set.
///
/// Parameters are keyed by element symbol; bonded terms use `"A-B"` and `"A-B-C"`
/// keys and are looked up in both directions.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Forcefield {
    pub globals: GlobalParams,
    pub atom_types: HashMap<String, AtomTypeParam>,
    #[serde(default)]
    pub residues: HashMap<String, ResidueParam>,
    #[serde(default)]
    pub water_models: HashMap<String, WaterModelParam>,
    #[serde(default)]
    pub ions: HashMap<String, IonParam>,
    #[serde(default)]
    pub bonds: HashMap<String, BondParam>,
    #[serde(default)]
    pub angles: HashMap<String, AngleParam>,
}

#[derive(Debug, Error)]
pub enum ParamLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
}

impl Forcefield {
    pub fn load(path: &Path) -> Result<Self, ParamLoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| ParamLoadError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        Self::parse(&content, &path.to_string_lossy())
    }

    /// The generic parameter set shipped with the library.
    pub fn generic() -> Result<Self, ParamLoadError> {
        Self::parse(GENERIC_FORCEFIELD, "<bundled generic.toml>")
    }

    fn parse(content: &str, origin: &str) -> Result<Self, ParamLoadError> {
        toml::from_str(content).map_err(|e| ParamLoadError::Toml {
            path: origin.to_string(),
            source: e,
        })
    }

    pub fn atom_type(&self, element: &str) -> Option<&AtomTypeParam> {
        self.atom_types.get(element)
    }

    pub fn bond(&self, e1: &str, e2: &str) -> Option<&BondParam> {
        self.bonds
            .get(&format!("{}-{}", e1, e2))
            .or_else(|| self.bonds.get(&format!("{}-{}", e2, e1)))
    }

    pub fn angle(&self, e1: &str, center: &str, e3: &str) -> Option<&AngleParam> {
        self.angles
            .get(&format!("{}-{}-{}", e1, center, e3))
            .or_else(|| self.angles.get(&format!("{}-{}-{}", e3, center, e1)))
    }

    pub fn water_model(&self, name: &str) -> Option<&WaterModelParam> {
        self.water_models.get(&name.to_ascii_lowercase())
    }

    pub fn ion(&self, element: &str) -> Option<&IonParam> {
        self.ions.get(element)
    }

    pub fn has_residue(&self, name: &str) -> bool {
        self.residues.contains_key(name)
    }
}
