use super::error::EngineError;
use super::forces::{ForceEvaluation, ForceModel, GatherMode};
use crate::core::models::periodic::PeriodicBox;
use nalgebra::Point3;
use std::sync::Arc;
use tracing::debug;

/// Evaluates forces for one configured system.
pub trait ForceKernel: Send + Sync {
    fn model(&self) -> &ForceModel;

    fn compute(&self, positions: &[Point3<f64>], cell: Option<&PeriodicBox>) -> ForceEvaluation;
}

/// A compute backend able to host simulation contexts.
///
/// Accelerated backends implement this trait and are added to a [`PlatformRegistry`]
/// next to the built-in ones.
pub trait Platform: Send + Sync {
    fn name(&self) -> &str;

    /// Relative speed used to pick a default platform; higher is faster.
    fn speed(&self) -> f64;

    fn is_available(&self) -> bool {
        true
    }

    fn create_kernel(&self, model: ForceModel) -> Result<Box<dyn ForceKernel>, EngineError>;
}

struct GatherKernel {
    model: ForceModel,
    mode: GatherMode,
}

impl ForceKernel for GatherKernel {
    fn model(&self) -> &ForceModel {
        &self.model
    }

    fn compute(&self, positions: &[Point3<f64>], cell: Option<&PeriodicBox>) -> ForceEvaluation {
        self.model.evaluate(positions, cell, self.mode)
    }
}

/// Serial force evaluation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferencePlatform;

impl Platform for ReferencePlatform {
    fn name(&self) -> &str {
        "Reference"
    }

    fn speed(&self) -> f64 {
        1.0
    }

    fn create_kernel(&self, model: ForceModel) -> Result<Box<dyn ForceKernel>, EngineError> {
        Ok(Box::new(GatherKernel {
            model,
            mode: GatherMode::Serial,
        }))
    }
}

/// Multi-threaded force evaluation on the rayon pool; results are identical to
/// [`ReferencePlatform`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuPlatform;

impl Platform for CpuPlatform {
    fn name(&self) -> &str {
        "CPU"
    }

    fn speed(&self) -> f64 {
        10.0
    }

    fn create_kernel(&self, model: ForceModel) -> Result<Box<dyn ForceKernel>, EngineError> {
        #[cfg(feature = "parallel")]
        debug!(threads = rayon::current_num_threads(), "Creating CPU force kernel.");
        Ok(Box::new(GatherKernel {
            model,
            mode: GatherMode::Parallel,
        }))
    }
}

/// Ordered set of known platforms.
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    platforms: Vec<Arc<dyn Platform>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in Reference and CPU platforms.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ReferencePlatform));
        registry.register(Arc::new(CpuPlatform));
        registry
    }

    pub fn register(&mut self, platform: Arc<dyn Platform>) {
        self.platforms.push(platform);
    }

    pub fn names(&self) -> Vec<String> {
        self.platforms.iter().map(|p| p.name().to_string()).collect()
    }

    /// Returns the named platform, or the fastest available one without a preference.
    pub fn select(&self, preference: Option<&str>) -> Result<Arc<dyn Platform>, EngineError> {
        match preference {
            Some(name) => {
                let platform = self
                    .platforms
                    .iter()
                    .find(|p| p.name().eq_ignore_ascii_case(name))
                    .ok_or_else(|| {
                        EngineError::Configuration(format!(
                            "unknown platform '{}' (known: {})",
                            name,
                            self.names().join(", ")
                        ))
                    })?;
                if platform.is_available() {
                    Ok(platform.clone())
                } else {
                    Err(EngineError::BackendUnavailable {
                        tried: vec![platform.name().to_string()],
                    })
                }
            }
            None => self
                .platforms
                .iter()
                .filter(|p| p.is_available())
                .fold(None::<&Arc<dyn Platform>>, |best, p| match best {
                    Some(b) if b.speed() >= p.speed() => Some(b),
                    _ => Some(p),
                })
                .cloned()
                .ok_or_else(|| EngineError::BackendUnavailable {
                    tried: self.names(),
                }),
        }
    }
}
