use crate::ModelError;
use crate::backend::{Backend, set_backend};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Settings shared by every masked scalar metric
///
/// # Fields
///
/// - `mask_id` - Target id treated as padding and given weight 0; `None` disables masking
/// - `has_weights` - Whether the metric takes a third input with per-position weights
/// - `backend` - Backend to activate when the configuration is applied; `None` leaves it unchanged
///
/// # Example
/// ```rust
/// use maskmetric::config::MetricConfig;
///
/// let config = MetricConfig::from_json_str(r#"{ "mask_id": 0.0, "has_weights": true }"#).unwrap();
/// assert_eq!(config.mask_id, Some(0.0));
/// assert!(config.has_weights);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricConfig {
    pub mask_id: Option<f32>,
    pub has_weights: bool,
    pub backend: Option<Backend>,
}

impl MetricConfig {
    /// Creates a configuration with the given mask id and weighting
    pub fn new(mask_id: Option<f32>, has_weights: bool) -> Self {
        Self {
            mask_id,
            has_weights,
            backend: None,
        }
    }

    /// Sets the backend to activate on `apply`
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Parses a configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
        serde_json::from_str(json).map_err(|e| ModelError::ConfigError(e.to_string()))
    }

    /// Reads a configuration from a JSON file
    ///
    /// # Returns
    ///
    /// - `Ok(MetricConfig)` - The parsed configuration
    /// - `Err(ModelError::ConfigError)` - If the file cannot be opened or parsed
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            ModelError::ConfigError(format!("cannot open {}: {}", path.display(), e))
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            ModelError::ConfigError(format!("cannot parse {}: {}", path.display(), e))
        })
    }

    /// Serializes the configuration as pretty-printed JSON
    pub fn to_json_string(&self) -> Result<String, ModelError> {
        serde_json::to_string_pretty(self).map_err(|e| ModelError::ConfigError(e.to_string()))
    }

    /// Activates the configured backend, if any
    pub fn apply(&self) {
        if let Some(backend) = self.backend {
            set_backend(backend);
        }
    }
}
