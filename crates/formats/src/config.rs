use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::material::{FlatMaterial, LightRig};

/// Overlay settings. Every field has a default, so `{}` is a valid document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub layer_id: String,
    /// Zoom below which nothing is shown and nothing is loaded.
    pub min_zoom: f64,
    /// Host style layers queried for features carrying a mesh reference.
    pub query_layers: Vec<String>,
    pub properties: PropertyNames,
    /// Upper bound on tracked instances; `None` keeps every feature seen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_instances: Option<usize>,
    pub max_completions_per_frame: usize,
    pub material: FlatMaterial,
    pub lighting: LightRig,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            layer_id: "3d-boulders".to_string(),
            min_zoom: 15.0,
            query_layers: vec!["boulders".to_string(), "cliffs".to_string()],
            properties: PropertyNames::default(),
            max_instances: None,
            max_completions_per_frame: 16,
            material: FlatMaterial::default(),
            lighting: LightRig::default(),
        }
    }
}

/// Feature property names read from the host's query results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyNames {
    pub mesh_url: String,
    pub elevation: String,
    pub feature_id: String,
    pub longitude: String,
    pub latitude: String,
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self {
            mesh_url: "mesh_url".to_string(),
            elevation: "elevation_m".to_string(),
            feature_id: "id".to_string(),
            longitude: "lon".to_string(),
            latitude: "lat".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl OverlayConfig {
    pub fn from_json_str(payload: &str) -> Result<Self, ConfigError> {
        let config: OverlayConfig = serde_json::from_str(payload)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let payload = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&payload)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_zoom.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "min_zoom must be finite, got {}",
                self.min_zoom
            )));
        }
        if self.max_completions_per_frame == 0 {
            return Err(ConfigError::Invalid(
                "max_completions_per_frame must be at least 1".to_string(),
            ));
        }
        if self.max_instances == Some(0) {
            return Err(ConfigError::Invalid(
                "max_instances must be at least 1 when set".to_string(),
            ));
        }
        if self.properties.mesh_url.is_empty() {
            return Err(ConfigError::Invalid(
                "properties.mesh_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
