//! Per-frame render configuration and the scene manifest.

use std::path::{Path, PathBuf};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How a model's stream reaches the device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderPath {
    /// Plain baseline draws; no token stream involved.
    Immediate,
    /// Software interpretation of the recorded tokens.
    Emulation,
    /// One call of a compiled hardware command list.
    CompiledList,
    /// Address-indirect submission of the batch arrays.
    #[default]
    AddressIndirect,
}

impl RenderPath {
    pub fn uses_tokens(self) -> bool {
        !matches!(self, Self::Immediate)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingStrategy {
    /// Scene order.
    #[default]
    Unsorted,
    /// One pass per primitive family: lines, triangles, fans, quads, points.
    SortedByTopology,
}

/// Snapshot of the knobs the scene reads once per frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub path: RenderPath,
    pub grouping: GroupingStrategy,
    /// Submit only the first N batches on the address-indirect path. `None` or zero means all.
    pub max_batches: Option<u32>,
    pub supersampling: f32,
    /// Vertex bytes (in MiB) packed into one buffer before a new one is started.
    pub max_buffer_mb: u64,
    pub draw_grid: bool,
    pub draw_objects: bool,
    pub search_paths: Vec<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            path: RenderPath::default(),
            grouping: GroupingStrategy::default(),
            max_batches: None,
            supersampling: 1.0,
            max_buffer_mb: 200_000,
            draw_grid: true,
            draw_objects: true,
            search_paths: Vec::new(),
        }
    }
}

impl RenderConfig {
    pub fn parse_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::parse_str(&read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.supersampling.is_nan() || self.supersampling <= 0.0 {
            return Err(ConfigError::Supersampling(self.supersampling));
        }
        Ok(())
    }

    /// Batch cap for address-indirect submission, if any.
    pub fn batch_cap(&self) -> Option<usize> {
        self.max_batches.filter(|&n| n > 0).map(|n| n as usize)
    }

    pub fn max_vertex_bytes(&self) -> u64 {
        self.max_buffer_mb.saturating_mul(1024 * 1024)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneManifest {
    pub models: Vec<ModelEntry>,
    #[serde(default)]
    pub camera: Vec<CameraKeyframe>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    #[serde(default)]
    pub position: Vec3,
    /// Zero or negative requests an automatic fit to the unit cube.
    #[serde(default)]
    pub scale: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraKeyframe {
    pub eye: Vec3,
    pub focus: Vec3,
    /// Seconds to hold this keyframe.
    #[serde(default)]
    pub sleep: f32,
}

impl SceneManifest {
    pub fn parse_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::parse_str(&read_to_string(path)?)
    }
}

fn read_to_string(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = RenderConfig::parse_str("{}").unwrap();
        assert_eq!(config, RenderConfig::default());
        assert_eq!(config.path, RenderPath::AddressIndirect);
        assert_eq!(config.batch_cap(), None);
    }

    #[test]
    fn zero_batch_cap_means_unlimited() {
        let config = RenderConfig::parse_str(r#"{ "max_batches": 0 }"#).unwrap();
        assert_eq!(config.batch_cap(), None);
        let config = RenderConfig::parse_str(r#"{ "max_batches": 3 }"#).unwrap();
        assert_eq!(config.batch_cap(), Some(3));
    }

    #[test]
    fn rejects_non_positive_supersampling() {
        assert!(matches!(
            RenderConfig::parse_str(r#"{ "supersampling": 0.0 }"#),
            Err(ConfigError::Supersampling(_))
        ));
    }

    #[test]
    fn manifest_parses_models_and_camera() {
        let manifest = SceneManifest::parse_str(
            r#"{
                "models": [
                    { "name": "city.json", "position": [1.0, 0.0, 0.0], "scale": 0.5 },
                    { "name": "car.json" }
                ],
                "camera": [{ "eye": [0.0, 1.0, 2.0], "focus": [0.0, 0.0, 0.0], "sleep": 1.5 }]
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.models.len(), 2);
        assert_eq!(manifest.models[1].scale, 0.0);
        assert_eq!(manifest.camera[0].sleep, 1.5);
    }
}
