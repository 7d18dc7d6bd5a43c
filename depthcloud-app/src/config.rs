//! Pipeline configuration loaded from JSON.

use std::path::Path;
use std::time::Duration;

use clap::ValueEnum;
use depthcloud_capture::SyntheticConfig;
use depthcloud_data::{Bounds, QuantizationConfig};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Where the point mesh lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// CPU buffers only.
    Memory,
    /// wgpu buffers and textures on a headless device.
    Gpu,
}

/// Fixed bounds given to the point mesh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub center: [f32; 3],
    pub size: [f32; 3],
}

impl Default for MeshConfig {
    fn default() -> Self {
        let bounds = Bounds::generous();
        Self {
            center: bounds.center.to_array(),
            size: bounds.size.to_array(),
        }
    }
}

impl MeshConfig {
    pub fn bounds(&self) -> Bounds {
        Bounds::new(Vec3::from_array(self.center), Vec3::from_array(self.size))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub backend: Backend,
    /// Render ticks to run. 0 runs until the camera stops on its own.
    pub ticks: u64,
    pub tick_hz: f32,
    /// Send positions through the 8-bit position texture.
    pub quantize: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            ticks: 300,
            tick_hz: 60.0,
            quantize: true,
        }
    }
}

impl RenderConfig {
    /// Time between render ticks.
    pub fn tick_interval(&self) -> Result<Duration, AppError> {
        if !(self.tick_hz.is_finite() && self.tick_hz > 0.0) {
            return Err(AppError::InvalidConfig(format!(
                "tick rate {} must be positive",
                self.tick_hz
            )));
        }
        Duration::try_from_secs_f32(1.0 / self.tick_hz).map_err(|e| {
            AppError::InvalidConfig(format!("tick rate {} is out of range: {}", self.tick_hz, e))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub camera: SyntheticConfig,
    pub codec: QuantizationConfig,
    pub mesh: MeshConfig,
    pub render: RenderConfig,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path).map_err(|source| AppError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.render.tick_interval()?;
        if self.render.ticks == 0 && self.camera.max_frames.is_none() {
            return Err(AppError::InvalidConfig(
                "running until the camera stops needs a camera frame budget".into(),
            ));
        }
        if self.mesh.size.iter().any(|s| !(*s > 0.0)) {
            return Err(AppError::InvalidConfig(format!(
                "mesh bounds size {:?} must be positive",
                self.mesh.size
            )));
        }
        Ok(())
    }
}
