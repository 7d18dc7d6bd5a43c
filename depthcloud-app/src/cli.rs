//! Command line arguments.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{Backend, PipelineConfig};

/// Depthcloud - stream depth frames into a live point mesh
#[derive(Parser, Debug)]
#[command(name = "depthcloud")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON pipeline configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Render host to drive
    #[arg(short, long, value_enum)]
    pub backend: Option<Backend>,

    /// Number of render ticks (0 = until the camera stops)
    #[arg(short, long)]
    pub ticks: Option<u64>,

    /// Render ticks per second
    #[arg(long)]
    pub tick_hz: Option<f32>,

    /// Copy positions to the mesh without 8-bit quantization
    #[arg(long)]
    pub no_quantize: bool,

    /// Depth stream width
    #[arg(long, requires = "height")]
    pub width: Option<u32>,

    /// Depth stream height
    #[arg(long, requires = "width")]
    pub height: Option<u32>,

    /// Stop the camera after this many frames
    #[arg(long)]
    pub max_frames: Option<u64>,
}

impl Args {
    /// Override file values with the flags that were given.
    pub fn apply_to(&self, config: &mut PipelineConfig) {
        if let Some(backend) = self.backend {
            config.render.backend = backend;
        }
        if let Some(ticks) = self.ticks {
            config.render.ticks = ticks;
        }
        if let Some(tick_hz) = self.tick_hz {
            config.render.tick_hz = tick_hz;
        }
        if self.no_quantize {
            config.render.quantize = false;
        }
        if let (Some(width), Some(height)) = (self.width, self.height) {
            config.camera.width = width;
            config.camera.height = height;
        }
        if let Some(max_frames) = self.max_frames {
            config.camera.max_frames = Some(max_frames);
        }
    }

    pub fn load_config(&self) -> Result<PipelineConfig, crate::error::AppError> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        self.apply_to(&mut config);
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_flags_keep_defaults() {
        let args = Args::try_parse_from(["depthcloud"]).unwrap();
        let config = args.load_config().unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::try_parse_from([
            "depthcloud",
            "--backend",
            "gpu",
            "--ticks",
            "0",
            "--tick-hz",
            "120",
            "--no-quantize",
            "--width",
            "320",
            "--height",
            "240",
            "--max-frames",
            "50",
        ])
        .unwrap();

        let config = args.load_config().unwrap();
        assert_eq!(config.render.backend, Backend::Gpu);
        assert_eq!(config.render.ticks, 0);
        assert_eq!(config.render.tick_hz, 120.0);
        assert!(!config.render.quantize);
        assert_eq!((config.camera.width, config.camera.height), (320, 240));
        assert_eq!(config.camera.max_frames, Some(50));
    }

    #[test]
    fn test_width_requires_height() {
        assert!(Args::try_parse_from(["depthcloud", "--width", "320"]).is_err());
        assert!(Args::try_parse_from(["depthcloud", "--backend", "metal"]).is_err());
    }
}
