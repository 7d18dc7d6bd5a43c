use std::path::PathBuf;

use depthcloud_capture::CaptureError;
use depthcloud_data::CodecError;
use depthcloud_gpu::{RendererError, SyncError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Mesh sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Renderer error: {0}")]
    Renderer(#[from] RendererError),
}
