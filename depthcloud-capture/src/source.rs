//! Common capture source types and traits.

use std::sync::Arc;

use depthcloud_data::{Frame, StreamProfile};
use thiserror::Error;

/// Errors that can occur during capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Capture already started")]
    AlreadyStarted,

    #[error("Invalid capture configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Receiver of frames pushed by a [`FrameProvider`].
///
/// Callbacks run on the provider's delivery thread. Frames are only
/// borrowed for the duration of the call; anything kept past it must be
/// copied or cloned. Implementations must not let errors escape into the
/// provider: there is no return channel.
pub trait FrameSink: Send + Sync {
    /// Called once when streaming begins, before any frame is delivered.
    fn on_start(&self, profile: &StreamProfile);

    /// Called for every frame (usually a composite frame set).
    fn on_new_sample(&self, frame: &Frame);
}

/// A camera that pushes frames to a [`FrameSink`] after being started.
pub trait FrameProvider {
    /// Start streaming into `sink`. Returns the active depth profile.
    fn start(&mut self, sink: Arc<dyn FrameSink>) -> Result<StreamProfile, CaptureError>;

    /// Stop streaming. Blocks until the delivery thread has exited.
    fn stop(&mut self);

    /// Check if the provider is still delivering frames.
    fn is_active(&self) -> bool;

    /// Depth profile negotiated by the last successful `start`.
    fn active_profile(&self) -> Option<StreamProfile>;
}
