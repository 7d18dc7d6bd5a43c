//! Depthcloud Capture Crate
//!
//! Push-style depth camera sources. A [`FrameProvider`] owns a delivery
//! thread and calls a [`FrameSink`] for every frame it produces.

pub mod source;
pub mod synthetic;

pub use source::{CaptureError, FrameProvider, FrameSink};
pub use synthetic::{SyntheticCamera, SyntheticConfig, render_depth, synthesize_frame};
