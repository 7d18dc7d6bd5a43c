//! Depthcloud Ingest Crate
//!
//! Turns camera samples into point frames:
//!
//! - [`FrameFilter`] picks the primary Z16 depth frame (or a ready-made
//!   point frame) out of each sample
//! - [`PointCloudGenerator`] back-projects depth into camera-space points
//! - [`FrameQueue`] passes the newest point frame to the render loop
//! - [`DepthToPointCloud`] ties them together as a camera [`FrameSink`]
//!
//! [`FrameSink`]: depthcloud_capture::FrameSink

pub mod filter;
pub mod intake;
pub mod point_cloud;
pub mod queue;

pub use filter::{FrameFilter, is_depth_frame, is_depth_profile};
pub use intake::{DepthToPointCloud, IntakeStats};
pub use point_cloud::{IngestError, PointCloudGenerator, TextureMapping};
pub use queue::FrameQueue;
