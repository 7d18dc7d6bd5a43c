//! Depthcloud
//!
//! Depth camera frames to a live point mesh. The workspace members are
//! re-exported here so demos and integration tests can reach the whole
//! pipeline through one crate. Tests that run a frame from the camera
//! callback all the way to the mesh span every member, so they live in
//! `tests/` here rather than inside any one of them.

pub use depthcloud_capture as capture;
pub use depthcloud_data as data;
pub use depthcloud_gpu as gpu;
pub use depthcloud_ingest as ingest;
