//! Stream synthetic depth frames into an in-memory point mesh
//!
//! Starts the software camera, switches its resolution halfway through to
//! show the mesh resize path, and prints what reached the mesh.
//!
//! Usage:
//!   cargo run --example stream_to_mesh -- [frames]

use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use depthcloud::capture::{FrameProvider, SyntheticCamera, SyntheticConfig};
use depthcloud::data::{Bounds, QuantizationCodec};
use depthcloud::gpu::{MemoryHost, MeshResource, MeshSync, TextureResource};
use depthcloud::ingest::{DepthToPointCloud, FrameQueue};
use tracing::info;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let frames: u64 = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 60,
    };

    let mut camera = SyntheticCamera::new(SyntheticConfig {
        width: 320,
        height: 240,
        max_frames: Some(frames),
        ..Default::default()
    })?;

    let queue = Arc::new(FrameQueue::new());
    let intake = Arc::new(
        DepthToPointCloud::new(Arc::clone(&queue))
            .with_texture_mapping(camera.color_intrinsics(), camera.depth_to_color()),
    );
    let mut sync = MeshSync::new(
        MemoryHost::new(),
        Some(QuantizationCodec::default()),
        Bounds::generous(),
    )?;

    camera.start(intake.clone())?;
    let mut resized = false;

    while camera.is_active() || !queue.is_empty() {
        if let Some(frame) = queue.poll_frame() {
            sync.apply_frame(&frame)?;
            let mesh = sync.mesh();
            info!(
                "Frame {}: {} vertices, {} with depth",
                frame.frame_number,
                mesh.vertex_count(),
                frame.valid_vertices().count()
            );
        }

        if !resized && camera.frames_sent() >= frames / 2 {
            camera.set_resolution(160, 120)?;
            resized = true;
        }
        thread::sleep(Duration::from_millis(16));
    }
    camera.stop();

    let stats = intake.stats();
    info!(
        "Done: {} frames converted, {} applied, {} overwritten",
        stats.converted,
        sync.frames_applied(),
        queue.overwritten()
    );
    info!(
        "Final mesh {}x{}, position texture {:?} as {:?}",
        sync.dimensions().0,
        sync.dimensions().1,
        sync.position_texture().dimensions(),
        sync.position_texture().format()
    );
    Ok(())
}
