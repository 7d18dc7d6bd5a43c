//! Pipeline wiring and the render loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use depthcloud_capture::{FrameProvider, SyntheticCamera};
use depthcloud_data::QuantizationCodec;
use depthcloud_gpu::{MemoryHost, MeshResource, MeshSync, RenderHost, Renderer, SyncError};
use depthcloud_ingest::{DepthToPointCloud, FrameQueue, IntakeStats};
use tracing::{info, warn};

use crate::config::{Backend, PipelineConfig};
use crate::error::AppError;

/// What a run did, logged at exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub frames_applied: u64,
    pub frames_rejected: u64,
    /// Point frames replaced in the queue before the render loop saw them.
    pub frames_overwritten: u64,
    pub intake: IntakeStats,
    pub mesh_points: usize,
}

/// Run the pipeline on the configured backend.
pub fn run(config: &PipelineConfig) -> Result<RunSummary, AppError> {
    match config.render.backend {
        Backend::Memory => run_with_host(config, MemoryHost::new()),
        Backend::Gpu => {
            let renderer = pollster::block_on(Renderer::new_headless())?;
            run_with_host(config, renderer.host())
        }
    }
}

/// Stream the synthetic camera into a point mesh owned by `host`.
pub fn run_with_host<H: RenderHost>(
    config: &PipelineConfig,
    host: H,
) -> Result<RunSummary, AppError> {
    let tick_interval = config.render.tick_interval()?;
    let codec = if config.render.quantize {
        Some(QuantizationCodec::new(config.codec)?)
    } else {
        None
    };
    let mut sync = MeshSync::new(host, codec, config.mesh.bounds())?;

    let queue = Arc::new(FrameQueue::new());
    let mut camera = SyntheticCamera::new(config.camera.clone())?;
    let intake = Arc::new(
        DepthToPointCloud::new(Arc::clone(&queue))
            .with_texture_mapping(camera.color_intrinsics(), camera.depth_to_color()),
    );
    camera.start(intake.clone())?;

    let mut rate = RateCounter::new();
    let mut ticks = 0u64;
    let mut rejected = 0u64;

    while config.render.ticks == 0 || ticks < config.render.ticks {
        let tick_start = Instant::now();
        ticks += 1;

        if let Some(frame) = queue.poll_frame() {
            match sync.apply_frame(&frame) {
                Ok(()) => rate.record(),
                Err(e @ SyncError::CountMismatch { .. }) => {
                    warn!("Dropping frame {}: {}", frame.frame_number, e);
                    rejected += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        if let Some(per_second) = rate.poll() {
            info!("Mesh updates: {:.1}/s", per_second);
        }

        if !camera.is_active() && queue.is_empty() {
            info!("Camera stopped, ending after {} ticks", ticks);
            break;
        }

        let elapsed = tick_start.elapsed();
        if elapsed < tick_interval {
            thread::sleep(tick_interval - elapsed);
        }
    }
    camera.stop();

    let summary = RunSummary {
        ticks,
        frames_applied: sync.frames_applied(),
        frames_rejected: rejected,
        frames_overwritten: queue.overwritten(),
        intake: intake.stats(),
        mesh_points: sync.mesh().vertex_count(),
    };
    info!(
        "Applied {} frames of {} points in {} ticks ({} overwritten, {} rejected); intake converted {}, skipped {}, failed {}",
        summary.frames_applied,
        summary.mesh_points,
        summary.ticks,
        summary.frames_overwritten,
        summary.frames_rejected,
        summary.intake.converted,
        summary.intake.skipped,
        summary.intake.failed
    );
    Ok(summary)
}

/// Counts events and reports their rate about once per second.
struct RateCounter {
    window_start: Instant,
    count: u64,
}

impl RateCounter {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            count: 0,
        }
    }

    fn record(&mut self) {
        self.count += 1;
    }

    fn poll(&mut self) -> Option<f64> {
        let elapsed = self.window_start.elapsed();
        if elapsed < Duration::from_secs(1) {
            return None;
        }
        let rate = self.count as f64 / elapsed.as_secs_f64();
        self.window_start = Instant::now();
        self.count = 0;
        Some(rate)
    }
}
