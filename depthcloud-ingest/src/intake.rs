//! Camera callback boundary.
//!
//! [`DepthToPointCloud`] is the sink a camera pushes frames into. It picks
//! the depth frame out of each sample, converts it to points and leaves the
//! result in a shared [`FrameQueue`] for the render loop. Nothing raised
//! while handling a frame ever reaches the camera's delivery thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use depthcloud_capture::FrameSink;
use depthcloud_data::{Extrinsics, Frame, Intrinsics, PointFrame, StreamProfile};
use tracing::{debug, error, info};

use crate::filter::FrameFilter;
use crate::point_cloud::{IngestError, PointCloudGenerator};
use crate::queue::FrameQueue;

/// Counters of what the intake did with incoming samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntakeStats {
    /// Point frames handed to the queue.
    pub converted: u64,
    /// Samples without a usable frame.
    pub skipped: u64,
    /// Samples whose conversion failed or panicked.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    converted: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// Frame sink that turns depth samples into queued point frames.
pub struct DepthToPointCloud {
    queue: Arc<FrameQueue>,
    generator: Mutex<PointCloudGenerator>,
    active_profile: Mutex<Option<StreamProfile>>,
    counters: Counters,
}

impl DepthToPointCloud {
    pub fn new(queue: Arc<FrameQueue>) -> Self {
        Self {
            queue,
            generator: Mutex::new(PointCloudGenerator::new()),
            active_profile: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    /// Also produce color texture coordinates for every point.
    pub fn with_texture_mapping(self, color: Intrinsics, depth_to_color: Extrinsics) -> Self {
        self.generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map_to(color, depth_to_color);
        self
    }

    pub fn queue(&self) -> &Arc<FrameQueue> {
        &self.queue
    }

    /// Depth profile reported by the camera when streaming started.
    pub fn active_profile(&self) -> Option<StreamProfile> {
        *self
            .active_profile
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> IntakeStats {
        IntakeStats {
            converted: self.counters.converted.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Select and convert the point data carried by `frame`.
    ///
    /// Returns `Ok(None)` when the sample holds nothing the pipeline uses.
    pub fn convert(&self, frame: &Frame) -> Result<Option<PointFrame>, IngestError> {
        if let Some(depth) = FrameFilter::Depth.select(frame).and_then(Frame::as_depth) {
            let mut generator = self
                .generator
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            return generator.process(depth).map(Some);
        }
        Ok(FrameFilter::Points
            .select(frame)
            .and_then(Frame::as_points)
            .cloned())
    }
}

impl FrameSink for DepthToPointCloud {
    fn on_start(&self, profile: &StreamProfile) {
        info!(
            "Depth stream started: {}x{} @ {} fps",
            profile.width, profile.height, profile.fps
        );
        self.generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
        *self
            .active_profile
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(*profile);
    }

    fn on_new_sample(&self, frame: &Frame) {
        self.dispatch(frame, || self.convert(frame));
    }
}

impl DepthToPointCloud {
    /// Run `convert` for `frame`, queue its result and account for it.
    /// Errors and panics stop here.
    fn dispatch(
        &self,
        frame: &Frame,
        convert: impl FnOnce() -> Result<Option<PointFrame>, IngestError>,
    ) {
        match panic::catch_unwind(AssertUnwindSafe(convert)) {
            Ok(Ok(Some(points))) => {
                debug!(
                    "Frame {}: {} points, coordinate sum {:.3}",
                    points.frame_number,
                    points.count(),
                    points.coordinate_sum()
                );
                self.queue.enqueue(points);
                self.counters.converted.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Ok(None)) => {
                debug!("Skipping sample without depth: {:?}", frame.profile());
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                error!("Failed to convert depth frame: {}", e);
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("Panic while converting depth frame: {}", message);
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
