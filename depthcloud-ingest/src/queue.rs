//! Single-slot, latest-wins frame hand-off.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use depthcloud_data::PointFrame;

/// Hands point frames from the camera callback thread to the render loop.
///
/// Holds at most one frame. `enqueue` replaces any frame that has not been
/// polled yet, so a slow consumer only ever sees the most recent frame.
/// Neither side blocks beyond the slot swap.
#[derive(Debug, Default)]
pub struct FrameQueue {
    slot: Mutex<Option<PointFrame>>,
    enqueued: AtomicU64,
    overwritten: AtomicU64,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame`, dropping any frame still waiting. Returns true when a
    /// frame was overwritten.
    pub fn enqueue(&self, frame: PointFrame) -> bool {
        // A panicking holder cannot leave the slot half-written
        let previous = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(frame);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        if previous.is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Take the waiting frame, if any.
    pub fn poll_frame(&self) -> Option<PointFrame> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn is_empty(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Total frames ever enqueued.
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Frames dropped because a newer one arrived before they were polled.
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}
