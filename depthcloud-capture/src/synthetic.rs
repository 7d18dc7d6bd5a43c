//! Software depth camera.
//!
//! Renders a simple scene (a slanted back wall with a sphere orbiting in
//! front of it) into Z16 depth frames plus matching RGB8 color frames, and
//! pushes them as composite frame sets from a background thread. Used for
//! headless runs and tests where no physical camera is attached.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use depthcloud_data::{
    DepthFrame, Extrinsics, Frame, FrameSet, Intrinsics, StreamProfile, VideoFrame,
};
use glam::Vec3;
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::source::{CaptureError, FrameProvider, FrameSink};

/// Distance between the depth and color imagers, in meters.
const COLOR_BASELINE: f32 = 0.015;

const WALL_NORMAL: Vec3 = Vec3::new(0.0, -0.2, 1.0);
const WALL_DISTANCE: f32 = 3.0;
const SPHERE_RADIUS: f32 = 0.35;

/// Configuration of the synthetic camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Horizontal field of view of both imagers, in degrees.
    pub horizontal_fov: f32,
    /// Meters per raw depth unit.
    pub depth_units: f32,
    /// Fraction of pixels reported without depth (value 0).
    pub hole_ratio: f32,
    /// Deliver a color frame alongside each depth frame.
    pub with_color: bool,
    /// Stop on its own after this many frames.
    pub max_frames: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            horizontal_fov: 87.0,
            depth_units: 0.001,
            hole_ratio: 0.02,
            with_color: true,
            max_frames: None,
        }
    }
}

impl SyntheticConfig {
    fn validate(&self) -> Result<(), CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::InvalidConfig(format!(
                "resolution {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(CaptureError::InvalidConfig("fps must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&self.hole_ratio) {
            return Err(CaptureError::InvalidConfig(format!(
                "hole ratio {} is outside [0, 1]",
                self.hole_ratio
            )));
        }
        if !(self.depth_units > 0.0) {
            return Err(CaptureError::InvalidConfig(format!(
                "depth units {} must be positive",
                self.depth_units
            )));
        }
        if !(self.horizontal_fov > 0.0 && self.horizontal_fov < 180.0) {
            return Err(CaptureError::InvalidConfig(format!(
                "field of view {} is outside (0, 180)",
                self.horizontal_fov
            )));
        }
        Ok(())
    }
}

/// Frame provider backed by a rendered scene.
pub struct SyntheticCamera {
    config: SyntheticConfig,
    resolution: Arc<Mutex<(u32, u32)>>,
    running: Arc<AtomicBool>,
    frames_sent: Arc<AtomicU64>,
    profile: Option<StreamProfile>,
    handle: Option<JoinHandle<()>>,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticConfig) -> Result<Self, CaptureError> {
        config.validate()?;
        let resolution = (config.width, config.height);
        Ok(Self {
            config,
            resolution: Arc::new(Mutex::new(resolution)),
            running: Arc::new(AtomicBool::new(false)),
            frames_sent: Arc::new(AtomicU64::new(0)),
            profile: None,
            handle: None,
        })
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    /// Change the streamed resolution. Takes effect from the next frame.
    pub fn set_resolution(&self, width: u32, height: u32) -> Result<(), CaptureError> {
        if width == 0 || height == 0 {
            return Err(CaptureError::InvalidConfig(format!(
                "resolution {width}x{height} is empty"
            )));
        }
        *self.resolution.lock().unwrap_or_else(PoisonError::into_inner) = (width, height);
        info!("Synthetic camera resolution set to {}x{}", width, height);
        Ok(())
    }

    pub fn resolution(&self) -> (u32, u32) {
        *self.resolution.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Intrinsics of the depth imager at the current resolution.
    pub fn depth_intrinsics(&self) -> Intrinsics {
        let (width, height) = self.resolution();
        Intrinsics::from_horizontal_fov(width, height, self.config.horizontal_fov)
    }

    /// Intrinsics of the color imager at the current resolution.
    pub fn color_intrinsics(&self) -> Intrinsics {
        self.depth_intrinsics()
    }

    /// Transform from depth camera space into color camera space.
    pub fn depth_to_color(&self) -> Extrinsics {
        Extrinsics::from_translation(Vec3::new(-COLOR_BASELINE, 0.0, 0.0))
    }

    /// Total number of frames delivered since construction.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    fn join_thread(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Synthetic camera thread panicked");
            }
        }
    }
}

impl FrameProvider for SyntheticCamera {
    fn start(&mut self, sink: Arc<dyn FrameSink>) -> Result<StreamProfile, CaptureError> {
        if self.is_active() {
            return Err(CaptureError::AlreadyStarted);
        }
        // Reap a thread that ran out of its frame budget
        self.join_thread();

        let (width, height) = self.resolution();
        let profile = StreamProfile::depth(width, height, self.config.fps);
        info!(
            "Starting synthetic camera: {}x{} @ {} fps",
            width, height, self.config.fps
        );
        sink.on_start(&profile);

        self.running.store(true, Ordering::Release);
        let worker = Worker {
            config: self.config.clone(),
            resolution: Arc::clone(&self.resolution),
            running: Arc::clone(&self.running),
            frames_sent: Arc::clone(&self.frames_sent),
        };
        let handle = thread::Builder::new()
            .name("synthetic-camera".into())
            .spawn(move || worker.run(sink))
            .inspect_err(|_| self.running.store(false, Ordering::Release))?;

        self.handle = Some(handle);
        self.profile = Some(profile);
        Ok(profile)
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.join_thread();
    }

    fn is_active(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn active_profile(&self) -> Option<StreamProfile> {
        let (width, height) = self.resolution();
        self.profile.map(|profile| StreamProfile {
            width,
            height,
            ..profile
        })
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    config: SyntheticConfig,
    resolution: Arc<Mutex<(u32, u32)>>,
    running: Arc<AtomicBool>,
    frames_sent: Arc<AtomicU64>,
}

impl Worker {
    fn run(self, sink: Arc<dyn FrameSink>) {
        let interval = Duration::from_secs_f64(1.0 / self.config.fps as f64);
        let start = Instant::now();
        let mut next = start;
        let mut delivered = 0u64;

        while self.running.load(Ordering::Acquire) {
            if self.config.max_frames.is_some_and(|max| delivered >= max) {
                break;
            }

            let (width, height) = *self.resolution.lock().unwrap_or_else(PoisonError::into_inner);
            let frame_number = self.frames_sent.load(Ordering::Relaxed);
            let timestamp = start.elapsed().as_secs_f64();
            let frame = synthesize_frame(&self.config, width, height, frame_number, timestamp);

            sink.on_new_sample(&frame);
            self.frames_sent.fetch_add(1, Ordering::Relaxed);
            delivered += 1;
            debug!("Delivered synthetic frame {} at {:.3}s", frame_number, timestamp);

            next += interval;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else {
                // Fell behind; don't try to catch up with a burst
                next = now;
            }
        }

        self.running.store(false, Ordering::Release);
        info!("Synthetic camera stopped after {} frames", delivered);
    }
}

/// Build the composite frame set for one tick.
pub fn synthesize_frame(
    config: &SyntheticConfig,
    width: u32,
    height: u32,
    frame_number: u64,
    timestamp: f64,
) -> Frame {
    let intrinsics = Intrinsics::from_horizontal_fov(width, height, config.horizontal_fov);
    let depth = DepthFrame::new(
        StreamProfile::depth(width, height, config.fps),
        intrinsics,
        config.depth_units,
        render_depth(&intrinsics, config.depth_units, config.hole_ratio, frame_number),
        frame_number,
        timestamp,
    );

    let mut frames = vec![Frame::Depth(depth)];
    if config.with_color {
        let image = render_color(width, height, frame_number);
        frames.push(Frame::Video(VideoFrame::new(
            StreamProfile::color(width, height, config.fps),
            intrinsics,
            image.into_raw(),
            frame_number,
            timestamp,
        )));
    }
    Frame::Composite(FrameSet::new(frames))
}

/// Render the scene as raw Z16 samples.
pub fn render_depth(
    intrinsics: &Intrinsics,
    depth_units: f32,
    hole_ratio: f32,
    frame_number: u64,
) -> Vec<u16> {
    let phase = frame_number as f32 * 0.05;
    let sphere_center = Vec3::new(0.4 * phase.cos(), 0.1, 1.8 + 0.2 * phase.sin());
    let hole_threshold = (hole_ratio as f64 * u32::MAX as f64) as u64;

    let mut samples = Vec::with_capacity(intrinsics.width as usize * intrinsics.height as usize);
    for v in 0..intrinsics.height {
        for u in 0..intrinsics.width {
            if hole_ratio > 0.0 && (pixel_hash(u, v, frame_number) as u64) < hole_threshold {
                samples.push(0);
                continue;
            }
            let ray = Vec3::new(
                (u as f32 - intrinsics.ppx) / intrinsics.fx,
                (v as f32 - intrinsics.ppy) / intrinsics.fy,
                1.0,
            );
            let z = match (wall_hit(ray), sphere_hit(ray, sphere_center)) {
                (Some(a), Some(b)) => a.min(b),
                (a, b) => a.or(b).unwrap_or(0.0),
            };
            samples.push(to_raw_depth(z, depth_units));
        }
    }
    samples
}

fn render_color(width: u32, height: u32, frame_number: u64) -> RgbImage {
    let blue = (frame_number * 4 % 256) as u8;
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            blue,
        ])
    })
}

// Rays have z = 1, so the ray parameter equals the depth.
fn wall_hit(ray: Vec3) -> Option<f32> {
    let denom = WALL_NORMAL.dot(ray);
    (denom > f32::EPSILON).then(|| WALL_DISTANCE / denom)
}

fn sphere_hit(ray: Vec3, center: Vec3) -> Option<f32> {
    let a = ray.dot(ray);
    let b = -2.0 * ray.dot(center);
    let c = center.dot(center) - SPHERE_RADIUS * SPHERE_RADIUS;
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return None;
    }
    let t = (-b - discriminant.sqrt()) / (2.0 * a);
    (t > 0.0).then_some(t)
}

fn to_raw_depth(z: f32, depth_units: f32) -> u16 {
    if z <= 0.0 {
        return 0;
    }
    (z / depth_units).round().clamp(1.0, u16::MAX as f32) as u16
}

fn pixel_hash(u: u32, v: u32, frame_number: u64) -> u32 {
    let mut x = (u as u64) | ((v as u64) << 20) | (frame_number << 40);
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    x ^= x >> 33;
    x as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CollectingSink {
        starts: AtomicUsize,
        frames: Mutex<Vec<Frame>>,
    }

    impl FrameSink for CollectingSink {
        fn on_start(&self, _profile: &StreamProfile) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_new_sample(&self, frame: &Frame) {
            self.frames.lock().unwrap().push(frame.clone());
        }
    }

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    fn small_config() -> SyntheticConfig {
        SyntheticConfig {
            width: 64,
            height: 48,
            fps: 500,
            hole_ratio: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_wall_depth_on_optical_axis() {
        let intrinsics = Intrinsics::from_horizontal_fov(64, 48, 87.0);
        let samples = render_depth(&intrinsics, 0.001, 0.0, 0);
        assert_eq!(samples.len(), 64 * 48);
        // The sphere starts off-axis, so the center ray hits the wall at 3 m
        assert_eq!(samples[24 * 64 + 32], 3000);
        assert!(samples.iter().all(|&d| d > 0));
    }

    #[test]
    fn test_sphere_in_front_of_wall() {
        let intrinsics = Intrinsics::from_horizontal_fov(64, 48, 87.0);
        let samples = render_depth(&intrinsics, 0.001, 0.0, 0);
        let pixel = intrinsics.project(Vec3::new(0.4, 0.1, 1.8));
        let index = pixel.y.round() as usize * 64 + pixel.x.round() as usize;
        assert!(samples[index] > 1300 && samples[index] < 1600);
    }

    #[test]
    fn test_hole_ratio_extremes() {
        let intrinsics = Intrinsics::from_horizontal_fov(32, 24, 87.0);
        let all_holes = render_depth(&intrinsics, 0.001, 1.0, 3);
        assert!(all_holes.iter().all(|&d| d == 0));

        let some_holes = render_depth(&intrinsics, 0.001, 0.25, 3);
        let zeros = some_holes.iter().filter(|&&d| d == 0).count();
        assert!(zeros > 0 && zeros < some_holes.len());
    }

    #[test]
    fn test_synthesized_frame_set() {
        let config = small_config();
        let frame = synthesize_frame(&config, 64, 48, 2, 0.1);
        let set = frame.as_composite().expect("composite frame");
        assert_eq!(set.len(), 2);
        let depth = set.depth_frame().expect("depth frame");
        assert_eq!(depth.profile, StreamProfile::depth(64, 48, 500));
        assert_eq!(depth.frame_number, 2);

        let color = set.iter().nth(1).unwrap();
        assert_eq!(color.profile(), Some(StreamProfile::color(64, 48, 500)));
    }

    #[test]
    fn test_camera_delivers_budget_then_stops() {
        let mut camera = SyntheticCamera::new(SyntheticConfig {
            max_frames: Some(5),
            ..small_config()
        })
        .unwrap();
        let sink = Arc::new(CollectingSink::default());

        let profile = camera.start(sink.clone()).unwrap();
        assert_eq!(profile, StreamProfile::depth(64, 48, 500));
        assert!(wait_until(Duration::from_secs(5), || !camera.is_active()));
        camera.stop();

        assert_eq!(sink.starts.load(Ordering::SeqCst), 1);
        let frames = sink.frames.lock().unwrap();
        assert_eq!(frames.len(), 5);
        assert!(frames.iter().all(Frame::is_composite));
        assert_eq!(camera.frames_sent(), 5);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let mut camera = SyntheticCamera::new(small_config()).unwrap();
        let sink = Arc::new(CollectingSink::default());
        camera.start(sink.clone()).unwrap();
        assert!(matches!(
            camera.start(sink.clone()),
            Err(CaptureError::AlreadyStarted)
        ));
        camera.stop();
        assert!(!camera.is_active());
    }

    #[test]
    fn test_resolution_change_mid_stream() {
        let mut camera = SyntheticCamera::new(small_config()).unwrap();
        let sink = Arc::new(CollectingSink::default());
        camera.start(sink.clone()).unwrap();
        camera.set_resolution(32, 24).unwrap();

        let resized = wait_until(Duration::from_secs(5), || {
            sink.frames.lock().unwrap().iter().any(|f| {
                f.as_composite()
                    .and_then(FrameSet::depth_frame)
                    .is_some_and(|d| d.width() == 32 && d.data().len() == 32 * 24)
            })
        });
        camera.stop();
        assert!(resized);
        assert_eq!(
            camera.active_profile(),
            Some(StreamProfile::depth(32, 24, 500))
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SyntheticConfig {
            width: 0,
            ..Default::default()
        };
        assert!(matches!(
            SyntheticCamera::new(config),
            Err(CaptureError::InvalidConfig(_))
        ));

        let camera = SyntheticCamera::new(SyntheticConfig::default()).unwrap();
        assert!(camera.set_resolution(10, 0).is_err());
    }
}
