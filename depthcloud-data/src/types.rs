//! Core frame and geometry types for depth streaming.
//!
//! These mirror the parts of a depth camera SDK's frame model that the
//! point-cloud pipeline needs: stream profiles, calibration, depth/video
//! frames, composite frame sets and generated point frames. They are plain
//! CPU-side values; GPU resources live in depthcloud-gpu.

use std::sync::Arc;

use glam::{Mat3, Vec2, Vec3};

/// Kind of sensor stream a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Any,
    Depth,
    Color,
    Infrared,
    Fisheye,
    Gyro,
    Accel,
    Pose,
}

/// Pixel layout of a frame's sample data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Any,
    /// 16-bit single channel depth.
    Z16,
    Y8,
    Rgb8,
    Bgr8,
    Rgba8,
    /// Three 32-bit floats per pixel (already deprojected points).
    Xyz32f,
}

impl PixelFormat {
    /// Size of one pixel in bytes. `Any` has no fixed size and reports 0.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Any => 0,
            PixelFormat::Z16 => 2,
            PixelFormat::Y8 => 1,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 => 4,
            PixelFormat::Xyz32f => 12,
        }
    }
}

/// Metadata describing a camera stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamProfile {
    pub kind: StreamKind,
    pub format: PixelFormat,
    /// Index of the stream among streams of the same kind.
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl StreamProfile {
    pub fn new(
        kind: StreamKind,
        format: PixelFormat,
        index: u32,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Self {
        Self {
            kind,
            format,
            index,
            width,
            height,
            fps,
        }
    }

    /// The primary Z16 depth stream at the given resolution.
    pub fn depth(width: u32, height: u32, fps: u32) -> Self {
        Self::new(StreamKind::Depth, PixelFormat::Z16, 0, width, height, fps)
    }

    /// The primary RGB8 color stream at the given resolution.
    pub fn color(width: u32, height: u32, fps: u32) -> Self {
        Self::new(StreamKind::Color, PixelFormat::Rgb8, 0, width, height, fps)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Pinhole intrinsics of a stream (no distortion model).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    pub width: u32,
    pub height: u32,
    /// Principal point, in pixels.
    pub ppx: f32,
    pub ppy: f32,
    /// Focal length, in pixels.
    pub fx: f32,
    pub fy: f32,
}

impl Intrinsics {
    pub fn new(width: u32, height: u32, ppx: f32, ppy: f32, fx: f32, fy: f32) -> Self {
        Self {
            width,
            height,
            ppx,
            ppy,
            fx,
            fy,
        }
    }

    /// Square-pixel intrinsics with the principal point at the image center
    /// and the given horizontal field of view in degrees.
    pub fn from_horizontal_fov(width: u32, height: u32, hfov_degrees: f32) -> Self {
        let focal = width as f32 * 0.5 / (hfov_degrees.to_radians() * 0.5).tan();
        Self::new(
            width,
            height,
            width as f32 * 0.5,
            height as f32 * 0.5,
            focal,
            focal,
        )
    }

    /// Back-project a pixel with the given depth (in meters) into camera space.
    pub fn deproject(&self, pixel: Vec2, depth: f32) -> Vec3 {
        let x = (pixel.x - self.ppx) / self.fx;
        let y = (pixel.y - self.ppy) / self.fy;
        Vec3::new(x * depth, y * depth, depth)
    }

    /// Project a camera-space point onto the image plane.
    pub fn project(&self, point: Vec3) -> Vec2 {
        let x = point.x / point.z;
        let y = point.y / point.z;
        Vec2::new(x * self.fx + self.ppx, y * self.fy + self.ppy)
    }
}

/// Rigid transform from one stream's camera space into another's.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extrinsics {
    pub rotation: Mat3,
    pub translation: Vec3,
}

impl Extrinsics {
    pub fn new(rotation: Mat3, translation: Vec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Mat3::IDENTITY, Vec3::ZERO)
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self::new(Mat3::IDENTITY, translation)
    }

    pub fn transform(&self, point: Vec3) -> Vec3 {
        self.rotation * point + self.translation
    }
}

impl Default for Extrinsics {
    fn default() -> Self {
        Self::identity()
    }
}

/// A grid of 16-bit depth samples.
///
/// Sample storage is reference counted, so cloning a frame is cheap and
/// never copies the samples.
#[derive(Debug, Clone)]
pub struct DepthFrame {
    pub profile: StreamProfile,
    pub intrinsics: Intrinsics,
    /// Meters per raw depth unit.
    pub depth_units: f32,
    pub frame_number: u64,
    /// Seconds since the stream started.
    pub timestamp: f64,
    data: Arc<[u16]>,
}

impl DepthFrame {
    pub fn new(
        profile: StreamProfile,
        intrinsics: Intrinsics,
        depth_units: f32,
        data: impl Into<Arc<[u16]>>,
        frame_number: u64,
        timestamp: f64,
    ) -> Self {
        Self {
            profile,
            intrinsics,
            depth_units,
            frame_number,
            timestamp,
            data: data.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.profile.width
    }

    pub fn height(&self) -> u32 {
        self.profile.height
    }

    /// Raw samples in row-major order.
    pub fn data(&self) -> &[u16] {
        &self.data
    }

    /// Raw sample at `(x, y)`, or `None` when out of range.
    pub fn sample(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        self.data
            .get(y as usize * self.width() as usize + x as usize)
            .copied()
    }
}

/// An image frame (color, infrared, ...).
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub profile: StreamProfile,
    pub intrinsics: Intrinsics,
    pub frame_number: u64,
    pub timestamp: f64,
    data: Arc<[u8]>,
}

impl VideoFrame {
    pub fn new(
        profile: StreamProfile,
        intrinsics: Intrinsics,
        data: impl Into<Arc<[u8]>>,
        frame_number: u64,
        timestamp: f64,
    ) -> Self {
        Self {
            profile,
            intrinsics,
            frame_number,
            timestamp,
            data: data.into(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Vertex positions (and optional texture coordinates) derived from a
/// depth frame.
///
/// `count()` equals the pixel count of the source stream. Pixels without a
/// depth reading hold the sentinel position `Vec3::ZERO`.
#[derive(Debug, Clone, PartialEq)]
pub struct PointFrame {
    /// Profile of the depth stream the points were generated from.
    pub profile: StreamProfile,
    pub frame_number: u64,
    pub timestamp: f64,
    vertices: Vec<Vec3>,
    tex_coords: Option<Vec<Vec2>>,
}

impl PointFrame {
    pub fn new(
        profile: StreamProfile,
        vertices: Vec<Vec3>,
        tex_coords: Option<Vec<Vec2>>,
        frame_number: u64,
        timestamp: f64,
    ) -> Self {
        Self {
            profile,
            frame_number,
            timestamp,
            vertices,
            tex_coords,
        }
    }

    pub fn count(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn tex_coords(&self) -> Option<&[Vec2]> {
        self.tex_coords.as_deref()
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Texture coordinates as raw bytes (two `f32` per point).
    pub fn tex_coord_bytes(&self) -> Option<&[u8]> {
        self.tex_coords.as_deref().map(bytemuck::cast_slice)
    }

    /// Copy positions as a flat `x, y, z, x, y, z, ...` array.
    ///
    /// `out` is only reallocated when the point count changed since the
    /// last copy into it.
    pub fn copy_vertices(&self, out: &mut Vec<f32>) {
        let len = self.vertices.len() * 3;
        if out.len() != len {
            *out = vec![0.0; len];
        }
        out.copy_from_slice(bytemuck::cast_slice(&self.vertices));
    }

    /// Positions that carry an actual depth reading.
    pub fn valid_vertices(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices.iter().copied().filter(|v| *v != Vec3::ZERO)
    }

    /// Sum of every coordinate. Cheap checksum for logging.
    pub fn coordinate_sum(&self) -> f32 {
        self.vertices.iter().map(|v| v.x + v.y + v.z).sum()
    }
}

/// Capability tags a frame can be queried for, independent of stream kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extension {
    Video,
    Depth,
    Points,
    Composite,
}

/// Any frame delivered by a camera.
#[derive(Debug, Clone)]
pub enum Frame {
    Depth(DepthFrame),
    Video(VideoFrame),
    Points(PointFrame),
    Composite(FrameSet),
}

impl Frame {
    /// Stream profile of the frame. A composite frame reports the profile of
    /// its first sub-frame; an empty composite has none.
    pub fn profile(&self) -> Option<StreamProfile> {
        match self {
            Frame::Depth(f) => Some(f.profile),
            Frame::Video(f) => Some(f.profile),
            Frame::Points(f) => Some(f.profile),
            Frame::Composite(set) => set.iter().next().and_then(Frame::profile),
        }
    }

    /// Whether the frame supports the given capability. Depth frames are
    /// also video frames.
    pub fn is(&self, extension: Extension) -> bool {
        matches!(
            (self, extension),
            (Frame::Depth(_), Extension::Depth | Extension::Video)
                | (Frame::Video(_), Extension::Video)
                | (Frame::Points(_), Extension::Points)
                | (Frame::Composite(_), Extension::Composite)
        )
    }

    pub fn is_composite(&self) -> bool {
        self.is(Extension::Composite)
    }

    pub fn frame_number(&self) -> Option<u64> {
        match self {
            Frame::Depth(f) => Some(f.frame_number),
            Frame::Video(f) => Some(f.frame_number),
            Frame::Points(f) => Some(f.frame_number),
            Frame::Composite(set) => set.iter().next().and_then(Frame::frame_number),
        }
    }

    pub fn as_depth(&self) -> Option<&DepthFrame> {
        match self {
            Frame::Depth(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_points(&self) -> Option<&PointFrame> {
        match self {
            Frame::Points(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_composite(&self) -> Option<&FrameSet> {
        match self {
            Frame::Composite(set) => Some(set),
            _ => None,
        }
    }
}

impl From<DepthFrame> for Frame {
    fn from(frame: DepthFrame) -> Self {
        Frame::Depth(frame)
    }
}

impl From<VideoFrame> for Frame {
    fn from(frame: VideoFrame) -> Self {
        Frame::Video(frame)
    }
}

impl From<PointFrame> for Frame {
    fn from(frame: PointFrame) -> Self {
        Frame::Points(frame)
    }
}

impl From<FrameSet> for Frame {
    fn from(set: FrameSet) -> Self {
        Frame::Composite(set)
    }
}

/// Frames captured together (one per enabled stream).
#[derive(Debug, Clone, Default)]
pub struct FrameSet {
    frames: Vec<Frame>,
}

impl FrameSet {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
        self.frames.iter()
    }

    /// First sub-frame accepted by `predicate`.
    pub fn first_matching(&self, predicate: impl Fn(&Frame) -> bool) -> Option<&Frame> {
        self.frames.iter().find(|f| predicate(f))
    }

    /// First depth sub-frame, regardless of its index.
    pub fn depth_frame(&self) -> Option<&DepthFrame> {
        self.frames.iter().find_map(Frame::as_depth)
    }
}

impl<'a> IntoIterator for &'a FrameSet {
    type Item = &'a Frame;
    type IntoIter = std::slice::Iter<'a, Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

/// Axis-aligned box given by center and full size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub center: Vec3,
    pub size: Vec3,
}

impl Bounds {
    pub fn new(center: Vec3, size: Vec3) -> Self {
        Self { center, size }
    }

    /// Fixed box used for live point meshes, large enough for any depth
    /// camera range so culling never hides points.
    pub fn generous() -> Self {
        Self::new(Vec3::ZERO, Vec3::splat(10.0))
    }

    pub fn extents(&self) -> Vec3 {
        self.size * 0.5
    }

    pub fn min(&self) -> Vec3 {
        self.center - self.extents()
    }

    pub fn max(&self) -> Vec3 {
        self.center + self.extents()
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min()).all() && point.cmple(self.max()).all()
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::generous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth_frame(width: u32, height: u32, value: u16) -> DepthFrame {
        let profile = StreamProfile::depth(width, height, 30);
        let intrinsics = Intrinsics::from_horizontal_fov(width, height, 87.0);
        let data = vec![value; profile.pixel_count()];
        DepthFrame::new(profile, intrinsics, 0.001, data, 7, 0.25)
    }

    #[test]
    fn test_deproject_project_inverse() {
        let intrinsics = Intrinsics::new(640, 480, 320.5, 240.25, 600.0, 610.0);
        let pixel = Vec2::new(100.0, 400.0);
        let point = intrinsics.deproject(pixel, 2.0);
        assert_eq!(point.z, 2.0);
        let back = intrinsics.project(point);
        assert!((back - pixel).length() < 1e-3);
    }

    #[test]
    fn test_principal_point_deprojects_on_axis() {
        let intrinsics = Intrinsics::from_horizontal_fov(640, 480, 90.0);
        let point = intrinsics.deproject(Vec2::new(320.0, 240.0), 1.5);
        assert_eq!(point, Vec3::new(0.0, 0.0, 1.5));
        // 90 degree fov puts the image edge at 45 degrees
        assert!((intrinsics.fx - 320.0).abs() < 1e-3);
    }

    #[test]
    fn test_depth_frame_sample() {
        let frame = depth_frame(4, 3, 1500);
        assert_eq!(frame.sample(3, 2), Some(1500));
        assert_eq!(frame.sample(4, 0), None);
    }

    #[test]
    fn test_frame_extensions() {
        let depth = Frame::from(depth_frame(2, 2, 1));
        assert!(depth.is(Extension::Depth));
        assert!(depth.is(Extension::Video));
        assert!(!depth.is(Extension::Points));

        let points = Frame::from(PointFrame::new(
            StreamProfile::depth(1, 1, 30),
            vec![Vec3::ONE],
            None,
            0,
            0.0,
        ));
        assert!(points.is(Extension::Points));
        assert!(!points.is(Extension::Depth));
    }

    #[test]
    fn test_composite_reports_first_profile() {
        let color_profile = StreamProfile::color(2, 2, 30);
        let color = VideoFrame::new(
            color_profile,
            Intrinsics::from_horizontal_fov(2, 2, 69.0),
            vec![0u8; 12],
            3,
            0.0,
        );
        let set = FrameSet::new(vec![color.into(), depth_frame(2, 2, 5).into()]);
        let frame = Frame::from(set);
        assert!(frame.is_composite());
        assert_eq!(frame.profile(), Some(color_profile));
        assert_eq!(frame.frame_number(), Some(3));
        let depth = frame.as_composite().unwrap().depth_frame().unwrap();
        assert_eq!(depth.sample(1, 1), Some(5));

        assert_eq!(Frame::from(FrameSet::default()).profile(), None);
    }

    #[test]
    fn test_point_frame_copy_vertices_reuses_buffer() {
        let frame = PointFrame::new(
            StreamProfile::depth(2, 1, 30),
            vec![Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 5.0, 6.0)],
            None,
            0,
            0.0,
        );
        let mut out = Vec::new();
        frame.copy_vertices(&mut out);
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let ptr = out.as_ptr();
        frame.copy_vertices(&mut out);
        assert_eq!(ptr, out.as_ptr());
        assert_eq!(frame.coordinate_sum(), 21.0);
    }

    #[test]
    fn test_valid_vertices_skip_sentinel() {
        let frame = PointFrame::new(
            StreamProfile::depth(3, 1, 30),
            vec![Vec3::ZERO, Vec3::new(0.1, 0.2, 1.0), Vec3::ZERO],
            Some(vec![Vec2::ZERO; 3]),
            0,
            0.0,
        );
        assert_eq!(frame.valid_vertices().count(), 1);
        assert_eq!(frame.tex_coord_bytes().unwrap().len(), 3 * 8);
        assert_eq!(frame.vertex_bytes().len(), 3 * 12);
    }

    #[test]
    fn test_generous_bounds() {
        let bounds = Bounds::generous();
        assert!(bounds.contains(Vec3::new(4.9, -4.9, 0.0)));
        assert!(!bounds.contains(Vec3::new(0.0, 0.0, 5.1)));
        assert_eq!(bounds.extents(), Vec3::splat(5.0));
    }
}
