//! Frame selection for the point cloud pipeline.

use depthcloud_data::{Extension, Frame, PixelFormat, StreamKind, StreamProfile};

/// Which frames the pipeline accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrameFilter {
    /// Raw depth from the primary Z16 stream, to be converted into points.
    #[default]
    Depth,
    /// Frames that already carry point data.
    Points,
}

impl FrameFilter {
    pub fn matches(&self, frame: &Frame) -> bool {
        match self {
            FrameFilter::Depth => is_depth_frame(frame),
            FrameFilter::Points => frame.is(Extension::Points),
        }
    }

    /// First sub-frame of a composite accepted by the filter. A plain frame
    /// is returned as-is when it matches.
    pub fn select<'a>(&self, frame: &'a Frame) -> Option<&'a Frame> {
        match frame {
            Frame::Composite(set) => set.first_matching(|f| self.matches(f)),
            other => self.matches(other).then_some(other),
        }
    }
}

/// True iff the frame is a depth frame from the depth stream with index 0 in
/// Z16 format. Point frames keep their source depth profile and are rejected.
pub fn is_depth_frame(frame: &Frame) -> bool {
    frame.is(Extension::Depth) && frame.profile().is_some_and(|p| is_depth_profile(&p))
}

pub fn is_depth_profile(profile: &StreamProfile) -> bool {
    profile.kind == StreamKind::Depth && profile.format == PixelFormat::Z16 && profile.index == 0
}
