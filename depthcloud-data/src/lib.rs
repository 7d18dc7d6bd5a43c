//! Depthcloud Data Crate
//!
//! Frame model and geometry types shared by the capture, ingest and GPU
//! crates, plus the 8-bit position quantization codec. This crate is
//! GPU-agnostic and has no threading of its own.

pub mod quantize;
pub mod types;

pub use quantize::{CodecError, QuantizationCodec, QuantizationConfig, QuantizedSample};
pub use types::{
    Bounds, DepthFrame, Extension, Extrinsics, Frame, FrameSet, Intrinsics, PixelFormat,
    PointFrame, StreamKind, StreamProfile, VideoFrame,
};
