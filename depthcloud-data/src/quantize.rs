//! Lossy packing of vertex positions into 8-bit texels.
//!
//! Each axis is shifted by a fixed offset into `[0, far_plane]`, normalized,
//! and stored as one byte. The quantization step is `far_plane / 255` per
//! axis (about 2.4 cm for a 6 m far plane).

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when configuring or running the codec.
#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("Far plane must be positive and finite, got {0}")]
    InvalidFarPlane(f32),

    #[error("Axis offset must be finite, got {0}")]
    InvalidOffset(f32),

    #[error("Texel stride must be 3 or 4 bytes, got {0}")]
    InvalidStride(usize),

    #[error("Texel buffer of {len} bytes is not a multiple of stride {stride}")]
    TexelLength { len: usize, stride: usize },
}

/// Deployment parameters of the codec.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizationConfig {
    /// Largest representable extent on every axis.
    pub far_plane: f32,
    /// Added to x before normalizing so negative x fits the range.
    pub offset_x: f32,
    /// Added to y before normalizing so negative y fits the range.
    pub offset_y: f32,
}

impl Default for QuantizationConfig {
    fn default() -> Self {
        Self {
            far_plane: 6.0,
            offset_x: 3.0,
            offset_y: 2.42,
        }
    }
}

/// Three bytes per vertex, one per axis.
pub type QuantizedSample = [u8; 3];

/// Stateless normalize/denormalize transform between positions and bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizationCodec {
    config: QuantizationConfig,
}

impl QuantizationCodec {
    pub fn new(config: QuantizationConfig) -> Result<Self, CodecError> {
        if !(config.far_plane.is_finite() && config.far_plane > 0.0) {
            return Err(CodecError::InvalidFarPlane(config.far_plane));
        }
        for offset in [config.offset_x, config.offset_y] {
            if !offset.is_finite() {
                return Err(CodecError::InvalidOffset(offset));
            }
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &QuantizationConfig {
        &self.config
    }

    /// Width of one quantization bucket.
    pub fn step(&self) -> f32 {
        self.config.far_plane / 255.0
    }

    pub fn encode(&self, position: Vec3) -> QuantizedSample {
        let far = self.config.far_plane;
        [
            quantize_axis(position.x + self.config.offset_x, far),
            quantize_axis(position.y + self.config.offset_y, far),
            quantize_axis(position.z, far),
        ]
    }

    pub fn decode(&self, sample: QuantizedSample) -> Vec3 {
        let far = self.config.far_plane;
        Vec3::new(
            dequantize_axis(sample[0], far) - self.config.offset_x,
            dequantize_axis(sample[1], far) - self.config.offset_y,
            dequantize_axis(sample[2], far),
        )
    }

    /// Encode positions into `out` as texels of `stride` bytes.
    ///
    /// A stride of 4 writes an opaque alpha byte after each sample so the
    /// buffer can be loaded straight into an RGBA8 texture.
    pub fn encode_texels(
        &self,
        positions: &[Vec3],
        stride: usize,
        out: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        check_stride(stride)?;
        out.clear();
        out.reserve(positions.len() * stride);
        for position in positions {
            out.extend_from_slice(&self.encode(*position));
            if stride == 4 {
                out.push(u8::MAX);
            }
        }
        Ok(())
    }

    /// Decode texels of `stride` bytes into `out`, replacing its contents.
    pub fn decode_texels(
        &self,
        texels: &[u8],
        stride: usize,
        out: &mut Vec<Vec3>,
    ) -> Result<(), CodecError> {
        check_stride(stride)?;
        if texels.len() % stride != 0 {
            return Err(CodecError::TexelLength {
                len: texels.len(),
                stride,
            });
        }
        out.clear();
        out.extend(
            texels
                .chunks_exact(stride)
                .map(|texel| self.decode([texel[0], texel[1], texel[2]])),
        );
        Ok(())
    }
}

impl Default for QuantizationCodec {
    fn default() -> Self {
        Self {
            config: QuantizationConfig::default(),
        }
    }
}

fn check_stride(stride: usize) -> Result<(), CodecError> {
    match stride {
        3 | 4 => Ok(()),
        other => Err(CodecError::InvalidStride(other)),
    }
}

fn quantize_axis(shifted: f32, far_plane: f32) -> u8 {
    // NaN survives clamp and then saturates to 0 in the cast
    ((shifted / far_plane).clamp(0.0, 1.0) * 255.0).round() as u8
}

fn dequantize_axis(byte: u8, far_plane: f32) -> f32 {
    byte as f32 * far_plane / 255.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_within_one_step() {
        let codec = QuantizationCodec::default();
        let config = *codec.config();
        let bound = codec.step();

        for i in 0..=600 {
            let t = i as f32 / 600.0;
            let x = -config.offset_x + t * config.far_plane;
            let y = -config.offset_y + t * config.far_plane;
            let z = t * config.far_plane;
            let original = Vec3::new(x, y, z);
            let decoded = codec.decode(codec.encode(original));
            let error = (decoded - original).abs();
            assert!(
                error.max_element() <= bound,
                "{original:?} decoded to {decoded:?}"
            );
        }
    }

    #[test]
    fn test_encode_clamps_out_of_range() {
        let codec = QuantizationCodec::default();
        assert_eq!(codec.encode(Vec3::new(-10.0, -10.0, -1.0)), [0, 0, 0]);
        assert_eq!(codec.encode(Vec3::new(10.0, 10.0, 10.0)), [255, 255, 255]);
        assert_eq!(codec.encode(Vec3::new(f32::NAN, 0.0, 0.0))[0], 0);
    }

    #[test]
    fn test_encode_known_values() {
        let codec = QuantizationCodec::default();
        // x = 0 sits at offset 3 / 6 = 0.5 -> 127.5 rounds to 128
        let sample = codec.encode(Vec3::new(0.0, 0.0, 6.0));
        assert_eq!(sample, [128, 103, 255]);

        let decoded = codec.decode([0, 0, 0]);
        assert_eq!(decoded, Vec3::new(-3.0, -2.42, 0.0));
    }

    #[test]
    fn test_sentinel_round_trip() {
        // Zero-depth sentinel vertices should stay near the origin
        let codec = QuantizationCodec::default();
        let decoded = codec.decode(codec.encode(Vec3::ZERO));
        assert!(decoded.abs().max_element() <= codec.step());
    }

    #[test]
    fn test_texels_with_alpha() {
        let codec = QuantizationCodec::default();
        let positions = [Vec3::new(0.5, -0.5, 1.0), Vec3::new(-1.0, 1.0, 2.5)];
        let mut texels = Vec::new();
        codec.encode_texels(&positions, 4, &mut texels).unwrap();
        assert_eq!(texels.len(), 8);
        assert_eq!(texels[3], 255);
        assert_eq!(texels[7], 255);
        assert_eq!(&texels[0..3], &codec.encode(positions[0]));

        let mut decoded = vec![Vec3::ONE; 10];
        codec.decode_texels(&texels, 4, &mut decoded).unwrap();
        assert_eq!(decoded.len(), 2);
        for (d, p) in decoded.iter().zip(positions.iter()) {
            assert!((*d - *p).abs().max_element() <= codec.step());
        }
    }

    #[test]
    fn test_packed_rgb_texels() {
        let codec = QuantizationCodec::default();
        let positions = [Vec3::new(0.0, 0.0, 3.0); 5];
        let mut texels = Vec::new();
        codec.encode_texels(&positions, 3, &mut texels).unwrap();
        assert_eq!(texels.len(), 15);

        let mut decoded = Vec::new();
        codec.decode_texels(&texels, 3, &mut decoded).unwrap();
        assert_eq!(decoded.len(), 5);
    }

    #[test]
    fn test_invalid_stride_and_length() {
        let codec = QuantizationCodec::default();
        let mut texels = Vec::new();
        assert_eq!(
            codec.encode_texels(&[Vec3::ZERO], 2, &mut texels),
            Err(CodecError::InvalidStride(2))
        );
        let mut decoded = Vec::new();
        assert_eq!(
            codec.decode_texels(&[0u8; 7], 4, &mut decoded),
            Err(CodecError::TexelLength { len: 7, stride: 4 })
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad_far = QuantizationConfig {
            far_plane: 0.0,
            ..Default::default()
        };
        assert_eq!(
            QuantizationCodec::new(bad_far),
            Err(CodecError::InvalidFarPlane(0.0))
        );

        let bad_offset = QuantizationConfig {
            offset_y: f32::INFINITY,
            ..Default::default()
        };
        assert!(matches!(
            QuantizationCodec::new(bad_offset),
            Err(CodecError::InvalidOffset(_))
        ));
    }
}
