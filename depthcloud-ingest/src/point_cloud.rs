//! Depth frame to point cloud conversion.

use depthcloud_data::{DepthFrame, Extrinsics, Intrinsics, PointFrame};
use glam::{Vec2, Vec3};
use thiserror::Error;
use tracing::debug;

/// Errors produced while converting frames.
#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    #[error("Malformed depth frame: expected {expected} samples, got {actual}")]
    MalformedFrame { expected: usize, actual: usize },
}

/// Projection of depth points into a color stream for texture lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureMapping {
    pub color: Intrinsics,
    /// Transform from depth camera space into color camera space.
    pub depth_to_color: Extrinsics,
}

impl TextureMapping {
    /// Normalized color-image coordinate of a depth-space point.
    pub fn uv(&self, point: Vec3) -> Vec2 {
        let in_color = self.depth_to_color.transform(point);
        if in_color.z <= 0.0 {
            return Vec2::ZERO;
        }
        let pixel = self.color.project(in_color);
        Vec2::new(
            pixel.x / self.color.width as f32,
            pixel.y / self.color.height as f32,
        )
    }
}

/// Converts depth frames into point frames.
///
/// Each point is the pinhole back-projection of its pixel. Pixels without a
/// depth reading map to `Vec3::ZERO` so the point count always equals the
/// pixel count. Per-pixel rays are cached and only rebuilt when the
/// intrinsics change.
#[derive(Debug, Default)]
pub struct PointCloudGenerator {
    mapping: Option<TextureMapping>,
    rays: Vec<Vec2>,
    rays_for: Option<Intrinsics>,
}

impl PointCloudGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce texture coordinates into the given color stream.
    pub fn map_to(&mut self, color: Intrinsics, depth_to_color: Extrinsics) {
        self.mapping = Some(TextureMapping {
            color,
            depth_to_color,
        });
    }

    pub fn clear_mapping(&mut self) {
        self.mapping = None;
    }

    pub fn mapping(&self) -> Option<&TextureMapping> {
        self.mapping.as_ref()
    }

    /// Drop cached state. The texture mapping is kept.
    pub fn reset(&mut self) {
        self.rays.clear();
        self.rays_for = None;
    }

    pub fn process(&mut self, frame: &DepthFrame) -> Result<PointFrame, IngestError> {
        let expected = frame.profile.pixel_count();
        let samples = frame.data();
        if samples.len() != expected {
            return Err(IngestError::MalformedFrame {
                expected,
                actual: samples.len(),
            });
        }

        let intrinsics = Intrinsics {
            width: frame.width(),
            height: frame.height(),
            ..frame.intrinsics
        };
        self.ensure_rays(&intrinsics);

        let vertices: Vec<Vec3> = samples
            .iter()
            .zip(&self.rays)
            .map(|(&raw, ray)| {
                if raw == 0 {
                    return Vec3::ZERO;
                }
                let z = raw as f32 * frame.depth_units;
                Vec3::new(ray.x * z, ray.y * z, z)
            })
            .collect();

        let tex_coords = self.mapping.map(|mapping| {
            vertices
                .iter()
                .map(|&v| {
                    if v == Vec3::ZERO {
                        Vec2::ZERO
                    } else {
                        mapping.uv(v)
                    }
                })
                .collect()
        });

        Ok(PointFrame::new(
            frame.profile,
            vertices,
            tex_coords,
            frame.frame_number,
            frame.timestamp,
        ))
    }

    fn ensure_rays(&mut self, intrinsics: &Intrinsics) {
        if self.rays_for.as_ref() == Some(intrinsics) {
            return;
        }
        debug!(
            "Rebuilding ray table for {}x{}",
            intrinsics.width, intrinsics.height
        );
        self.rays.clear();
        self.rays
            .reserve(intrinsics.width as usize * intrinsics.height as usize);
        for v in 0..intrinsics.height {
            for u in 0..intrinsics.width {
                self.rays.push(Vec2::new(
                    (u as f32 - intrinsics.ppx) / intrinsics.fx,
                    (v as f32 - intrinsics.ppy) / intrinsics.fy,
                ));
            }
        }
        self.rays_for = Some(*intrinsics);
    }

    #[cfg(test)]
    fn cached_rays(&self) -> usize {
        self.rays.len()
    }
}
