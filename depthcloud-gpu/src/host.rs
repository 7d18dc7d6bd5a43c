//! Render host abstraction.
//!
//! The point mesh and its textures are owned by whatever draws them. These
//! traits are the small surface [`MeshSync`](crate::MeshSync) needs from it.

use depthcloud_data::Bounds;
use glam::{Vec2, Vec3};
use thiserror::Error;

/// How mesh indices are assembled into primitives. The point mesh only
/// ever draws single points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    Points,
}

impl Topology {
    pub fn to_wgpu(self) -> wgpu::PrimitiveTopology {
        match self {
            Topology::Points => wgpu::PrimitiveTopology::PointList,
        }
    }
}

/// Texel layouts used by the point cloud textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// Packed 3-byte texels. Not every host can store these.
    Rgb8Unorm,
    Rgba8Unorm,
    /// Two 32-bit floats per texel.
    Rg32Float,
}

impl TextureFormat {
    pub fn bytes_per_texel(&self) -> usize {
        match self {
            TextureFormat::Rgb8Unorm => 3,
            TextureFormat::Rgba8Unorm => 4,
            TextureFormat::Rg32Float => 8,
        }
    }

    /// Matching wgpu format, if there is one.
    pub fn to_wgpu(self) -> Option<wgpu::TextureFormat> {
        match self {
            TextureFormat::Rgb8Unorm => None,
            TextureFormat::Rgba8Unorm => Some(wgpu::TextureFormat::Rgba8Unorm),
            TextureFormat::Rg32Float => Some(wgpu::TextureFormat::Rg32Float),
        }
    }
}

/// Errors reported by render host resources.
#[derive(Debug, Error, PartialEq)]
pub enum HostError {
    #[error("Texture format {0:?} is not supported by this host")]
    UnsupportedFormat(TextureFormat),

    #[error(
        "Texture data of {actual} bytes does not fit {width}x{height} {format:?} ({expected} bytes)"
    )]
    TextureSize {
        format: TextureFormat,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Index {index} is out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },

    #[error("Attribute has {actual} entries but the mesh has {expected} vertices")]
    AttributeLength { expected: usize, actual: usize },

    #[error("Texture readback failed: {0}")]
    Readback(String),
}

/// A mesh owned by the render host.
pub trait MeshResource {
    /// Replace the vertex positions. Indices and UVs must be set again when
    /// the count changes.
    fn set_vertices(&mut self, vertices: &[Vec3]);

    fn set_indices(&mut self, indices: &[u32], topology: Topology) -> Result<(), HostError>;

    fn set_uvs(&mut self, uvs: &[Vec2]) -> Result<(), HostError>;

    /// Hint that the vertex data changes every frame.
    fn mark_dynamic(&mut self);

    fn set_bounds(&mut self, bounds: Bounds);

    /// Push pending changes to the renderer. With `recalculate_bounds` the
    /// bounds are refit to the vertices; otherwise the last set bounds stay.
    fn upload(&mut self, recalculate_bounds: bool) -> Result<(), HostError>;

    fn vertex_count(&self) -> usize;
}

/// A 2D texture owned by the render host.
pub trait TextureResource {
    fn format(&self) -> TextureFormat;

    fn dimensions(&self) -> (u32, u32);

    /// Reallocate storage. Contents are undefined afterwards.
    fn resize(&mut self, width: u32, height: u32);

    /// Replace the texel data. `data` must be tightly packed rows.
    fn load_raw(&mut self, data: &[u8]) -> Result<(), HostError>;

    /// Read back the texel data as tightly packed rows.
    fn raw_data(&self) -> Result<Vec<u8>, HostError>;
}

/// Creates and binds mesh and texture resources.
pub trait RenderHost {
    type Mesh: MeshResource;
    type Texture: TextureResource;

    fn supports_texture_format(&self, format: TextureFormat) -> bool;

    fn create_mesh(&mut self, label: &str) -> Self::Mesh;

    fn create_texture(
        &mut self,
        label: &str,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<Self::Texture, HostError>;

    /// Make `texture` visible to the point material under `slot`.
    fn bind_texture(&mut self, slot: &str, texture: &Self::Texture);
}

/// Expected byte length of a tightly packed texture.
pub(crate) fn texture_len(format: TextureFormat, width: u32, height: u32) -> usize {
    width as usize * height as usize * format.bytes_per_texel()
}

pub(crate) fn check_texture_len(
    format: TextureFormat,
    width: u32,
    height: u32,
    actual: usize,
) -> Result<(), HostError> {
    let expected = texture_len(format, width, height);
    if actual != expected {
        return Err(HostError::TextureSize {
            format,
            width,
            height,
            expected,
            actual,
        });
    }
    Ok(())
}

pub(crate) fn check_indices(indices: &[u32], vertex_count: usize) -> Result<(), HostError> {
    match indices.iter().find(|&&i| i as usize >= vertex_count) {
        Some(&index) => Err(HostError::IndexOutOfRange {
            index,
            vertex_count,
        }),
        None => Ok(()),
    }
}

/// Smallest box around `vertices`. Empty input gives a zero-size box at the
/// origin.
pub(crate) fn fit_bounds(vertices: &[Vec3]) -> Bounds {
    let Some(first) = vertices.first() else {
        return Bounds::new(Vec3::ZERO, Vec3::ZERO);
    };
    let (min, max) = vertices
        .iter()
        .fold((*first, *first), |(min, max), v| (min.min(*v), max.max(*v)));
    Bounds::new((min + max) * 0.5, max - min)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_len_check() {
        assert!(check_texture_len(TextureFormat::Rgba8Unorm, 2, 3, 24).is_ok());
        assert_eq!(
            check_texture_len(TextureFormat::Rg32Float, 2, 2, 16),
            Err(HostError::TextureSize {
                format: TextureFormat::Rg32Float,
                width: 2,
                height: 2,
                expected: 32,
                actual: 16,
            })
        );
    }

    #[test]
    fn test_index_range_check() {
        assert!(check_indices(&[0, 1, 2], 3).is_ok());
        assert_eq!(
            check_indices(&[0, 3], 3),
            Err(HostError::IndexOutOfRange {
                index: 3,
                vertex_count: 3
            })
        );
    }

    #[test]
    fn test_fit_bounds() {
        let bounds = fit_bounds(&[Vec3::new(-1.0, 0.0, 2.0), Vec3::new(1.0, 2.0, 4.0)]);
        assert_eq!(bounds.center, Vec3::new(0.0, 1.0, 3.0));
        assert_eq!(bounds.size, Vec3::splat(2.0));
        assert_eq!(fit_bounds(&[]).size, Vec3::ZERO);
    }

    #[test]
    fn test_wgpu_format_mapping() {
        assert_eq!(TextureFormat::Rgb8Unorm.to_wgpu(), None);
        assert_eq!(
            TextureFormat::Rgba8Unorm.to_wgpu(),
            Some(wgpu::TextureFormat::Rgba8Unorm)
        );
        assert_eq!(Topology::Points.to_wgpu(), wgpu::PrimitiveTopology::PointList);
    }
}
