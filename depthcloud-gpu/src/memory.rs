//! CPU-only render host for headless runs and tests.

use std::collections::HashMap;

use depthcloud_data::Bounds;
use glam::{Vec2, Vec3};
use tracing::debug;

use crate::host::{
    HostError, MeshResource, RenderHost, TextureFormat, TextureResource, Topology,
    check_indices, check_texture_len, fit_bounds, texture_len,
};

/// Render host that keeps every resource in plain vectors.
#[derive(Debug)]
pub struct MemoryHost {
    supported: Vec<TextureFormat>,
    bindings: HashMap<String, String>,
}

impl MemoryHost {
    /// Host supporting every [`TextureFormat`].
    pub fn new() -> Self {
        Self::with_formats(&[
            TextureFormat::Rgb8Unorm,
            TextureFormat::Rgba8Unorm,
            TextureFormat::Rg32Float,
        ])
    }

    pub fn with_formats(formats: &[TextureFormat]) -> Self {
        Self {
            supported: formats.to_vec(),
            bindings: HashMap::new(),
        }
    }

    /// Label of the texture bound to `slot`.
    pub fn bound_texture(&self, slot: &str) -> Option<&str> {
        self.bindings.get(slot).map(String::as_str)
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderHost for MemoryHost {
    type Mesh = MemoryMesh;
    type Texture = MemoryTexture;

    fn supports_texture_format(&self, format: TextureFormat) -> bool {
        self.supported.contains(&format)
    }

    fn create_mesh(&mut self, label: &str) -> MemoryMesh {
        MemoryMesh {
            label: label.to_string(),
            ..Default::default()
        }
    }

    fn create_texture(
        &mut self,
        label: &str,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<MemoryTexture, HostError> {
        if !self.supports_texture_format(format) {
            return Err(HostError::UnsupportedFormat(format));
        }
        Ok(MemoryTexture {
            label: label.to_string(),
            format,
            width,
            height,
            data: vec![0; texture_len(format, width, height)],
            loads: 0,
        })
    }

    fn bind_texture(&mut self, slot: &str, texture: &MemoryTexture) {
        debug!("Binding {} to {}", texture.label, slot);
        self.bindings
            .insert(slot.to_string(), texture.label.clone());
    }
}

#[derive(Debug, Default)]
pub struct MemoryMesh {
    label: String,
    vertices: Vec<Vec3>,
    indices: Vec<u32>,
    uvs: Vec<Vec2>,
    topology: Option<Topology>,
    bounds: Option<Bounds>,
    dynamic: bool,
    uploads: usize,
}

impl MemoryMesh {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn uvs(&self) -> &[Vec2] {
        &self.uvs
    }

    pub fn topology(&self) -> Option<Topology> {
        self.topology
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Number of `upload` calls so far.
    pub fn uploads(&self) -> usize {
        self.uploads
    }
}

impl MeshResource for MemoryMesh {
    fn set_vertices(&mut self, vertices: &[Vec3]) {
        self.vertices.clear();
        self.vertices.extend_from_slice(vertices);
    }

    fn set_indices(&mut self, indices: &[u32], topology: Topology) -> Result<(), HostError> {
        check_indices(indices, self.vertices.len())?;
        self.indices = indices.to_vec();
        self.topology = Some(topology);
        Ok(())
    }

    fn set_uvs(&mut self, uvs: &[Vec2]) -> Result<(), HostError> {
        if uvs.len() != self.vertices.len() {
            return Err(HostError::AttributeLength {
                expected: self.vertices.len(),
                actual: uvs.len(),
            });
        }
        self.uvs = uvs.to_vec();
        Ok(())
    }

    fn mark_dynamic(&mut self) {
        self.dynamic = true;
    }

    fn set_bounds(&mut self, bounds: Bounds) {
        self.bounds = Some(bounds);
    }

    fn upload(&mut self, recalculate_bounds: bool) -> Result<(), HostError> {
        if recalculate_bounds {
            self.bounds = Some(fit_bounds(&self.vertices));
        }
        self.uploads += 1;
        Ok(())
    }

    fn vertex_count(&self) -> usize {
        self.vertices.len()
    }
}

#[derive(Debug)]
pub struct MemoryTexture {
    label: String,
    format: TextureFormat,
    width: u32,
    height: u32,
    data: Vec<u8>,
    loads: usize,
}

impl MemoryTexture {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of successful `load_raw` calls so far.
    pub fn loads(&self) -> usize {
        self.loads
    }
}

impl TextureResource for MemoryTexture {
    fn format(&self) -> TextureFormat {
        self.format
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.data = vec![0; texture_len(self.format, width, height)];
    }

    fn load_raw(&mut self, data: &[u8]) -> Result<(), HostError> {
        check_texture_len(self.format, self.width, self.height, data.len())?;
        self.data.copy_from_slice(data);
        self.loads += 1;
        Ok(())
    }

    fn raw_data(&self) -> Result<Vec<u8>, HostError> {
        Ok(self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_format_rejected() {
        let mut host = MemoryHost::with_formats(&[TextureFormat::Rg32Float]);
        assert!(!host.supports_texture_format(TextureFormat::Rgba8Unorm));
        assert_eq!(
            host.create_texture("positions", TextureFormat::Rgba8Unorm, 2, 2)
                .err(),
            Some(HostError::UnsupportedFormat(TextureFormat::Rgba8Unorm))
        );
        assert!(host
            .create_texture("uvs", TextureFormat::Rg32Float, 2, 2)
            .is_ok());
    }

    #[test]
    fn test_texture_load_and_read_back() {
        let mut host = MemoryHost::new();
        let mut texture = host
            .create_texture("positions", TextureFormat::Rgb8Unorm, 2, 1)
            .unwrap();
        texture.load_raw(&[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(texture.raw_data().unwrap(), vec![1, 2, 3, 4, 5, 6]);
        assert!(texture.load_raw(&[0; 4]).is_err());

        texture.resize(3, 2);
        assert_eq!(texture.dimensions(), (3, 2));
        assert_eq!(texture.data().len(), 18);
        assert_eq!(texture.loads(), 1);
    }

    #[test]
    fn test_mesh_attributes_validated() {
        let mut host = MemoryHost::new();
        let mut mesh = host.create_mesh("points");
        mesh.set_vertices(&[Vec3::ZERO, Vec3::ONE]);
        assert!(mesh.set_indices(&[0, 1], Topology::Points).is_ok());
        assert!(mesh.set_indices(&[2], Topology::Points).is_err());
        assert!(mesh.set_uvs(&[Vec2::ZERO]).is_err());

        mesh.set_bounds(Bounds::generous());
        mesh.upload(false).unwrap();
        assert_eq!(mesh.bounds(), Some(Bounds::generous()));
        mesh.upload(true).unwrap();
        assert_eq!(mesh.bounds().unwrap().size, Vec3::ONE);
        assert_eq!(mesh.uploads(), 2);
    }

    #[test]
    fn test_bindings_recorded() {
        let mut host = MemoryHost::new();
        let texture = host
            .create_texture("uv map", TextureFormat::Rg32Float, 1, 1)
            .unwrap();
        host.bind_texture("_UVMap", &texture);
        assert_eq!(host.bound_texture("_UVMap"), Some("uv map"));
        assert_eq!(host.bound_texture("_PositionTex"), None);
    }
}
