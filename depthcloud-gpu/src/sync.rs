//! Keeps the render mesh and its textures in step with incoming point frames.

use depthcloud_data::{Bounds, CodecError, PointFrame, QuantizationCodec};
use glam::{Vec2, Vec3};
use thiserror::Error;
use tracing::{debug, info};

use crate::host::{HostError, MeshResource, RenderHost, TextureFormat, TextureResource, Topology};

/// Material slot of the quantized position texture.
pub const POSITION_TEXTURE_SLOT: &str = "_PositionTex";
/// Material slot of the color lookup texture.
pub const UV_TEXTURE_SLOT: &str = "_UVMap";

/// Position texture formats in order of preference.
const POSITION_FORMATS: [TextureFormat; 2] = [TextureFormat::Rgba8Unorm, TextureFormat::Rgb8Unorm];

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Render host supports none of the texture formats {0:?}")]
    UnsupportedTextureFormat(Vec<TextureFormat>),

    #[error("Point frame has {count} points but its stream is {width}x{height}")]
    CountMismatch { count: usize, width: u32, height: u32 },

    #[error("Cannot size the point mesh to {width}x{height}")]
    EmptyResize { width: u32, height: u32 },

    #[error("Render host error: {0}")]
    Host(#[from] HostError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Owns the render host and applies point frames to its mesh.
///
/// The mesh is a point list with one vertex per depth pixel and grid UVs
/// that address the color lookup texture. With a codec, positions make a
/// round trip through the 8-bit position texture before reaching the mesh,
/// so the mesh shows exactly what a shader sampling that texture sees.
pub struct MeshSync<H: RenderHost> {
    host: H,
    mesh: H::Mesh,
    position_texture: H::Texture,
    uv_texture: H::Texture,
    codec: Option<QuantizationCodec>,
    bounds: Bounds,
    width: u32,
    height: u32,
    frames_applied: u64,
    vertices: Vec<Vec3>,
    texels: Vec<u8>,
}

impl<H: RenderHost> MeshSync<H> {
    /// Create the mesh and textures and bind the textures to their slots.
    ///
    /// Fails when the host lacks an 8-bit position format or a two channel
    /// float format for the color lookup.
    pub fn new(
        mut host: H,
        codec: Option<QuantizationCodec>,
        bounds: Bounds,
    ) -> Result<Self, SyncError> {
        let position_format = POSITION_FORMATS
            .into_iter()
            .find(|f| host.supports_texture_format(*f))
            .ok_or_else(|| SyncError::UnsupportedTextureFormat(POSITION_FORMATS.to_vec()))?;
        if !host.supports_texture_format(TextureFormat::Rg32Float) {
            return Err(SyncError::UnsupportedTextureFormat(vec![
                TextureFormat::Rg32Float,
            ]));
        }

        let mut mesh = host.create_mesh("Point Cloud");
        mesh.mark_dynamic();
        mesh.set_bounds(bounds);

        let position_texture = host.create_texture("Position Texture", position_format, 0, 0)?;
        let uv_texture = host.create_texture("UV Map", TextureFormat::Rg32Float, 0, 0)?;
        host.bind_texture(POSITION_TEXTURE_SLOT, &position_texture);
        host.bind_texture(UV_TEXTURE_SLOT, &uv_texture);

        info!(
            "Point mesh ready: positions as {:?}, quantization {}",
            position_format,
            if codec.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            host,
            mesh,
            position_texture,
            uv_texture,
            codec,
            bounds,
            width: 0,
            height: 0,
            frames_applied: 0,
            vertices: Vec::new(),
            texels: Vec::new(),
        })
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn mesh(&self) -> &H::Mesh {
        &self.mesh
    }

    pub fn position_texture(&self) -> &H::Texture {
        &self.position_texture
    }

    pub fn uv_texture(&self) -> &H::Texture {
        &self.uv_texture
    }

    pub fn codec(&self) -> Option<&QuantizationCodec> {
        self.codec.as_ref()
    }

    /// Current grid size of the mesh.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frames_applied(&self) -> u64 {
        self.frames_applied
    }

    /// Reallocate the mesh and textures for a `width` x `height` grid.
    ///
    /// Vertices are zeroed, indices enumerate the points and UVs address the
    /// grid cell of each point. Calling it again with the same size gives the
    /// same state.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), SyncError> {
        if width == 0 || height == 0 {
            return Err(SyncError::EmptyResize { width, height });
        }
        let count = width as usize * height as usize;

        self.vertices.clear();
        self.vertices.resize(count, Vec3::ZERO);
        self.mesh.set_vertices(&self.vertices);

        let indices: Vec<u32> = (0..count as u32).collect();
        self.mesh.set_indices(&indices, Topology::Points)?;
        self.mesh.set_uvs(&grid_uvs(width, height))?;
        self.mesh.mark_dynamic();
        self.mesh.set_bounds(self.bounds);

        self.position_texture.resize(width, height);
        self.uv_texture.resize(width, height);
        // Resizing may have replaced the underlying textures
        self.host
            .bind_texture(POSITION_TEXTURE_SLOT, &self.position_texture);
        self.host.bind_texture(UV_TEXTURE_SLOT, &self.uv_texture);

        self.width = width;
        self.height = height;
        info!("Resized point mesh to {}x{} ({} points)", width, height, count);
        Ok(())
    }

    /// Push one point frame to the mesh, resizing first if the point count
    /// or grid changed.
    pub fn apply_frame(&mut self, frame: &PointFrame) -> Result<(), SyncError> {
        let (width, height) = (frame.profile.width, frame.profile.height);
        if frame.count() != frame.profile.pixel_count() {
            return Err(SyncError::CountMismatch {
                count: frame.count(),
                width,
                height,
            });
        }
        if frame.count() != self.mesh.vertex_count() || (width, height) != self.dimensions() {
            self.resize(width, height)?;
        }

        match self.codec {
            Some(codec) => {
                let stride = self.position_texture.format().bytes_per_texel();
                codec.encode_texels(frame.vertices(), stride, &mut self.texels)?;
                self.position_texture.load_raw(&self.texels)?;
                let texels = self.position_texture.raw_data()?;
                codec.decode_texels(&texels, stride, &mut self.vertices)?;
            }
            None => {
                self.vertices.clear();
                self.vertices.extend_from_slice(frame.vertices());
            }
        }
        self.mesh.set_vertices(&self.vertices);

        if let Some(tex_coords) = frame.tex_coords() {
            self.uv_texture.load_raw(bytemuck::cast_slice(tex_coords))?;
        }

        self.mesh.upload(false)?;
        self.frames_applied += 1;
        debug!(
            "Applied frame {} ({} points)",
            frame.frame_number,
            frame.count()
        );
        Ok(())
    }

    pub fn into_host(self) -> H {
        self.host
    }
}

/// UV of every cell in a `width` x `height` grid, row-major.
pub fn grid_uvs(width: u32, height: u32) -> Vec<Vec2> {
    let mut uvs = Vec::with_capacity(width as usize * height as usize);
    for j in 0..height {
        for i in 0..width {
            uvs.push(Vec2::new(i as f32 / width as f32, j as f32 / height as f32));
        }
    }
    uvs
}
