//! wgpu-backed render host.

use std::collections::HashMap;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use depthcloud_data::Bounds;
use glam::{Vec2, Vec3};
use tracing::{debug, info};
use wgpu::util::DeviceExt;

use crate::host::{
    HostError, MeshResource, RenderHost, TextureFormat, TextureResource, Topology,
    check_indices, check_texture_len, fit_bounds,
};

const READBACK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    #[error("Request Adapter Error: {0}")]
    RequestAdapterError(#[from] wgpu::RequestAdapterError),
    #[error("Request Device Error: {0}")]
    RequestDeviceError(#[from] wgpu::RequestDeviceError),
}

/// Device and queue without a presentation surface.
pub struct Renderer {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl Renderer {
    pub async fn new_headless() -> Result<Self, RendererError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::from_env_or_default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await?;
        let adapter_info = adapter.get_info();
        info!(
            "Using adapter {} ({:?})",
            adapter_info.name, adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Depthcloud Device"),
                ..Default::default()
            })
            .await?;

        Ok(Self { device, queue })
    }

    pub fn host(&self) -> GpuHost {
        GpuHost::new(self.device.clone(), self.queue.clone())
    }
}

/// Render host whose meshes and textures live in GPU memory.
pub struct GpuHost {
    device: wgpu::Device,
    queue: wgpu::Queue,
    bindings: HashMap<String, wgpu::TextureView>,
}

impl GpuHost {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            bindings: HashMap::new(),
        }
    }

    /// View bound to a material slot, for building bind groups.
    pub fn binding(&self, slot: &str) -> Option<&wgpu::TextureView> {
        self.bindings.get(slot)
    }
}

impl RenderHost for GpuHost {
    type Mesh = GpuMesh;
    type Texture = GpuTexture;

    fn supports_texture_format(&self, format: TextureFormat) -> bool {
        format.to_wgpu().is_some()
    }

    fn create_mesh(&mut self, label: &str) -> GpuMesh {
        GpuMesh::new(self.device.clone(), self.queue.clone(), label)
    }

    fn create_texture(
        &mut self,
        label: &str,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<GpuTexture, HostError> {
        let wgpu_format = format
            .to_wgpu()
            .ok_or(HostError::UnsupportedFormat(format))?;
        Ok(GpuTexture::new(
            self.device.clone(),
            self.queue.clone(),
            label,
            format,
            wgpu_format,
            width,
            height,
        ))
    }

    fn bind_texture(&mut self, slot: &str, texture: &GpuTexture) {
        debug!("Binding {} to {}", texture.label, slot);
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.bindings.insert(slot.to_string(), view);
    }
}

/// Point mesh backed by vertex, UV and index buffers.
///
/// Attribute data is staged on the CPU and written on `upload`. Buffers are
/// recreated only when their size changes.
pub struct GpuMesh {
    device: wgpu::Device,
    queue: wgpu::Queue,
    label: String,
    vertices: Vec<Vec3>,
    uvs: Vec<Vec2>,
    indices: Vec<u32>,
    indices_dirty: bool,
    topology: Topology,
    bounds: Bounds,
    dynamic: bool,
    vertex_buffer: Option<wgpu::Buffer>,
    uv_buffer: Option<wgpu::Buffer>,
    index_buffer: Option<wgpu::Buffer>,
}

impl GpuMesh {
    fn new(device: wgpu::Device, queue: wgpu::Queue, label: &str) -> Self {
        Self {
            device,
            queue,
            label: label.to_string(),
            vertices: Vec::new(),
            uvs: Vec::new(),
            indices: Vec::new(),
            indices_dirty: false,
            topology: Topology::Points,
            bounds: Bounds::generous(),
            dynamic: false,
            vertex_buffer: None,
            uv_buffer: None,
            index_buffer: None,
        }
    }

    pub fn vertex_buffer(&self) -> Option<&wgpu::Buffer> {
        self.vertex_buffer.as_ref()
    }

    pub fn uv_buffer(&self) -> Option<&wgpu::Buffer> {
        self.uv_buffer.as_ref()
    }

    pub fn index_buffer(&self) -> Option<&wgpu::Buffer> {
        self.index_buffer.as_ref()
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn primitive_topology(&self) -> wgpu::PrimitiveTopology {
        self.topology.to_wgpu()
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    fn write_attribute(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        slot: &mut Option<wgpu::Buffer>,
        label: &str,
        usage: wgpu::BufferUsages,
        bytes: &[u8],
    ) {
        if bytes.is_empty() {
            *slot = None;
            return;
        }
        match slot {
            Some(buffer) if buffer.size() == bytes.len() as u64 => {
                queue.write_buffer(buffer, 0, bytes);
            }
            _ => {
                debug!("Creating {} ({} bytes)", label, bytes.len());
                *slot = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytes,
                    usage: usage | wgpu::BufferUsages::COPY_DST,
                }));
            }
        }
    }
}

impl MeshResource for GpuMesh {
    fn set_vertices(&mut self, vertices: &[Vec3]) {
        self.vertices.clear();
        self.vertices.extend_from_slice(vertices);
    }

    fn set_indices(&mut self, indices: &[u32], topology: Topology) -> Result<(), HostError> {
        check_indices(indices, self.vertices.len())?;
        self.indices.clear();
        self.indices.extend_from_slice(indices);
        self.topology = topology;
        self.indices_dirty = true;
        Ok(())
    }

    fn set_uvs(&mut self, uvs: &[Vec2]) -> Result<(), HostError> {
        if uvs.len() != self.vertices.len() {
            return Err(HostError::AttributeLength {
                expected: self.vertices.len(),
                actual: uvs.len(),
            });
        }
        self.uvs.clear();
        self.uvs.extend_from_slice(uvs);
        Ok(())
    }

    fn mark_dynamic(&mut self) {
        self.dynamic = true;
    }

    fn set_bounds(&mut self, bounds: Bounds) {
        self.bounds = bounds;
    }

    fn upload(&mut self, recalculate_bounds: bool) -> Result<(), HostError> {
        if recalculate_bounds {
            self.bounds = fit_bounds(&self.vertices);
        }

        Self::write_attribute(
            &self.device,
            &self.queue,
            &mut self.vertex_buffer,
            &format!("{} Vertices", self.label),
            wgpu::BufferUsages::VERTEX,
            bytemuck::cast_slice(&self.vertices),
        );
        Self::write_attribute(
            &self.device,
            &self.queue,
            &mut self.uv_buffer,
            &format!("{} UVs", self.label),
            wgpu::BufferUsages::VERTEX,
            bytemuck::cast_slice(&self.uvs),
        );
        if self.indices_dirty {
            Self::write_attribute(
                &self.device,
                &self.queue,
                &mut self.index_buffer,
                &format!("{} Indices", self.label),
                wgpu::BufferUsages::INDEX,
                bytemuck::cast_slice(&self.indices),
            );
            self.indices_dirty = false;
        }
        Ok(())
    }

    fn vertex_count(&self) -> usize {
        self.vertices.len()
    }
}

/// 2D texture that can be written from and read back to the CPU.
pub struct GpuTexture {
    device: wgpu::Device,
    queue: wgpu::Queue,
    label: String,
    format: TextureFormat,
    wgpu_format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    texture: wgpu::Texture,
}

impl GpuTexture {
    fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        label: &str,
        format: TextureFormat,
        wgpu_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let texture = create_texture(&device, label, wgpu_format, width, height);
        Self {
            device,
            queue,
            label: label.to_string(),
            format,
            wgpu_format,
            width,
            height,
            texture,
        }
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width.max(1),
            height: self.height.max(1),
            depth_or_array_layers: 1,
        }
    }
}

impl TextureResource for GpuTexture {
    fn format(&self) -> TextureFormat {
        self.format
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        self.width = width;
        self.height = height;
        self.texture = create_texture(&self.device, &self.label, self.wgpu_format, width, height);
    }

    fn load_raw(&mut self, data: &[u8]) -> Result<(), HostError> {
        check_texture_len(self.format, self.width, self.height, data.len())?;
        if data.is_empty() {
            return Ok(());
        }
        let bytes_per_row = self.width * self.format.bytes_per_texel() as u32;
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(self.height),
            },
            self.extent(),
        );
        Ok(())
    }

    fn raw_data(&self) -> Result<Vec<u8>, HostError> {
        if self.width == 0 || self.height == 0 {
            return Ok(Vec::new());
        }
        let row_bytes = self.width * self.format.bytes_per_texel() as u32;
        let padded_row_bytes = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Texture Readback Buffer"),
            size: padded_row_bytes as u64 * self.height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Texture Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes),
                    rows_per_image: Some(self.height),
                },
            },
            self.extent(),
        );
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        // Native backends only run map callbacks while the device is polled
        let start = Instant::now();
        loop {
            let _ = self.device.poll(wgpu::PollType::Poll);
            if let Ok(result) = receiver.try_recv() {
                result.map_err(|e| HostError::Readback(e.to_string()))?;
                break;
            }
            if start.elapsed() > READBACK_TIMEOUT {
                return Err(HostError::Readback(
                    "timeout waiting for buffer mapping".into(),
                ));
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        let mapped = buffer_slice.get_mapped_range();
        let mut data = Vec::with_capacity(row_bytes as usize * self.height as usize);
        for row in mapped.chunks_exact(padded_row_bytes as usize) {
            data.extend_from_slice(&row[..row_bytes as usize]);
        }
        drop(mapped);
        staging_buffer.unmap();
        Ok(data)
    }
}

fn create_texture(
    device: &wgpu::Device,
    label: &str,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{MeshSync, POSITION_TEXTURE_SLOT, UV_TEXTURE_SLOT};
    use depthcloud_data::{PointFrame, QuantizationCodec, StreamProfile};
    use pollster::FutureExt;

    fn test_host() -> Option<GpuHost> {
        match Renderer::new_headless().block_on() {
            Ok(renderer) => Some(renderer.host()),
            Err(e) => {
                eprintln!("Skipping GPU test: {e}");
                None
            }
        }
    }

    #[test]
    fn test_rgb_textures_unsupported() {
        let Some(mut host) = test_host() else {
            return;
        };
        assert!(!host.supports_texture_format(TextureFormat::Rgb8Unorm));
        assert!(matches!(
            host.create_texture("positions", TextureFormat::Rgb8Unorm, 2, 2),
            Err(HostError::UnsupportedFormat(TextureFormat::Rgb8Unorm))
        ));
    }

    #[test]
    fn test_texture_round_trip_with_row_padding() {
        let Some(mut host) = test_host() else {
            return;
        };
        // 3 texels * 4 bytes = 12 byte rows, padded to 256 for the copy
        let mut texture = host
            .create_texture("positions", TextureFormat::Rgba8Unorm, 3, 2)
            .unwrap();
        let data: Vec<u8> = (0..24).collect();
        texture.load_raw(&data).unwrap();
        assert_eq!(texture.raw_data().unwrap(), data);

        texture.resize(2, 2);
        let floats: Vec<u8> = bytemuck::cast_slice(&[0.25f32; 4]).to_vec();
        let mut uvs = host
            .create_texture("uvs", TextureFormat::Rg32Float, 2, 1)
            .unwrap();
        uvs.load_raw(&floats).unwrap();
        assert_eq!(uvs.raw_data().unwrap(), floats);
    }

    #[test]
    fn test_mesh_buffers_follow_size() {
        let Some(mut host) = test_host() else {
            return;
        };
        let mut mesh = host.create_mesh("points");
        mesh.set_vertices(&[Vec3::ZERO; 4]);
        mesh.set_indices(&[0, 1, 2, 3], Topology::Points).unwrap();
        mesh.set_uvs(&[Vec2::ZERO; 4]).unwrap();
        mesh.upload(false).unwrap();

        assert_eq!(mesh.vertex_buffer().unwrap().size(), 48);
        assert_eq!(mesh.uv_buffer().unwrap().size(), 32);
        assert_eq!(mesh.index_buffer().unwrap().size(), 16);
        assert_eq!(mesh.primitive_topology(), wgpu::PrimitiveTopology::PointList);

        mesh.set_vertices(&[Vec3::ONE; 2]);
        mesh.set_indices(&[0, 1], Topology::Points).unwrap();
        mesh.set_uvs(&[Vec2::ZERO; 2]).unwrap();
        mesh.upload(true).unwrap();
        assert_eq!(mesh.vertex_buffer().unwrap().size(), 24);
        assert_eq!(mesh.index_count(), 2);
        assert_eq!(mesh.bounds().center, Vec3::ONE);
    }

    #[test]
    fn test_bound_views_are_recorded() {
        let Some(mut host) = test_host() else {
            return;
        };
        let texture = host
            .create_texture("uvs", TextureFormat::Rg32Float, 1, 1)
            .unwrap();
        host.bind_texture("_UVMap", &texture);
        assert!(host.binding("_UVMap").is_some());
        assert!(host.binding("_PositionTex").is_none());
    }

    fn varied_frame(width: u32, height: u32) -> PointFrame {
        let count = (width * height) as usize;
        let vertices = (0..count)
            .map(|i| {
                Vec3::new(
                    (i % 7) as f32 * 0.5 - 1.5,
                    (i % 5) as f32 * 0.3 - 0.6,
                    0.5 + (i % 11) as f32 * 0.4,
                )
            })
            .collect();
        let tex_coords = (0..count)
            .map(|i| Vec2::new((i % 3) as f32 * 0.25, (i % 2) as f32 * 0.5))
            .collect();
        PointFrame::new(
            StreamProfile::depth(width, height, 30),
            vertices,
            Some(tex_coords),
            1,
            0.0,
        )
    }

    #[test]
    fn test_mesh_sync_on_gpu_host() {
        let Some(host) = test_host() else {
            return;
        };
        let codec = QuantizationCodec::default();
        let mut sync = MeshSync::new(host, Some(codec), Bounds::generous()).unwrap();

        for (width, height) in [(640, 480), (3, 2)] {
            let frame = varied_frame(width, height);
            sync.apply_frame(&frame).unwrap();

            assert_eq!(sync.dimensions(), (width, height));
            assert_eq!(sync.position_texture().dimensions(), (width, height));
            let mesh = sync.mesh();
            assert_eq!(mesh.vertex_count(), frame.count());
            for (decoded, original) in mesh.vertices.iter().zip(frame.vertices()) {
                let error = (*decoded - *original).abs();
                assert!(
                    error.max_element() <= codec.step(),
                    "{original:?} came back as {decoded:?}"
                );
            }
            let uvs = sync.uv_texture().raw_data().unwrap();
            assert_eq!(uvs, bytemuck::cast_slice::<Vec2, u8>(frame.tex_coords().unwrap()));
        }

        let mesh = sync.mesh();
        assert_eq!(mesh.index_count(), 6);
        assert_eq!(mesh.index_buffer().unwrap().size(), 24);
        assert_eq!(mesh.vertex_buffer().unwrap().size(), 72);
        assert_eq!(mesh.bounds(), Bounds::generous());
        assert!(mesh.is_dynamic());
        assert!(sync.host().binding(POSITION_TEXTURE_SLOT).is_some());
        assert!(sync.host().binding(UV_TEXTURE_SLOT).is_some());
    }
}
