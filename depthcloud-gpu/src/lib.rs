//! Depthcloud GPU Crate
//!
//! Render-side half of the pipeline. [`MeshSync`] keeps a point mesh, a
//! quantized position texture and a color lookup texture up to date with
//! the newest point frame, against any [`RenderHost`]:
//!
//! - [`MemoryHost`] keeps everything in CPU memory
//! - [`GpuHost`] creates wgpu buffers and textures

pub mod gpu;
pub mod host;
pub mod memory;
pub mod sync;

pub use gpu::{GpuHost, GpuMesh, GpuTexture, Renderer, RendererError};
pub use host::{HostError, MeshResource, RenderHost, TextureFormat, TextureResource, Topology};
pub use memory::{MemoryHost, MemoryMesh, MemoryTexture};
pub use sync::{MeshSync, POSITION_TEXTURE_SLOT, SyncError, UV_TEXTURE_SLOT, grid_uvs};
