//! Legacy resource object model
//!
//! Resources own a native image or buffer, carry a legacy type tag and a
//! residency pool classification, and are reference counted through `Arc`.
//! The concrete subtypes live in the submodules; [`Resource`] is the handle
//! enum the interop surface traffics in.

pub mod buffer;
pub mod initializer;
pub mod texture;
pub mod volume;

use ash::vk;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub use buffer::{BufferDesc, CommonBuffer, IndexBuffer, VertexBuffer};
pub use initializer::Initializer;
pub use texture::{CommonTexture, Surface, Texture2D, Texture3D, TextureCube, TextureDesc};
pub use volume::Volume;

slotmap::new_key_type! {
    /// Key into the device's live-resource registry
    pub struct ResourceKey;
}

/// Legacy resource type tags
///
/// Numeric values follow the legacy convention. `Volume` exists as a tag but
/// cannot be created as a standalone resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ResourceType {
    /// Standalone 2D surface
    Surface = 1,
    /// Slice of a volume texture; never a standalone resource
    Volume = 2,
    /// 2D texture
    Texture = 3,
    /// 3D texture
    VolumeTexture = 4,
    /// Cube texture, always six faces
    CubeTexture = 5,
    /// Vertex buffer
    VertexBuffer = 6,
    /// Index buffer
    IndexBuffer = 7,
}

/// Residency pool classification
///
/// Governs who is responsible for eviction and recreation. Default-pool
/// resources are lost on device loss and counted by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Pool {
    /// Video memory; destroyed and recreated on device loss
    Default = 0,
    /// Runtime-managed with a system-memory backup copy
    Managed = 1,
    /// System memory
    SystemMem = 2,
    /// Scratch memory, never bound to the device
    Scratch = 3,
}

/// Legacy multisample levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MultiSampleType {
    /// No multisampling
    None = 0,
    /// Driver-chosen sample count selected through the quality level
    NonMaskable = 1,
    /// 2x
    Samples2 = 2,
    /// 4x
    Samples4 = 4,
    /// 8x
    Samples8 = 8,
    /// 16x
    Samples16 = 16,
}

impl MultiSampleType {
    /// Effective sample count of this level
    pub fn sample_count(self) -> u32 {
        match self {
            MultiSampleType::None | MultiSampleType::NonMaskable => 1,
            other => other as u32,
        }
    }

    /// Vulkan sample-count flag for this level
    pub fn to_vk(self) -> vk::SampleCountFlags {
        // Sample-count flag bits equal the counts themselves
        vk::SampleCountFlags::from_raw(self.sample_count())
    }
}

bitflags::bitflags! {
    /// Legacy resource usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Usage: u32 {
        /// Resource is a render target
        const RENDER_TARGET = 0x0000_0001;
        /// Resource is a depth-stencil attachment
        const DEPTH_STENCIL = 0x0000_0002;
        /// Resource is written every frame
        const DYNAMIC = 0x0000_0200;
        /// Mip chain is regenerated automatically
        const AUTOGEN_MIPMAP = 0x0000_0400;
        /// Buffer is only ever written by the application
        const WRITE_ONLY = 0x0000_0008;
        /// Vertex processing happens in software
        const SOFTWARE_PROCESSING = 0x0000_0010;
    }

    /// Legacy lock/map flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LockFlags: u32 {
        /// Caller will not write through the mapping
        const READONLY = 0x0000_0010;
        /// Previous contents may be discarded
        const DISCARD = 0x0000_2000;
        /// Caller promises not to overwrite in-flight data
        const NOOVERWRITE = 0x0000_1000;
        /// Do not take the global system lock
        const NOSYSLOCK = 0x0000_0800;
        /// Fail instead of blocking when the resource is busy
        const DONOTWAIT = 0x0000_4000;
        /// Do not mark the locked region dirty
        const NO_DIRTY_UPDATE = 0x0000_8000;
    }
}

/// GPU synchronization state shared by every resource
///
/// Tracks the command-stream sequence number of the last enqueued operation
/// that references the resource's backing memory. The backing must not be
/// freed while that operation is outstanding; closures hold strong
/// references for their own lifetime, which enforces this.
#[derive(Debug, Default)]
pub struct GpuSync {
    pending: AtomicU64,
}

impl GpuSync {
    /// Record that an operation with the given sequence number references
    /// this resource
    pub fn track(&self, seq: u64) {
        self.pending.fetch_max(seq, Ordering::Release);
    }

    /// Sequence number of the most recent operation referencing the resource
    pub fn pending_seq(&self) -> u64 {
        self.pending.load(Ordering::Acquire)
    }
}

/// Reference-counted handle to a concrete resource
///
/// `Volume` is deliberately absent: it lacks standalone reference counting
/// and is reachable only through its parent volume texture.
#[derive(Clone)]
pub enum Resource {
    /// Standalone surface
    Surface(Arc<Surface>),
    /// 2D texture
    Texture(Arc<Texture2D>),
    /// 3D texture
    VolumeTexture(Arc<Texture3D>),
    /// Cube texture
    CubeTexture(Arc<TextureCube>),
    /// Vertex buffer
    VertexBuffer(Arc<VertexBuffer>),
    /// Index buffer
    IndexBuffer(Arc<IndexBuffer>),
}

impl Resource {
    /// Legacy type tag of this resource
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Resource::Surface(_) => ResourceType::Surface,
            Resource::Texture(_) => ResourceType::Texture,
            Resource::VolumeTexture(_) => ResourceType::VolumeTexture,
            Resource::CubeTexture(_) => ResourceType::CubeTexture,
            Resource::VertexBuffer(_) => ResourceType::VertexBuffer,
            Resource::IndexBuffer(_) => ResourceType::IndexBuffer,
        }
    }

    /// Residency pool of this resource
    pub fn pool(&self) -> Pool {
        match self {
            Resource::Surface(r) => r.common_texture().desc().pool,
            Resource::Texture(r) => r.common_texture().desc().pool,
            Resource::VolumeTexture(r) => r.common_texture().desc().pool,
            Resource::CubeTexture(r) => r.common_texture().desc().pool,
            Resource::VertexBuffer(r) => r.common_buffer().desc().pool,
            Resource::IndexBuffer(r) => r.common_buffer().desc().pool,
        }
    }

    /// GPU synchronization state of the backing object
    pub fn gpu_sync(&self) -> &GpuSync {
        match self {
            Resource::Surface(r) => r.common_texture().gpu_sync(),
            Resource::Texture(r) => r.common_texture().gpu_sync(),
            Resource::VolumeTexture(r) => r.common_texture().gpu_sync(),
            Resource::CubeTexture(r) => r.common_texture().gpu_sync(),
            Resource::VertexBuffer(r) => r.common_buffer().gpu_sync(),
            Resource::IndexBuffer(r) => r.common_buffer().gpu_sync(),
        }
    }

    /// Backing common texture, when the resource is image-backed
    pub fn common_texture(&self) -> Option<&Arc<CommonTexture>> {
        match self {
            Resource::Surface(r) => Some(r.common_texture()),
            Resource::Texture(r) => Some(r.common_texture()),
            Resource::VolumeTexture(r) => Some(r.common_texture()),
            Resource::CubeTexture(r) => Some(r.common_texture()),
            Resource::VertexBuffer(_) | Resource::IndexBuffer(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multisample_counts() {
        assert_eq!(MultiSampleType::None.sample_count(), 1);
        assert_eq!(MultiSampleType::NonMaskable.sample_count(), 1);
        assert_eq!(MultiSampleType::Samples4.sample_count(), 4);
        assert_eq!(
            MultiSampleType::Samples8.to_vk(),
            vk::SampleCountFlags::TYPE_8
        );
    }

    #[test]
    fn test_gpu_sync_tracks_newest_sequence() {
        let sync = GpuSync::default();
        assert_eq!(sync.pending_seq(), 0);

        sync.track(5);
        sync.track(3);
        assert_eq!(sync.pending_seq(), 5);
    }

    #[test]
    fn test_legacy_type_tag_values() {
        assert_eq!(ResourceType::Surface as u32, 1);
        assert_eq!(ResourceType::Volume as u32, 2);
        assert_eq!(ResourceType::CubeTexture as u32, 5);
        assert_eq!(ResourceType::IndexBuffer as u32, 7);
    }
}
