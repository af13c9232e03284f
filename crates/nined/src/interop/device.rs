//! Interop surface of an imported device
//!
//! The host reaches through [`InteropDevice`] to interleave its own native
//! work with the translation layer: layout transitions ride the device
//! command stream in strict order, flushes drain it completely, and the two
//! cooperative locks fence direct queue access and device-wide state.

use ash::vk;
use std::sync::Arc;

use crate::device::{Device, DeviceHandles};
use crate::error::{D3d9Error, D3d9Result};
use crate::format::D3d9Format;
use crate::resource::buffer::{BufferDesc, CommonBuffer};
use crate::resource::texture::{CommonTexture, TextureDesc};
use crate::resource::{
    IndexBuffer, LockFlags, MultiSampleType, Pool, Resource, ResourceType, Surface, Texture2D,
    Texture3D, TextureCube, Usage, VertexBuffer,
};

/// Extended image-creation descriptor
///
/// Richer than what the legacy creation entry points accept: it addresses
/// every image-backed resource type through one call and can request extra
/// native usage bits.
#[derive(Debug, Clone, Copy)]
pub struct ExtImageDesc {
    /// Resource type to create
    pub resource_type: ResourceType,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Depth in texels
    pub depth: u32,
    /// Mip level count; 0 requests a full chain
    pub mip_levels: u32,
    /// Legacy usage flags
    pub usage: Usage,
    /// Legacy pixel format
    pub format: D3d9Format,
    /// Residency pool
    pub pool: Pool,
    /// Contents may be discarded on lock
    pub discard: bool,
    /// Multisample level
    pub multi_sample: MultiSampleType,
    /// Multisample quality level
    pub multisample_quality: u32,
    /// Resource is only ever an attachment, never sampled
    pub is_attachment_only: bool,
    /// Resource can be mapped by the application
    pub is_lockable: bool,
    /// Extra native usage bits to enable on the image
    pub image_usage: vk::ImageUsageFlags,
}

/// Interop handle to an imported device
#[derive(Clone)]
pub struct InteropDevice {
    device: Arc<Device>,
}

impl InteropDevice {
    /// Interop handle over a device
    pub fn new(device: Arc<Device>) -> Self {
        Self { device }
    }

    /// Underlying translation device
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Native handles the device was imported with
    ///
    /// Informational; no ownership transfers.
    pub fn get_vulkan_handles(&self) -> DeviceHandles {
        *self.device.handles()
    }

    /// Queue the command stream submits to, with its family index
    pub fn get_submission_queue(&self) -> (vk::Queue, u32) {
        let handles = self.device.handles();
        (handles.queue, handles.queue_family)
    }

    /// Enqueue an image layout transition on the device command stream
    ///
    /// Non-blocking; the transition executes in strict order relative to
    /// every other operation enqueued for this device.
    pub fn transition_texture_layout(
        &self,
        texture: &Arc<CommonTexture>,
        range: vk::ImageSubresourceRange,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) {
        let image = Arc::clone(texture);
        self.device.emit_cs(
            Box::new(move |ctx| {
                ctx.transform_image(image, range, old_layout, new_layout);
            }),
            Some(texture.gpu_sync()),
        );
    }

    /// Force submission of buffered work and block until it has executed
    pub fn flush_rendering_commands(&self) {
        self.device.flush();
        self.device.synchronize_cs();
    }

    /// Take the cooperative token fencing direct native-queue submission
    ///
    /// The command-stream worker checks the token before each submission
    /// batch. Not reentrant.
    pub fn lock_submission_queue(&self) {
        self.device.queue_lock().acquire();
    }

    /// Release the submission-queue token
    pub fn release_submission_queue(&self) {
        self.device.queue_lock().release();
    }

    /// Take the coarse lock over device-wide mutable state
    pub fn lock_device(&self) {
        self.device.device_lock().acquire();
    }

    /// Release the device lock; a no-op when not held
    pub fn unlock_device(&self) {
        self.device.device_lock().release();
    }

    /// Block until pending native work referencing the resource completes
    ///
    /// Returns true when the resource is safe to access. With
    /// [`LockFlags::DONOTWAIT`] the call never blocks and returns false
    /// while work is still pending.
    pub fn wait_for_resource(&self, resource: &Resource, flags: LockFlags) -> bool {
        self.device.wait_for_resource(resource.gpu_sync(), flags)
    }

    /// Create an image-backed resource from an extended descriptor
    ///
    /// Validation is ordered and short-circuiting; the first violated rule
    /// decides the error. The native image is created immediately but its
    /// initial layout transition rides the command stream.
    pub fn create_image(&self, desc: &ExtImageDesc) -> D3d9Result<Resource> {
        match desc.resource_type {
            ResourceType::Surface
            | ResourceType::Texture
            | ResourceType::CubeTexture
            | ResourceType::VolumeTexture => {}
            _ => return Err(D3d9Error::InvalidCall),
        }

        if desc.depth > 1 && desc.resource_type != ResourceType::VolumeTexture {
            return Err(D3d9Error::InvalidCall);
        }

        if desc.resource_type == ResourceType::Surface {
            if desc.mip_levels > 1 {
                return Err(D3d9Error::InvalidCall);
            }
            if desc.multi_sample.sample_count() > self.device.caps().max_sample_count {
                return Err(D3d9Error::InvalidCall);
            }
        } else if desc.multi_sample != MultiSampleType::None {
            return Err(D3d9Error::InvalidCall);
        }

        let array_size = match desc.resource_type {
            ResourceType::CubeTexture => 6,
            _ => 1,
        };

        let mut texture_desc = TextureDesc {
            width: desc.width,
            height: desc.height,
            depth: desc.depth,
            array_size,
            mip_levels: desc.mip_levels,
            usage: desc.usage,
            format: desc.format,
            pool: desc.pool,
            discard: desc.discard,
            multi_sample: desc.multi_sample,
            multisample_quality: desc.multisample_quality,
            is_back_buffer: false,
            is_attachment_only: desc.is_attachment_only,
            is_lockable: desc.is_lockable,
            image_usage: desc.image_usage,
        };

        // Surfaces obey the same dimension rules as plain 2D textures
        let validation_type = match desc.resource_type {
            ResourceType::Surface => ResourceType::Texture,
            other => other,
        };
        let mapping =
            CommonTexture::normalize_desc(&self.device, validation_type, &mut texture_desc)?;

        let pool = texture_desc.pool;
        let common = CommonTexture::new(
            &self.device,
            desc.resource_type,
            texture_desc,
            mapping,
        )?;

        self.device.initializer().init_texture(&self.device, &common);
        let key = self.device.register_resource(desc.resource_type, pool);
        common.set_registry_key(key);

        Ok(match desc.resource_type {
            ResourceType::Surface => Resource::Surface(Surface::new(common)),
            ResourceType::Texture => Resource::Texture(Texture2D::new(common)),
            ResourceType::VolumeTexture => Resource::VolumeTexture(Texture3D::new(common)),
            ResourceType::CubeTexture => Resource::CubeTexture(TextureCube::new(common)),
            _ => unreachable!("validated above"),
        })
    }

    /// Create a vertex buffer
    pub fn create_vertex_buffer(&self, desc: &BufferDesc) -> D3d9Result<Resource> {
        let common = self.create_buffer(ResourceType::VertexBuffer, desc)?;
        Ok(Resource::VertexBuffer(VertexBuffer::new(common)))
    }

    /// Create an index buffer
    pub fn create_index_buffer(&self, desc: &BufferDesc) -> D3d9Result<Resource> {
        let common = self.create_buffer(ResourceType::IndexBuffer, desc)?;
        Ok(Resource::IndexBuffer(IndexBuffer::new(common)))
    }

    fn create_buffer(
        &self,
        buffer_type: ResourceType,
        desc: &BufferDesc,
    ) -> D3d9Result<Arc<CommonBuffer>> {
        let common = CommonBuffer::new(&self.device, buffer_type, *desc)?;

        self.device.initializer().init_buffer(&self.device, &common);
        let key = self.device.register_resource(buffer_type, desc.pool);
        common.set_registry_key(key);

        Ok(common)
    }
}
