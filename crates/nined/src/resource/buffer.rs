//! Common buffer backing
//!
//! Vertex and index buffers share a [`CommonBuffer`]: descriptor, native
//! buffer when a loader is present, and GPU synchronization state. Buffers
//! participate in the general resource hierarchy (wait-for-resource,
//! registry, losable counting) but are created through the legacy device
//! surface rather than the extended image path.

use ash::vk;
use std::sync::{Arc, Mutex};

use crate::device::Device;
use crate::error::{D3d9Error, D3d9Result};
use crate::resource::{GpuSync, Pool, ResourceKey, ResourceType, Usage};

/// Buffer descriptor
#[derive(Debug, Clone, Copy)]
pub struct BufferDesc {
    /// Size in bytes
    pub size: u64,
    /// Legacy usage flags
    pub usage: Usage,
    /// Residency pool
    pub pool: Pool,
}

/// Shared backing of vertex and index buffers
pub struct CommonBuffer {
    device: Arc<Device>,
    desc: BufferDesc,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    sync: GpuSync,
    registry_key: Mutex<Option<ResourceKey>>,
}

impl CommonBuffer {
    pub(crate) fn new(
        device: &Arc<Device>,
        buffer_type: ResourceType,
        desc: BufferDesc,
    ) -> D3d9Result<Arc<Self>> {
        if desc.size == 0 {
            return Err(D3d9Error::InvalidCall);
        }

        let (buffer, memory) = match device.native() {
            Some(native) => Self::allocate_buffer(native, buffer_type, &desc)?,
            None => (vk::Buffer::null(), vk::DeviceMemory::null()),
        };

        Ok(Arc::new(Self {
            device: Arc::clone(device),
            desc,
            buffer,
            memory,
            sync: GpuSync::default(),
            registry_key: Mutex::new(None),
        }))
    }

    fn allocate_buffer(
        native: &crate::device::NativeDevice,
        buffer_type: ResourceType,
        desc: &BufferDesc,
    ) -> D3d9Result<(vk::Buffer, vk::DeviceMemory)> {
        let device = &native.device;

        let usage = vk::BufferUsageFlags::TRANSFER_SRC
            | vk::BufferUsageFlags::TRANSFER_DST
            | match buffer_type {
                ResourceType::IndexBuffer => vk::BufferUsageFlags::INDEX_BUFFER,
                _ => vk::BufferUsageFlags::VERTEX_BUFFER,
            };

        let create_info = vk::BufferCreateInfo::builder()
            .size(desc.size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device.create_buffer(&create_info, None).map_err(|err| {
                log::error!("Native buffer creation failed: {:?}", err);
                D3d9Error::OutOfVideoMemory
            })?
        };

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory_type = (0..native.memory_props.memory_type_count).find(|&index| {
            (requirements.memory_type_bits & (1 << index)) != 0
                && native.memory_props.memory_types[index as usize]
                    .property_flags
                    .contains(vk::MemoryPropertyFlags::DEVICE_LOCAL)
        });

        let memory_type = match memory_type {
            Some(index) => index,
            None => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(D3d9Error::OutOfVideoMemory);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(err) => {
                log::error!("Native buffer memory allocation failed: {:?}", err);
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(D3d9Error::OutOfVideoMemory);
            }
        };

        if let Err(err) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
            log::error!("Native buffer memory bind failed: {:?}", err);
            unsafe {
                device.free_memory(memory, None);
                device.destroy_buffer(buffer, None);
            }
            return Err(D3d9Error::OutOfVideoMemory);
        }

        Ok((buffer, memory))
    }

    /// Descriptor the buffer was created with
    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    /// Native buffer handle; null when the device has no loader
    pub fn buffer_handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// GPU synchronization state
    pub fn gpu_sync(&self) -> &GpuSync {
        &self.sync
    }

    pub(crate) fn set_registry_key(&self, key: ResourceKey) {
        *self.registry_key.lock().unwrap() = Some(key);
    }
}

impl Drop for CommonBuffer {
    fn drop(&mut self) {
        if let Some(key) = self.registry_key.lock().unwrap().take() {
            self.device.unregister_resource(key);
        }

        if let Some(native) = self.device.native() {
            unsafe {
                if self.buffer != vk::Buffer::null() {
                    native.device.destroy_buffer(self.buffer, None);
                }
                if self.memory != vk::DeviceMemory::null() {
                    native.device.free_memory(self.memory, None);
                }
            }
        }
    }
}

/// Vertex buffer resource
pub struct VertexBuffer {
    common: Arc<CommonBuffer>,
}

impl VertexBuffer {
    pub(crate) fn new(common: Arc<CommonBuffer>) -> Arc<Self> {
        Arc::new(Self { common })
    }

    /// Shared backing of this resource
    pub fn common_buffer(&self) -> &Arc<CommonBuffer> {
        &self.common
    }
}

/// Index buffer resource
pub struct IndexBuffer {
    common: Arc<CommonBuffer>,
}

impl IndexBuffer {
    pub(crate) fn new(common: Arc<CommonBuffer>) -> Arc<Self> {
        Arc::new(Self { common })
    }

    /// Shared backing of this resource
    pub fn common_buffer(&self) -> &Arc<CommonBuffer> {
        &self.common
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::tests::test_device_params;
    use crate::device::Device;

    #[test]
    fn test_zero_sized_buffer_rejected() {
        let device = Device::new(test_device_params());
        let desc = BufferDesc {
            size: 0,
            usage: Usage::WRITE_ONLY,
            pool: Pool::Default,
        };
        assert!(matches!(
            CommonBuffer::new(&device, ResourceType::VertexBuffer, desc),
            Err(D3d9Error::InvalidCall)
        ));
    }

    #[test]
    fn test_buffer_without_loader_has_null_handle() {
        let device = Device::new(test_device_params());
        let desc = BufferDesc {
            size: 1024,
            usage: Usage::WRITE_ONLY,
            pool: Pool::Managed,
        };
        let buffer = CommonBuffer::new(&device, ResourceType::IndexBuffer, desc).unwrap();
        assert_eq!(buffer.buffer_handle(), vk::Buffer::null());
        assert_eq!(buffer.desc().size, 1024);
    }
}
