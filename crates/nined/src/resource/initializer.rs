//! Deferred resource initialization
//!
//! Freshly created resources are handed here instead of being initialized
//! synchronously: the initializer enqueues the native-side setup (the
//! transition out of the undefined layout, and eventually the clear) on the
//! device's command stream, so creation never stalls on the GPU.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::resource::{CommonBuffer, CommonTexture};

/// Deferred-initialization collaborator, one per device
#[derive(Debug, Default)]
pub struct Initializer {
    outstanding: Arc<AtomicU32>,
}

impl Initializer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Enqueue native-side setup for a new texture
    ///
    /// The closure holds a strong reference; the backing image cannot be
    /// freed before the setup has executed.
    pub(crate) fn init_texture(&self, device: &Device, texture: &Arc<CommonTexture>) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        let outstanding = Arc::clone(&self.outstanding);

        let image = Arc::clone(texture);
        let range = texture.full_subresource_range();
        let layout = texture.default_layout();

        device.emit_cs(
            Box::new(move |ctx| {
                ctx.transform_image(image, range, vk::ImageLayout::UNDEFINED, layout);
                outstanding.fetch_sub(1, Ordering::AcqRel);
            }),
            Some(texture.gpu_sync()),
        );
    }

    /// Enqueue native-side setup for a new buffer
    pub(crate) fn init_buffer(&self, device: &Device, buffer: &Arc<CommonBuffer>) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        let outstanding = Arc::clone(&self.outstanding);

        let keepalive = Arc::clone(buffer);
        device.emit_cs(
            Box::new(move |_ctx| {
                // Buffer contents start undefined; nothing to record yet
                drop(keepalive);
                outstanding.fetch_sub(1, Ordering::AcqRel);
            }),
            Some(buffer.gpu_sync()),
        );
    }

    /// Number of initializations still queued
    pub fn outstanding(&self) -> u32 {
        self.outstanding.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::tests::test_device_params;
    use crate::format::D3d9Format;
    use crate::resource::{MultiSampleType, Pool, ResourceType, TextureDesc, Usage};

    #[test]
    fn test_init_tracks_sequence_and_drains() {
        let device = Device::new(test_device_params());
        let mut desc = TextureDesc {
            width: 16,
            height: 16,
            depth: 1,
            array_size: 1,
            mip_levels: 1,
            usage: Usage::empty(),
            format: D3d9Format::A8R8G8B8,
            pool: Pool::Managed,
            discard: false,
            multi_sample: MultiSampleType::None,
            multisample_quality: 0,
            is_back_buffer: false,
            is_attachment_only: false,
            is_lockable: true,
            image_usage: vk::ImageUsageFlags::empty(),
        };
        let mapping =
            CommonTexture::normalize_desc(&device, ResourceType::Texture, &mut desc).unwrap();
        let texture = CommonTexture::new(&device, ResourceType::Texture, desc, mapping).unwrap();

        device.initializer().init_texture(&device, &texture);
        assert!(texture.gpu_sync().pending_seq() > 0);

        device.synchronize_cs();
        assert_eq!(device.initializer().outstanding(), 0);
    }
}
