//! Volume slices
//!
//! A volume is one mip level of a volume texture. Unlike every other
//! resource kind it has no standalone identity: it cannot be created on its
//! own, carries no independent reference count, and is reachable only
//! through its parent. It therefore lives outside the [`Resource`] handle
//! enum as a reduced capability subset.
//!
//! [`Resource`]: crate::resource::Resource

use ash::vk;
use std::sync::Arc;

use crate::resource::CommonTexture;

/// One mip level of a volume texture
pub struct Volume {
    texture: Arc<CommonTexture>,
    mip_level: u32,
}

impl Volume {
    pub(crate) fn new(texture: &Arc<CommonTexture>, mip_level: u32) -> Option<Self> {
        if mip_level >= texture.image_params().mip_levels {
            return None;
        }
        Some(Self {
            texture: Arc::clone(texture),
            mip_level,
        })
    }

    /// Mip level this volume covers
    pub fn mip_level(&self) -> u32 {
        self.mip_level
    }

    /// Extent of this mip level
    pub fn extent(&self) -> vk::Extent3D {
        let base = self.texture.image_params().extent;
        vk::Extent3D {
            width: (base.width >> self.mip_level).max(1),
            height: (base.height >> self.mip_level).max(1),
            depth: (base.depth >> self.mip_level).max(1),
        }
    }

    /// Native image shared with the parent texture
    pub fn image_handle(&self) -> vk::Image {
        self.texture.image_handle()
    }

    /// Parent texture backing
    pub fn texture(&self) -> &Arc<CommonTexture> {
        &self.texture
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::tests::test_device_params;
    use crate::device::Device;
    use crate::format::D3d9Format;
    use crate::resource::{MultiSampleType, Pool, ResourceType, TextureDesc, Usage};

    fn volume_texture(device: &Arc<Device>) -> Arc<CommonTexture> {
        let mut desc = TextureDesc {
            width: 64,
            height: 64,
            depth: 32,
            array_size: 1,
            mip_levels: 0,
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
            CommonTexture::normalize_desc(device, ResourceType::VolumeTexture, &mut desc).unwrap();
        CommonTexture::new(device, ResourceType::VolumeTexture, desc, mapping).unwrap()
    }

    #[test]
    fn test_volume_mip_extents() {
        let device = Device::new(test_device_params());
        let texture = volume_texture(&device);

        let base = Volume::new(&texture, 0).unwrap();
        assert_eq!(base.extent().width, 64);
        assert_eq!(base.extent().depth, 32);

        let tail = Volume::new(&texture, 6).unwrap();
        assert_eq!(tail.extent().width, 1);
        assert_eq!(tail.extent().depth, 1);
    }

    #[test]
    fn test_out_of_range_mip_rejected() {
        let device = Device::new(test_device_params());
        let texture = volume_texture(&device);
        assert!(Volume::new(&texture, 7).is_none());
    }
}
