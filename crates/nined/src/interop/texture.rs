//! Interop view over an image-backed resource

use ash::vk;
use std::sync::Arc;

use crate::error::{D3d9Error, D3d9Result};
use crate::resource::texture::CommonTexture;
use crate::resource::Resource;

/// Non-owning interop view of an image-backed resource
///
/// Purely informational: the view borrows the backing texture and transfers
/// no ownership of the native image.
pub struct InteropTexture<'a> {
    texture: &'a Arc<CommonTexture>,
}

impl<'a> InteropTexture<'a> {
    /// View over a common texture
    pub fn new(texture: &'a Arc<CommonTexture>) -> Self {
        Self { texture }
    }

    /// View over a resource, when it is image-backed
    pub fn from_resource(resource: &'a Resource) -> Option<Self> {
        resource.common_texture().map(Self::new)
    }

    /// Backing texture
    pub fn texture(&self) -> &Arc<CommonTexture> {
        self.texture
    }

    /// Report the native image handle, its default layout, and the
    /// parameters it was created with
    ///
    /// Every out-parameter is optional. The create-info structure is
    /// synthesized from the recorded creation parameters; extended structure
    /// chains are not supported, so a create-info carrying a non-null
    /// `p_next` (or the wrong structure type) is an invalid call.
    pub fn get_vulkan_image_info(
        &self,
        handle_out: Option<&mut vk::Image>,
        layout_out: Option<&mut vk::ImageLayout>,
        info_out: Option<&mut vk::ImageCreateInfo>,
    ) -> D3d9Result<()> {
        if let Some(info) = &info_out {
            if info.s_type != vk::StructureType::IMAGE_CREATE_INFO || !info.p_next.is_null() {
                return Err(D3d9Error::InvalidCall);
            }
        }

        if let Some(handle) = handle_out {
            *handle = self.texture.image_handle();
        }
        if let Some(layout) = layout_out {
            *layout = self.texture.default_layout();
        }
        if let Some(info) = info_out {
            let params = self.texture.image_params();
            info.flags = params.flags;
            info.image_type = params.image_type;
            info.format = params.format;
            info.extent = params.extent;
            info.mip_levels = params.mip_levels;
            info.array_layers = params.array_layers;
            info.samples = params.samples;
            info.tiling = params.tiling;
            info.usage = params.usage;
            info.sharing_mode = vk::SharingMode::EXCLUSIVE;
            info.queue_family_index_count = 0;
            info.p_queue_family_indices = std::ptr::null();
            info.initial_layout = vk::ImageLayout::UNDEFINED;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::tests::test_device_params;
    use crate::device::Device;
    use crate::format::D3d9Format;
    use crate::resource::texture::{CommonTexture, TextureDesc};
    use crate::resource::{MultiSampleType, Pool, ResourceType, Usage};

    fn test_texture() -> Arc<CommonTexture> {
        let device = Device::new(test_device_params());
        let mut desc = TextureDesc {
            width: 256,
            height: 128,
            depth: 1,
            array_size: 1,
            mip_levels: 1,
            usage: Usage::empty(),
            format: D3d9Format::A8R8G8B8,
            pool: Pool::Default,
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
        CommonTexture::new(&device, ResourceType::Texture, desc, mapping).unwrap()
    }

    #[test]
    fn test_image_info_reports_creation_parameters() {
        let texture = test_texture();
        let view = InteropTexture::new(&texture);

        let mut handle = vk::Image::null();
        let mut layout = vk::ImageLayout::UNDEFINED;
        let mut info = vk::ImageCreateInfo::default();

        view.get_vulkan_image_info(
            Some(&mut handle),
            Some(&mut layout),
            Some(&mut info),
        )
        .unwrap();

        assert_eq!(layout, texture.default_layout());
        assert_eq!(info.image_type, vk::ImageType::TYPE_2D);
        assert_eq!(info.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(info.extent.width, 256);
        assert_eq!(info.extent.height, 128);
        assert_eq!(info.sharing_mode, vk::SharingMode::EXCLUSIVE);
        assert_eq!(info.initial_layout, vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn test_image_info_rejects_extension_chain() {
        let texture = test_texture();
        let view = InteropTexture::new(&texture);

        let chained = vk::ImageFormatListCreateInfo::default();
        let mut info = vk::ImageCreateInfo::default();
        info.p_next = &chained as *const _ as *const std::ffi::c_void;

        assert_eq!(
            view.get_vulkan_image_info(None, None, Some(&mut info)),
            Err(D3d9Error::InvalidCall)
        );
    }

    #[test]
    fn test_image_info_rejects_wrong_structure_type() {
        let texture = test_texture();
        let view = InteropTexture::new(&texture);

        let mut info = vk::ImageCreateInfo::default();
        info.s_type = vk::StructureType::BUFFER_CREATE_INFO;

        assert_eq!(
            view.get_vulkan_image_info(None, None, Some(&mut info)),
            Err(D3d9Error::InvalidCall)
        );
    }

    #[test]
    fn test_all_out_parameters_optional() {
        let texture = test_texture();
        let view = InteropTexture::new(&texture);
        view.get_vulkan_image_info(None, None, None).unwrap();
    }
}
