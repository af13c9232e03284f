//! Common texture backing
//!
//! Every image-backed legacy resource (surface, 2D/3D/cube texture) shares a
//! [`CommonTexture`]: the validated descriptor, the derived native image
//! parameters, and the native image itself when the device runs with a live
//! loader. Validation and normalization happen here; the interop factory
//! calls into them before constructing a concrete subtype.

use ash::vk;
use std::sync::{Arc, Mutex};

use crate::device::Device;
use crate::error::{D3d9Error, D3d9Result};
use crate::format::{format_mapping, D3d9Format, FormatMapping};
use crate::resource::{GpuSync, MultiSampleType, Pool, ResourceKey, ResourceType, Usage};

/// Validated texture descriptor
#[derive(Debug, Clone, Copy)]
pub struct TextureDesc {
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Depth in texels; 1 unless the resource is a volume texture
    pub depth: u32,
    /// Array size; 6 for cube textures, 1 otherwise
    pub array_size: u32,
    /// Number of mip levels; 0 requests a full chain
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
    /// Resource backs a swap chain
    pub is_back_buffer: bool,
    /// Resource is only ever an attachment, never sampled
    pub is_attachment_only: bool,
    /// Resource can be mapped by the application
    pub is_lockable: bool,
    /// Extra Vulkan usage bits requested through the extended descriptor
    pub image_usage: vk::ImageUsageFlags,
}

/// Native image parameters derived from a validated descriptor
///
/// Recorded at creation so the interop view can report them without
/// re-deriving creation history.
#[derive(Debug, Clone, Copy)]
pub struct ImageCreateParams {
    /// Image create flags
    pub flags: vk::ImageCreateFlags,
    /// Image dimensionality
    pub image_type: vk::ImageType,
    /// Vulkan format
    pub format: vk::Format,
    /// Extent in texels
    pub extent: vk::Extent3D,
    /// Mip level count
    pub mip_levels: u32,
    /// Array layer count
    pub array_layers: u32,
    /// Sample count
    pub samples: vk::SampleCountFlags,
    /// Tiling; always optimal
    pub tiling: vk::ImageTiling,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
}

/// Largest meaningful mip chain for the given extent
pub(crate) fn max_mip_levels(width: u32, height: u32, depth: u32) -> u32 {
    let largest = width.max(height).max(depth).max(1);
    32 - largest.leading_zeros()
}

/// Shared backing of every image-backed resource
pub struct CommonTexture {
    device: Arc<Device>,
    texture_type: ResourceType,
    desc: TextureDesc,
    mapping: FormatMapping,
    image_params: ImageCreateParams,
    image: vk::Image,
    memory: vk::DeviceMemory,
    default_layout: vk::ImageLayout,
    sync: GpuSync,
    registry_key: Mutex<Option<ResourceKey>>,
}

impl CommonTexture {
    /// Normalize a descriptor against device capability
    ///
    /// Mutates the descriptor in place (mip-chain expansion and clamping,
    /// quality normalization) and returns the format mapping. Any rule
    /// violation is an invalid call; surfaces normalize as 2D textures.
    pub fn normalize_desc(
        device: &Device,
        texture_type: ResourceType,
        desc: &mut TextureDesc,
    ) -> D3d9Result<FormatMapping> {
        let limits = &device.caps().limits;

        if desc.width == 0 || desc.height == 0 || desc.depth == 0 {
            return Err(D3d9Error::InvalidCall);
        }

        let mapping = format_mapping(desc.format).ok_or(D3d9Error::InvalidCall)?;

        match texture_type {
            ResourceType::VolumeTexture => {
                let max = limits.max_volume_extent;
                if desc.width > max || desc.height > max || desc.depth > max {
                    return Err(D3d9Error::InvalidCall);
                }
            }
            ResourceType::CubeTexture => {
                if desc.width != desc.height {
                    return Err(D3d9Error::InvalidCall);
                }
                if desc.width > limits.max_cube_dimension {
                    return Err(D3d9Error::InvalidCall);
                }
            }
            _ => {
                let max = limits.max_texture_dimension;
                if desc.width > max || desc.height > max {
                    return Err(D3d9Error::InvalidCall);
                }
            }
        }

        // Attachments live in video memory; no other pool can back them
        if desc
            .usage
            .intersects(Usage::RENDER_TARGET | Usage::DEPTH_STENCIL)
            && desc.pool != Pool::Default
        {
            return Err(D3d9Error::InvalidCall);
        }

        if desc.multi_sample != MultiSampleType::None {
            if desc.pool != Pool::Default {
                return Err(D3d9Error::InvalidCall);
            }
        } else {
            desc.multisample_quality = 0;
        }

        let max_mips = max_mip_levels(desc.width, desc.height, desc.depth);
        if desc.mip_levels == 0 || desc.mip_levels > max_mips {
            desc.mip_levels = max_mips;
        }
        if desc.usage.contains(Usage::AUTOGEN_MIPMAP) {
            // The runtime regenerates the chain itself; level count is its call
            desc.mip_levels = max_mips;
        }

        Ok(mapping)
    }

    /// Construct the backing, allocating the native image when a loader is
    /// present
    ///
    /// Native allocation failure destroys any partially created objects and
    /// surfaces as out-of-video-memory.
    pub(crate) fn new(
        device: &Arc<Device>,
        texture_type: ResourceType,
        desc: TextureDesc,
        mapping: FormatMapping,
    ) -> D3d9Result<Arc<Self>> {
        let image_params = Self::image_params_for(texture_type, &desc, mapping);
        let default_layout = Self::default_layout_for(&desc, mapping);

        let (image, memory) = match device.native() {
            Some(native) => Self::allocate_image(native, &image_params)?,
            None => (vk::Image::null(), vk::DeviceMemory::null()),
        };

        log::debug!(
            "Created {:?} {}x{}x{} ({:?}, {} mips, pool {:?})",
            texture_type,
            desc.width,
            desc.height,
            desc.depth,
            mapping.format,
            desc.mip_levels,
            desc.pool
        );

        Ok(Arc::new(Self {
            device: Arc::clone(device),
            texture_type,
            desc,
            mapping,
            image_params,
            image,
            memory,
            default_layout,
            sync: GpuSync::default(),
            registry_key: Mutex::new(None),
        }))
    }

    fn image_params_for(
        texture_type: ResourceType,
        desc: &TextureDesc,
        mapping: FormatMapping,
    ) -> ImageCreateParams {
        let mut flags = vk::ImageCreateFlags::empty();
        let image_type = match texture_type {
            ResourceType::VolumeTexture => vk::ImageType::TYPE_3D,
            _ => vk::ImageType::TYPE_2D,
        };
        if texture_type == ResourceType::CubeTexture {
            flags |= vk::ImageCreateFlags::CUBE_COMPATIBLE;
        }

        let mut usage = vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;
        if !desc.is_attachment_only {
            usage |= vk::ImageUsageFlags::SAMPLED;
        }
        if desc.usage.contains(Usage::RENDER_TARGET) {
            usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
        if desc.usage.contains(Usage::DEPTH_STENCIL) {
            usage |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        }
        usage |= desc.image_usage;

        ImageCreateParams {
            flags,
            image_type,
            format: mapping.format,
            extent: vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: desc.depth,
            },
            mip_levels: desc.mip_levels,
            array_layers: desc.array_size,
            samples: desc.multi_sample.to_vk(),
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
        }
    }

    fn default_layout_for(desc: &TextureDesc, mapping: FormatMapping) -> vk::ImageLayout {
        if mapping.is_depth() && desc.usage.contains(Usage::DEPTH_STENCIL) {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        } else if desc.is_attachment_only && desc.usage.contains(Usage::RENDER_TARGET) {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        } else if desc.is_attachment_only {
            vk::ImageLayout::GENERAL
        } else {
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        }
    }

    fn allocate_image(
        native: &crate::device::NativeDevice,
        params: &ImageCreateParams,
    ) -> D3d9Result<(vk::Image, vk::DeviceMemory)> {
        let device = &native.device;

        let create_info = vk::ImageCreateInfo::builder()
            .flags(params.flags)
            .image_type(params.image_type)
            .format(params.format)
            .extent(params.extent)
            .mip_levels(params.mip_levels)
            .array_layers(params.array_layers)
            .samples(params.samples)
            .tiling(params.tiling)
            .usage(params.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe {
            device.create_image(&create_info, None).map_err(|err| {
                log::error!("Native image creation failed: {:?}", err);
                D3d9Error::OutOfVideoMemory
            })?
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory_type = Self::find_memory_type(
            &native.memory_props,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        );

        let memory_type = match memory_type {
            Some(index) => index,
            None => {
                unsafe { device.destroy_image(image, None) };
                return Err(D3d9Error::OutOfVideoMemory);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(err) => {
                log::error!(
                    "Native image memory allocation failed ({} bytes): {:?}",
                    requirements.size,
                    err
                );
                unsafe { device.destroy_image(image, None) };
                return Err(D3d9Error::OutOfVideoMemory);
            }
        };

        if let Err(err) = unsafe { device.bind_image_memory(image, memory, 0) } {
            log::error!("Native image memory bind failed: {:?}", err);
            unsafe {
                device.free_memory(memory, None);
                device.destroy_image(image, None);
            }
            return Err(D3d9Error::OutOfVideoMemory);
        }

        Ok((image, memory))
    }

    fn find_memory_type(
        props: &vk::PhysicalDeviceMemoryProperties,
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    ) -> Option<u32> {
        (0..props.memory_type_count).find(|&index| {
            (type_bits & (1 << index)) != 0
                && props.memory_types[index as usize]
                    .property_flags
                    .contains(required)
        })
    }

    /// Owning device
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Texture type tag; surfaces report as 2D textures here
    pub fn texture_type(&self) -> ResourceType {
        self.texture_type
    }

    /// Validated descriptor
    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    /// Format mapping the texture was created with
    pub fn mapping(&self) -> FormatMapping {
        self.mapping
    }

    /// Native image parameters recorded at creation
    pub fn image_params(&self) -> &ImageCreateParams {
        &self.image_params
    }

    /// Native image handle; null when the device has no loader
    pub fn image_handle(&self) -> vk::Image {
        self.image
    }

    /// Steady-state layout the runtime keeps the image in
    pub fn default_layout(&self) -> vk::ImageLayout {
        self.default_layout
    }

    /// GPU synchronization state
    pub fn gpu_sync(&self) -> &GpuSync {
        &self.sync
    }

    /// Full subresource range of the image
    pub fn full_subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.mapping.aspect,
            base_mip_level: 0,
            level_count: self.image_params.mip_levels,
            base_array_layer: 0,
            layer_count: self.image_params.array_layers,
        }
    }

    pub(crate) fn set_registry_key(&self, key: ResourceKey) {
        *self.registry_key.lock().unwrap() = Some(key);
    }
}

impl Drop for CommonTexture {
    fn drop(&mut self) {
        if let Some(key) = self.registry_key.lock().unwrap().take() {
            self.device.unregister_resource(key);
        }

        if let Some(native) = self.device.native() {
            // Closures hold strong references and every batch waits for queue
            // idle, so by the time the last reference drops the GPU is done
            // with this image
            unsafe {
                if self.image != vk::Image::null() {
                    native.device.destroy_image(self.image, None);
                }
                if self.memory != vk::DeviceMemory::null() {
                    native.device.free_memory(self.memory, None);
                }
            }
        }
    }
}

macro_rules! texture_subtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        pub struct $name {
            common: Arc<CommonTexture>,
        }

        impl $name {
            pub(crate) fn new(common: Arc<CommonTexture>) -> Arc<Self> {
                Arc::new(Self { common })
            }

            /// Shared backing of this resource
            pub fn common_texture(&self) -> &Arc<CommonTexture> {
                &self.common
            }
        }
    };
}

texture_subtype! {
    /// Standalone 2D surface
    ///
    /// Backed by a single-mip 2D texture; the only image kind that may be
    /// multisampled.
    Surface
}

texture_subtype! {
    /// 2D texture
    Texture2D
}

texture_subtype! {
    /// 3D (volume) texture
    Texture3D
}

texture_subtype! {
    /// Cube texture; always six array layers
    TextureCube
}

impl Texture3D {
    /// Borrow one mip level as a volume
    ///
    /// Volumes cannot stand alone; they share the parent's native image and
    /// have no independent reference counting.
    pub fn volume(&self, mip_level: u32) -> Option<crate::resource::Volume> {
        crate::resource::Volume::new(&self.common, mip_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::tests::test_device_params;
    use crate::device::Device;

    fn desc() -> TextureDesc {
        TextureDesc {
            width: 256,
            height: 256,
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
        }
    }

    #[test]
    fn test_max_mip_levels() {
        assert_eq!(max_mip_levels(1, 1, 1), 1);
        assert_eq!(max_mip_levels(256, 256, 1), 9);
        assert_eq!(max_mip_levels(256, 16, 1), 9);
        assert_eq!(max_mip_levels(1, 1, 64), 7);
    }

    #[test]
    fn test_normalize_rejects_zero_extent() {
        let device = Device::new(test_device_params());
        let mut bad = desc();
        bad.width = 0;
        assert_eq!(
            CommonTexture::normalize_desc(&device, ResourceType::Texture, &mut bad).unwrap_err(),
            D3d9Error::InvalidCall
        );
    }

    #[test]
    fn test_normalize_rejects_unknown_format() {
        let device = Device::new(test_device_params());
        let mut bad = desc();
        bad.format = D3d9Format::Unknown;
        assert_eq!(
            CommonTexture::normalize_desc(&device, ResourceType::Texture, &mut bad).unwrap_err(),
            D3d9Error::InvalidCall
        );
    }

    #[test]
    fn test_normalize_expands_full_mip_chain() {
        let device = Device::new(test_device_params());
        let mut full = desc();
        full.mip_levels = 0;
        CommonTexture::normalize_desc(&device, ResourceType::Texture, &mut full).unwrap();
        assert_eq!(full.mip_levels, 9);

        let mut clamped = desc();
        clamped.mip_levels = 40;
        CommonTexture::normalize_desc(&device, ResourceType::Texture, &mut clamped).unwrap();
        assert_eq!(clamped.mip_levels, 9);
    }

    #[test]
    fn test_normalize_rejects_oversized_dimensions() {
        let device = Device::new(test_device_params());
        let max = device.caps().limits.max_texture_dimension;

        let mut bad = desc();
        bad.width = max + 1;
        assert_eq!(
            CommonTexture::normalize_desc(&device, ResourceType::Texture, &mut bad).unwrap_err(),
            D3d9Error::InvalidCall
        );
    }

    #[test]
    fn test_normalize_requires_default_pool_for_attachments() {
        let device = Device::new(test_device_params());

        let mut managed_rt = desc();
        managed_rt.usage = Usage::RENDER_TARGET;
        managed_rt.pool = Pool::Managed;
        assert_eq!(
            CommonTexture::normalize_desc(&device, ResourceType::Texture, &mut managed_rt)
                .unwrap_err(),
            D3d9Error::InvalidCall
        );

        let mut default_rt = desc();
        default_rt.usage = Usage::RENDER_TARGET;
        default_rt.pool = Pool::Default;
        assert!(
            CommonTexture::normalize_desc(&device, ResourceType::Texture, &mut default_rt).is_ok()
        );
    }

    #[test]
    fn test_normalize_resets_quality_without_multisampling() {
        let device = Device::new(test_device_params());
        let mut single = desc();
        single.multisample_quality = 3;
        CommonTexture::normalize_desc(&device, ResourceType::Texture, &mut single).unwrap();
        assert_eq!(single.multisample_quality, 0);
    }

    #[test]
    fn test_cube_textures_must_be_square() {
        let device = Device::new(test_device_params());
        let mut oblong = desc();
        oblong.height = 128;
        assert_eq!(
            CommonTexture::normalize_desc(&device, ResourceType::CubeTexture, &mut oblong)
                .unwrap_err(),
            D3d9Error::InvalidCall
        );
    }

    #[test]
    fn test_image_params_reflect_descriptor() {
        let device = Device::new(test_device_params());
        let mut d = desc();
        d.usage = Usage::RENDER_TARGET;
        d.pool = Pool::Default;
        let mapping = CommonTexture::normalize_desc(&device, ResourceType::Texture, &mut d).unwrap();

        let texture = CommonTexture::new(&device, ResourceType::Texture, d, mapping).unwrap();
        let params = texture.image_params();

        assert_eq!(params.image_type, vk::ImageType::TYPE_2D);
        assert_eq!(params.format, vk::Format::B8G8R8A8_UNORM);
        assert!(params.usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
        assert!(params.usage.contains(vk::ImageUsageFlags::SAMPLED));
        assert_eq!(params.extent.width, 256);
        assert_eq!(params.samples, vk::SampleCountFlags::TYPE_1);
        // No loader on this device; the handle stays null
        assert_eq!(texture.image_handle(), vk::Image::null());
    }

    #[test]
    fn test_attachment_only_images_are_not_sampled() {
        let device = Device::new(test_device_params());
        let mut d = desc();
        d.usage = Usage::RENDER_TARGET;
        d.pool = Pool::Default;
        d.is_attachment_only = true;
        let mapping = CommonTexture::normalize_desc(&device, ResourceType::Texture, &mut d).unwrap();

        let texture = CommonTexture::new(&device, ResourceType::Texture, d, mapping).unwrap();
        assert!(!texture
            .image_params()
            .usage
            .contains(vk::ImageUsageFlags::SAMPLED));
        assert_eq!(
            texture.default_layout(),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
    }
}
