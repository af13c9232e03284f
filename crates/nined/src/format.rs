//! Legacy pixel-format table
//!
//! Maps D3D9 format ids to the Vulkan formats the runtime actually backs
//! them with. The table is intentionally opinionated: several legacy formats
//! have no exact Vulkan equivalent and are widened to the closest superset
//! the way the rest of the runtime expects.

use ash::vk;

/// D3D9 pixel-format identifiers
///
/// Values match the legacy numeric convention so ids round-trip across the
/// translation boundary unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum D3d9Format {
    /// Format not specified
    Unknown = 0,
    /// 24-bit RGB
    R8G8B8 = 20,
    /// 32-bit ARGB
    A8R8G8B8 = 21,
    /// 32-bit RGB, alpha ignored
    X8R8G8B8 = 22,
    /// 16-bit 5-6-5 RGB
    R5G6B5 = 23,
    /// 16-bit 1-5-5-5 ARGB
    A1R5G5B5 = 25,
    /// 16-bit 4-4-4-4 ARGB
    A4R4G4B4 = 26,
    /// 8-bit alpha only
    A8 = 28,
    /// 32-bit 2-10-10-10 ABGR
    A2B10G10R10 = 31,
    /// 32-bit ABGR
    A8B8G8R8 = 32,
    /// 32-bit two-channel 16-16
    G16R16 = 34,
    /// 64-bit four-channel 16-16-16-16
    A16B16G16R16 = 36,
    /// 8-bit luminance
    L8 = 50,
    /// 16-bit luminance-alpha
    A8L8 = 51,
    /// 16-bit signed two-channel
    V8U8 = 60,
    /// 16-bit depth
    D16 = 80,
    /// 32-bit depth with 8-bit stencil
    D24S8 = 75,
    /// 24-bit depth, no stencil
    D24X8 = 77,
    /// 32-bit float depth
    D32 = 71,
    /// 16-bit float single channel
    R16F = 111,
    /// 32-bit float two-channel 16-16
    G16R16F = 112,
    /// 64-bit float four-channel
    A16B16G16R16F = 113,
    /// 32-bit float single channel
    R32F = 114,
    /// 128-bit float four-channel
    A32B32G32R32F = 116,
}

/// Concrete Vulkan backing for a legacy format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatMapping {
    /// Vulkan format the resource is created with
    pub format: vk::Format,
    /// Image aspects covered by the format
    pub aspect: vk::ImageAspectFlags,
}

impl FormatMapping {
    const fn color(format: vk::Format) -> Self {
        Self {
            format,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }

    const fn depth(format: vk::Format, aspect: vk::ImageAspectFlags) -> Self {
        Self { format, aspect }
    }

    /// Whether this format is a depth or depth-stencil format
    pub fn is_depth(&self) -> bool {
        self.aspect.contains(vk::ImageAspectFlags::DEPTH)
    }
}

/// Resolve a legacy format id to its Vulkan backing
///
/// Returns `None` for [`D3d9Format::Unknown`]; resource creation treats that
/// as an invalid call.
pub fn format_mapping(format: D3d9Format) -> Option<FormatMapping> {
    use D3d9Format as F;

    const DS: vk::ImageAspectFlags = vk::ImageAspectFlags::from_raw(
        vk::ImageAspectFlags::DEPTH.as_raw() | vk::ImageAspectFlags::STENCIL.as_raw(),
    );

    let mapping = match format {
        F::Unknown => return None,
        // No 24-bit formats in practice; widened to 32-bit like X8R8G8B8
        F::R8G8B8 => FormatMapping::color(vk::Format::B8G8R8A8_UNORM),
        F::A8R8G8B8 => FormatMapping::color(vk::Format::B8G8R8A8_UNORM),
        F::X8R8G8B8 => FormatMapping::color(vk::Format::B8G8R8A8_UNORM),
        F::R5G6B5 => FormatMapping::color(vk::Format::R5G6B5_UNORM_PACK16),
        F::A1R5G5B5 => FormatMapping::color(vk::Format::A1R5G5B5_UNORM_PACK16),
        F::A4R4G4B4 => FormatMapping::color(vk::Format::A4R4G4B4_UNORM_PACK16_EXT),
        F::A8 => FormatMapping::color(vk::Format::R8_UNORM),
        F::A2B10G10R10 => FormatMapping::color(vk::Format::A2B10G10R10_UNORM_PACK32),
        F::A8B8G8R8 => FormatMapping::color(vk::Format::R8G8B8A8_UNORM),
        F::G16R16 => FormatMapping::color(vk::Format::R16G16_UNORM),
        F::A16B16G16R16 => FormatMapping::color(vk::Format::R16G16B16A16_UNORM),
        F::L8 => FormatMapping::color(vk::Format::R8_UNORM),
        F::A8L8 => FormatMapping::color(vk::Format::R8G8_UNORM),
        F::V8U8 => FormatMapping::color(vk::Format::R8G8_SNORM),
        F::D16 => FormatMapping::depth(vk::Format::D16_UNORM, vk::ImageAspectFlags::DEPTH),
        F::D24S8 => FormatMapping::depth(vk::Format::D24_UNORM_S8_UINT, DS),
        F::D24X8 => FormatMapping::depth(vk::Format::X8_D24_UNORM_PACK32, vk::ImageAspectFlags::DEPTH),
        F::D32 => FormatMapping::depth(vk::Format::D32_SFLOAT, vk::ImageAspectFlags::DEPTH),
        F::R16F => FormatMapping::color(vk::Format::R16_SFLOAT),
        F::G16R16F => FormatMapping::color(vk::Format::R16G16_SFLOAT),
        F::A16B16G16R16F => FormatMapping::color(vk::Format::R16G16B16A16_SFLOAT),
        F::R32F => FormatMapping::color(vk::Format::R32_SFLOAT),
        F::A32B32G32R32F => FormatMapping::color(vk::Format::R32G32B32A32_SFLOAT),
    };

    Some(mapping)
}
