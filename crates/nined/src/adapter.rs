//! Adapter capability snapshot
//!
//! An [`Adapter`] pairs a native physical-device handle with an immutable
//! snapshot of everything the negotiator needs: queue families, supported
//! device extensions, feature bits, and the limits that gate resource
//! creation. The snapshot can be taken from a live instance or supplied
//! directly, which is how import-only deployments (and tests) run without a
//! Vulkan loader present.

use ash::vk;
use std::ffi::{CStr, CString};

use crate::error::{D3d9Error, D3d9Result};

/// Device limits the resource validator checks against
#[derive(Debug, Clone, Copy)]
pub struct AdapterLimits {
    /// Maximum width/height of 2D images
    pub max_texture_dimension: u32,
    /// Maximum extent of 3D images
    pub max_volume_extent: u32,
    /// Maximum number of cube-map faces edge length
    pub max_cube_dimension: u32,
    /// Sample counts the framebuffer supports for color attachments
    pub framebuffer_sample_counts: vk::SampleCountFlags,
}

impl Default for AdapterLimits {
    fn default() -> Self {
        Self {
            max_texture_dimension: 16384,
            max_volume_extent: 2048,
            max_cube_dimension: 16384,
            framebuffer_sample_counts: vk::SampleCountFlags::TYPE_1
                | vk::SampleCountFlags::TYPE_2
                | vk::SampleCountFlags::TYPE_4
                | vk::SampleCountFlags::TYPE_8,
        }
    }
}

/// Immutable capability snapshot of one adapter
#[derive(Debug, Clone)]
pub struct AdapterCaps {
    /// Queue family properties, indexed by family
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    /// Device extensions the adapter supports
    pub supported_extensions: Vec<CString>,
    /// Feature bits the adapter supports
    pub features: vk::PhysicalDeviceFeatures,
    /// Limits relevant to resource creation
    pub limits: AdapterLimits,
}

/// Queue family indices selected for device creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    /// Graphics (and compute) family
    pub graphics: u32,
    /// Transfer family; falls back to the graphics family
    pub transfer: u32,
    /// Sparse-binding family, when the adapter has one
    pub sparse: Option<u32>,
}

/// A physical device and its capability snapshot
///
/// Immutable after construction.
pub struct Adapter {
    handle: vk::PhysicalDevice,
    caps: AdapterCaps,
}

impl Adapter {
    /// Wrap an externally obtained capability snapshot
    pub fn new(handle: vk::PhysicalDevice, caps: AdapterCaps) -> Self {
        Self { handle, caps }
    }

    /// Snapshot capabilities from a live instance
    pub fn query(instance: &ash::Instance, handle: vk::PhysicalDevice) -> D3d9Result<Self> {
        let properties = unsafe { instance.get_physical_device_properties(handle) };
        let features = unsafe { instance.get_physical_device_features(handle) };
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(handle) };

        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(handle)
                .map_err(|_| D3d9Error::NotAvailable)?
        };

        let supported_extensions = extensions
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }.to_owned())
            .collect();

        let limits = AdapterLimits {
            max_texture_dimension: properties.limits.max_image_dimension2_d,
            max_volume_extent: properties.limits.max_image_dimension3_d,
            max_cube_dimension: properties.limits.max_image_dimension_cube,
            framebuffer_sample_counts: properties.limits.framebuffer_color_sample_counts,
        };

        log::debug!("Queried adapter: {}", unsafe {
            CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy()
        });

        Ok(Self::new(
            handle,
            AdapterCaps {
                queue_families,
                supported_extensions,
                features,
                limits,
            },
        ))
    }

    /// Native physical-device handle
    pub fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    /// Capability snapshot
    pub fn caps(&self) -> &AdapterCaps {
        &self.caps
    }

    /// Whether the adapter supports a device extension
    pub fn supports_extension(&self, name: &CStr) -> bool {
        self.caps
            .supported_extensions
            .iter()
            .any(|ext| ext.as_c_str() == name)
    }

    /// Highest color sample count the adapter supports
    pub fn max_sample_count(&self) -> u32 {
        let counts = self.caps.limits.framebuffer_sample_counts;
        for count in [64u32, 32, 16, 8, 4, 2] {
            if counts.contains(vk::SampleCountFlags::from_raw(count)) {
                return count;
            }
        }
        1
    }

    /// Select queue families covering graphics, transfer, and sparse binding
    ///
    /// Graphics requires a family with both graphics and compute support.
    /// Transfer prefers a dedicated transfer family, falling back to a
    /// compute-only family and finally to the graphics family. Sparse is
    /// optional; the graphics family is preferred when it qualifies.
    pub fn find_queue_families(&self) -> D3d9Result<QueueFamilies> {
        let families = &self.caps.queue_families;

        let graphics = self
            .find_family(
                vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
                vk::QueueFlags::empty(),
            )
            .ok_or(D3d9Error::InvalidCall)?;

        let transfer = self
            .find_family(
                vk::QueueFlags::TRANSFER,
                vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
            )
            .or_else(|| self.find_family(vk::QueueFlags::COMPUTE, vk::QueueFlags::GRAPHICS))
            .unwrap_or(graphics);

        let sparse = if families[graphics as usize]
            .queue_flags
            .contains(vk::QueueFlags::SPARSE_BINDING)
        {
            Some(graphics)
        } else {
            self.find_family(vk::QueueFlags::SPARSE_BINDING, vk::QueueFlags::empty())
        };

        Ok(QueueFamilies {
            graphics,
            transfer,
            sparse,
        })
    }

    fn find_family(&self, required: vk::QueueFlags, forbidden: vk::QueueFlags) -> Option<u32> {
        self.caps
            .queue_families
            .iter()
            .enumerate()
            .find(|(_, family)| {
                family.queue_flags.contains(required)
                    && !family.queue_flags.intersects(forbidden)
            })
            .map(|(index, _)| index as u32)
    }
}
