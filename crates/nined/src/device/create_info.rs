//! Device-creation negotiation
//!
//! Turns an adapter capability snapshot into an ABI-correct, caller-owned
//! creation descriptor: the feature set the translation layer needs, the
//! queue families it will use, an owned queue-create array, and an owned
//! extension-name list. The caller creates the native device from the
//! descriptor and must release it through the paired free exactly once.

use ash::extensions::khr;
use ash::vk;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use crate::adapter::Adapter;
use crate::error::{D3d9Error, D3d9Result};

/// One queue priority per created queue
static QUEUE_PRIORITY: [f32; 1] = [1.0];

/// Caller-owned device-creation descriptor
///
/// `info.p_queue_create_infos` and `info.pp_enabled_extension_names` point
/// at heap allocations owned by this descriptor; array lengths always equal
/// the counts embedded in `info`, and `info.p_enabled_features` points at
/// the `features` field. Release through [`free_device_create_info`] exactly
/// once; double-free or use-after-free is undefined.
#[repr(C)]
pub struct DeviceCreateInfo {
    /// Feature set the translation layer requires on this adapter
    pub features: vk::PhysicalDeviceFeatures,
    /// Ready-to-use native device-creation parameters
    pub info: vk::DeviceCreateInfo,
    /// Graphics queue family index
    pub graphics_queue_family: u32,
    /// Transfer queue family index
    pub transfer_queue_family: u32,
    /// Sparse-binding queue family index, or `VK_QUEUE_FAMILY_IGNORED`
    pub sparse_queue_family: u32,
    queue_create_infos: *mut vk::DeviceQueueCreateInfo,
    extension_names: *mut *const c_char,
}

/// Device extensions the translation layer cannot run without
fn required_device_extensions() -> [&'static CStr; 1] {
    [khr::Swapchain::name()]
}

/// Device extensions the translation layer uses when the adapter has them
fn optional_device_extensions() -> [&'static CStr; 3] {
    [
        CStr::from_bytes_with_nul(b"VK_EXT_memory_budget\0").unwrap(),
        CStr::from_bytes_with_nul(b"VK_EXT_memory_priority\0").unwrap(),
        CStr::from_bytes_with_nul(b"VK_EXT_4444_formats\0").unwrap(),
    ]
}

/// Feature set the translation layer requires, gated on adapter support
pub(crate) fn required_device_features(adapter: &Adapter) -> vk::PhysicalDeviceFeatures {
    let supported = &adapter.caps().features;

    vk::PhysicalDeviceFeatures::builder()
        .sampler_anisotropy(supported.sampler_anisotropy != 0)
        .depth_clamp(supported.depth_clamp != 0)
        .depth_bias_clamp(supported.depth_bias_clamp != 0)
        .fill_mode_non_solid(supported.fill_mode_non_solid != 0)
        .image_cube_array(supported.image_cube_array != 0)
        .occlusion_query_precise(supported.occlusion_query_precise != 0)
        .shader_clip_distance(supported.shader_clip_distance != 0)
        .texture_compression_bc(supported.texture_compression_bc != 0)
        .build()
}

/// Negotiate a creation descriptor against an adapter
///
/// Fails with an invalid call when a required extension is missing or no
/// suitable queue families exist; nothing is leaked on failure.
pub(crate) fn build_device_create_info(adapter: &Adapter) -> D3d9Result<*mut DeviceCreateInfo> {
    let queues = adapter.find_queue_families()?;
    let features = required_device_features(adapter);

    // Extension list: everything required, plus supported optionals
    let mut extension_names: Vec<&CStr> = Vec::new();
    for required in required_device_extensions() {
        if !adapter.supports_extension(required) {
            log::error!(
                "Adapter is missing required extension {}",
                required.to_string_lossy()
            );
            return Err(D3d9Error::InvalidCall);
        }
        extension_names.push(required);
    }
    for optional in optional_device_extensions() {
        if adapter.supports_extension(optional) {
            extension_names.push(optional);
        }
    }

    // One queue per distinct family, in graphics/transfer/sparse order
    let mut families = vec![queues.graphics];
    if queues.transfer != queues.graphics {
        families.push(queues.transfer);
    }
    if let Some(sparse) = queues.sparse {
        if !families.contains(&sparse) {
            families.push(sparse);
        }
    }

    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(&QUEUE_PRIORITY)
                .build()
        })
        .collect();

    // Every name gets its own heap-owned null-terminated buffer
    let owned_names: Vec<*const c_char> = extension_names
        .iter()
        .map(|name| CString::from(*name).into_raw() as *const c_char)
        .collect();

    let queue_count = queue_infos.len();
    let extension_count = owned_names.len();

    let queue_ptr = if queue_count > 0 {
        Box::into_raw(queue_infos.into_boxed_slice()) as *mut vk::DeviceQueueCreateInfo
    } else {
        std::ptr::null_mut()
    };
    let names_ptr = if extension_count > 0 {
        Box::into_raw(owned_names.into_boxed_slice()) as *mut *const c_char
    } else {
        std::ptr::null_mut()
    };

    let mut info = vk::DeviceCreateInfo::default();
    info.queue_create_info_count = queue_count as u32;
    info.p_queue_create_infos = queue_ptr;
    info.enabled_extension_count = extension_count as u32;
    info.pp_enabled_extension_names = names_ptr as *const *const c_char;

    let mut descriptor = Box::new(DeviceCreateInfo {
        features,
        info,
        graphics_queue_family: queues.graphics,
        transfer_queue_family: queues.transfer,
        sparse_queue_family: queues.sparse.unwrap_or(vk::QUEUE_FAMILY_IGNORED),
        queue_create_infos: queue_ptr,
        extension_names: names_ptr,
    });

    // The boxed location is stable; the embedded info can point at the
    // feature set it travels with
    let features_ptr: *const vk::PhysicalDeviceFeatures = &descriptor.features;
    descriptor.info.p_enabled_features = features_ptr;

    Ok(Box::into_raw(descriptor))
}

/// Release a creation descriptor
///
/// Deep-frees every extension-name buffer, the queue-create array, and the
/// descriptor itself. No-op on null.
///
/// # Safety
///
/// `descriptor` must be null or a pointer previously returned by the
/// negotiator that has not been freed yet.
pub unsafe fn free_device_create_info(descriptor: *mut DeviceCreateInfo) {
    if descriptor.is_null() {
        return;
    }

    let descriptor = Box::from_raw(descriptor);

    if !descriptor.extension_names.is_null() {
        let count = descriptor.info.enabled_extension_count as usize;
        for i in 0..count {
            let name = *descriptor.extension_names.add(i);
            if !name.is_null() {
                drop(CString::from_raw(name as *mut c_char));
            }
        }
        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
            descriptor.extension_names,
            count,
        )));
    }

    if !descriptor.queue_create_infos.is_null() {
        let count = descriptor.info.queue_create_info_count as usize;
        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
            descriptor.queue_create_infos,
            count,
        )));
    }
}
