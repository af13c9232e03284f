//! External device adoption
//!
//! An importing caller supplies the native device and queue it already
//! created; the runtime wraps them without creating anything native itself.
//! Adoption either produces a fully constructed translation device or fails
//! with the caller's handles untouched — cleanup of the native objects is
//! always the caller's responsibility.

use ash::vk;
use std::ffi::CString;
use std::sync::Arc;
use thiserror::Error;

use crate::adapter::Adapter;
use crate::cs::QueueLockCallback;
use crate::device::{
    BehaviorFlags, Device, DeviceCaps, DeviceCreateParams, DeviceHandles, DeviceType,
    DisplayModeEx, FocusWindow, NativeDevice, PresentParameters,
};
use crate::error::{D3d9Error, D3d9Result};
use crate::options::Options;

/// Caller-supplied description of an externally created device
///
/// Consumed exactly once by the import.
pub struct DeviceImportInfo {
    /// Native device to adopt
    pub device: vk::Device,
    /// Graphics queue belonging to the device
    pub queue: vk::Queue,
    /// Family of the supplied queue
    pub queue_family: u32,
    /// Extensions the device was created with
    pub extensions: Vec<CString>,
    /// Features the device was created with
    pub features: vk::PhysicalDeviceFeatures,
    /// Invoked with `true`/`false` around the runtime's own submissions so
    /// the caller can cooperate with its own queue locking
    pub queue_lock_callback: Option<QueueLockCallback>,
}

/// Reasons the native layer rejects an adoption
#[derive(Debug, Error)]
enum AdoptionError {
    #[error("native device handle is null")]
    NullDevice,

    #[error("native queue handle is null")]
    NullQueue,

    #[error("queue family {0} out of range ({1} families reported)")]
    QueueFamilyOutOfRange(u32, u32),

    #[error("queue family {0} does not support graphics and compute")]
    QueueFamilyNotGraphics(u32),
}

/// Adopt an external device and build the translation device around it
///
/// Validation of behavior flags and presentation parameters has already
/// happened by the time this runs. Adoption failure logs the underlying
/// message and surfaces as not-available; no partially constructed device
/// escapes and the caller's handles are left untouched.
pub(crate) fn import_device(
    instance: Option<&ash::Instance>,
    instance_handle: vk::Instance,
    adapter: &Adapter,
    device_type: DeviceType,
    focus_window: Option<FocusWindow>,
    behavior_flags: BehaviorFlags,
    present_params: &mut PresentParameters,
    fullscreen_mode: Option<&DisplayModeEx>,
    info: DeviceImportInfo,
    options: Options,
) -> D3d9Result<Arc<Device>> {
    let adopted = match adopt_native(instance, adapter, device_type, &info) {
        Ok(native) => native,
        Err(err) => {
            log::error!("Device import failed: {}", err);
            return Err(D3d9Error::NotAvailable);
        }
    };

    let handles = DeviceHandles {
        instance: instance_handle,
        physical_device: adapter.handle(),
        device: info.device,
        queue: info.queue,
        queue_index: 0,
        queue_family: info.queue_family,
    };

    let caps = DeviceCaps {
        limits: adapter.caps().limits,
        max_sample_count: adapter.max_sample_count(),
    };

    let device = Device::new(DeviceCreateParams {
        device_type,
        behavior_flags,
        focus_window,
        handles,
        native: adopted,
        features: info.features,
        extensions: info.extensions,
        caps,
        queue_callback: info.queue_lock_callback,
        options,
    });

    device.initial_reset(present_params, fullscreen_mode)?;

    log::info!(
        "Imported {:?} device (queue family {})",
        device_type,
        handles.queue_family
    );

    Ok(device)
}

/// Resolve the adopted handles against the native layer
///
/// A null-reference device may be imported without any native handles; every
/// other type requires a live device and queue. The loader is built only
/// when the importing interface has instance function pointers to resolve
/// against.
fn adopt_native(
    instance: Option<&ash::Instance>,
    adapter: &Adapter,
    device_type: DeviceType,
    info: &DeviceImportInfo,
) -> Result<Option<NativeDevice>, AdoptionError> {
    if device_type == DeviceType::NullRef && info.device == vk::Device::null() {
        return Ok(None);
    }

    if info.device == vk::Device::null() {
        return Err(AdoptionError::NullDevice);
    }
    if info.queue == vk::Queue::null() {
        return Err(AdoptionError::NullQueue);
    }

    let family_count = adapter.caps().queue_families.len() as u32;
    if info.queue_family >= family_count {
        return Err(AdoptionError::QueueFamilyOutOfRange(
            info.queue_family,
            family_count,
        ));
    }

    let family = &adapter.caps().queue_families[info.queue_family as usize];
    if !family
        .queue_flags
        .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
    {
        return Err(AdoptionError::QueueFamilyNotGraphics(info.queue_family));
    }

    let native = instance.map(|instance| {
        let device = unsafe { ash::Device::load(instance.fp_v1_0(), info.device) };
        let memory_props =
            unsafe { instance.get_physical_device_memory_properties(adapter.handle()) };
        NativeDevice {
            device,
            memory_props,
        }
    });

    Ok(native)
}
