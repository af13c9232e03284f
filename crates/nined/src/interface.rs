//! Top-level interface object
//!
//! The [`Interface`] is the entry point a host embeds: it owns the native
//! instance (when one exists), enumerates adapters, negotiates device
//! creation parameters, and imports externally created devices. It can also
//! be constructed from pre-built adapter snapshots, which is how import-only
//! deployments and tests run without a Vulkan loader.

use ash::vk;
use std::ffi::{c_char, CString};
use std::sync::Arc;

use crate::adapter::Adapter;
use crate::device::create_info::{self, DeviceCreateInfo};
use crate::device::import::{self, DeviceImportInfo};
use crate::device::{
    validate_present_parameters, BehaviorFlags, Device, DeviceType, DisplayModeEx, FocusWindow,
    PresentParameters,
};
use crate::error::{D3d9Error, D3d9Result};
use crate::options::Options;

/// Outcome of one instance-extension enumeration pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionList {
    /// Number of names written into the caller's buffer
    pub written: usize,
    /// Number of extensions enabled on the instance
    pub total: usize,
    /// The caller's buffer was too small to hold every name
    pub truncated: bool,
}

impl ExtensionList {
    /// Legacy status of the pass; truncation maps to [`D3d9Error::MoreData`]
    pub fn status(&self) -> D3d9Result<()> {
        if self.truncated {
            Err(D3d9Error::MoreData)
        } else {
            Ok(())
        }
    }
}

/// Owned native instance and its loaders
struct NativeInstance {
    #[allow(dead_code)]
    entry: ash::Entry,
    instance: ash::Instance,
}

/// Top-level translation interface
///
/// One per host process. Owns the native instance when it created one;
/// adapters and the instance-extension list are immutable after
/// construction.
pub struct Interface {
    native: Option<NativeInstance>,
    instance_handle: vk::Instance,
    adapters: Vec<Adapter>,
    instance_extensions: Vec<CString>,
    options: Options,
}

impl Interface {
    /// Create the interface against a live Vulkan loader
    ///
    /// Creates a native instance with the extensions the runtime needs and
    /// snapshots every physical device as an adapter.
    pub fn new(options: Options) -> D3d9Result<Self> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            log::error!("Failed to load Vulkan: {:?}", e);
            D3d9Error::NotAvailable
        })?;

        let instance_extensions = Self::instance_extension_names(&options);
        let extension_ptrs: Vec<*const c_char> = instance_extensions
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        let app_name = CString::new(options.app_name.as_str()).unwrap_or_default();
        let engine_name = CString::new("nined").unwrap();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_1);

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(|e| {
            log::error!("Instance creation failed: {:?}", e);
            D3d9Error::NotAvailable
        })?;

        let physical_devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
            log::error!("Adapter enumeration failed: {:?}", e);
            unsafe { instance.destroy_instance(None) };
            D3d9Error::NotAvailable
        })?;

        let mut adapters = Vec::with_capacity(physical_devices.len());
        for handle in physical_devices {
            match Adapter::query(&instance, handle) {
                Ok(adapter) => adapters.push(adapter),
                Err(err) => log::warn!("Skipping adapter, capability query failed: {}", err),
            }
        }

        log::info!("Interface created with {} adapter(s)", adapters.len());

        let instance_handle = instance.handle();
        Ok(Self {
            native: Some(NativeInstance { entry, instance }),
            instance_handle,
            adapters,
            instance_extensions,
            options,
        })
    }

    /// Create the interface from pre-built adapter snapshots
    ///
    /// No native instance is created; device imports adopt the caller's
    /// handles without loading device-level entry points.
    pub fn from_adapters(adapters: Vec<Adapter>, options: Options) -> Self {
        let instance_extensions = Self::instance_extension_names(&options);
        Self {
            native: None,
            instance_handle: vk::Instance::null(),
            adapters,
            instance_extensions,
            options,
        }
    }

    fn instance_extension_names(options: &Options) -> Vec<CString> {
        let mut names = vec![
            ash::extensions::khr::Surface::name().to_owned(),
            vk::KhrGetPhysicalDeviceProperties2Fn::name().to_owned(),
        ];
        if options.enable_debug_utils {
            names.push(ash::extensions::ext::DebugUtils::name().to_owned());
        }
        names
    }

    /// Number of adapters available
    pub fn adapter_count(&self) -> u32 {
        self.adapters.len() as u32
    }

    /// Adapter at the given index
    pub fn adapter(&self, index: u32) -> Option<&Adapter> {
        self.adapters.get(index as usize)
    }

    /// Native instance handle; null when constructed from snapshots
    pub fn instance_handle(&self) -> vk::Instance {
        self.instance_handle
    }

    /// Runtime options in effect
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Enumerate the instance extensions the runtime enabled
    ///
    /// With no buffer this is a capacity query. With a buffer, pointers to
    /// the owned extension-name strings are written in order; they stay
    /// valid for the lifetime of the interface. A buffer shorter than the
    /// total is filled completely and the result carries both counts and
    /// the truncation flag explicitly.
    pub fn get_instance_extensions(&self, out: Option<&mut [*const c_char]>) -> ExtensionList {
        let total = self.instance_extensions.len();
        let Some(out) = out else {
            return ExtensionList {
                written: 0,
                total,
                truncated: false,
            };
        };

        let written = total.min(out.len());
        for (slot, name) in out.iter_mut().zip(&self.instance_extensions) {
            *slot = name.as_ptr();
        }

        ExtensionList {
            written,
            total,
            truncated: written < total,
        }
    }

    /// Negotiate device creation parameters for an adapter
    ///
    /// Returns a caller-owned descriptor that must be released exactly once
    /// via [`Interface::free_device_create_info`].
    pub fn get_device_create_info(&self, adapter_index: u32) -> D3d9Result<*mut DeviceCreateInfo> {
        let adapter = self
            .adapter(adapter_index)
            .ok_or(D3d9Error::InvalidCall)?;
        create_info::build_device_create_info(adapter)
    }

    /// Release a descriptor obtained from [`Interface::get_device_create_info`]
    ///
    /// # Safety
    ///
    /// `descriptor` must be null or a pointer previously returned by
    /// [`Interface::get_device_create_info`] that has not been freed.
    pub unsafe fn free_device_create_info(&self, descriptor: *mut DeviceCreateInfo) {
        create_info::free_device_create_info(descriptor);
    }

    /// Import an externally created device
    ///
    /// Validates behavior flags and presentation parameters, then adopts the
    /// caller's native handles. Presentation parameters are skipped for the
    /// legacy null-reference device type. On success the device has already
    /// performed its initial display-mode reset.
    pub fn import_device(
        &self,
        adapter_index: u32,
        device_type: DeviceType,
        focus_window: Option<FocusWindow>,
        behavior_flags: BehaviorFlags,
        present_params: &mut PresentParameters,
        fullscreen_mode: Option<&DisplayModeEx>,
        info: DeviceImportInfo,
    ) -> D3d9Result<Arc<Device>> {
        if behavior_flags.contains(BehaviorFlags::PUREDEVICE)
            && !behavior_flags.contains(BehaviorFlags::HARDWARE_VERTEXPROCESSING)
        {
            return Err(D3d9Error::InvalidCall);
        }

        if device_type != DeviceType::NullRef {
            validate_present_parameters(present_params)?;
            if present_params.windowed && fullscreen_mode.is_some() {
                return Err(D3d9Error::InvalidCall);
            }
        }

        let adapter = self
            .adapter(adapter_index)
            .ok_or(D3d9Error::InvalidCall)?;

        import::import_device(
            self.native.as_ref().map(|native| &native.instance),
            self.instance_handle,
            adapter,
            device_type,
            focus_window,
            behavior_flags,
            present_params,
            fullscreen_mode,
            info,
            self.options.clone(),
        )
    }
}

impl Drop for Interface {
    fn drop(&mut self) {
        if let Some(native) = self.native.take() {
            unsafe { native.instance.destroy_instance(None) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AdapterCaps, AdapterLimits};
    use crate::device::SwapEffect;
    use crate::format::D3d9Format;
    use std::ffi::CStr;
    use std::ptr;

    fn test_adapter() -> Adapter {
        Adapter::new(
            vk::PhysicalDevice::null(),
            AdapterCaps {
                queue_families: vec![vk::QueueFamilyProperties {
                    queue_flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
                    queue_count: 1,
                    ..Default::default()
                }],
                supported_extensions: vec![CString::new("VK_KHR_swapchain").unwrap()],
                features: vk::PhysicalDeviceFeatures::default(),
                limits: AdapterLimits::default(),
            },
        )
    }

    fn test_interface() -> Interface {
        Interface::from_adapters(vec![test_adapter()], Options::default())
    }

    fn present_params() -> PresentParameters {
        PresentParameters {
            back_buffer_width: 640,
            back_buffer_height: 480,
            back_buffer_format: D3d9Format::X8R8G8B8,
            back_buffer_count: 1,
            swap_effect: SwapEffect::Discard,
            windowed: true,
            enable_auto_depth_stencil: false,
            auto_depth_stencil_format: D3d9Format::Unknown,
            fullscreen_refresh_rate: 0,
            presentation_interval: 0,
        }
    }

    fn import_info() -> DeviceImportInfo {
        DeviceImportInfo {
            device: vk::Device::null(),
            queue: vk::Queue::null(),
            queue_family: 0,
            extensions: Vec::new(),
            features: vk::PhysicalDeviceFeatures::default(),
            queue_lock_callback: None,
        }
    }

    #[test]
    fn test_extension_capacity_query() {
        let interface = test_interface();
        let list = interface.get_instance_extensions(None);
        assert!(list.total >= 2);
        assert_eq!(list.written, 0);
        assert!(!list.truncated);
        assert!(list.status().is_ok());
    }

    #[test]
    fn test_extension_enumeration_fills_buffer() {
        let interface = test_interface();
        let total = interface.get_instance_extensions(None).total;

        let mut names = vec![ptr::null(); total];
        let list = interface.get_instance_extensions(Some(&mut names));
        assert_eq!(list.written, total);
        assert!(!list.truncated);

        let first = unsafe { CStr::from_ptr(names[0]) };
        assert_eq!(first, ash::extensions::khr::Surface::name());
    }

    #[test]
    fn test_extension_enumeration_reports_truncation_counts() {
        let interface = test_interface();
        let mut names = vec![ptr::null(); 1];
        let list = interface.get_instance_extensions(Some(&mut names));

        assert!(list.truncated);
        assert_eq!(list.written, 1);
        assert!(list.total > 1);
        assert_eq!(list.status(), Err(D3d9Error::MoreData));
        // best-effort partial result
        assert!(!names[0].is_null());
    }

    #[test]
    fn test_debug_utils_extension_follows_options() {
        let options = Options {
            enable_debug_utils: true,
            ..Options::default()
        };
        let interface = Interface::from_adapters(vec![test_adapter()], options);
        assert!(interface
            .instance_extensions
            .iter()
            .any(|name| name.as_c_str() == ash::extensions::ext::DebugUtils::name()));
    }

    #[test]
    fn test_device_create_info_bad_adapter_index() {
        let interface = test_interface();
        assert_eq!(
            interface.get_device_create_info(1).unwrap_err(),
            D3d9Error::InvalidCall
        );
    }

    #[test]
    fn test_device_create_info_roundtrip() {
        let interface = test_interface();
        let descriptor = interface.get_device_create_info(0).unwrap();
        assert!(!descriptor.is_null());
        unsafe { interface.free_device_create_info(descriptor) };
    }

    #[test]
    fn test_pure_device_requires_hardware_vertex_processing() {
        let interface = test_interface();
        let mut params = present_params();
        let result = interface.import_device(
            0,
            DeviceType::NullRef,
            None,
            BehaviorFlags::PUREDEVICE,
            &mut params,
            None,
            import_info(),
        );
        assert!(matches!(result, Err(D3d9Error::InvalidCall)));
    }

    #[test]
    fn test_nullref_skips_present_parameter_validation() {
        let interface = test_interface();
        let mut params = present_params();
        params.back_buffer_count = 7;

        let device = interface
            .import_device(
                0,
                DeviceType::NullRef,
                None,
                BehaviorFlags::HARDWARE_VERTEXPROCESSING,
                &mut params,
                None,
                import_info(),
            )
            .unwrap();
        assert_eq!(device.device_type(), DeviceType::NullRef);
    }

    #[test]
    fn test_bad_present_parameters_rejected() {
        let interface = test_interface();
        let mut params = present_params();
        params.back_buffer_count = 7;

        let result = interface.import_device(
            0,
            DeviceType::Hal,
            None,
            BehaviorFlags::HARDWARE_VERTEXPROCESSING,
            &mut params,
            None,
            import_info(),
        );
        assert!(matches!(result, Err(D3d9Error::InvalidCall)));
    }

    #[test]
    fn test_windowed_with_fullscreen_mode_rejected() {
        let interface = test_interface();
        let mut params = present_params();
        let mode = DisplayModeEx {
            width: 1920,
            height: 1080,
            refresh_rate: 60,
            format: D3d9Format::X8R8G8B8,
        };

        let result = interface.import_device(
            0,
            DeviceType::Hal,
            None,
            BehaviorFlags::HARDWARE_VERTEXPROCESSING,
            &mut params,
            Some(&mode),
            import_info(),
        );
        assert!(matches!(result, Err(D3d9Error::InvalidCall)));
    }

    #[test]
    fn test_bad_adapter_index_rejected() {
        let interface = test_interface();
        let mut params = present_params();
        let result = interface.import_device(
            3,
            DeviceType::Hal,
            None,
            BehaviorFlags::HARDWARE_VERTEXPROCESSING,
            &mut params,
            None,
            import_info(),
        );
        assert!(matches!(result, Err(D3d9Error::InvalidCall)));
    }
}
