//! # nined
//!
//! Native-interop layer of a legacy D3D9-style graphics runtime translated
//! onto Vulkan.
//!
//! ## Features
//!
//! - **Device import**: adopt an externally created `vk::Device` and queue
//!   into a translation-layer device
//! - **Device-creation negotiation**: ABI-stable descriptor carrying the
//!   queue families, extensions, and features the runtime needs
//! - **Resource interop**: create legacy-typed images through an extended
//!   descriptor and query their true native creation parameters
//! - **Command-stream pacing**: strict-FIFO deferred execution with
//!   cooperative queue locking, full-drain flushes, and per-resource waits
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ash::vk;
//! use nined::device::import::DeviceImportInfo;
//! use nined::device::{BehaviorFlags, DeviceType, PresentParameters, SwapEffect};
//! use nined::format::D3d9Format;
//! use nined::interop::InteropDevice;
//! use nined::{Interface, Options};
//!
//! fn main() -> Result<(), nined::D3d9Error> {
//!     let interface = Interface::new(Options::default())?;
//!
//!     let mut params = PresentParameters {
//!         back_buffer_width: 1280,
//!         back_buffer_height: 720,
//!         back_buffer_format: D3d9Format::X8R8G8B8,
//!         back_buffer_count: 1,
//!         swap_effect: SwapEffect::Discard,
//!         windowed: true,
//!         enable_auto_depth_stencil: false,
//!         auto_depth_stencil_format: D3d9Format::Unknown,
//!         fullscreen_refresh_rate: 0,
//!         presentation_interval: 0,
//!     };
//!
//!     // Handles created by the host through its own Vulkan plumbing
//!     let import = DeviceImportInfo {
//!         device: vk::Device::null(),
//!         queue: vk::Queue::null(),
//!         queue_family: 0,
//!         extensions: Vec::new(),
//!         features: vk::PhysicalDeviceFeatures::default(),
//!         queue_lock_callback: None,
//!     };
//!
//!     let device = interface.import_device(
//!         0,
//!         DeviceType::Hal,
//!         None,
//!         BehaviorFlags::HARDWARE_VERTEXPROCESSING,
//!         &mut params,
//!         None,
//!         import,
//!     )?;
//!
//!     let interop = InteropDevice::new(device);
//!     interop.flush_rendering_commands();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions, clippy::too_many_arguments)]

pub mod adapter;
pub mod cs;
pub mod device;
pub mod error;
pub mod format;
pub mod interface;
pub mod interop;
pub mod options;
pub mod resource;

pub use error::{D3d9Error, D3d9Result};
pub use interface::{ExtensionList, Interface};
pub use options::Options;

/// Common imports for embedding hosts
pub mod prelude {
    pub use crate::adapter::{Adapter, AdapterCaps, AdapterLimits};
    pub use crate::device::import::DeviceImportInfo;
    pub use crate::device::{
        BehaviorFlags, Device, DeviceType, DisplayModeEx, PresentParameters, SwapEffect,
    };
    pub use crate::format::D3d9Format;
    pub use crate::interop::{ExtImageDesc, InteropDevice, InteropTexture};
    pub use crate::resource::{
        BufferDesc, LockFlags, MultiSampleType, Pool, Resource, ResourceType, Usage,
    };
    pub use crate::{D3d9Error, D3d9Result, ExtensionList, Interface, Options};
}
