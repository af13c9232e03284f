//! Translation-layer device object
//!
//! A [`Device`] wraps an adopted native Vulkan device/queue pair and carries
//! everything the rest of the runtime hangs off it: the command-stream
//! worker, the cooperative submission-queue token, the coarser device-state
//! lock, the live-resource registry, and the losable-resource counter.
//! Devices are only ever constructed through import; the runtime never
//! creates the native device itself.

pub mod create_info;
pub mod import;
pub mod lock;

use ash::vk;
use raw_window_handle::RawWindowHandle;
use slotmap::SlotMap;
use std::ffi::CString;
use std::sync::{Arc, Mutex};

use crate::adapter::AdapterLimits;
use crate::cs::{CommandStream, CsClosure, CsContext, QueueLockCallback, SYNCHRONIZE_ALL};
use crate::error::{D3d9Error, D3d9Result};
use crate::format::D3d9Format;
use crate::options::Options;
use crate::resource::{GpuSync, Initializer, LockFlags, Pool, ResourceKey, ResourceType};

use lock::CooperativeLock;

/// Legacy device types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DeviceType {
    /// Hardware rasterization
    Hal = 1,
    /// Reference rasterizer
    Ref = 2,
    /// Software rasterizer
    Sw = 3,
    /// Null-reference device; accepts intentionally invalid parameters for
    /// compatibility with callers that rely on that
    NullRef = 4,
}

bitflags::bitflags! {
    /// Legacy device behavior flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BehaviorFlags: u32 {
        /// Preserve FPU state across calls
        const FPU_PRESERVE = 0x0000_0002;
        /// Device may be entered from multiple threads
        const MULTITHREADED = 0x0000_0004;
        /// Device performs no state validation or emulation
        const PUREDEVICE = 0x0000_0010;
        /// Vertex processing in software
        const SOFTWARE_VERTEXPROCESSING = 0x0000_0020;
        /// Vertex processing in hardware
        const HARDWARE_VERTEXPROCESSING = 0x0000_0040;
        /// Vertex processing split between hardware and software
        const MIXED_VERTEXPROCESSING = 0x0000_0080;
        /// Driver management of resources disabled
        const DISABLE_DRIVER_MANAGEMENT = 0x0000_0100;
        /// Device must not change the focus window
        const NOWINDOWCHANGES = 0x0000_0800;
    }
}

/// Swap effects accepted by the presentation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SwapEffect {
    /// Back buffer contents are undefined after present
    Discard = 1,
    /// Back buffers rotate
    Flip = 2,
    /// Back buffer is copied to the front buffer
    Copy = 3,
    /// Overlay presentation
    Overlay = 4,
    /// Flip without waiting for the queue
    FlipEx = 5,
}

/// Legacy presentation parameters
///
/// Presentation itself is out of scope for this layer; the parameters are
/// validated and recorded so the initial display-mode reset can happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentParameters {
    /// Back buffer width; zero in windowed mode means "use the window size"
    pub back_buffer_width: u32,
    /// Back buffer height
    pub back_buffer_height: u32,
    /// Back buffer format
    pub back_buffer_format: D3d9Format,
    /// Number of back buffers; zero is normalized to one
    pub back_buffer_count: u32,
    /// Swap effect
    pub swap_effect: SwapEffect,
    /// Windowed or exclusive fullscreen
    pub windowed: bool,
    /// Create an automatic depth-stencil surface
    pub enable_auto_depth_stencil: bool,
    /// Format of the automatic depth-stencil surface
    pub auto_depth_stencil_format: D3d9Format,
    /// Refresh rate in fullscreen mode; zero in windowed mode
    pub fullscreen_refresh_rate: u32,
    /// Presentation interval
    pub presentation_interval: u32,
}

/// Extended display mode used for exclusive fullscreen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayModeEx {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Refresh rate in Hz
    pub refresh_rate: u32,
    /// Pixel format
    pub format: D3d9Format,
}

/// Validate caller-supplied presentation parameters
///
/// Mirrors the legacy rules the runtime enforces before any device state is
/// touched: at most three back buffers, copy swap effect limited to a single
/// back buffer, and explicit dimensions in exclusive fullscreen.
pub fn validate_present_parameters(params: &PresentParameters) -> D3d9Result<()> {
    if params.back_buffer_count > 3 {
        return Err(D3d9Error::InvalidCall);
    }

    if params.swap_effect == SwapEffect::Copy && params.back_buffer_count > 1 {
        return Err(D3d9Error::InvalidCall);
    }

    if !params.windowed && (params.back_buffer_width == 0 || params.back_buffer_height == 0) {
        return Err(D3d9Error::InvalidCall);
    }

    Ok(())
}

/// Focus window handle attached to an imported device
///
/// Wraps [`RawWindowHandle`] so the device can be shared across threads; the
/// handle is an opaque identifier here and is never dereferenced.
#[derive(Debug, Clone, Copy)]
pub struct FocusWindow(pub RawWindowHandle);

unsafe impl Send for FocusWindow {}
unsafe impl Sync for FocusWindow {}

/// Raw native handles of an imported device
///
/// Purely informational; exposing them transfers no ownership.
#[derive(Debug, Clone, Copy)]
pub struct DeviceHandles {
    /// Native instance the device was created against
    pub instance: vk::Instance,
    /// Physical device of the adapter
    pub physical_device: vk::PhysicalDevice,
    /// Adopted native device
    pub device: vk::Device,
    /// Adopted submission queue
    pub queue: vk::Queue,
    /// Queue index within its family
    pub queue_index: u32,
    /// Queue family index
    pub queue_family: u32,
}

/// Live function loader for the adopted device
///
/// Present only when the importing interface had a Vulkan loader to resolve
/// device-level entry points against; a null-reference import runs without
/// one and performs no native work.
pub(crate) struct NativeDevice {
    pub(crate) device: ash::Device,
    pub(crate) memory_props: vk::PhysicalDeviceMemoryProperties,
}

/// Capability subset the resource validator checks against
#[derive(Debug, Clone, Copy)]
pub struct DeviceCaps {
    /// Adapter limits
    pub limits: AdapterLimits,
    /// Highest supported color sample count
    pub max_sample_count: u32,
}

/// Bookkeeping entry for one live resource
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResourceInfo {
    #[allow(dead_code)]
    pub resource_type: ResourceType,
    pub pool: Pool,
}

/// Device-wide mutable state guarded by the device-state lock
struct DeviceState {
    resources: SlotMap<ResourceKey, ResourceInfo>,
    losable_resources: u32,
    display_mode: Option<DisplayModeEx>,
    present_params: Option<PresentParameters>,
}

/// Parameters handed from the importer to the device constructor
pub(crate) struct DeviceCreateParams {
    pub device_type: DeviceType,
    pub behavior_flags: BehaviorFlags,
    pub focus_window: Option<FocusWindow>,
    pub handles: DeviceHandles,
    pub native: Option<NativeDevice>,
    pub features: vk::PhysicalDeviceFeatures,
    pub extensions: Vec<CString>,
    pub caps: DeviceCaps,
    pub queue_callback: Option<QueueLockCallback>,
    pub options: Options,
}

/// An adopted legacy device
pub struct Device {
    device_type: DeviceType,
    behavior_flags: BehaviorFlags,
    #[allow(dead_code)]
    focus_window: Option<FocusWindow>,
    handles: DeviceHandles,
    native: Option<NativeDevice>,
    features: vk::PhysicalDeviceFeatures,
    extensions: Vec<CString>,
    caps: DeviceCaps,
    options: Options,
    cs: CommandStream,
    queue_lock: Arc<CooperativeLock>,
    device_lock: CooperativeLock,
    state: Mutex<DeviceState>,
    initializer: Initializer,
}

impl Device {
    pub(crate) fn new(params: DeviceCreateParams) -> Arc<Self> {
        let queue_lock = Arc::new(CooperativeLock::new());

        let ctx = CsContext::new(
            params.native.as_ref().map(|native| native.device.clone()),
            params.handles.queue,
            params.handles.queue_family,
            Arc::clone(&queue_lock),
            params.queue_callback,
        );
        let cs = CommandStream::new(ctx, params.options.cs_chunk_size);

        Arc::new(Self {
            device_type: params.device_type,
            behavior_flags: params.behavior_flags,
            focus_window: params.focus_window,
            handles: params.handles,
            native: params.native,
            features: params.features,
            extensions: params.extensions,
            caps: params.caps,
            options: params.options,
            cs,
            queue_lock,
            device_lock: CooperativeLock::new(),
            state: Mutex::new(DeviceState {
                resources: SlotMap::with_key(),
                losable_resources: 0,
                display_mode: None,
                present_params: None,
            }),
            initializer: Initializer::new(),
        })
    }

    /// Legacy device type this device was imported as
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Behavior flags the device was imported with
    pub fn behavior_flags(&self) -> BehaviorFlags {
        self.behavior_flags
    }

    /// Raw native handles; informational only
    pub fn handles(&self) -> &DeviceHandles {
        &self.handles
    }

    /// Capability subset used by resource validation
    pub fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    /// Feature set the device was adopted with
    pub fn features(&self) -> &vk::PhysicalDeviceFeatures {
        &self.features
    }

    /// Device extensions the device was adopted with
    pub fn extensions(&self) -> &[CString] {
        &self.extensions
    }

    /// Runtime options
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Deferred-initialization collaborator
    pub(crate) fn initializer(&self) -> &Initializer {
        &self.initializer
    }

    pub(crate) fn native(&self) -> Option<&NativeDevice> {
        self.native.as_ref()
    }

    /// Enqueue a deferred operation on the command stream
    ///
    /// A resource sync passed here is tracked atomically with the enqueue,
    /// so the operation is never observable as pending-but-untracked.
    pub(crate) fn emit_cs(&self, op: CsClosure, sync: Option<&GpuSync>) -> u64 {
        self.cs.enqueue(op, sync)
    }

    /// Force submission of all buffered work
    ///
    /// Returns the sequence number to synchronize against.
    pub(crate) fn flush(&self) -> u64 {
        // An empty batch still forces the worker through a submission cycle
        self.cs.enqueue(Box::new(|_| {}), None)
    }

    /// Block until every operation enqueued so far has fully executed
    pub(crate) fn synchronize_cs(&self) {
        self.cs.synchronize(SYNCHRONIZE_ALL);
    }

    /// Wait until pending native work referencing a resource has completed
    ///
    /// With [`LockFlags::DONOTWAIT`] this returns immediately; `false` means
    /// work referencing the resource is still outstanding.
    pub(crate) fn wait_for_resource(&self, sync: &GpuSync, flags: LockFlags) -> bool {
        let pending = sync.pending_seq();
        if pending <= self.cs.last_executed() {
            return true;
        }

        if flags.contains(LockFlags::DONOTWAIT) {
            return false;
        }

        self.cs.synchronize(pending);
        true
    }

    /// Register a freshly constructed resource
    ///
    /// The losable-resource counter moves together with the default-pool
    /// classification, both under the device-state lock.
    pub(crate) fn register_resource(
        &self,
        resource_type: ResourceType,
        pool: Pool,
    ) -> ResourceKey {
        let mut state = self.state.lock().unwrap();
        let key = state.resources.insert(ResourceInfo {
            resource_type,
            pool,
        });

        if pool == Pool::Default {
            state.losable_resources += 1;
            if state.losable_resources > self.options.losable_resource_warn_threshold {
                log::warn!(
                    "{} losable resources alive; device loss recovery will be expensive",
                    state.losable_resources
                );
            }
        }

        key
    }

    pub(crate) fn unregister_resource(&self, key: ResourceKey) {
        let mut state = self.state.lock().unwrap();
        if let Some(info) = state.resources.remove(key) {
            if info.pool == Pool::Default {
                state.losable_resources -= 1;
            }
        }
    }

    /// Number of live default-pool resources
    pub fn losable_resource_count(&self) -> u32 {
        self.state.lock().unwrap().losable_resources
    }

    /// Number of live resources of any pool
    pub fn resource_count(&self) -> usize {
        self.state.lock().unwrap().resources.len()
    }

    /// Submission-queue token shared with the command-stream worker
    pub(crate) fn queue_lock(&self) -> &Arc<CooperativeLock> {
        &self.queue_lock
    }

    /// Coarse lock over device-wide mutable state
    pub(crate) fn device_lock(&self) -> &CooperativeLock {
        &self.device_lock
    }

    /// Mandatory initial display-mode reset performed at import time
    pub(crate) fn initial_reset(
        &self,
        params: &mut PresentParameters,
        fullscreen_mode: Option<&DisplayModeEx>,
    ) -> D3d9Result<()> {
        if params.back_buffer_count == 0 {
            params.back_buffer_count = 1;
        }

        let display_mode = match fullscreen_mode {
            Some(mode) => *mode,
            None => DisplayModeEx {
                width: params.back_buffer_width,
                height: params.back_buffer_height,
                refresh_rate: params.fullscreen_refresh_rate,
                format: params.back_buffer_format,
            },
        };

        let mut state = self.state.lock().unwrap();
        state.display_mode = Some(display_mode);
        state.present_params = Some(*params);

        log::debug!(
            "Initial reset: {}x{} ({:?})",
            display_mode.width,
            display_mode.height,
            display_mode.format
        );

        Ok(())
    }

    /// Display mode recorded by the most recent reset
    pub fn display_mode(&self) -> Option<DisplayModeEx> {
        self.state.lock().unwrap().display_mode
    }

    /// Presentation parameters recorded by the most recent reset
    pub fn present_parameters(&self) -> Option<PresentParameters> {
        self.state.lock().unwrap().present_params
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // Pending closures hold strong resource references; draining them
        // before teardown keeps backing memory alive until execution
        self.cs.shutdown();

        if let Some(native) = &self.native {
            unsafe {
                let _ = native.device.device_wait_idle();
            }
        }
        // The adopted device/queue handles belong to the importer and are
        // never destroyed here
    }
}
