//! Runtime wiring: one object that owns the pipeline and connects its parts.
//!
//! # Who owns what (for beginners)
//!
//! [`HostContext`] owns the event loop handle, the device manager, the seat
//! manager and the display topology.  The loop owns the callbacks, and the
//! callbacks need to reach back into the context, so they only hold a
//! [`Weak`] reference to it: ownership flows one way and dropping the context
//! tears everything down.
//!
//! ```text
//! DeviceDiscoverer ──opened──▶ HostContext::add_device ─▶ InputDeviceManager
//!                                                             │ listener
//! InputDevice ──kernel events──▶ HostContext ──▶ SeatManager ◀┘
//!                                    │                │
//!                         gesture timers (loop)   EventDispatcher
//! ```
//!
//! Every `RefCell` borrow is released before the code calls out to another
//! component that might call back in.

use std::cell::{Ref, RefCell};
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use inputflow_core::{
    DeviceInfo, DisplayChange, KernelEvent, LogicalDisplay, PhysicalDisplayState, TopologyError,
    WindowStateManager,
};
use tracing::{debug, info, warn};

use crate::application::dispatch::{EventDispatcher, GestureTimer};
use crate::application::seat_manager::SeatManager;
use crate::infrastructure::device_manager::{DeviceListener, InputDeviceManager};
use crate::infrastructure::discovery::{DeviceDiscoverer, DiscoveryError, DiscoveryListener};
use crate::infrastructure::event_loop::{EventLoop, EventLoopError};
use crate::infrastructure::input_device::{DeviceOpener, InputDevice, KernelEventListener};
use crate::infrastructure::storage::config::{GesturesConfig, SeatsConfig};

/// The assembled host pipeline.
pub struct HostContext {
    event_loop: Rc<EventLoop>,
    devices: RefCell<InputDeviceManager>,
    seats: RefCell<SeatManager>,
    topology: RefCell<WindowStateManager>,
    discoverer: RefCell<Option<Rc<RefCell<DeviceDiscoverer>>>>,
}

impl HostContext {
    /// Builds the pipeline around `event_loop`.  Nothing is opened yet; call
    /// [`start_discovery`](Self::start_discovery) or
    /// [`add_device`](Self::add_device) to bring devices in.
    pub fn new(
        event_loop: Rc<EventLoop>,
        dispatcher: Rc<dyn EventDispatcher>,
        gestures: &GesturesConfig,
    ) -> Rc<Self> {
        let context = Rc::new(Self {
            event_loop,
            devices: RefCell::new(InputDeviceManager::new()),
            seats: RefCell::new(SeatManager::new(
                dispatcher,
                gestures.tuning,
                gestures.enable_touchpad_gestures,
            )),
            topology: RefCell::new(WindowStateManager::new()),
            discoverer: RefCell::new(None),
        });
        let bridge = Rc::new(SeatBridge {
            context: Rc::downgrade(&context),
        });
        context.devices.borrow_mut().add_listener(bridge);
        context
    }

    pub fn event_loop(&self) -> &Rc<EventLoop> {
        &self.event_loop
    }

    pub fn seats(&self) -> Ref<'_, SeatManager> {
        self.seats.borrow()
    }

    pub fn topology(&self) -> Ref<'_, WindowStateManager> {
        self.topology.borrow()
    }

    pub fn device_ids(&self) -> Vec<i32> {
        self.devices.borrow().device_ids()
    }

    /// Starts watching `device_dir`; devices appear once the loop runs.
    ///
    /// # Errors
    ///
    /// Any [`DiscoveryError`] from [`DeviceDiscoverer::start`].
    pub fn start_discovery(
        self: &Rc<Self>,
        device_dir: impl Into<PathBuf>,
        opener: Box<dyn DeviceOpener>,
        seats: SeatsConfig,
    ) -> Result<(), DiscoveryError> {
        if self.discoverer.borrow().is_some() {
            return Err(DiscoveryError::AlreadyStarted);
        }
        let listener = Rc::new(DiscoveryBridge {
            context: Rc::downgrade(self),
        });
        let discoverer = Rc::new(RefCell::new(DeviceDiscoverer::new(
            device_dir, opener, seats, listener,
        )));
        DeviceDiscoverer::start(&discoverer, &self.event_loop)?;
        *self.discoverer.borrow_mut() = Some(discoverer);
        Ok(())
    }

    /// Registers an opened device, binds it to its seats and starts reading.
    /// Failures are logged and the device is dropped.
    pub fn add_device(self: &Rc<Self>, device: InputDevice) {
        let added = self.devices.borrow_mut().add_device(device);
        let handle = match added {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "device rejected");
                return;
            }
        };
        let listener = Rc::new(KernelBridge {
            context: Rc::downgrade(self),
        });
        if let Err(e) = InputDevice::start_receive_events(&handle, &self.event_loop, listener) {
            let device_id = handle.borrow().id();
            warn!(device_id, error = %e, "device cannot be read, dropping it");
            if let Err(e) = self.devices.borrow_mut().remove_device(device_id) {
                warn!(device_id, error = %e, "failed to drop unreadable device");
            }
        }
    }

    /// Closes the device opened from `path`, if any.
    pub fn remove_device_node(&self, path: &Path) {
        if let Err(e) = self.devices.borrow_mut().remove_device_by_file(path) {
            debug!(path = %path.display(), error = %e, "removed node had no open device");
        }
    }

    /// Replaces the display topology and tells the seats what changed.
    ///
    /// # Errors
    ///
    /// Any [`TopologyError`]; the topology is left untouched in that case.
    pub fn update_display_info(
        &self,
        physical: Vec<PhysicalDisplayState>,
        logical: Vec<LogicalDisplay>,
    ) -> Result<Vec<DisplayChange>, TopologyError> {
        let changes = self
            .topology
            .borrow_mut()
            .update_display_info(physical, logical)?;
        info!(changes = changes.len(), "display topology updated");
        let topology = self.topology.borrow();
        self.seats.borrow_mut().on_display_changes(&changes, &topology);
        Ok(changes)
    }

    /// Runs the loop until [`EventLoop::exit_async`].
    ///
    /// # Errors
    ///
    /// Returns the loop's [`EventLoopError`] if the multiplexer fails.
    pub fn run(&self) -> Result<(), EventLoopError> {
        self.event_loop.run()
    }

    /// Stops discovery and closes every device, releasing what they held.
    pub fn shutdown(&self) {
        if let Some(discoverer) = self.discoverer.borrow_mut().take() {
            discoverer.borrow_mut().stop();
        }
        self.devices.borrow_mut().clear();
        info!("host pipeline shut down");
    }

    fn on_kernel_event(self: &Rc<Self>, event: KernelEvent) {
        let timers = {
            let mut topology = self.topology.borrow_mut();
            self.seats.borrow_mut().on_kernel_event(&event, &mut topology)
        };
        for timer in timers {
            self.schedule_gesture_timer(timer);
        }
    }

    fn schedule_gesture_timer(self: &Rc<Self>, timer: GestureTimer) {
        let context = Rc::downgrade(self);
        let GestureTimer {
            device_id,
            token,
            after,
        } = timer;
        let scheduled = self.event_loop.add_timer(after, 1, move || {
            if let Some(context) = context.upgrade() {
                context.seats.borrow_mut().on_gesture_timeout(device_id, token);
            }
        });
        if let Err(e) = scheduled {
            warn!(device_id, token, error = %e, "gesture timer not scheduled");
        }
    }

    fn on_device_failed(&self, device_id: i32) {
        if let Err(e) = self.devices.borrow_mut().remove_device(device_id) {
            debug!(device_id, error = %e, "failed device already removed");
        }
    }
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext")
            .field("devices", &self.devices)
            .field("seats", &self.seats)
            .finish_non_exhaustive()
    }
}

// ── Listener adapters ─────────────────────────────────────────────────────────

/// Device manager → seat manager.
struct SeatBridge {
    context: Weak<HostContext>,
}

impl DeviceListener for SeatBridge {
    fn on_device_added(&self, device: &Rc<RefCell<InputDevice>>) {
        if let Some(context) = self.context.upgrade() {
            let info = device.borrow().info().clone();
            context.seats.borrow_mut().on_device_added(&info);
        }
    }

    fn on_device_removed(&self, info: &DeviceInfo) {
        if let Some(context) = self.context.upgrade() {
            let time = context.event_loop.now_ms();
            let mut topology = context.topology.borrow_mut();
            context
                .seats
                .borrow_mut()
                .on_device_removed(info.id, time, &mut topology);
        }
    }
}

/// Discoverer → context.
struct DiscoveryBridge {
    context: Weak<HostContext>,
}

impl DiscoveryListener for DiscoveryBridge {
    fn on_device_opened(&self, device: InputDevice) {
        if let Some(context) = self.context.upgrade() {
            context.add_device(device);
        }
    }

    fn on_device_node_removed(&self, path: &Path) {
        if let Some(context) = self.context.upgrade() {
            context.remove_device_node(path);
        }
    }
}

/// Device → context.
struct KernelBridge {
    context: Weak<HostContext>,
}

impl KernelEventListener for KernelBridge {
    fn on_kernel_event(&self, event: KernelEvent) {
        if let Some(context) = self.context.upgrade() {
            context.on_kernel_event(event);
        }
    }

    fn on_device_failed(&self, device_id: i32) {
        if let Some(context) = self.context.upgrade() {
            context.on_device_failed(device_id);
        }
    }
}
