//! Input devices: one open event node, its collectors and its consumer.
//!
//! An [`InputDevice`] owns a [`RawEventSource`] (the open `/dev/input/eventN`
//! node in production, a [`mock::MockEventSource`] in tests), the
//! [`DeviceCollectors`] that fold raw records into kernel-level events, and
//! the registration of its fd with the [`EventLoop`].
//!
//! # Reading (for beginners)
//!
//! The node is opened non-blocking.  When the loop reports it readable the
//! device drains everything available, feeds each record to its collectors,
//! and hands every completed [`KernelEvent`] to its [`KernelEventListener`].
//! A would-block read simply ends the burst.  Any other read error is fatal
//! to this device only: it unregisters its fd, becomes closed, and tells the
//! listener so the device manager can drop it.
//!
//! # Testability
//!
//! The [`RawEventSource`] and [`DeviceOpener`] traits let tests inject
//! scripted record streams without any kernel device.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use inputflow_core::{
    AxisInfo, DeviceCapabilities, DeviceCollectors, DeviceInfo, InputId, KernelEvent, RawEvent,
};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::infrastructure::event_loop::{EventLoop, EventLoopError, Interest};

pub mod evdev;
pub mod mock;

pub use evdev::{EvdevNode, EvdevOpener};

/// Error type for device operations.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{request} failed on {path}: {source}")]
    Ioctl {
        path: PathBuf,
        request: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("read from device {device_id} failed: {source}")]
    Read {
        device_id: i32,
        #[source]
        source: io::Error,
    },

    #[error("device {device_id} is closed")]
    Closed { device_id: i32 },

    #[error("event loop rejected device {device_id}: {source}")]
    Register {
        device_id: i32,
        #[source]
        source: EventLoopError,
    },
}

// ── Seams ─────────────────────────────────────────────────────────────────────

/// A non-blocking stream of raw kernel records.
pub trait RawEventSource {
    /// The fd the event loop watches.
    fn fd(&self) -> RawFd;

    /// Appends every record currently available to `out`.
    ///
    /// Returns the number of records appended; `Ok(0)` means the read would
    /// block.  End of stream and any other failure are errors.
    fn read_batch(&mut self, out: &mut Vec<RawEvent>) -> io::Result<usize>;
}

/// What probing a node reveals about the device behind it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceProbe {
    pub name: String,
    pub capabilities: DeviceCapabilities,
    pub input_id: InputId,
    pub axes: BTreeMap<u16, AxisInfo>,
}

/// Opens and probes device nodes found by the discoverer.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceOpener {
    /// Opens `path` non-blocking and queries its capabilities.
    fn open(&self, path: &Path) -> Result<(Box<dyn RawEventSource>, DeviceProbe), DeviceError>;
}

/// Receives what a device produces.  Implementations use interior
/// mutability; they are called from the device's loop callback.
#[cfg_attr(test, mockall::automock)]
pub trait KernelEventListener {
    fn on_kernel_event(&self, event: KernelEvent);
    /// The device hit a fatal read error and closed itself.
    fn on_device_failed(&self, device_id: i32);
}

// ── InputDevice ───────────────────────────────────────────────────────────────

/// One opened input device.
pub struct InputDevice {
    info: DeviceInfo,
    /// `None` once the device is closed.
    source: Option<Box<dyn RawEventSource>>,
    collectors: DeviceCollectors,
    /// Set while the fd is registered with a loop.
    event_loop: Option<Weak<EventLoop>>,
    buffer: Vec<RawEvent>,
}

impl InputDevice {
    pub fn new(info: DeviceInfo, source: Box<dyn RawEventSource>) -> Self {
        let collectors = DeviceCollectors::new(info.id);
        Self {
            info,
            source: Some(source),
            collectors,
            event_loop: None,
            buffer: Vec::new(),
        }
    }

    pub fn id(&self) -> i32 {
        self.info.id
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn device_file(&self) -> &Path {
        &self.info.device_file
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    pub fn is_receiving(&self) -> bool {
        self.event_loop.is_some()
    }

    /// Registers the device fd with `event_loop`; every completed kernel
    /// event is then delivered to `listener`.
    ///
    /// # Errors
    ///
    /// - [`DeviceError::Closed`] if the device already closed.
    /// - [`DeviceError::Register`] if the loop rejects the fd (including a
    ///   second call without [`stop_receive_events`](Self::stop_receive_events)).
    pub fn start_receive_events(
        this: &Rc<RefCell<Self>>,
        event_loop: &Rc<EventLoop>,
        listener: Rc<dyn KernelEventListener>,
    ) -> Result<(), DeviceError> {
        let (device_id, fd) = {
            let device = this.borrow();
            let source = device.source.as_ref().ok_or(DeviceError::Closed {
                device_id: device.info.id,
            })?;
            (device.info.id, source.fd())
        };

        let weak_device = Rc::downgrade(this);
        event_loop
            .add_fd(fd, Interest::READABLE, move |_, _| {
                if let Some(device) = weak_device.upgrade() {
                    Self::on_readable(&device, listener.as_ref());
                }
            })
            .map_err(|source| DeviceError::Register { device_id, source })?;

        this.borrow_mut().event_loop = Some(Rc::downgrade(event_loop));
        debug!(device_id, fd, "device receiving events");
        Ok(())
    }

    /// Unregisters the device fd.  A no-op when not receiving or closed.
    pub fn stop_receive_events(&mut self) {
        let Some(event_loop) = self.event_loop.take().and_then(|weak| weak.upgrade()) else {
            return;
        };
        if let Some(source) = &self.source {
            if let Err(e) = event_loop.remove_fd(source.fd()) {
                warn!(device_id = self.info.id, error = %e, "failed to unregister device fd");
            }
        }
        self.collectors = DeviceCollectors::new(self.info.id);
        debug!(device_id = self.info.id, "device stopped receiving events");
    }

    /// Stops receiving and releases the node.  Further calls are no-ops.
    pub fn close(&mut self) {
        if self.source.is_none() {
            return;
        }
        self.stop_receive_events();
        self.source = None;
        info!(device_id = self.info.id, path = %self.info.device_file.display(), "device closed");
    }

    /// Reads everything available and runs it through the collectors.
    ///
    /// # Errors
    ///
    /// - [`DeviceError::Closed`] if the device already closed.
    /// - [`DeviceError::Read`] on a fatal read error; events completed before
    ///   the error are lost with it, as the frame they belong to is unusable.
    pub fn drain(&mut self) -> Result<Vec<KernelEvent>, DeviceError> {
        let device_id = self.info.id;
        let source = self
            .source
            .as_mut()
            .ok_or(DeviceError::Closed { device_id })?;

        let mut events = Vec::new();
        loop {
            self.buffer.clear();
            let n = source
                .read_batch(&mut self.buffer)
                .map_err(|source| DeviceError::Read { device_id, source })?;
            if n == 0 {
                break;
            }
            trace!(device_id, records = n, "records read");
            for raw in &self.buffer {
                events.extend(self.collectors.process(raw));
            }
        }
        Ok(events)
    }

    fn on_readable(device: &Rc<RefCell<Self>>, listener: &dyn KernelEventListener) {
        // The borrow ends before delivery: listeners may close this device.
        let result = device.borrow_mut().drain();
        match result {
            Ok(events) => {
                for event in events {
                    listener.on_kernel_event(event);
                }
            }
            Err(e) => {
                let device_id = {
                    let mut device = device.borrow_mut();
                    device.close();
                    device.info.id
                };
                error!(device_id, error = %e, "device read failed, closing");
                listener.on_device_failed(device_id);
            }
        }
    }
}

impl Drop for InputDevice {
    fn drop(&mut self) {
        self.stop_receive_events();
    }
}

impl std::fmt::Debug for InputDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputDevice")
            .field("info", &self.info)
            .field("closed", &self.is_closed())
            .field("receiving", &self.is_receiving())
            .finish()
    }
}

/// Assembles the [`DeviceInfo`] for a probed node.
pub fn device_info(
    id: i32,
    path: &Path,
    probe: DeviceProbe,
    seat_id: String,
    seat_name: String,
) -> DeviceInfo {
    DeviceInfo {
        id,
        device_file: path.to_path_buf(),
        name: probe.name,
        seat_id,
        seat_name,
        capabilities: probe.capabilities,
        input_id: probe.input_id,
        axes: probe.axes,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::mock::MockEventSource;
    use super::*;
    use crate::infrastructure::event_loop::mock::{ManualClock, ScriptedMultiplexer};
    use inputflow_core::kernel::codes;
    use inputflow_core::{KeyState, RelEvent};

    fn keyboard_info(id: i32) -> DeviceInfo {
        DeviceInfo {
            id,
            device_file: PathBuf::from(format!("/dev/input/event{id}")),
            name: "test keyboard".to_string(),
            capabilities: DeviceCapabilities::KEYBOARD,
            ..DeviceInfo::default()
        }
    }

    fn setup(id: i32) -> (Rc<EventLoop>, ScriptedMultiplexer, MockEventSource, Rc<RefCell<InputDevice>>) {
        let mux = ScriptedMultiplexer::new();
        let event_loop = EventLoop::with_parts(Box::new(mux.clone()), Box::new(ManualClock::default()));
        let source = MockEventSource::new(100 + id);
        let device = Rc::new(RefCell::new(InputDevice::new(
            keyboard_info(id),
            Box::new(source.clone()),
        )));
        (event_loop, mux, source, device)
    }

    #[test]
    fn test_drain_folds_records_into_kernel_events() {
        // Arrange
        let (_, _, source, device) = setup(1);
        source.push_frame(
            10,
            &[(codes::EV_REL, codes::REL_X, 4), (codes::EV_REL, codes::REL_Y, -2)],
        );
        source.push_frame(11, &[(codes::EV_KEY, 30, 1)]);

        // Act
        let events = device.borrow_mut().drain().unwrap();

        // Assert
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], KernelEvent::Rel(RelEvent::motion(1, 10, 4, -2)));
        match &events[1] {
            KernelEvent::Key(key) => {
                assert_eq!(key.key_code, 30);
                assert_eq!(key.state, KeyState::Down);
            }
            other => panic!("expected key event, got {other:?}"),
        }
    }

    #[test]
    fn test_readable_device_delivers_events_to_listener() {
        // Arrange
        let (event_loop, mux, source, device) = setup(2);
        let mut listener = MockKernelEventListener::new();
        listener
            .expect_on_kernel_event()
            .withf(|event| matches!(event, KernelEvent::Key(k) if k.key_code == 30))
            .times(1)
            .return_const(());
        listener.expect_on_device_failed().never();
        InputDevice::start_receive_events(&device, &event_loop, Rc::new(listener)).unwrap();
        source.push_frame(5, &[(codes::EV_KEY, 30, 1)]);

        // Act
        mux.set_ready(source.fd());
        event_loop.run_once(Some(0)).unwrap();

        // Assert
        assert!(device.borrow().is_receiving());
    }

    #[test]
    fn test_read_error_closes_device_and_notifies_listener() {
        // Arrange
        let (event_loop, mux, source, device) = setup(3);
        let mut listener = MockKernelEventListener::new();
        listener.expect_on_kernel_event().never();
        listener
            .expect_on_device_failed()
            .withf(|&id| id == 3)
            .times(1)
            .return_const(());
        InputDevice::start_receive_events(&device, &event_loop, Rc::new(listener)).unwrap();
        source.fail_next_read(io::Error::from_raw_os_error(libc::ENODEV));

        // Act
        mux.set_ready(source.fd());
        event_loop.run_once(Some(0)).unwrap();

        // Assert
        assert!(device.borrow().is_closed());
        assert!(!event_loop.has_fd(source.fd()));
        assert!(matches!(
            device.borrow_mut().drain(),
            Err(DeviceError::Closed { device_id: 3 })
        ));
    }

    #[test]
    fn test_start_receive_events_twice_is_rejected() {
        let (event_loop, _, _, device) = setup(4);
        let listener: Rc<dyn KernelEventListener> = Rc::new(MockKernelEventListener::new());
        InputDevice::start_receive_events(&device, &event_loop, Rc::clone(&listener)).unwrap();

        let result = InputDevice::start_receive_events(&device, &event_loop, listener);

        assert!(matches!(result, Err(DeviceError::Register { device_id: 4, .. })));
    }

    #[test]
    fn test_dropping_device_unregisters_its_fd() {
        let (event_loop, _, source, device) = setup(5);
        InputDevice::start_receive_events(&device, &event_loop, Rc::new(MockKernelEventListener::new()))
            .unwrap();
        assert!(event_loop.has_fd(source.fd()));

        drop(device);

        assert!(!event_loop.has_fd(source.fd()));
    }

    #[test]
    fn test_closed_device_cannot_start_receiving() {
        let (event_loop, _, _, device) = setup(6);
        device.borrow_mut().close();
        device.borrow_mut().close();

        let result =
            InputDevice::start_receive_events(&device, &event_loop, Rc::new(MockKernelEventListener::new()));

        assert!(matches!(result, Err(DeviceError::Closed { device_id: 6 })));
    }
}
