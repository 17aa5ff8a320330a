//! Scripted device sources for tests.
//!
//! [`MockEventSource`] stands in for an open event node: the test queues raw
//! records (or a read failure) and the device drains them as if the kernel had
//! produced them.  [`MockOpener`] hands out such sources by path, so the
//! discoverer can be exercised without `/dev/input`.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use inputflow_core::kernel::codes;
use inputflow_core::RawEvent;

use super::{DeviceError, DeviceOpener, DeviceProbe, RawEventSource};

#[derive(Debug, Default)]
struct SourceState {
    queued: VecDeque<RawEvent>,
    failure: Option<io::Error>,
}

/// A queue of raw records behind a fake fd.
///
/// Cloning yields another handle to the same queue.
#[derive(Debug, Clone)]
pub struct MockEventSource {
    fd: RawFd,
    state: Rc<RefCell<SourceState>>,
}

impl MockEventSource {
    /// `fd` only needs to be unique among the fds registered with one loop.
    pub fn new(fd: RawFd) -> Self {
        Self {
            fd,
            state: Rc::new(RefCell::new(SourceState::default())),
        }
    }

    pub fn push(&self, event: RawEvent) {
        self.state.borrow_mut().queued.push_back(event);
    }

    /// Queues `(type, code, value)` records stamped `time`, then `SYN_REPORT`.
    pub fn push_frame(&self, time: i64, records: &[(u16, u16, i32)]) {
        let mut state = self.state.borrow_mut();
        for &(event_type, code, value) in records {
            state
                .queued
                .push_back(RawEvent::new(time, event_type, code, value));
        }
        state.queued.push_back(RawEvent::sync(time));
    }

    /// Makes the next read fail with `error` instead of returning records.
    pub fn fail_next_read(&self, error: io::Error) {
        self.state.borrow_mut().failure = Some(error);
    }

    pub fn pending(&self) -> usize {
        self.state.borrow().queued.len()
    }
}

impl RawEventSource for MockEventSource {
    fn fd(&self) -> RawFd {
        self.fd
    }

    fn read_batch(&mut self, out: &mut Vec<RawEvent>) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        if let Some(error) = state.failure.take() {
            return Err(error);
        }
        let n = state.queued.len();
        out.extend(state.queued.drain(..));
        Ok(n)
    }
}

/// Opens [`MockEventSource`]s registered by path.
#[derive(Debug, Clone, Default)]
pub struct MockOpener {
    devices: Rc<RefCell<HashMap<PathBuf, (MockEventSource, DeviceProbe)>>>,
}

impl MockOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `path` openable; returns the source handle for scripting.
    pub fn register(&self, path: impl Into<PathBuf>, fd: RawFd, probe: DeviceProbe) -> MockEventSource {
        let source = MockEventSource::new(fd);
        self.devices
            .borrow_mut()
            .insert(path.into(), (source.clone(), probe));
        source
    }
}

impl DeviceOpener for MockOpener {
    fn open(&self, path: &Path) -> Result<(Box<dyn RawEventSource>, DeviceProbe), DeviceError> {
        match self.devices.borrow().get(path) {
            Some((source, probe)) => Ok((Box::new(source.clone()), probe.clone())),
            None => Err(DeviceError::Open {
                path: path.to_path_buf(),
                source: io::Error::from_raw_os_error(libc::ENOENT),
            }),
        }
    }
}

/// A probe that classifies as a relative mouse with left/right buttons.
pub fn mouse_probe(name: &str) -> DeviceProbe {
    DeviceProbe {
        name: name.to_string(),
        capabilities: inputflow_core::DeviceCapabilities::MOUSE,
        ..DeviceProbe::default()
    }
}

/// A probe that classifies as a multi-touch panel with `0..=max_x` by
/// `0..=max_y` position axes.
pub fn touchscreen_probe(name: &str, max_x: i32, max_y: i32) -> DeviceProbe {
    let mut probe = DeviceProbe {
        name: name.to_string(),
        capabilities: inputflow_core::DeviceCapabilities::TOUCHSCREEN,
        ..DeviceProbe::default()
    };
    for (axis, maximum) in [(codes::ABS_MT_POSITION_X, max_x), (codes::ABS_MT_POSITION_Y, max_y)] {
        probe.axes.insert(
            axis,
            inputflow_core::AxisInfo {
                axis,
                minimum: 0,
                maximum,
                ..Default::default()
            },
        );
    }
    probe
}
