//! Hot-plug discovery of evdev nodes.
//!
//! [`DeviceDiscoverer`] watches the device directory (normally `/dev/input`)
//! with inotify and opens every `eventN` node that appears, handing the
//! resulting [`InputDevice`] to its [`DiscoveryListener`].  Nodes that vanish
//! are reported by path so the device manager can drop them.
//!
//! # Start-up (for beginners)
//!
//! Nodes that already exist when the host starts produce no inotify event, so
//! the directory is also enumerated once.  That scan is deferred by a one-shot
//! loop timer: [`DeviceDiscoverer::start`] returns before any device is opened,
//! which lets the caller finish wiring the seat layer first.  The watch is
//! installed *before* the scan, and a set of known paths makes sure a node seen
//! by both is opened only once.
//!
//! # Failure policy
//!
//! A node that cannot be opened (permissions, a node that vanished again) is
//! logged and skipped.  A notification queue overflow is logged and answered
//! with a rescan of the directory.  Neither stops discovery.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use inputflow_core::event::sequence::IdCounter;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::infrastructure::event_loop::{EventLoop, EventLoopError, Interest};
use crate::infrastructure::input_device::{device_info, DeviceOpener, InputDevice};
use crate::infrastructure::storage::config::SeatsConfig;

pub mod inotify;

pub use inotify::{parse_inotify_records, DirectoryWatch, InotifyRecord};

/// File-name prefix of evdev character devices.
pub const DEVICE_NODE_PREFIX: &str = "event";

/// Error type for starting discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("cannot watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("event loop rejected the discoverer: {0}")]
    Register(#[from] EventLoopError),

    #[error("discovery is already running")]
    AlreadyStarted,
}

/// Receives devices as they come and go.
pub trait DiscoveryListener {
    /// A node was opened and probed.  The listener takes ownership.
    fn on_device_opened(&self, device: InputDevice);
    /// The node at `path` was deleted.
    fn on_device_node_removed(&self, path: &Path);
}

/// Returns `true` for `eventN` names.
pub fn is_device_node_name(name: &str) -> bool {
    name.strip_prefix(DEVICE_NODE_PREFIX)
        .is_some_and(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
}

/// Watches a device directory and opens what appears in it.
pub struct DeviceDiscoverer {
    device_dir: PathBuf,
    opener: Box<dyn DeviceOpener>,
    seats: SeatsConfig,
    ids: IdCounter,
    known: BTreeSet<PathBuf>,
    listener: Rc<dyn DiscoveryListener>,
    watch: Option<DirectoryWatch>,
    event_loop: Option<Weak<EventLoop>>,
}

impl DeviceDiscoverer {
    pub fn new(
        device_dir: impl Into<PathBuf>,
        opener: Box<dyn DeviceOpener>,
        seats: SeatsConfig,
        listener: Rc<dyn DiscoveryListener>,
    ) -> Self {
        Self {
            device_dir: device_dir.into(),
            opener,
            seats,
            ids: IdCounter::new(),
            known: BTreeSet::new(),
            listener,
            watch: None,
            event_loop: None,
        }
    }

    pub fn device_dir(&self) -> &Path {
        &self.device_dir
    }

    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    /// Paths currently considered open, ascending.
    pub fn known_nodes(&self) -> Vec<PathBuf> {
        self.known.iter().cloned().collect()
    }

    /// Installs the directory watch and schedules the initial scan.
    ///
    /// # Errors
    ///
    /// - [`DiscoveryError::AlreadyStarted`] on a second call.
    /// - [`DiscoveryError::Watch`] if the directory cannot be watched.
    /// - [`DiscoveryError::Register`] if the loop rejects the fd or the timer;
    ///   nothing stays registered in that case.
    pub fn start(this: &Rc<RefCell<Self>>, event_loop: &Rc<EventLoop>) -> Result<(), DiscoveryError> {
        if this.borrow().watch.is_some() {
            return Err(DiscoveryError::AlreadyStarted);
        }
        let dir = this.borrow().device_dir.clone();
        let watch = DirectoryWatch::new(&dir).map_err(|source| DiscoveryError::Watch {
            path: dir.clone(),
            source,
        })?;
        let fd = watch.as_raw_fd();

        let weak = Rc::downgrade(this);
        event_loop.add_fd(fd, Interest::READABLE, move |_, _| {
            if let Some(discoverer) = weak.upgrade() {
                discoverer.borrow_mut().on_watch_readable();
            }
        })?;

        let weak = Rc::downgrade(this);
        let scheduled = event_loop.add_timer(0, 1, move || {
            if let Some(discoverer) = weak.upgrade() {
                discoverer.borrow_mut().enumerate();
            }
        });
        if let Err(e) = scheduled {
            let _ = event_loop.remove_fd(fd);
            return Err(e.into());
        }

        let mut discoverer = this.borrow_mut();
        discoverer.watch = Some(watch);
        discoverer.event_loop = Some(Rc::downgrade(event_loop));
        info!(dir = %dir.display(), "device discovery started");
        Ok(())
    }

    /// Removes the watch from the loop.  Already opened devices are unaffected.
    pub fn stop(&mut self) {
        let Some(watch) = self.watch.take() else {
            return;
        };
        if let Some(event_loop) = self.event_loop.take().and_then(|weak| weak.upgrade()) {
            if let Err(e) = event_loop.remove_fd(watch.as_raw_fd()) {
                warn!(error = %e, "failed to unregister discovery watch");
            }
        }
        info!(dir = %self.device_dir.display(), "device discovery stopped");
    }

    /// Opens every device node in the directory that is not open yet.
    /// Returns how many were opened.
    pub fn enumerate(&mut self) -> usize {
        let nodes = match self.scan() {
            Ok(nodes) => nodes,
            Err(e) => {
                error!(error = %e, "device directory scan failed");
                return 0;
            }
        };
        debug!(count = nodes.len(), "device directory scanned");
        nodes
            .into_iter()
            .filter(|path| self.open_node(path))
            .count()
    }

    /// Applies a batch of directory notifications.
    pub fn handle_records(&mut self, records: Vec<InotifyRecord>) {
        for record in records {
            if record.is_overflow() {
                warn!("inotify queue overflowed, rescanning device directory");
                self.resync();
                continue;
            }
            if !is_device_node_name(&record.name) {
                continue;
            }
            let path = self.device_dir.join(&record.name);
            if record.is_create() {
                self.open_node(&path);
            } else if record.is_delete() && self.known.remove(&path) {
                info!(path = %path.display(), "device node removed");
                self.listener.on_device_node_removed(&path);
            }
        }
    }

    fn on_watch_readable(&mut self) {
        let Some(watch) = self.watch.as_mut() else {
            return;
        };
        match watch.read_records() {
            Ok(records) => self.handle_records(records),
            Err(e) => error!(error = %e, "reading directory notifications failed"),
        }
    }

    /// Brings `known` back in line with the directory after lost events.
    fn resync(&mut self) {
        let present: BTreeSet<PathBuf> = match self.scan() {
            Ok(nodes) => nodes.into_iter().collect(),
            Err(e) => {
                error!(error = %e, "device directory rescan failed");
                return;
            }
        };
        let gone: Vec<PathBuf> = self.known.difference(&present).cloned().collect();
        for path in gone {
            self.known.remove(&path);
            self.listener.on_device_node_removed(&path);
        }
        for path in present {
            self.open_node(&path);
        }
    }

    fn open_node(&mut self, path: &Path) -> bool {
        if self.known.contains(path) {
            return false;
        }
        let (source, probe) = match self.opener.open(path) {
            Ok(opened) => opened,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping device node");
                return false;
            }
        };
        let (seat_id, seat_name) = self.seats.seat_for(&probe.name);
        let id = self.ids.next();
        let info = device_info(id, path, probe, seat_id, seat_name);
        info!(
            device_id = id,
            path = %path.display(),
            name = %info.name,
            seat_id = %info.seat_id,
            "device node opened"
        );
        self.known.insert(path.to_path_buf());
        self.listener.on_device_opened(InputDevice::new(info, source));
        true
    }

    /// `eventN` nodes of the directory ordered by N.
    fn scan(&self) -> Result<Vec<PathBuf>, DiscoveryError> {
        let entries = std::fs::read_dir(&self.device_dir).map_err(|source| DiscoveryError::Scan {
            path: self.device_dir.clone(),
            source,
        })?;
        let mut nodes: Vec<(u32, PathBuf)> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !is_device_node_name(&name) {
                    return None;
                }
                let index = name[DEVICE_NODE_PREFIX.len()..].parse().unwrap_or(u32::MAX);
                Some((index, entry.path()))
            })
            .collect();
        nodes.sort();
        Ok(nodes.into_iter().map(|(_, path)| path).collect())
    }
}

impl Drop for DeviceDiscoverer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for DeviceDiscoverer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceDiscoverer")
            .field("device_dir", &self.device_dir)
            .field("known", &self.known)
            .field("watching", &self.is_watching())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::input_device::mock::{mouse_probe, MockOpener};
    use crate::infrastructure::storage::config::SeatAssignment;

    #[derive(Default)]
    struct RecordingListener {
        opened: RefCell<Vec<(i32, PathBuf, String)>>,
        removed: RefCell<Vec<PathBuf>>,
    }

    impl DiscoveryListener for RecordingListener {
        fn on_device_opened(&self, device: InputDevice) {
            self.opened.borrow_mut().push((
                device.id(),
                device.device_file().to_path_buf(),
                device.info().seat_id.clone(),
            ));
        }

        fn on_device_node_removed(&self, path: &Path) {
            self.removed.borrow_mut().push(path.to_path_buf());
        }
    }

    struct TempDir(PathBuf);

    impl TempDir {
        fn new(tag: &str) -> Self {
            let path = std::env::temp_dir().join(format!("inputflow-discovery-{}-{tag}", std::process::id()));
            let _ = std::fs::remove_dir_all(&path);
            std::fs::create_dir_all(&path).expect("create temp dir");
            Self(path)
        }

        fn touch(&self, name: &str) -> PathBuf {
            let path = self.0.join(name);
            std::fs::write(&path, b"").expect("create node");
            path
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn pump(event_loop: &EventLoop, done: impl Fn() -> bool) {
        for _ in 0..40 {
            if done() {
                return;
            }
            event_loop.run_once(Some(25)).unwrap();
        }
    }

    fn discoverer(
        dir: &Path,
        opener: &MockOpener,
        seats: SeatsConfig,
    ) -> (Rc<RefCell<DeviceDiscoverer>>, Rc<RecordingListener>) {
        let listener = Rc::new(RecordingListener::default());
        let discoverer = Rc::new(RefCell::new(DeviceDiscoverer::new(
            dir,
            Box::new(opener.clone()),
            seats,
            Rc::clone(&listener) as Rc<dyn DiscoveryListener>,
        )));
        (discoverer, listener)
    }

    #[test]
    fn test_is_device_node_name_accepts_only_event_nodes() {
        assert!(is_device_node_name("event0"));
        assert!(is_device_node_name("event17"));
        assert!(!is_device_node_name("event"));
        assert!(!is_device_node_name("mouse0"));
        assert!(!is_device_node_name("event3.bak"));
    }

    #[test]
    fn test_existing_nodes_are_opened_after_deferred_scan() {
        // Arrange
        let dir = TempDir::new("existing");
        let opener = MockOpener::new();
        let node = dir.touch("event3");
        dir.touch("mice");
        opener.register(&node, 40, mouse_probe("desk mouse"));
        let seats = SeatsConfig {
            assignments: vec![SeatAssignment {
                device_name: "desk mouse".to_string(),
                seat_id: "seat1".to_string(),
                seat_name: "desk".to_string(),
            }],
            ..SeatsConfig::default()
        };
        let (discoverer, listener) = discoverer(&dir.0, &opener, seats);
        let event_loop = EventLoop::new().expect("epoll");

        // Act
        DeviceDiscoverer::start(&discoverer, &event_loop).unwrap();
        let opened_at_start = listener.opened.borrow().len();
        pump(&event_loop, || !listener.opened.borrow().is_empty());

        // Assert
        assert_eq!(opened_at_start, 0, "scan must be deferred past start()");
        assert_eq!(*listener.opened.borrow(), vec![(0, node, "seat1".to_string())]);
        discoverer.borrow_mut().stop();
        assert_eq!(event_loop.fd_count(), 0);
    }

    #[test]
    fn test_created_and_deleted_nodes_are_reported() {
        // Arrange
        let dir = TempDir::new("hotplug");
        let opener = MockOpener::new();
        let (discoverer, listener) = discoverer(&dir.0, &opener, SeatsConfig::default());
        let event_loop = EventLoop::new().expect("epoll");
        DeviceDiscoverer::start(&discoverer, &event_loop).unwrap();
        pump(&event_loop, || event_loop.timer_count() == 0);
        opener.register(dir.0.join("event7"), 41, mouse_probe("usb mouse"));

        // Act
        let node = dir.touch("event7");
        pump(&event_loop, || !listener.opened.borrow().is_empty());
        std::fs::remove_file(&node).unwrap();
        pump(&event_loop, || !listener.removed.borrow().is_empty());

        // Assert
        assert_eq!(listener.opened.borrow().len(), 1);
        assert_eq!(listener.opened.borrow()[0].2, "seat0");
        assert_eq!(*listener.removed.borrow(), vec![node]);
        assert!(discoverer.borrow().known_nodes().is_empty());
    }

    #[test]
    fn test_unopenable_node_is_skipped() {
        let dir = TempDir::new("unopenable");
        dir.touch("event9");
        let opener = MockOpener::new();
        let (discoverer, listener) = discoverer(&dir.0, &opener, SeatsConfig::default());

        let opened = discoverer.borrow_mut().enumerate();

        assert_eq!(opened, 0);
        assert!(listener.opened.borrow().is_empty());
    }

    #[test]
    fn test_device_ids_are_never_reused() {
        // Arrange
        let dir = TempDir::new("ids");
        let opener = MockOpener::new();
        let node = dir.0.join("event1");
        opener.register(&node, 42, mouse_probe("mouse"));
        let (discoverer, listener) = discoverer(&dir.0, &opener, SeatsConfig::default());
        let record = |mask| InotifyRecord {
            wd: 1,
            mask,
            name: "event1".to_string(),
        };

        // Act
        discoverer.borrow_mut().handle_records(vec![
            record(libc::IN_CREATE),
            record(libc::IN_CREATE),
            record(libc::IN_DELETE),
            record(libc::IN_CREATE),
        ]);

        // Assert
        let ids: Vec<i32> = listener.opened.borrow().iter().map(|(id, _, _)| *id).collect();
        assert_eq!(ids, vec![0, 1], "duplicate create must not reopen; re-plug gets a new id");
        assert_eq!(*listener.removed.borrow(), vec![node]);
    }

    #[test]
    fn test_overflow_rescans_directory() {
        // Arrange
        let dir = TempDir::new("overflow");
        let opener = MockOpener::new();
        let kept = dir.touch("event2");
        opener.register(&kept, 43, mouse_probe("kept"));
        opener.register(dir.0.join("event5"), 44, mouse_probe("gone"));
        let (discoverer, listener) = discoverer(&dir.0, &opener, SeatsConfig::default());
        discoverer.borrow_mut().handle_records(vec![InotifyRecord {
            wd: 1,
            mask: libc::IN_CREATE,
            name: "event5".to_string(),
        }]);

        // Act
        discoverer.borrow_mut().handle_records(vec![InotifyRecord {
            wd: -1,
            mask: libc::IN_Q_OVERFLOW,
            name: String::new(),
        }]);

        // Assert
        assert_eq!(*listener.removed.borrow(), vec![dir.0.join("event5")]);
        assert_eq!(discoverer.borrow().known_nodes(), vec![kept]);
    }

    #[test]
    fn test_start_on_missing_directory_fails() {
        let opener = MockOpener::new();
        let missing = std::env::temp_dir().join(format!("inputflow-missing-{}", std::process::id()));
        let (discoverer, _) = discoverer(&missing, &opener, SeatsConfig::default());
        let event_loop = EventLoop::new().expect("epoll");

        let result = DeviceDiscoverer::start(&discoverer, &event_loop);

        assert!(matches!(result, Err(DiscoveryError::Watch { .. })));
        assert_eq!(event_loop.fd_count(), 0);
    }
}
