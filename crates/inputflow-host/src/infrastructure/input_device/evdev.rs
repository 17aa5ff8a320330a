//! evdev character devices (`/dev/input/eventN`).
//!
//! Opening a node queries everything the pipeline needs up front through the
//! `EVIOC*` ioctls: the name, the bus/vendor/product ids, the supported event
//! types and codes, the input properties and the calibration of every
//! absolute axis.  The node is also switched to `CLOCK_MONOTONIC` timestamps
//! so record times share the event loop's clock.
//!
//! This module uses `unsafe` code exclusively for ioctl FFI calls and for
//! decoding `struct input_event` records.  All `unsafe` blocks are annotated
//! with `// SAFETY:` comments.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use inputflow_core::kernel::codes;
use inputflow_core::{AxisInfo, BitVector, DeviceCapabilities, InputId, RawEvent};
use tracing::{debug, warn};

use super::{DeviceError, DeviceOpener, DeviceProbe, RawEventSource};

/// Records fetched per `read` call.
const READ_BATCH: usize = 64;
const RECORD_SIZE: usize = std::mem::size_of::<libc::input_event>();
const NAME_BUFFER: usize = 256;

// ── ioctl request numbers ─────────────────────────────────────────────────────

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

const fn ioc(dir: u32, nr: u32, size: usize) -> u32 {
    (dir << 30) | ((size as u32) << 16) | ((b'E' as u32) << 8) | nr
}

const fn eviocgname(len: usize) -> u32 {
    ioc(IOC_READ, 0x06, len)
}

const fn eviocgprop(len: usize) -> u32 {
    ioc(IOC_READ, 0x09, len)
}

const fn eviocgbit(event_type: u16, len: usize) -> u32 {
    ioc(IOC_READ, 0x20 + event_type as u32, len)
}

const fn eviocgabs(axis: u16) -> u32 {
    ioc(IOC_READ, 0x40 + axis as u32, std::mem::size_of::<libc::input_absinfo>())
}

const EVIOCGID: u32 = ioc(IOC_READ, 0x02, std::mem::size_of::<libc::input_id>());
const EVIOCSCLOCKID: u32 = ioc(IOC_WRITE, 0xa0, std::mem::size_of::<libc::c_int>());

// ── EvdevNode ─────────────────────────────────────────────────────────────────

/// An open, non-blocking evdev node.
#[derive(Debug)]
pub struct EvdevNode {
    file: File,
    path: PathBuf,
    buffer: Vec<u8>,
}

impl EvdevNode {
    /// Opens `path` read-only and non-blocking.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Open`] if the node cannot be opened.
    pub fn open(path: &Path) -> Result<Self, DeviceError> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(path)
            .map_err(|source| DeviceError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            buffer: vec![0; READ_BATCH * RECORD_SIZE],
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queries name, ids, capabilities and axis calibration.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Ioctl`] if a mandatory query fails.  Failing to
    /// switch the timestamp clock is only logged.
    pub fn probe(&self) -> Result<DeviceProbe, DeviceError> {
        let name = self.name()?;
        let input_id = self.input_id()?;

        let event_types = self.bits(eviocgbit(0, 0), codes::EV_MAX, "EVIOCGBIT(0)")?;
        let key_bits = self.bits(eviocgbit(codes::EV_KEY, 0), codes::KEY_MAX, "EVIOCGBIT(EV_KEY)")?;
        let rel_bits = self.bits(eviocgbit(codes::EV_REL, 0), codes::REL_MAX, "EVIOCGBIT(EV_REL)")?;
        let abs_bits = self.bits(eviocgbit(codes::EV_ABS, 0), codes::ABS_MAX, "EVIOCGBIT(EV_ABS)")?;
        let props = self.bits(eviocgprop(0), codes::INPUT_PROP_MAX, "EVIOCGPROP")?;

        let mut axes = BTreeMap::new();
        if event_types.contains(codes::EV_ABS) {
            for axis in 0..=codes::ABS_MAX {
                if abs_bits.contains(axis) {
                    axes.insert(axis, self.axis_info(axis)?);
                }
            }
        }

        if let Err(e) = self.set_monotonic_clock() {
            warn!(path = %self.path.display(), error = %e, "could not select CLOCK_MONOTONIC timestamps");
        }

        let capabilities = DeviceCapabilities::classify(&event_types, &key_bits, &rel_bits, &props);
        debug!(path = %self.path.display(), %name, ?capabilities, axes = axes.len(), "device probed");
        Ok(DeviceProbe {
            name,
            capabilities,
            input_id,
            axes,
        })
    }

    fn ioctl_error(&self, request: &'static str) -> DeviceError {
        DeviceError::Ioctl {
            path: self.path.clone(),
            request,
            source: io::Error::last_os_error(),
        }
    }

    fn name(&self) -> Result<String, DeviceError> {
        let mut buf = [0u8; NAME_BUFFER];
        // SAFETY: the request encodes `buf.len()`, so the kernel writes at most that many bytes.
        let n = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                eviocgname(buf.len()) as _,
                buf.as_mut_ptr(),
            )
        };
        if n < 0 {
            return Err(self.ioctl_error("EVIOCGNAME"));
        }
        let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        Ok(String::from_utf8_lossy(&buf[..len]).into_owned())
    }

    fn input_id(&self) -> Result<InputId, DeviceError> {
        let mut id = libc::input_id {
            bustype: 0,
            vendor: 0,
            product: 0,
            version: 0,
        };
        // SAFETY: `id` is a valid, correctly sized `struct input_id`.
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), EVIOCGID as _, &mut id) };
        if rc < 0 {
            return Err(self.ioctl_error("EVIOCGID"));
        }
        Ok(InputId {
            bus_type: id.bustype,
            vendor: id.vendor,
            product: id.product,
            version: id.version,
        })
    }

    /// Runs a bit query; `request_base` carries a zero length that is
    /// replaced by the buffer size.
    fn bits(&self, request_base: u32, max_bit: u16, label: &'static str) -> Result<BitVector, DeviceError> {
        let mut bits = BitVector::with_max_bit(max_bit);
        let buf = bits.as_mut_bytes();
        let request = request_base | ((buf.len() as u32) << 16);
        // SAFETY: the request encodes `buf.len()`, so the kernel writes at most that many bytes.
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), request as _, buf.as_mut_ptr()) };
        if rc < 0 {
            return Err(self.ioctl_error(label));
        }
        Ok(bits)
    }

    fn axis_info(&self, axis: u16) -> Result<AxisInfo, DeviceError> {
        // SAFETY: input_absinfo is plain data.
        let mut info: libc::input_absinfo = unsafe { std::mem::zeroed() };
        // SAFETY: `info` is a valid, correctly sized `struct input_absinfo`.
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), eviocgabs(axis) as _, &mut info) };
        if rc < 0 {
            return Err(self.ioctl_error("EVIOCGABS"));
        }
        Ok(AxisInfo {
            axis,
            minimum: info.minimum,
            maximum: info.maximum,
            fuzz: info.fuzz,
            flat: info.flat,
            resolution: info.resolution,
        })
    }

    fn set_monotonic_clock(&self) -> io::Result<()> {
        let clock: libc::c_int = libc::CLOCK_MONOTONIC;
        // SAFETY: the request reads one `int` from the pointer.
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), EVIOCSCLOCKID as _, &clock) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl RawEventSource for EvdevNode {
    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    fn read_batch(&mut self, out: &mut Vec<RawEvent>) -> io::Result<usize> {
        match self.file.read(&mut self.buffer) {
            Ok(0) => Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(n) => {
                let records = decode_records(&self.buffer[..n]);
                let count = records.len();
                out.extend(records);
                Ok(count)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e),
        }
    }
}

/// Decodes whole `struct input_event` records; a trailing partial record is
/// dropped (the kernel never returns one).
pub fn decode_records(bytes: &[u8]) -> Vec<RawEvent> {
    bytes
        .chunks_exact(RECORD_SIZE)
        .map(|chunk| {
            // SAFETY: `chunk` holds exactly one record; read_unaligned copes
            // with the byte buffer's alignment.
            let record: libc::input_event =
                unsafe { std::ptr::read_unaligned(chunk.as_ptr().cast::<libc::input_event>()) };
            let time = record.time.tv_sec as i64 * 1000 + record.time.tv_usec as i64 / 1000;
            RawEvent::new(time, record.type_, record.code, record.value)
        })
        .collect()
}

/// [`DeviceOpener`] for real evdev nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvdevOpener;

impl DeviceOpener for EvdevOpener {
    fn open(&self, path: &Path) -> Result<(Box<dyn RawEventSource>, DeviceProbe), DeviceError> {
        let node = EvdevNode::open(path)?;
        let probe = node.probe()?;
        Ok((Box::new(node), probe))
    }
}
