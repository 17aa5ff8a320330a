//! A thin inotify wrapper and a pure parser for its record stream.
//!
//! This module uses `unsafe` code exclusively for libc FFI calls.
//! All `unsafe` blocks are annotated with `// SAFETY:` comments.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use tracing::warn;

/// Size of `struct inotify_event` without its trailing name.
pub const RECORD_HEADER_LEN: usize = 16;

/// Buffer size for one read; holds many records with `NAME_MAX` names.
const READ_BUFFER_LEN: usize = 4096;

/// One decoded `struct inotify_event`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InotifyRecord {
    pub wd: i32,
    pub mask: u32,
    /// Entry name relative to the watched directory; empty for events on the
    /// directory itself.
    pub name: String,
}

impl InotifyRecord {
    pub fn is_create(&self) -> bool {
        self.mask & libc::IN_CREATE != 0
    }

    pub fn is_delete(&self) -> bool {
        self.mask & libc::IN_DELETE != 0
    }

    pub fn is_overflow(&self) -> bool {
        self.mask & libc::IN_Q_OVERFLOW != 0
    }
}

/// Decodes a buffer of back-to-back inotify records.
///
/// A truncated trailing record is logged and dropped; the records before it
/// are still returned.  Names are NUL-padded by the kernel; the padding is
/// stripped.
pub fn parse_inotify_records(buf: &[u8]) -> Vec<InotifyRecord> {
    let mut records = Vec::new();
    let mut offset = 0;
    while offset < buf.len() {
        let Some(header) = buf.get(offset..offset + RECORD_HEADER_LEN) else {
            warn!(offset, available = buf.len() - offset, "truncated inotify header, skipping");
            break;
        };
        let wd = i32::from_ne_bytes([header[0], header[1], header[2], header[3]]);
        let mask = u32::from_ne_bytes([header[4], header[5], header[6], header[7]]);
        let len = u32::from_ne_bytes([header[12], header[13], header[14], header[15]]) as usize;

        let name_start = offset + RECORD_HEADER_LEN;
        let Some(raw_name) = buf.get(name_start..name_start + len) else {
            warn!(offset, len, "truncated inotify name, skipping");
            break;
        };
        let end = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
        records.push(InotifyRecord {
            wd,
            mask,
            name: String::from_utf8_lossy(&raw_name[..end]).into_owned(),
        });
        offset = name_start + len;
    }
    records
}

/// A non-blocking inotify instance watching one directory.
#[derive(Debug)]
pub struct DirectoryWatch {
    fd: OwnedFd,
    buffer: Vec<u8>,
}

impl DirectoryWatch {
    /// Watches `dir` for entries being created or deleted.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the inotify instance or the watch cannot be
    /// created (for example when `dir` does not exist).
    pub fn new(dir: &Path) -> io::Result<Self> {
        let c_path = CString::new(dir.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        // SAFETY: inotify_init1 takes no pointers; the result is checked below.
        let raw = unsafe { libc::inotify_init1(libc::IN_NONBLOCK | libc::IN_CLOEXEC) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `raw` is a freshly created descriptor owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        // SAFETY: `c_path` is a valid NUL-terminated string for the call.
        let wd = unsafe {
            libc::inotify_add_watch(
                fd.as_raw_fd(),
                c_path.as_ptr(),
                libc::IN_CREATE | libc::IN_DELETE,
            )
        };
        if wd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            fd,
            buffer: vec![0; READ_BUFFER_LEN],
        })
    }

    /// Reads and decodes every pending record.  Returns an empty list when
    /// nothing is pending.
    ///
    /// # Errors
    ///
    /// Returns the OS error for failures other than would-block.
    pub fn read_records(&mut self) -> io::Result<Vec<InotifyRecord>> {
        let mut records = Vec::new();
        loop {
            // SAFETY: `buffer` is a writable region of exactly `len` bytes.
            let n = unsafe {
                libc::read(
                    self.fd.as_raw_fd(),
                    self.buffer.as_mut_ptr().cast(),
                    self.buffer.len(),
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::WouldBlock => return Ok(records),
                    io::ErrorKind::Interrupted => continue,
                    _ => return Err(err),
                }
            }
            if n == 0 {
                return Ok(records);
            }
            records.extend(parse_inotify_records(&self.buffer[..n as usize]));
        }
    }
}

impl AsRawFd for DirectoryWatch {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
