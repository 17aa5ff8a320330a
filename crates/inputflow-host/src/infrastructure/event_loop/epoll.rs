//! Linux backends for the event loop: epoll, the monotonic clock and signalfd.
//!
//! This module uses `unsafe` code exclusively for libc FFI calls.
//! All `unsafe` blocks are annotated with `// SAFETY:` comments.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use super::{Clock, Interest, Multiplexer};

/// Ready events fetched per `epoll_wait` call.
const EPOLL_BATCH: usize = 64;

/// [`Multiplexer`] over one epoll instance.
pub struct EpollMultiplexer {
    epoll: OwnedFd,
    events: Vec<libc::epoll_event>,
}

impl EpollMultiplexer {
    /// Creates a close-on-exec epoll instance.
    ///
    /// # Errors
    ///
    /// Returns the OS error if `epoll_create1` fails.
    pub fn new() -> io::Result<Self> {
        // SAFETY: epoll_create1 takes no pointers; the result is checked below.
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            // SAFETY: `fd` is a freshly created descriptor owned by nobody else.
            epoll: unsafe { OwnedFd::from_raw_fd(fd) },
            events: vec![libc::epoll_event { events: 0, u64: 0 }; EPOLL_BATCH],
        })
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, interest: Interest) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: interest.bits(),
            u64: fd as u64,
        };
        // SAFETY: `event` is a valid epoll_event for the duration of the call.
        let rc = unsafe { libc::epoll_ctl(self.epoll.as_raw_fd(), op, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Multiplexer for EpollMultiplexer {
    fn add(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, interest)
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, interest)
    }

    fn delete(&mut self, fd: RawFd) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_DEL, fd, Interest::READABLE)
    }

    fn wait(&mut self, timeout_ms: i32, ready: &mut Vec<(RawFd, Interest)>) -> io::Result<()> {
        // SAFETY: `events` has `len` initialised entries the kernel may overwrite.
        let n = unsafe {
            libc::epoll_wait(
                self.epoll.as_raw_fd(),
                self.events.as_mut_ptr(),
                self.events.len() as libc::c_int,
                timeout_ms,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }
        for event in &self.events[..n as usize] {
            // Copy out of the (packed on x86_64) struct before use.
            let bits = event.events;
            let data = event.u64;
            ready.push((data as RawFd, Interest::from_bits_truncate(bits)));
        }
        Ok(())
    }
}

/// `CLOCK_MONOTONIC` in milliseconds, the same base as evdev timestamps
/// once `EVIOCSCLOCKID` selects it.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl MonotonicClock {
    pub fn now() -> i64 {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid out-pointer; CLOCK_MONOTONIC cannot fail on Linux.
        unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
        ts.tv_sec as i64 * 1000 + ts.tv_nsec as i64 / 1_000_000
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> i64 {
        Self::now()
    }
}

/// A non-blocking signalfd for a set of blocked signals.
#[derive(Debug)]
pub struct SignalFd {
    fd: OwnedFd,
}

impl SignalFd {
    /// Blocks `signals` for the calling thread and opens a signalfd for them.
    ///
    /// # Errors
    ///
    /// Returns the OS error if masking the signals or creating the fd fails.
    pub fn new(signals: &[i32]) -> io::Result<Self> {
        // SAFETY: sigset_t is plain data; sigemptyset initialises it.
        let mut mask: libc::sigset_t = unsafe { std::mem::zeroed() };
        // SAFETY: `mask` is a valid sigset_t for all calls below.
        unsafe {
            libc::sigemptyset(&mut mask);
            for &signal in signals {
                if libc::sigaddset(&mut mask, signal) < 0 {
                    return Err(io::Error::last_os_error());
                }
            }
        }
        // SAFETY: `mask` is initialised; the old mask is not requested.
        let rc = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &mask, std::ptr::null_mut()) };
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
        // SAFETY: `mask` is initialised; -1 asks for a new descriptor.
        let fd = unsafe { libc::signalfd(-1, &mask, libc::SFD_NONBLOCK | libc::SFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            // SAFETY: `fd` is a freshly created descriptor owned by nobody else.
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Reads one pending signal number; `None` if nothing is pending.
    ///
    /// # Errors
    ///
    /// Returns the OS error for failures other than would-block.
    pub fn read_signal(&self) -> io::Result<Option<u32>> {
        // SAFETY: signalfd_siginfo is plain data.
        let mut info: libc::signalfd_siginfo = unsafe { std::mem::zeroed() };
        let size = std::mem::size_of::<libc::signalfd_siginfo>();
        // SAFETY: `info` is a writable buffer of exactly `size` bytes.
        let n = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                (&mut info as *mut libc::signalfd_siginfo).cast(),
                size,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(None);
            }
            return Err(err);
        }
        if n as usize != size {
            return Ok(None);
        }
        Ok(Some(info.ssi_signo))
    }
}

impl AsRawFd for SignalFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
