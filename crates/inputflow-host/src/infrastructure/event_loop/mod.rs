//! Single-threaded event loop: fd readiness plus a software timer wheel.
//!
//! Everything in the host runs on callbacks invoked from [`EventLoop::run`].
//! Devices register their fds, the discoverer registers its inotify fd, and
//! gesture timeouts are one-shot timers.
//!
//! # How one pass works (for beginners)
//!
//! ```text
//! timeout = min over timers of clamp(next_call_time - now)   (or -1: block)
//! multiplexer.wait(timeout)          ── the only place the thread sleeps
//! for each ready fd, in registration order: call its callback
//! for each due timer, by next_call_time:  call it once, then reschedule
//! ```
//!
//! # Re-entrancy
//!
//! Callbacks routinely add or remove fds and timers (a device that hits a
//! read error removes itself; the discoverer adds new devices).  The tables
//! live in a `RefCell` that is never borrowed while a callback runs: each
//! callback is cloned out of the table (`Rc`) before being invoked, and an
//! entry removed during the pass is skipped if its turn has not come yet.
//! For that reason every method takes `&self` and the loop is shared as
//! `Rc<EventLoop>`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

pub mod epoll;
pub mod mock;

pub use epoll::{EpollMultiplexer, MonotonicClock, SignalFd};

/// Shortest interval a timer may have; shorter requests are raised to this.
pub const MIN_TIMER_INTERVAL_MS: i64 = 36;
/// Longest interval a timer may have; longer requests are lowered to this.
pub const MAX_TIMER_INTERVAL_MS: i64 = 10_000;
/// Upper bound on simultaneously registered timers.
pub const MAX_TIMER_COUNT: usize = 64;
/// Lower bound of the computed wait timeout.
pub const MIN_TIMEOUT_MS: i64 = 0;

/// Identifier returned by [`EventLoop::add_timer`].
pub type TimerId = i32;

bitflags! {
    /// Readiness conditions an fd callback is interested in.
    ///
    /// The bit values are the `EPOLL*` constants so the epoll backend can pass
    /// them through unchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Interest: u32 {
        const READABLE = 0x001;
        const PRIORITY = 0x002;
        const WRITABLE = 0x004;
        const ERROR = 0x008;
        const HANGUP = 0x010;
    }
}

impl Interest {
    /// Converts a raw event mask.
    ///
    /// # Errors
    ///
    /// Returns [`EventLoopError::InvalidArgument`] if `raw` has bits outside
    /// the known set.
    pub fn from_raw(raw: u32) -> Result<Self, EventLoopError> {
        Self::from_bits(raw)
            .ok_or_else(|| EventLoopError::InvalidArgument(format!("unknown event mask bits {raw:#x}")))
    }
}

/// Error type for event loop registration and waiting.
#[derive(Debug, Error)]
pub enum EventLoopError {
    /// Bad mask, duplicate fd, or unknown fd/timer.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// [`MAX_TIMER_COUNT`] timers are already registered.
    #[error("timer limit of {limit} reached")]
    TooManyTimers { limit: usize },

    /// The readiness multiplexer failed.
    #[error("multiplexer error: {0}")]
    Multiplexer(#[from] io::Error),
}

// ── Seams ─────────────────────────────────────────────────────────────────────

/// Readiness multiplexer backing the loop.
///
/// The production implementation is [`EpollMultiplexer`]; tests script
/// readiness through a mock.
#[cfg_attr(test, mockall::automock)]
pub trait Multiplexer {
    /// Starts watching `fd`.
    fn add(&mut self, fd: RawFd, interest: Interest) -> io::Result<()>;
    /// Changes the conditions watched for `fd`.
    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()>;
    /// Stops watching `fd`.
    fn delete(&mut self, fd: RawFd) -> io::Result<()>;
    /// Blocks up to `timeout_ms` (`-1` = forever) and appends ready fds to `ready`.
    fn wait(&mut self, timeout_ms: i32, ready: &mut Vec<(RawFd, Interest)>) -> io::Result<()>;
}

/// Millisecond clock used for timer scheduling.
pub trait Clock {
    fn now_ms(&self) -> i64;
}

// ── Tables ────────────────────────────────────────────────────────────────────

type FdCallback = Rc<RefCell<dyn FnMut(RawFd, Interest)>>;
type TimerCallback = Rc<RefCell<dyn FnMut()>>;

struct FdEntry {
    interest: Interest,
    /// Registration sequence; fixes dispatch order within a batch.
    order: u64,
    callback: FdCallback,
}

struct Timer {
    interval_ms: i64,
    /// Firings left; `None` repeats forever.
    remaining: Option<u32>,
    next_call_time: i64,
    callback: TimerCallback,
}

#[derive(Default)]
struct Tables {
    fds: HashMap<RawFd, FdEntry>,
    next_order: u64,
    timers: HashMap<TimerId, Timer>,
    next_timer_id: TimerId,
}

// ── EventLoop ─────────────────────────────────────────────────────────────────

/// The host's only scheduler.
pub struct EventLoop {
    multiplexer: RefCell<Box<dyn Multiplexer>>,
    clock: Box<dyn Clock>,
    tables: RefCell<Tables>,
    exit_requested: Cell<bool>,
}

impl EventLoop {
    /// Creates a loop over a fresh epoll instance and the monotonic clock.
    ///
    /// # Errors
    ///
    /// Returns [`EventLoopError::Multiplexer`] if `epoll_create1` fails.
    pub fn new() -> Result<Rc<Self>, EventLoopError> {
        Ok(Self::with_parts(
            Box::new(EpollMultiplexer::new()?),
            Box::new(MonotonicClock),
        ))
    }

    /// Creates a loop over the given multiplexer and clock.
    pub fn with_parts(multiplexer: Box<dyn Multiplexer>, clock: Box<dyn Clock>) -> Rc<Self> {
        Rc::new(Self {
            multiplexer: RefCell::new(multiplexer),
            clock,
            tables: RefCell::new(Tables {
                next_timer_id: 1,
                ..Tables::default()
            }),
            exit_requested: Cell::new(false),
        })
    }

    /// Current time on the loop's clock, in milliseconds.
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    // ── File descriptors ──────────────────────────────────────────────────────

    /// Registers `fd` and the callback run when it becomes ready.
    ///
    /// # Errors
    ///
    /// - [`EventLoopError::InvalidArgument`] for an empty mask or an fd that is
    ///   already registered.
    /// - [`EventLoopError::Multiplexer`] if the multiplexer rejects the fd.
    pub fn add_fd<F>(&self, fd: RawFd, interest: Interest, callback: F) -> Result<(), EventLoopError>
    where
        F: FnMut(RawFd, Interest) + 'static,
    {
        if interest.is_empty() {
            return Err(EventLoopError::InvalidArgument("empty event mask".to_string()));
        }
        if self.tables.borrow().fds.contains_key(&fd) {
            return Err(EventLoopError::InvalidArgument(format!("fd {fd} is already registered")));
        }
        self.multiplexer.borrow_mut().add(fd, interest)?;

        let mut tables = self.tables.borrow_mut();
        let order = tables.next_order;
        tables.next_order += 1;
        tables.fds.insert(
            fd,
            FdEntry {
                interest,
                order,
                callback: Rc::new(RefCell::new(callback)),
            },
        );
        trace!(fd, ?interest, "fd registered");
        Ok(())
    }

    /// Replaces the mask and callback of a registered fd.  The fd keeps its
    /// place in the dispatch order.
    ///
    /// # Errors
    ///
    /// - [`EventLoopError::InvalidArgument`] for an empty mask or an fd that is
    ///   not registered.
    /// - [`EventLoopError::Multiplexer`] if the multiplexer rejects the change.
    pub fn update_fd<F>(&self, fd: RawFd, interest: Interest, callback: F) -> Result<(), EventLoopError>
    where
        F: FnMut(RawFd, Interest) + 'static,
    {
        if interest.is_empty() {
            return Err(EventLoopError::InvalidArgument("empty event mask".to_string()));
        }
        if !self.tables.borrow().fds.contains_key(&fd) {
            return Err(EventLoopError::InvalidArgument(format!("fd {fd} is not registered")));
        }
        self.multiplexer.borrow_mut().modify(fd, interest)?;

        if let Some(entry) = self.tables.borrow_mut().fds.get_mut(&fd) {
            entry.interest = interest;
            entry.callback = Rc::new(RefCell::new(callback));
        }
        Ok(())
    }

    /// Unregisters `fd`.  The entry is gone even if the multiplexer reports an
    /// error (typically because the fd was already closed).
    ///
    /// # Errors
    ///
    /// - [`EventLoopError::InvalidArgument`] if `fd` is not registered.
    /// - [`EventLoopError::Multiplexer`] if the multiplexer rejects the removal.
    pub fn remove_fd(&self, fd: RawFd) -> Result<(), EventLoopError> {
        if self.tables.borrow_mut().fds.remove(&fd).is_none() {
            return Err(EventLoopError::InvalidArgument(format!("fd {fd} is not registered")));
        }
        trace!(fd, "fd unregistered");
        self.multiplexer.borrow_mut().delete(fd)?;
        Ok(())
    }

    pub fn has_fd(&self, fd: RawFd) -> bool {
        self.tables.borrow().fds.contains_key(&fd)
    }

    /// Mask a registered fd is watched for.
    pub fn fd_interest(&self, fd: RawFd) -> Option<Interest> {
        self.tables.borrow().fds.get(&fd).map(|entry| entry.interest)
    }

    pub fn fd_count(&self) -> usize {
        self.tables.borrow().fds.len()
    }

    // ── Timers ────────────────────────────────────────────────────────────────

    /// Registers a timer firing every `interval_ms` (clamped into
    /// `[MIN_TIMER_INTERVAL_MS, MAX_TIMER_INTERVAL_MS]`), `repeat_count` times;
    /// `0` repeats until removed.
    ///
    /// # Errors
    ///
    /// Returns [`EventLoopError::TooManyTimers`] if [`MAX_TIMER_COUNT`] timers
    /// are registered; the existing timers are untouched.
    pub fn add_timer<F>(&self, interval_ms: i64, repeat_count: u32, callback: F) -> Result<TimerId, EventLoopError>
    where
        F: FnMut() + 'static,
    {
        let interval_ms = interval_ms.clamp(MIN_TIMER_INTERVAL_MS, MAX_TIMER_INTERVAL_MS);
        let now = self.now_ms();
        let mut tables = self.tables.borrow_mut();
        if tables.timers.len() >= MAX_TIMER_COUNT {
            return Err(EventLoopError::TooManyTimers {
                limit: MAX_TIMER_COUNT,
            });
        }
        let id = tables.next_timer_id;
        tables.next_timer_id = tables.next_timer_id.checked_add(1).unwrap_or(1);
        tables.timers.insert(
            id,
            Timer {
                interval_ms,
                remaining: (repeat_count > 0).then_some(repeat_count),
                next_call_time: now + interval_ms,
                callback: Rc::new(RefCell::new(callback)),
            },
        );
        trace!(timer_id = id, interval_ms, repeat_count, "timer registered");
        Ok(id)
    }

    /// Cancels a timer.
    ///
    /// # Errors
    ///
    /// Returns [`EventLoopError::InvalidArgument`] if `id` is not registered
    /// (including one-shot timers that already fired).
    pub fn remove_timer(&self, id: TimerId) -> Result<(), EventLoopError> {
        match self.tables.borrow_mut().timers.remove(&id) {
            Some(_) => Ok(()),
            None => Err(EventLoopError::InvalidArgument(format!("timer {id} is not registered"))),
        }
    }

    pub fn timer_count(&self) -> usize {
        self.tables.borrow().timers.len()
    }

    /// Interval of a registered timer after clamping.
    pub fn timer_interval(&self, id: TimerId) -> Option<i64> {
        self.tables.borrow().timers.get(&id).map(|t| t.interval_ms)
    }

    // ── Running ───────────────────────────────────────────────────────────────

    /// Runs passes until [`exit_async`](Self::exit_async) is called.
    ///
    /// # Errors
    ///
    /// Returns [`EventLoopError::Multiplexer`] if waiting fails.
    pub fn run(&self) -> Result<(), EventLoopError> {
        info!("event loop running");
        while !self.exit_requested.get() {
            self.run_once(None)?;
        }
        self.exit_requested.set(false);
        info!("event loop stopped");
        Ok(())
    }

    /// Performs one wait and dispatch pass.  `max_timeout_ms` caps the wait
    /// (tests pass `Some(0)` to poll).
    ///
    /// # Errors
    ///
    /// Returns [`EventLoopError::Multiplexer`] if waiting fails.
    pub fn run_once(&self, max_timeout_ms: Option<i32>) -> Result<(), EventLoopError> {
        let timeout = match (self.next_timeout(), max_timeout_ms) {
            (-1, Some(cap)) => cap,
            (timeout, Some(cap)) if cap >= 0 => timeout.min(cap),
            (timeout, _) => timeout,
        };

        let mut ready = Vec::new();
        self.multiplexer.borrow_mut().wait(timeout, &mut ready)?;
        self.dispatch_ready(ready);
        self.fire_due_timers();
        Ok(())
    }

    /// Asks [`run`](Self::run) to return after the current pass.  Safe to call
    /// from inside a callback.
    pub fn exit_async(&self) {
        debug!("exit requested");
        self.exit_requested.set(true);
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested.get()
    }

    /// Blocks `signals` for the process and routes them through a signalfd
    /// that calls [`exit_async`](Self::exit_async).
    ///
    /// # Errors
    ///
    /// Returns [`EventLoopError::Multiplexer`] if the signalfd cannot be
    /// created, or any [`add_fd`](Self::add_fd) error.
    pub fn add_signal_exit(self: &Rc<Self>, signals: &[i32]) -> Result<(), EventLoopError> {
        let signal_fd = SignalFd::new(signals)?;
        let fd = signal_fd.as_raw_fd();
        let weak: Weak<Self> = Rc::downgrade(self);
        // The closure owns the signalfd; it closes when the entry is dropped.
        self.add_fd(fd, Interest::READABLE, move |_, _| {
            match signal_fd.read_signal() {
                Ok(Some(signo)) => info!(signal = signo, "exit signal received"),
                Ok(None) => return,
                Err(e) => warn!(error = %e, "signalfd read failed"),
            }
            if let Some(event_loop) = weak.upgrade() {
                event_loop.exit_async();
            }
        })
    }

    fn next_timeout(&self) -> i32 {
        let now = self.now_ms();
        self.tables
            .borrow()
            .timers
            .values()
            .map(|t| (t.next_call_time - now).clamp(MIN_TIMEOUT_MS, MAX_TIMER_INTERVAL_MS))
            .min()
            .map_or(-1, |ms| ms as i32)
    }

    fn dispatch_ready(&self, ready: Vec<(RawFd, Interest)>) {
        let mut batch: Vec<(u64, RawFd, Interest, FdCallback)> = {
            let tables = self.tables.borrow();
            ready
                .into_iter()
                .filter_map(|(fd, events)| {
                    tables
                        .fds
                        .get(&fd)
                        .map(|entry| (entry.order, fd, events, Rc::clone(&entry.callback)))
                })
                .collect()
        };
        batch.sort_by_key(|(order, ..)| *order);

        for (order, fd, events, callback) in batch {
            // Removed (or removed and re-added) by an earlier callback this pass.
            let still_registered = self
                .tables
                .borrow()
                .fds
                .get(&fd)
                .is_some_and(|entry| entry.order == order);
            if !still_registered {
                continue;
            }
            match callback.try_borrow_mut() {
                Ok(mut cb) => (*cb)(fd, events),
                Err(_) => warn!(fd, "fd callback re-entered, skipping"),
            }
        }
    }

    fn fire_due_timers(&self) {
        let now = self.now_ms();
        let mut due: Vec<(i64, TimerId)> = self
            .tables
            .borrow()
            .timers
            .iter()
            .filter(|(_, t)| t.next_call_time <= now)
            .map(|(&id, t)| (t.next_call_time, id))
            .collect();
        due.sort_unstable();

        for (_, id) in due {
            let callback = {
                let mut tables = self.tables.borrow_mut();
                let Some(timer) = tables.timers.get_mut(&id) else {
                    continue;
                };
                let callback = Rc::clone(&timer.callback);
                match timer.remaining.as_mut() {
                    Some(left) if *left <= 1 => {
                        tables.timers.remove(&id);
                    }
                    Some(left) => {
                        *left -= 1;
                        timer.next_call_time += timer.interval_ms;
                    }
                    None => timer.next_call_time += timer.interval_ms,
                }
                callback
            };
            match callback.try_borrow_mut() {
                Ok(mut cb) => (*cb)(),
                Err(_) => warn!(timer_id = id, "timer callback re-entered, skipping"),
            };
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
