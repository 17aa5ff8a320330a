//! Deterministic loop parts for tests.
//!
//! [`ManualClock`] only moves when the test advances it, and
//! [`ScriptedMultiplexer`] reports readiness only for fds the test marks
//! ready.  Both are cheap handles (`Rc` inside): keep a clone to drive the
//! loop after handing the other clone to [`EventLoop::with_parts`](super::EventLoop::with_parts).

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::os::fd::RawFd;
use std::rc::Rc;

use super::{Clock, Interest, Multiplexer};

/// A clock the test advances by hand.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Rc<Cell<i64>>);

impl ManualClock {
    pub fn starting_at(ms: i64) -> Self {
        Self(Rc::new(Cell::new(ms)))
    }

    pub fn advance(&self, ms: i64) {
        self.0.set(self.0.get() + ms);
    }

    pub fn set(&self, ms: i64) {
        self.0.set(ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.0.get()
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    watched: HashMap<RawFd, Interest>,
    /// Level-triggered readiness, like epoll without `EPOLLET`.
    ready: BTreeSet<RawFd>,
    /// Timeout of the most recent `wait`.
    last_timeout: Option<i32>,
}

/// A multiplexer whose readiness is set by the test.
#[derive(Debug, Clone, Default)]
pub struct ScriptedMultiplexer {
    state: Rc<RefCell<ScriptState>>,
}

impl ScriptedMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `fd` readable until [`clear_ready`](Self::clear_ready).
    pub fn set_ready(&self, fd: RawFd) {
        self.state.borrow_mut().ready.insert(fd);
    }

    pub fn clear_ready(&self, fd: RawFd) {
        self.state.borrow_mut().ready.remove(&fd);
    }

    pub fn is_watched(&self, fd: RawFd) -> bool {
        self.state.borrow().watched.contains_key(&fd)
    }

    pub fn watched_count(&self) -> usize {
        self.state.borrow().watched.len()
    }

    /// Timeout passed to the most recent `wait`.
    pub fn last_timeout(&self) -> Option<i32> {
        self.state.borrow().last_timeout
    }
}

impl Multiplexer for ScriptedMultiplexer {
    fn add(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.watched.contains_key(&fd) {
            return Err(io::Error::from_raw_os_error(libc::EEXIST));
        }
        state.watched.insert(fd, interest);
        Ok(())
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        match self.state.borrow_mut().watched.get_mut(&fd) {
            Some(slot) => {
                *slot = interest;
                Ok(())
            }
            None => Err(io::Error::from_raw_os_error(libc::ENOENT)),
        }
    }

    fn delete(&mut self, fd: RawFd) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.ready.remove(&fd);
        match state.watched.remove(&fd) {
            Some(_) => Ok(()),
            None => Err(io::Error::from_raw_os_error(libc::ENOENT)),
        }
    }

    fn wait(&mut self, timeout_ms: i32, ready: &mut Vec<(RawFd, Interest)>) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.last_timeout = Some(timeout_ms);
        let fds: Vec<RawFd> = state
            .ready
            .iter()
            .copied()
            .filter(|fd| state.watched.contains_key(fd))
            .collect();
        ready.extend(fds.into_iter().map(|fd| (fd, Interest::READABLE)));
        Ok(())
    }
}
