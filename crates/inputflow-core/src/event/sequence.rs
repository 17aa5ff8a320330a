//! Monotonic id counters for events and devices.
//!
//! # Why a dedicated counter? (for beginners)
//!
//! Every [`InputEvent`](super::EventHeader) carries an `id` that is reassigned
//! whenever the event's observable state changes.  Consumers use the id to tell
//! two snapshots of the same mutable event apart: if the id differs, something
//! changed.  The ids must never repeat within a process lifetime, so they come
//! from a single shared counter.
//!
//! The same type is reused (as an owned instance, not the shared one) by the
//! device discoverer to hand out device ids.
//!
//! # Thread safety
//!
//! The pipeline itself is single-threaded, but the counter uses an atomic so
//! the shared event-id source needs no `unsafe` and no lock.

use std::sync::atomic::{AtomicI32, Ordering};

/// Process-wide source of event ids.
static EVENT_IDS: IdCounter = IdCounter::starting_at(1);

/// Returns a fresh, never-before-returned event id.
pub fn next_event_id() -> i32 {
    EVENT_IDS.next()
}

/// A monotonically increasing `i32` counter.
///
/// Ids start at the configured value and increment by 1 with each call to
/// [`next`](IdCounter::next).  On overflow the counter wraps back to the
/// starting value instead of going negative, because negative ids mean
/// "none" throughout the pipeline.
///
/// # Examples
///
/// ```rust
/// use inputflow_core::event::sequence::IdCounter;
///
/// let counter = IdCounter::new();
/// assert_eq!(counter.next(), 0);
/// assert_eq!(counter.next(), 1);
/// ```
#[derive(Debug)]
pub struct IdCounter {
    start: i32,
    inner: AtomicI32,
}

impl IdCounter {
    /// Creates a new counter starting at 0.
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    /// Creates a new counter whose first id is `start`.
    pub const fn starting_at(start: i32) -> Self {
        Self {
            start,
            inner: AtomicI32::new(start),
        }
    }

    /// Returns the next id and advances the counter.
    pub fn next(&self) -> i32 {
        let id = self.inner.fetch_add(1, Ordering::Relaxed);
        if id < self.start {
            // Wrapped past i32::MAX; restart from the configured base.
            self.inner.store(self.start + 1, Ordering::Relaxed);
            return self.start;
        }
        id
    }

    /// Returns the id the next call to [`next`](IdCounter::next) will produce.
    pub fn current(&self) -> i32 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for IdCounter {
    fn default() -> Self {
        Self::new()
    }
}
