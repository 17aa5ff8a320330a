//! The outbound seam: where finished events leave the pipeline.
//!
//! [`EventDispatcher`] is the only way events leave the seat layer.  The
//! binary plugs in a tracing adapter; [`RecordingDispatcher`] keeps events in
//! memory for tests and embedders that poll.

use std::cell::RefCell;

use inputflow_core::{DispatchedEvent, KeyEvent, PointerEvent};

/// Terminal sink for display-space events.
///
/// A one-way push: there is no return value and no acknowledgment.
#[cfg_attr(test, mockall::automock)]
pub trait EventDispatcher {
    fn dispatch(&self, event: DispatchedEvent);
}

/// A gesture transformer asked for a timeout.
///
/// The seat layer has no clock; the runtime schedules a one-shot loop timer
/// of `after` milliseconds and reports back through
/// [`SeatManager::on_gesture_timeout`](super::seat_manager::SeatManager::on_gesture_timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureTimer {
    pub device_id: i32,
    pub token: u64,
    pub after: i64,
}

/// Keeps every dispatched event in arrival order.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    events: RefCell<Vec<DispatchedEvent>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DispatchedEvent> {
        self.events.borrow().clone()
    }

    pub fn pointer_events(&self) -> Vec<PointerEvent> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                DispatchedEvent::Pointer(p) => Some(p.clone()),
                DispatchedEvent::Key(_) => None,
            })
            .collect()
    }

    pub fn key_events(&self) -> Vec<KeyEvent> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                DispatchedEvent::Key(k) => Some(k.clone()),
                DispatchedEvent::Pointer(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    /// Returns and forgets everything recorded so far.
    pub fn take(&self) -> Vec<DispatchedEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }
}

impl EventDispatcher for RecordingDispatcher {
    fn dispatch(&self, event: DispatchedEvent) {
        self.events.borrow_mut().push(event);
    }
}
