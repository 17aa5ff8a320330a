//! The display-space event model handed to external consumers.
//!
//! Two concrete event kinds leave the pipeline:
//!
//! - [`KeyEvent`](key_event::KeyEvent): keyboard keys, tracked per owning device.
//! - [`PointerEvent`](pointer_event::PointerEvent): mouse, touchscreen and
//!   touchpad contacts, each identified by a synthetic pointer id.
//!
//! Both embed an [`EventHeader`] carrying the fields common to every event.
//! Handlers own one mutable instance each and mutate it in place; every
//! mutation that changes observable state calls [`EventHeader::refresh_id`] so
//! consumers can tell snapshots apart.

pub mod key_event;
pub mod pointer_event;
pub mod sequence;

pub use key_event::{KeyAction, KeyEvent, KeyItem};
pub use pointer_event::{MouseButton, PointerAction, PointerEvent, PointerItem, SourceType};

/// Sentinel for "no display" / "no device" in id fields.
pub const NONE_ID: i32 = -1;

/// Discriminates the concrete event kind behind an [`EventHeader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Key,
    Pointer,
}

/// Fields shared by every event leaving the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHeader {
    id: i32,
    /// Timestamp of the latest action, in milliseconds on the monotonic clock.
    pub action_time: i64,
    /// Timestamp of the action that started the current gesture/press.
    pub action_start_time: i64,
    event_type: EventType,
    /// Logical display the event targets, or [`NONE_ID`].
    pub target_display_id: i32,
    /// Device that produced the latest action, or [`NONE_ID`].
    pub device_id: i32,
}

impl EventHeader {
    /// Creates a header with a fresh id and no target.
    pub fn new(event_type: EventType) -> Self {
        Self {
            id: sequence::next_event_id(),
            action_time: 0,
            action_start_time: 0,
            event_type,
            target_display_id: NONE_ID,
            device_id: NONE_ID,
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Reassigns a fresh id; called by every state-changing mutator.
    pub fn refresh_id(&mut self) {
        self.id = sequence::next_event_id();
    }
}

/// An event ready for the outbound dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchedEvent {
    Pointer(PointerEvent),
    Key(KeyEvent),
}

impl DispatchedEvent {
    pub fn header(&self) -> &EventHeader {
        match self {
            DispatchedEvent::Pointer(e) => &e.header,
            DispatchedEvent::Key(e) => &e.header,
        }
    }
}
