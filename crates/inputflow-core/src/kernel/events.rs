//! Kernel-level events: one frame of a single device, flushed at `SYN_REPORT`.
//!
//! These are transient values produced by the collectors and consumed by the
//! seat layer.  They never leave the host process; the display-space
//! [`PointerEvent`](crate::event::PointerEvent) / [`KeyEvent`](crate::event::KeyEvent)
//! pair is what consumers see.

use std::collections::BTreeMap;

/// Relative motion and wheel movement accumulated over one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelEvent {
    pub device_id: i32,
    pub time: i64,
    pub dx: i32,
    pub dy: i32,
    pub wheel_horizontal: i32,
    pub wheel_vertical: i32,
}

impl RelEvent {
    pub fn motion(device_id: i32, time: i64, dx: i32, dy: i32) -> Self {
        Self {
            device_id,
            time,
            dx,
            dy,
            ..Self::default()
        }
    }

    pub fn has_motion(&self) -> bool {
        self.dx != 0 || self.dy != 0
    }

    pub fn has_axis(&self) -> bool {
        self.wheel_horizontal != 0 || self.wheel_vertical != 0
    }

    pub fn is_empty(&self) -> bool {
        !self.has_motion() && !self.has_axis()
    }
}

/// State reported for a key code.  Auto-repeat (value 2) folds into `Down`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyState {
    Down,
    Up,
}

impl KeyState {
    /// Maps an `EV_KEY` value: 0 is up, 1 (press) and 2 (repeat) are down.
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Up),
            1 | 2 => Some(Self::Down),
            _ => None,
        }
    }
}

/// A single key or button transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelKeyEvent {
    pub device_id: i32,
    pub time: i64,
    pub key_code: u16,
    pub state: KeyState,
}

impl KernelKeyEvent {
    pub fn new(device_id: i32, time: i64, key_code: u16, state: KeyState) -> Self {
        Self {
            device_id,
            time,
            key_code,
            state,
        }
    }
}

/// What happened to one contact during a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbsAction {
    Down,
    Move,
    Up,
}

/// One multi-touch contact, identified by its kernel slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AbsPointer {
    /// Kernel pointer id (the slot index); stable for the contact's lifetime.
    pub id: i32,
    pub tracking_id: i32,
    pub x: i32,
    pub y: i32,
    pub pressure: i32,
    pub touch_major: i32,
    pub down_time: i64,
    /// Set in the frame the contact lifted; the pointer is gone afterwards.
    pub released: bool,
    /// Change this frame applied to the contact, if any.
    pub change: Option<AbsAction>,
}

/// Snapshot of every contact of one device at a `SYN_REPORT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsEvent {
    pub device_id: i32,
    pub time: i64,
    action: AbsAction,
    pointer_id: i32,
    pointers: BTreeMap<i32, AbsPointer>,
}

impl AbsEvent {
    /// Builds a snapshot; returns `None` if no pointer changed in the frame.
    ///
    /// The primary change is the first `Down`/`Up` in slot order, else the
    /// first `Move`.
    pub fn from_pointers(
        device_id: i32,
        time: i64,
        pointers: BTreeMap<i32, AbsPointer>,
    ) -> Option<Self> {
        let primary = pointers
            .values()
            .find(|p| matches!(p.change, Some(AbsAction::Down | AbsAction::Up)))
            .or_else(|| pointers.values().find(|p| p.change.is_some()))?;
        let action = primary.change?;
        let pointer_id = primary.id;
        Some(Self {
            device_id,
            time,
            action,
            pointer_id,
            pointers,
        })
    }

    pub fn action(&self) -> AbsAction {
        self.action
    }

    pub fn pointer_id(&self) -> i32 {
        self.pointer_id
    }

    pub fn pointer(&self, id: i32) -> Option<&AbsPointer> {
        self.pointers.get(&id)
    }

    pub fn pointers(&self) -> impl Iterator<Item = &AbsPointer> {
        self.pointers.values()
    }

    /// Every `(pointer id, change)` of this frame, in slot order.
    pub fn changes(&self) -> impl Iterator<Item = (i32, AbsAction)> + '_ {
        self.pointers
            .values()
            .filter_map(|p| p.change.map(|change| (p.id, change)))
    }

    /// Contacts still down after this frame.
    pub fn live_pointer_count(&self) -> usize {
        self.pointers.values().filter(|p| !p.released).count()
    }
}

/// The closed set of kernel-level events a device emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelEvent {
    Rel(RelEvent),
    Key(KernelKeyEvent),
    Abs(AbsEvent),
}

impl KernelEvent {
    pub fn device_id(&self) -> i32 {
        match self {
            KernelEvent::Rel(e) => e.device_id,
            KernelEvent::Key(e) => e.device_id,
            KernelEvent::Abs(e) => e.device_id,
        }
    }

    pub fn time(&self) -> i64 {
        match self {
            KernelEvent::Rel(e) => e.time,
            KernelEvent::Key(e) => e.time,
            KernelEvent::Abs(e) => e.time,
        }
    }
}
