//! Physical and logical displays.
//!
//! Physical displays are stored exactly as they arrive.  Logical displays are
//! stored as [`LogicalDisplayState`], which adds the windows' change tracking
//! and the multi-touch state scoped to that display.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use super::window::{InputWindowState, WindowInfo};
use super::Rect;
use crate::event::{PointerAction, PointerEvent, PointerItem, SourceType};
use crate::kernel::AbsAction;

/// Seat id used when a display or device does not name one.
pub const DEFAULT_SEAT_ID: &str = "seat0";
/// Seat name used when a display or device does not name one.
pub const DEFAULT_SEAT_NAME: &str = "seat0";

fn default_seat_id() -> String {
    DEFAULT_SEAT_ID.to_string()
}

fn default_seat_name() -> String {
    DEFAULT_SEAT_NAME.to_string()
}

// ── Physical ──────────────────────────────────────────────────────────────────

/// One physical panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalDisplayState {
    pub id: i32,
    /// Raw pixel width.
    pub width: i32,
    /// Raw pixel height.
    pub height: i32,
    /// DPI-scaled width; the unit of this panel's share of global space.
    pub logical_width: i32,
    pub logical_height: i32,
    /// Must be zero; panels are placed through the left/up links.
    #[serde(default)]
    pub top_left_x: i32,
    #[serde(default)]
    pub top_left_y: i32,
    /// Panel directly to the left of this one.
    #[serde(default)]
    pub left_display_id: Option<i32>,
    /// Panel directly above this one.
    #[serde(default)]
    pub up_display_id: Option<i32>,
    #[serde(default = "default_seat_id")]
    pub seat_id: String,
    #[serde(default = "default_seat_name")]
    pub seat_name: String,
}

impl PhysicalDisplayState {
    /// A panel with no neighbours on the default seat.
    pub fn new(id: i32, width: i32, height: i32) -> Self {
        Self {
            id,
            width,
            height,
            logical_width: width,
            logical_height: height,
            top_left_x: 0,
            top_left_y: 0,
            left_display_id: None,
            up_display_id: None,
            seat_id: default_seat_id(),
            seat_name: default_seat_name(),
        }
    }

    pub fn with_left(mut self, left: i32) -> Self {
        self.left_display_id = Some(left);
        self
    }

    pub fn with_up(mut self, up: i32) -> Self {
        self.up_display_id = Some(up);
        self
    }

    pub fn with_seat(mut self, seat_id: &str, seat_name: &str) -> Self {
        self.seat_id = seat_id.to_string();
        self.seat_name = seat_name.to_string();
        self
    }

    pub fn with_logical_size(mut self, logical_width: i32, logical_height: i32) -> Self {
        self.logical_width = logical_width;
        self.logical_height = logical_height;
        self
    }
}

// ── Logical ───────────────────────────────────────────────────────────────────

/// Inbound description of one logical display, and the snapshot carried by
/// logical-display notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalDisplay {
    pub id: i32,
    pub top_left_x: i32,
    pub top_left_y: i32,
    pub width: i32,
    pub height: i32,
    #[serde(default)]
    pub windows: Vec<WindowInfo>,
}

impl LogicalDisplay {
    pub fn new(id: i32, rect: Rect) -> Self {
        Self {
            id,
            top_left_x: rect.x,
            top_left_y: rect.y,
            width: rect.width,
            height: rect.height,
            windows: Vec::new(),
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.top_left_x, self.top_left_y, self.width, self.height)
    }
}

/// One touch contact already resolved to global coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contact {
    pub device_id: i32,
    /// Kernel pointer id (slot) on that device.
    pub kernel_pointer_id: i32,
    pub action: AbsAction,
    pub global_x: i32,
    pub global_y: i32,
    pub time: i64,
}

/// Stored state of one logical display.
#[derive(Debug, Clone)]
pub struct LogicalDisplayState {
    id: i32,
    rect: Rect,
    windows: Vec<InputWindowState>,
    pointer_event: PointerEvent,
    /// (device id, kernel pointer id) → synthetic pointer id.
    pointer_ids: BTreeMap<(i32, i32), i32>,
}

impl LogicalDisplayState {
    pub fn new(display: LogicalDisplay) -> Self {
        let mut pointer_event = PointerEvent::new(SourceType::TouchScreen);
        pointer_event.header.target_display_id = display.id;
        Self {
            id: display.id,
            rect: display.rect(),
            windows: display
                .windows
                .into_iter()
                .map(InputWindowState::new)
                .collect(),
            pointer_event,
            pointer_ids: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub(crate) fn set_rect(&mut self, rect: Rect) -> bool {
        let changed = self.rect != rect;
        self.rect = rect;
        changed
    }

    pub fn windows(&self) -> &[InputWindowState] {
        &self.windows
    }

    pub(crate) fn windows_mut(&mut self) -> &mut Vec<InputWindowState> {
        &mut self.windows
    }

    pub fn window(&self, window_id: i32) -> Option<&InputWindowState> {
        self.windows.iter().find(|w| w.id() == window_id)
    }

    /// Snapshot without pointer state, as carried by notifications.
    pub fn info(&self) -> LogicalDisplay {
        LogicalDisplay {
            id: self.id,
            top_left_x: self.rect.x,
            top_left_y: self.rect.y,
            width: self.rect.width,
            height: self.rect.height,
            windows: self.windows.iter().map(|w| w.info().clone()).collect(),
        }
    }

    /// Current multi-touch snapshot of this display.
    pub fn pointer_event(&self) -> &PointerEvent {
        &self.pointer_event
    }

    /// Applies one resolved contact and returns the updated snapshot.
    ///
    /// Synthetic pointer ids are allocated on `Down` (lowest free id) and
    /// recycled after `Up`.  A `Move`/`Up` for an unknown contact returns
    /// `None`.  A contact that lifted stays in the returned snapshot and is
    /// dropped on the next call.
    pub fn handle_contact(&mut self, contact: Contact) -> Option<PointerEvent> {
        self.purge_released();
        let key = (contact.device_id, contact.kernel_pointer_id);
        let local_x = contact.global_x - self.rect.x;
        let local_y = contact.global_y - self.rect.y;

        let (pointer_id, action) = match contact.action {
            AbsAction::Down => {
                let pointer_id = match self.pointer_ids.get(&key) {
                    Some(&existing) => {
                        warn!(
                            display_id = self.id,
                            device_id = contact.device_id,
                            kernel_pointer_id = contact.kernel_pointer_id,
                            "down for a contact that is already down, reusing its pointer id"
                        );
                        existing
                    }
                    None => self.allocate_pointer_id(key),
                };
                let mut item = PointerItem::new(pointer_id, contact.device_id);
                item.down_time = contact.time.max(1);
                self.pointer_event.upsert_pointer_item(item);
                if self.pointer_event.pointer_count() == 1 {
                    self.pointer_event.header.action_start_time = contact.time;
                }
                (pointer_id, PointerAction::Down)
            }
            AbsAction::Move => (*self.pointer_ids.get(&key)?, PointerAction::Move),
            AbsAction::Up => (self.pointer_ids.remove(&key)?, PointerAction::Up),
        };

        let item = self.pointer_event.pointer_item_mut(pointer_id)?;
        item.global_x = contact.global_x;
        item.global_y = contact.global_y;
        item.local_x = local_x;
        item.local_y = local_y;
        if action == PointerAction::Up {
            item.up_time = contact.time;
        }

        self.pointer_event.set_pointer_id(pointer_id);
        self.pointer_event.header.device_id = contact.device_id;
        self.pointer_event.header.target_display_id = self.id;
        self.pointer_event.set_action(action, contact.time);
        trace!(display_id = self.id, pointer_id, ?action, local_x, local_y, "contact applied");
        Some(self.pointer_event.clone())
    }

    /// Lifts one contact at its last known position.  Returns the `Up`
    /// snapshot, or `None` if the contact is not down on this display.
    pub fn release_contact(
        &mut self,
        device_id: i32,
        kernel_pointer_id: i32,
        time: i64,
    ) -> Option<PointerEvent> {
        self.purge_released();
        let pointer_id = self.pointer_ids.remove(&(device_id, kernel_pointer_id))?;
        let item = self.pointer_event.pointer_item_mut(pointer_id)?;
        item.up_time = time;
        self.pointer_event.set_pointer_id(pointer_id);
        self.pointer_event.header.device_id = device_id;
        self.pointer_event.set_action(PointerAction::Up, time);
        trace!(display_id = self.id, pointer_id, "contact released");
        Some(self.pointer_event.clone())
    }

    /// Drops every contact of `device_id`.  Returns a `Cancel` snapshot if
    /// the device had any contact on this display.
    pub fn cancel_device(&mut self, device_id: i32, time: i64) -> Option<PointerEvent> {
        self.purge_released();
        let cancelled: Vec<i32> = self
            .pointer_ids
            .iter()
            .filter(|((dev, _), _)| *dev == device_id)
            .map(|(_, &pointer_id)| pointer_id)
            .collect();
        if cancelled.is_empty() {
            return None;
        }
        self.pointer_ids.retain(|(dev, _), _| *dev != device_id);
        for pointer_id in &cancelled {
            if let Some(item) = self.pointer_event.pointer_item_mut(*pointer_id) {
                item.up_time = time;
            }
        }
        self.pointer_event.set_pointer_id(cancelled[0]);
        self.pointer_event.header.device_id = device_id;
        self.pointer_event.set_action(PointerAction::Cancel, time);
        let snapshot = self.pointer_event.clone();
        self.purge_released();
        Some(snapshot)
    }

    /// Number of contacts currently down on this display.
    pub fn active_contact_count(&self) -> usize {
        self.pointer_ids.len()
    }

    fn allocate_pointer_id(&mut self, key: (i32, i32)) -> i32 {
        let mut candidate = 0;
        while self.pointer_ids.values().any(|&id| id == candidate) {
            candidate += 1;
        }
        self.pointer_ids.insert(key, candidate);
        candidate
    }

    fn purge_released(&mut self) {
        let released: Vec<i32> = self
            .pointer_event
            .pointer_items()
            .filter(|item| item.up_time != -1)
            .map(|item| item.pointer_id)
            .collect();
        for pointer_id in released {
            self.pointer_event.remove_pointer_item(pointer_id);
        }
    }
}
