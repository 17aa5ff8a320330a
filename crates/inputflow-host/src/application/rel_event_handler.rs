//! The system cursor of one seat.
//!
//! Relative motion from every mouse (and every touchpad, through its gesture
//! chain) moves one cursor.  The handler keeps that cursor's global position
//! and the logical display it is on, and turns kernel-level motion, wheel and
//! button events into mouse-sourced [`PointerEvent`]s.
//!
//! # Crossing displays (for beginners)
//!
//! Logical displays are rectangles in one global coordinate space.  After a
//! move, if the cursor left its current display the handler looks for another
//! display containing the new point and moves there; if there is none (the
//! cursor ran into an outer edge) the point is clamped back into the current
//! display.
//!
//! # Buttons
//!
//! Presses are reference-counted per `(button, device)`: a left button held on
//! two mice stays down until both release it.

use std::collections::{BTreeMap, BTreeSet};

use inputflow_core::{
    DispatchedEvent, DisplayChange, KernelKeyEvent, KeyState, MouseButton, PointerAction,
    PointerEvent, PointerItem, Rect, RelEvent, SourceType, WindowStateManager, NONE_ID,
};
use tracing::{debug, trace};

use super::dispatch::EventDispatcher;

/// Pointer id of the cursor inside its [`PointerEvent`].
pub const CURSOR_POINTER_ID: i32 = 0;

#[derive(Debug)]
pub struct RelEventHandler {
    event: PointerEvent,
    target_display_id: i32,
    /// Rect of the target display as last seen, to detect resizes.
    target_rect: Rect,
    global_x: i32,
    global_y: i32,
    /// Button id → devices holding it.
    buttons: BTreeMap<i32, BTreeSet<i32>>,
}

impl Default for RelEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RelEventHandler {
    pub fn new() -> Self {
        let mut event = PointerEvent::new(SourceType::Mouse);
        event.upsert_pointer_item(PointerItem::new(CURSOR_POINTER_ID, NONE_ID));
        event.set_pointer_id(CURSOR_POINTER_ID);
        Self {
            event,
            target_display_id: NONE_ID,
            target_rect: Rect::default(),
            global_x: 0,
            global_y: 0,
            buttons: BTreeMap::new(),
        }
    }

    pub fn pointer_event(&self) -> &PointerEvent {
        &self.event
    }

    pub fn target_display_id(&self) -> i32 {
        self.target_display_id
    }

    pub fn global_position(&self) -> (i32, i32) {
        (self.global_x, self.global_y)
    }

    /// Applies a frame of relative motion and wheel movement.
    pub fn on_rel(&mut self, rel: &RelEvent, topology: &WindowStateManager, dispatcher: &dyn EventDispatcher) {
        if !self.ensure_target(topology) {
            trace!(device_id = rel.device_id, "no logical display, motion dropped");
            return;
        }
        if rel.has_motion() {
            self.move_by(rel.dx, rel.dy, topology);
            self.emit(PointerAction::Move, rel.device_id, rel.time, dispatcher);
        }
        if rel.has_axis() {
            self.event.set_axis_values(rel.wheel_horizontal, rel.wheel_vertical);
            self.emit(PointerAction::AxisUpdate, rel.device_id, rel.time, dispatcher);
            self.event.set_axis_values(0, 0);
        }
    }

    /// Applies a key transition if it is a mouse button.
    ///
    /// Returns `false` when `key` is not a button, so the caller can offer it
    /// to the keyboard pipeline.
    pub fn on_button(
        &mut self,
        key: &KernelKeyEvent,
        topology: &WindowStateManager,
        dispatcher: &dyn EventDispatcher,
    ) -> bool {
        let Some(button) = MouseButton::from_kernel_code(key.key_code) else {
            return false;
        };
        let button_id = button.id();
        let changed = match key.state {
            KeyState::Down => {
                let holders = self.buttons.entry(button_id).or_default();
                let first = holders.is_empty();
                holders.insert(key.device_id);
                first
            }
            KeyState::Up => self.release(button_id, key.device_id),
        };
        if !changed {
            trace!(device_id = key.device_id, ?button, state = ?key.state, "button already in that state");
            return true;
        }
        let action = match key.state {
            KeyState::Down => {
                self.event.set_button_pressed(button_id);
                PointerAction::ButtonDown
            }
            KeyState::Up => {
                self.event.set_button_released(button_id);
                PointerAction::ButtonUp
            }
        };
        self.event.set_button_id(button_id);
        if self.ensure_target(topology) {
            self.emit(action, key.device_id, key.time, dispatcher);
        }
        true
    }

    /// Releases every button `device_id` still holds.
    pub fn release_device(
        &mut self,
        device_id: i32,
        time: i64,
        topology: &WindowStateManager,
        dispatcher: &dyn EventDispatcher,
    ) {
        let held: Vec<i32> = self
            .buttons
            .iter()
            .filter(|(_, holders)| holders.contains(&device_id))
            .map(|(&button_id, _)| button_id)
            .collect();
        for button_id in held {
            if !self.release(button_id, device_id) {
                continue;
            }
            self.event.set_button_released(button_id);
            self.event.set_button_id(button_id);
            if self.ensure_target(topology) {
                self.emit(PointerAction::ButtonUp, device_id, time, dispatcher);
            }
        }
    }

    /// Keeps the target display valid across topology changes.  `topology`
    /// already reflects the change.
    pub fn on_display_change(&mut self, change: &DisplayChange, topology: &WindowStateManager) {
        match change {
            DisplayChange::LogicalAdded(added) if self.target_display_id == NONE_ID => {
                self.retarget(added.id, added.rect());
            }
            DisplayChange::LogicalChanged(changed) if changed.id == self.target_display_id => {
                if changed.rect() != self.target_rect {
                    let display_id = changed.id;
                    debug!(display_id, "cursor display resized, re-centering");
                    self.retarget(display_id, changed.rect());
                }
            }
            DisplayChange::LogicalRemoved(removed) if removed.id == self.target_display_id => {
                let removed_id = removed.id;
                match topology.logical_displays().first() {
                    Some(next) => self.retarget(next.id(), next.rect()),
                    None => {
                        self.target_display_id = NONE_ID;
                        self.target_rect = Rect::default();
                    }
                }
                debug!(
                    removed = removed_id,
                    target = self.target_display_id,
                    "cursor display removed"
                );
            }
            _ => {}
        }
    }

    fn release(&mut self, button_id: i32, device_id: i32) -> bool {
        let Some(holders) = self.buttons.get_mut(&button_id) else {
            return false;
        };
        if !holders.remove(&device_id) || !holders.is_empty() {
            return false;
        }
        self.buttons.remove(&button_id);
        true
    }

    /// Picks the first logical display if the cursor has none.
    fn ensure_target(&mut self, topology: &WindowStateManager) -> bool {
        if self.target_display_id != NONE_ID && topology.logical_display(self.target_display_id).is_some() {
            return true;
        }
        match topology.logical_displays().first() {
            Some(display) => {
                self.retarget(display.id(), display.rect());
                true
            }
            None => false,
        }
    }

    fn retarget(&mut self, display_id: i32, rect: Rect) {
        self.target_display_id = display_id;
        self.target_rect = rect;
        (self.global_x, self.global_y) = rect.center();
    }

    fn move_by(&mut self, dx: i32, dy: i32, topology: &WindowStateManager) {
        let x = self.global_x.saturating_add(dx);
        let y = self.global_y.saturating_add(dy);
        if self.target_rect.contains(x, y) {
            (self.global_x, self.global_y) = (x, y);
            return;
        }
        if let Some((display_id, _, _)) = topology.global_to_logical(x, y) {
            if let Some(display) = topology.logical_display(display_id) {
                trace!(from = self.target_display_id, to = display_id, "cursor crossed displays");
                self.target_display_id = display_id;
                self.target_rect = display.rect();
                (self.global_x, self.global_y) = (x, y);
                return;
            }
        }
        (self.global_x, self.global_y) = self.target_rect.clamp(x, y);
    }

    fn emit(&mut self, action: PointerAction, device_id: i32, time: i64, dispatcher: &dyn EventDispatcher) {
        let (global_x, global_y) = (self.global_x, self.global_y);
        let rect = self.target_rect;
        if let Some(item) = self.event.pointer_item_mut(CURSOR_POINTER_ID) {
            item.global_x = global_x;
            item.global_y = global_y;
            item.local_x = global_x - rect.x;
            item.local_y = global_y - rect.y;
            item.device_id = device_id;
        }
        self.event.header.target_display_id = self.target_display_id;
        self.event.header.device_id = device_id;
        self.event.set_action(action, time);
        dispatcher.dispatch(DispatchedEvent::Pointer(self.event.clone()));
    }
}
