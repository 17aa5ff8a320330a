//! Pointer event: mouse cursor, touchscreen and touchpad contacts.
//!
//! A `PointerEvent` is a snapshot of every contact currently known to its
//! producer, keyed by a synthetic pointer id, plus the id of the contact the
//! latest action refers to.  Mouse-sourced events additionally carry the set
//! of pressed buttons.

use std::collections::{BTreeMap, BTreeSet};

use super::{EventHeader, EventType};
use crate::kernel::codes;

/// The latest transition described by a [`PointerEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PointerAction {
    #[default]
    Unknown,
    Cancel,
    Down,
    Move,
    Up,
    ButtonDown,
    ButtonUp,
    AxisUpdate,
}

/// Which class of device produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceType {
    #[default]
    Unknown,
    Mouse,
    TouchScreen,
    TouchPad,
}

/// Logical mouse buttons and their stable ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Side,
    Extra,
    Forward,
    Back,
    Task,
}

impl MouseButton {
    /// Maps a kernel `BTN_*` code to a logical button.
    ///
    /// Returns `None` for anything that is not a mouse button, so the caller
    /// can hand the key to the keyboard pipeline instead.
    pub fn from_kernel_code(code: u16) -> Option<Self> {
        match code {
            codes::BTN_LEFT => Some(Self::Left),
            codes::BTN_RIGHT => Some(Self::Right),
            codes::BTN_MIDDLE => Some(Self::Middle),
            codes::BTN_SIDE => Some(Self::Side),
            codes::BTN_EXTRA => Some(Self::Extra),
            codes::BTN_FORWARD => Some(Self::Forward),
            codes::BTN_BACK => Some(Self::Back),
            codes::BTN_TASK => Some(Self::Task),
            _ => None,
        }
    }

    /// Stable numeric id exposed to consumers.
    pub fn id(self) -> i32 {
        match self {
            Self::Left => 0,
            Self::Right => 1,
            Self::Middle => 2,
            Self::Side => 3,
            Self::Extra => 4,
            Self::Forward => 5,
            Self::Back => 6,
            Self::Task => 7,
        }
    }
}

/// One contact (or the cursor) inside a [`PointerEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PointerItem {
    pub pointer_id: i32,
    pub down_time: i64,
    /// `-1` while the contact is down.
    pub up_time: i64,
    pub global_x: i32,
    pub global_y: i32,
    pub local_x: i32,
    pub local_y: i32,
    pub device_id: i32,
}

impl PointerItem {
    pub fn new(pointer_id: i32, device_id: i32) -> Self {
        Self {
            pointer_id,
            down_time: 0,
            up_time: -1,
            device_id,
            ..Self::default()
        }
    }

    /// A contact is pressed iff it went down and has not come up.
    pub fn is_pressed(&self) -> bool {
        self.down_time > 0 && self.up_time == -1
    }
}

/// Snapshot of all contacts of one producer plus the latest action.
#[derive(Debug, Clone, PartialEq)]
pub struct PointerEvent {
    pub header: EventHeader,
    action: PointerAction,
    pointer_id: i32,
    source_type: SourceType,
    pointers: BTreeMap<i32, PointerItem>,
    pressed_buttons: BTreeSet<i32>,
    button_id: i32,
    axis_vertical: i32,
    axis_horizontal: i32,
}

impl PointerEvent {
    pub fn new(source_type: SourceType) -> Self {
        Self {
            header: EventHeader::new(EventType::Pointer),
            action: PointerAction::Unknown,
            pointer_id: -1,
            source_type,
            pointers: BTreeMap::new(),
            pressed_buttons: BTreeSet::new(),
            button_id: -1,
            axis_vertical: 0,
            axis_horizontal: 0,
        }
    }

    pub fn action(&self) -> PointerAction {
        self.action
    }

    /// Records a new action and refreshes the event id.
    pub fn set_action(&mut self, action: PointerAction, time: i64) {
        self.action = action;
        self.header.action_time = time;
        self.header.refresh_id();
    }

    /// The pointer the latest action refers to.
    pub fn pointer_id(&self) -> i32 {
        self.pointer_id
    }

    pub fn set_pointer_id(&mut self, pointer_id: i32) {
        self.pointer_id = pointer_id;
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    /// Inserts or replaces the item with the same pointer id.
    pub fn upsert_pointer_item(&mut self, item: PointerItem) {
        self.pointers.insert(item.pointer_id, item);
    }

    pub fn pointer_item(&self, pointer_id: i32) -> Option<&PointerItem> {
        self.pointers.get(&pointer_id)
    }

    pub fn pointer_item_mut(&mut self, pointer_id: i32) -> Option<&mut PointerItem> {
        self.pointers.get_mut(&pointer_id)
    }

    pub fn remove_pointer_item(&mut self, pointer_id: i32) -> Option<PointerItem> {
        self.pointers.remove(&pointer_id)
    }

    /// Ids of every contact in this snapshot, ascending.
    pub fn pointer_ids(&self) -> Vec<i32> {
        self.pointers.keys().copied().collect()
    }

    pub fn pointer_count(&self) -> usize {
        self.pointers.len()
    }

    pub fn pointer_items(&self) -> impl Iterator<Item = &PointerItem> {
        self.pointers.values()
    }

    pub fn clear_pointers(&mut self) {
        self.pointers.clear();
    }

    /// Id of the button of the latest button transition, or `-1`.
    pub fn button_id(&self) -> i32 {
        self.button_id
    }

    pub fn set_button_id(&mut self, button_id: i32) {
        self.button_id = button_id;
    }

    pub fn set_button_pressed(&mut self, button_id: i32) {
        self.pressed_buttons.insert(button_id);
    }

    pub fn set_button_released(&mut self, button_id: i32) {
        self.pressed_buttons.remove(&button_id);
    }

    pub fn is_button_pressed(&self, button_id: i32) -> bool {
        self.pressed_buttons.contains(&button_id)
    }

    /// Pressed buttons in ascending id order.
    pub fn pressed_buttons(&self) -> Vec<i32> {
        self.pressed_buttons.iter().copied().collect()
    }

    pub fn axis_values(&self) -> (i32, i32) {
        (self.axis_horizontal, self.axis_vertical)
    }

    pub fn set_axis_values(&mut self, horizontal: i32, vertical: i32) {
        self.axis_horizontal = horizontal;
        self.axis_vertical = vertical;
    }
}
