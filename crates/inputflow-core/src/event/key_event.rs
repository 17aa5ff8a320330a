//! Keyboard event with per-device press tracking.
//!
//! A physical key code may be held by several devices at once (two keyboards
//! on one seat).  The key is logically pressed while at least one device holds
//! it and is released only when the last holder releases it.

use std::collections::{BTreeMap, BTreeSet};

use super::{EventHeader, EventType};

/// What happened to [`KeyEvent::key_code`] in the latest transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyAction {
    #[default]
    Unknown,
    Down,
    Up,
    Cancel,
}

/// Press bookkeeping for one key code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyItem {
    pub key_code: i32,
    pub down_time: i64,
    /// `-1` while pressed.
    pub up_time: i64,
    devices: BTreeSet<i32>,
}

impl KeyItem {
    fn new(key_code: i32, down_time: i64) -> Self {
        Self {
            key_code,
            down_time,
            up_time: -1,
            devices: BTreeSet::new(),
        }
    }

    /// Returns `true` while any device holds the key.
    pub fn is_pressed(&self) -> bool {
        !self.devices.is_empty()
    }

    /// Devices currently holding the key.
    pub fn devices(&self) -> impl Iterator<Item = i32> + '_ {
        self.devices.iter().copied()
    }
}

/// A keyboard event: the latest key transition plus every key still held.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEvent {
    pub header: EventHeader,
    action: KeyAction,
    key_code: i32,
    keys: BTreeMap<i32, KeyItem>,
}

impl Default for KeyEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyEvent {
    pub fn new() -> Self {
        Self {
            header: EventHeader::new(EventType::Key),
            action: KeyAction::Unknown,
            key_code: -1,
            keys: BTreeMap::new(),
        }
    }

    pub fn action(&self) -> KeyAction {
        self.action
    }

    /// Key code of the latest transition.
    pub fn key_code(&self) -> i32 {
        self.key_code
    }

    pub fn key_item(&self, key_code: i32) -> Option<&KeyItem> {
        self.keys.get(&key_code)
    }

    pub fn is_pressed(&self, key_code: i32) -> bool {
        self.keys.get(&key_code).is_some_and(KeyItem::is_pressed)
    }

    /// Key codes currently held by at least one device, ascending.
    pub fn pressed_keys(&self) -> Vec<i32> {
        self.keys
            .values()
            .filter(|k| k.is_pressed())
            .map(|k| k.key_code)
            .collect()
    }

    /// Records that `device_id` pressed `key_code`.
    ///
    /// Returns `true` when the key transitioned from released to pressed, in
    /// which case the event's action, key code and id are updated.  A second
    /// device pressing an already-held key only adds an owner.
    pub fn set_key_down(&mut self, key_code: i32, device_id: i32, time: i64) -> bool {
        self.purge_released();
        let item = self
            .keys
            .entry(key_code)
            .or_insert_with(|| KeyItem::new(key_code, time));
        let newly_pressed = !item.is_pressed();
        item.devices.insert(device_id);
        if !newly_pressed {
            return false;
        }
        item.down_time = time;
        item.up_time = -1;
        self.transition(KeyAction::Down, key_code, device_id, time);
        self.header.action_start_time = time;
        true
    }

    /// Records that `device_id` released `key_code`.
    ///
    /// Returns `true` when this was the last holder, i.e. the key is now
    /// logically released.  Releasing a key the device never held is ignored.
    pub fn set_key_up(&mut self, key_code: i32, device_id: i32, time: i64) -> bool {
        self.purge_released();
        let Some(item) = self.keys.get_mut(&key_code) else {
            return false;
        };
        if !item.devices.remove(&device_id) {
            return false;
        }
        if item.is_pressed() {
            return false;
        }
        item.up_time = time;
        self.transition(KeyAction::Up, key_code, device_id, time);
        true
    }

    /// Drops `device_id` from every key it holds.
    ///
    /// Returns the key codes that became released as a result, ascending.
    /// The event's action reflects the last released key.
    pub fn release_device(&mut self, device_id: i32, time: i64) -> Vec<i32> {
        let held: Vec<i32> = self
            .keys
            .values()
            .filter(|k| k.devices.contains(&device_id))
            .map(|k| k.key_code)
            .collect();
        held.into_iter()
            .filter(|&code| self.set_key_up(code, device_id, time))
            .collect()
    }

    fn transition(&mut self, action: KeyAction, key_code: i32, device_id: i32, time: i64) {
        self.action = action;
        self.key_code = key_code;
        self.header.device_id = device_id;
        self.header.action_time = time;
        self.header.refresh_id();
    }

    /// Released items stay visible in the snapshot that reported their
    /// release and are dropped on the next mutation.
    fn purge_released(&mut self) {
        self.keys.retain(|_, k| k.is_pressed());
    }
}
