//! Keyboard keys of one seat.
//!
//! Every keyboard bound to a seat feeds the same [`KeyEvent`], so a key held
//! on two keyboards is reported pressed once and released only when the last
//! keyboard lets go.

use inputflow_core::{keymap, DispatchedEvent, KernelKeyEvent, KeyEvent, KeyState};
use tracing::trace;

use super::dispatch::EventDispatcher;

#[derive(Debug, Default)]
pub struct KeyEventHandler {
    event: KeyEvent,
}

impl KeyEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_event(&self) -> &KeyEvent {
        &self.event
    }

    /// Applies one key transition.  Dispatches only when the seat-wide
    /// state of the key changed.  Returns whether an event was dispatched.
    pub fn on_key(&mut self, key: &KernelKeyEvent, dispatcher: &dyn EventDispatcher) -> bool {
        let code = i32::from(key.key_code);
        let changed = match key.state {
            KeyState::Down => self.event.set_key_down(code, key.device_id, key.time),
            KeyState::Up => self.event.set_key_up(code, key.device_id, key.time),
        };
        trace!(
            device_id = key.device_id,
            key = %keymap::describe_key(key.key_code),
            state = ?key.state,
            changed,
            "key"
        );
        if changed {
            dispatcher.dispatch(DispatchedEvent::Key(self.event.clone()));
        }
        changed
    }

    /// Releases everything `device_id` still holds, dispatching one up
    /// event per key that became released.
    pub fn release_device(&mut self, device_id: i32, time: i64, dispatcher: &dyn EventDispatcher) {
        let held: Vec<i32> = self
            .event
            .pressed_keys()
            .into_iter()
            .filter(|&code| {
                self.event
                    .key_item(code)
                    .is_some_and(|item| item.devices().any(|d| d == device_id))
            })
            .collect();
        for code in held {
            if self.event.set_key_up(code, device_id, time) {
                dispatcher.dispatch(DispatchedEvent::Key(self.event.clone()));
            }
        }
    }
}
