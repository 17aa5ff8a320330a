//! The binary's default [`EventDispatcher`]: logs every event.

use inputflow_core::{keymap, DispatchedEvent};
use tracing::debug;

use crate::application::dispatch::EventDispatcher;

/// Logs each dispatched event at `debug`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDispatcher;

impl EventDispatcher for TracingDispatcher {
    fn dispatch(&self, event: DispatchedEvent) {
        match &event {
            DispatchedEvent::Pointer(pointer) => {
                let item = pointer.pointer_item(pointer.pointer_id());
                debug!(
                    event_id = pointer.header.id(),
                    source = ?pointer.source_type(),
                    action = ?pointer.action(),
                    display_id = pointer.header.target_display_id,
                    device_id = pointer.header.device_id,
                    pointer_id = pointer.pointer_id(),
                    x = item.map_or(0, |i| i.local_x),
                    y = item.map_or(0, |i| i.local_y),
                    buttons = ?pointer.pressed_buttons(),
                    "pointer event"
                );
            }
            DispatchedEvent::Key(key) => {
                let code = key.key_code();
                let name = u16::try_from(code)
                    .ok()
                    .and_then(keymap::key_name)
                    .unwrap_or("?");
                debug!(
                    event_id = key.header.id(),
                    action = ?key.action(),
                    key_code = code,
                    key = name,
                    device_id = key.header.device_id,
                    pressed = ?key.pressed_keys(),
                    "key event"
                );
            }
        }
    }
}
