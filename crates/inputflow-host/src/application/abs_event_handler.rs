//! Touchpad contacts of one seat, fed through the gesture chain.
//!
//! Each touchpad gets its own [`PointerEvent`] (pointer ids are the kernel
//! slots, in touchpad units) and its own [`TransformerChain`], built the first
//! time the device reports contacts.  A frame that changed several contacts
//! is replayed as one snapshot per change so the transformers see every
//! down, move and up in order.

use std::collections::BTreeMap;

use inputflow_core::{
    AbsAction, AbsEvent, GestureConfig, GestureOutput, PointerAction, PointerEvent, PointerItem,
    SourceType, TransformerChain,
};
use tracing::{debug, trace};

#[derive(Debug)]
struct TouchpadState {
    event: PointerEvent,
    chain: TransformerChain,
}

impl TouchpadState {
    fn new(device_id: i32, config: GestureConfig) -> Self {
        let mut event = PointerEvent::new(SourceType::TouchPad);
        event.header.device_id = device_id;
        Self {
            event,
            chain: TransformerChain::touchpad(device_id, config),
        }
    }

    /// Items that lifted in an earlier snapshot are dropped.
    fn purge_released(&mut self) {
        let lifted: Vec<i32> = self
            .event
            .pointer_items()
            .filter(|item| item.up_time != -1)
            .map(|item| item.pointer_id)
            .collect();
        for pointer_id in lifted {
            self.event.remove_pointer_item(pointer_id);
        }
    }

    /// Applies one contact change; `None` if the contact is unknown.
    fn apply(&mut self, abs: &AbsEvent, pointer_id: i32, change: AbsAction) -> Option<&PointerEvent> {
        self.purge_released();
        let pointer = abs.pointer(pointer_id)?;
        let action = match change {
            AbsAction::Down => {
                let mut item = PointerItem::new(pointer_id, abs.device_id);
                item.down_time = abs.time.max(1);
                self.event.upsert_pointer_item(item);
                PointerAction::Down
            }
            AbsAction::Move => PointerAction::Move,
            AbsAction::Up => PointerAction::Up,
        };
        let item = self.event.pointer_item_mut(pointer_id)?;
        item.local_x = pointer.x;
        item.local_y = pointer.y;
        item.global_x = pointer.x;
        item.global_y = pointer.y;
        if action == PointerAction::Up {
            item.up_time = abs.time;
        }
        self.event.set_pointer_id(pointer_id);
        self.event.set_action(action, abs.time);
        Some(&self.event)
    }
}

#[derive(Debug)]
pub struct AbsEventHandler {
    config: GestureConfig,
    gestures_enabled: bool,
    touchpads: BTreeMap<i32, TouchpadState>,
}

impl AbsEventHandler {
    pub fn new(config: GestureConfig, gestures_enabled: bool) -> Self {
        Self {
            config,
            gestures_enabled,
            touchpads: BTreeMap::new(),
        }
    }

    pub fn has_chain(&self, device_id: i32) -> bool {
        self.touchpads.contains_key(&device_id)
    }

    /// Runs a touchpad frame through the device's chain and returns what the
    /// transformers synthesized.  The last timer request of the frame wins.
    pub fn on_abs(&mut self, abs: &AbsEvent) -> GestureOutput {
        let mut output = GestureOutput::default();
        if !self.gestures_enabled {
            trace!(device_id = abs.device_id, "touchpad gestures disabled, frame dropped");
            return output;
        }
        let config = self.config;
        let touchpad = self.touchpads.entry(abs.device_id).or_insert_with(|| {
            debug!(device_id = abs.device_id, "gesture chain created");
            TouchpadState::new(abs.device_id, config)
        });

        let changes: Vec<(i32, AbsAction)> = abs.changes().collect();
        for (pointer_id, change) in changes {
            let Some(snapshot) = touchpad.apply(abs, pointer_id, change) else {
                trace!(device_id = abs.device_id, pointer_id, ?change, "change for unknown contact dropped");
                continue;
            };
            let snapshot = snapshot.clone();
            let step = touchpad.chain.handle(&snapshot);
            output.consumed |= step.consumed;
            output.events.extend(step.events);
            if step.timer.is_some() {
                output.timer = step.timer;
            }
        }
        output
    }

    /// Forwards a gesture timeout to the device's chain, if it still exists.
    pub fn on_timeout(&mut self, device_id: i32, token: u64) {
        if let Some(touchpad) = self.touchpads.get_mut(&device_id) {
            touchpad.chain.on_timeout(token);
        }
    }

    /// Drops the chain and contact state of a device.
    pub fn remove_device(&mut self, device_id: i32) {
        if self.touchpads.remove(&device_id).is_some() {
            debug!(device_id, "gesture chain dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inputflow_core::kernel::codes;
    use inputflow_core::{AbsPointer, KernelEvent, KeyState};

    fn frame(time: i64, contacts: &[(i32, i32, i32, AbsAction)]) -> AbsEvent {
        let pointers = contacts
            .iter()
            .map(|&(id, x, y, change)| {
                (
                    id,
                    AbsPointer {
                        id,
                        tracking_id: id + 100,
                        x,
                        y,
                        released: change == AbsAction::Up,
                        change: Some(change),
                        ..AbsPointer::default()
                    },
                )
            })
            .collect();
        AbsEvent::from_pointers(7, time, pointers).unwrap()
    }

    #[test]
    fn test_quick_tap_synthesizes_left_click() {
        // Arrange
        let mut handler = AbsEventHandler::new(GestureConfig::default(), true);

        // Act
        let down = handler.on_abs(&frame(1000, &[(0, 300, 300, AbsAction::Down)]));
        let up = handler.on_abs(&frame(1050, &[(0, 300, 300, AbsAction::Up)]));

        // Assert
        assert!(down.timer.is_some(), "tap window must be armed on down");
        let keys: Vec<(u16, KeyState)> = up
            .events
            .iter()
            .filter_map(|e| match e {
                KernelEvent::Key(k) => Some((k.key_code, k.state)),
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec![(codes::BTN_LEFT, KeyState::Down), (codes::BTN_LEFT, KeyState::Up)]);
        assert!(handler.has_chain(7));
    }

    #[test]
    fn test_single_finger_drag_synthesizes_relative_motion() {
        let mut handler = AbsEventHandler::new(GestureConfig::default(), true);

        handler.on_abs(&frame(1000, &[(0, 300, 300, AbsAction::Down)]));
        let moved = handler.on_abs(&frame(1010, &[(0, 340, 290, AbsAction::Move)]));

        let motion: Vec<(i32, i32)> = moved
            .events
            .iter()
            .filter_map(|e| match e {
                KernelEvent::Rel(r) => Some((r.dx, r.dy)),
                _ => None,
            })
            .collect();
        assert_eq!(motion, vec![(40, -10)]);
    }

    #[test]
    fn test_disabled_gestures_produce_nothing() {
        let mut handler = AbsEventHandler::new(GestureConfig::default(), false);

        let out = handler.on_abs(&frame(1000, &[(0, 1, 1, AbsAction::Down)]));

        assert_eq!(out, GestureOutput::default());
        assert!(!handler.has_chain(7));
    }

    #[test]
    fn test_timeout_cancels_pending_tap() {
        // Arrange
        let mut handler = AbsEventHandler::new(GestureConfig::default(), true);
        let down = handler.on_abs(&frame(1000, &[(0, 300, 300, AbsAction::Down)]));
        let token = down.timer.map(|t| t.token).unwrap();

        // Act
        handler.on_timeout(7, token);
        let up = handler.on_abs(&frame(1050, &[(0, 300, 300, AbsAction::Up)]));

        // Assert
        assert!(up.events.iter().all(|e| !matches!(e, KernelEvent::Key(_))));
    }

    #[test]
    fn test_remove_device_drops_chain() {
        let mut handler = AbsEventHandler::new(GestureConfig::default(), true);
        handler.on_abs(&frame(1000, &[(0, 1, 1, AbsAction::Down)]));

        handler.remove_device(7);

        assert!(!handler.has_chain(7));
    }
}
