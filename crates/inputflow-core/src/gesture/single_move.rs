//! One-finger drag → relative mouse motion.
//!
//! ```text
//!   Waiting ──first down / up leaving one contact──▶ Moving
//!   Moving  ──tracked contact lifts──────────────────▶ Waiting
//!   Moving  ──another contact lands──────────────────▶ Dead
//!   Dead    ──all contacts lifted────────────────────▶ Waiting
//! ```
//!
//! An inconsistent event (its pointer id is not in its own snapshot) or an
//! action the machine does not expect falls back to `Waiting` when no contact
//! is down and to `Dead` otherwise.

use tracing::{trace, warn};

use super::{pressed_contacts, GestureConfig, GestureOutput};
use crate::event::{PointerAction, PointerEvent};
use crate::kernel::{KernelEvent, RelEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveState {
    Waiting,
    Moving {
        pointer_id: i32,
        down_time: i64,
        last_x: i32,
        last_y: i32,
    },
    Dead,
}

#[derive(Debug, Clone)]
pub struct SingleMoveTransformer {
    device_id: i32,
    jitter_threshold: i32,
    state: MoveState,
}

impl SingleMoveTransformer {
    pub fn new(device_id: i32, config: GestureConfig) -> Self {
        Self {
            device_id,
            jitter_threshold: config.move_jitter_threshold,
            state: MoveState::Waiting,
        }
    }

    pub fn state(&self) -> MoveState {
        self.state
    }

    /// Consumes the moves it turns into relative motion.
    pub fn on_pointer_event(&mut self, event: &PointerEvent, out: &mut GestureOutput) -> bool {
        let contacts = pressed_contacts(event).count();
        if event.pointer_item(event.pointer_id()).is_none() {
            warn!(
                device_id = self.device_id,
                pointer_id = event.pointer_id(),
                "pointer id missing from its own event"
            );
            self.fall_back(contacts);
            return false;
        }

        if let MoveState::Moving {
            pointer_id,
            down_time,
            ..
        } = self.state
        {
            // The lift of the tracked contact was consumed upstream; a reused
            // pointer id shows up with a newer down time.
            let same_contact = event
                .pointer_item(pointer_id)
                .is_some_and(|item| item.down_time == down_time);
            if !same_contact {
                self.state = MoveState::Waiting;
            }
        }

        match (self.state, event.action()) {
            (MoveState::Waiting, PointerAction::Down) if contacts == 1 => {
                self.track_sole_contact(event);
                false
            }
            (MoveState::Waiting, PointerAction::Up) if contacts == 1 => {
                self.track_sole_contact(event);
                false
            }
            (MoveState::Waiting, PointerAction::Down | PointerAction::Move | PointerAction::Up) => {
                false
            }
            (
                MoveState::Moving {
                    pointer_id,
                    down_time,
                    last_x,
                    last_y,
                },
                PointerAction::Move,
            ) => {
                if event.pointer_id() != pointer_id {
                    return false;
                }
                let Some(item) = event.pointer_item(pointer_id) else {
                    return false;
                };
                let (dx, dy) = (item.local_x - last_x, item.local_y - last_y);
                if dx.abs() < self.jitter_threshold && dy.abs() < self.jitter_threshold {
                    trace!(device_id = self.device_id, dx, dy, "move below jitter threshold");
                    return true;
                }
                self.state = MoveState::Moving {
                    pointer_id,
                    down_time,
                    last_x: item.local_x,
                    last_y: item.local_y,
                };
                out.events.push(KernelEvent::Rel(RelEvent::motion(
                    self.device_id,
                    event.header.action_time,
                    dx,
                    dy,
                )));
                true
            }
            (MoveState::Moving { pointer_id, .. }, PointerAction::Up) => {
                if event.pointer_id() == pointer_id {
                    self.state = MoveState::Waiting;
                }
                false
            }
            (MoveState::Moving { .. }, PointerAction::Down) => {
                self.state = MoveState::Dead;
                false
            }
            (MoveState::Dead, PointerAction::Down | PointerAction::Move | PointerAction::Up) => {
                if contacts == 0 {
                    self.state = MoveState::Waiting;
                }
                false
            }
            (_, _) => {
                self.fall_back(contacts);
                false
            }
        }
    }

    fn track_sole_contact(&mut self, event: &PointerEvent) {
        if let Some(item) = pressed_contacts(event).next() {
            self.state = MoveState::Moving {
                pointer_id: item.pointer_id,
                down_time: item.down_time,
                last_x: item.local_x,
                last_y: item.local_y,
            };
        }
    }

    fn fall_back(&mut self, contacts: usize) {
        self.state = if contacts == 0 {
            MoveState::Waiting
        } else {
            MoveState::Dead
        };
    }
}
