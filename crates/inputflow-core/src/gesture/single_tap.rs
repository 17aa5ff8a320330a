//! One-finger tap → left click.
//!
//! ```text
//!          down (sole contact) / arm timer
//!   Idle ───────────────────────────────────▶ FirstDown
//!    ▲                                           │
//!    │  up in time and in place / click          │
//!    ├───────────────────────────────────────────┤
//!    │  big move, second contact, timeout, late  │
//!    └───────────────────────────────────────────┘
//! ```

use tracing::trace;

use super::{pressed_contacts, GestureConfig, GestureOutput, TimerRequest};
use crate::event::{PointerAction, PointerEvent};
use crate::kernel::{codes, KernelEvent, KernelKeyEvent, KeyState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapState {
    Idle,
    FirstDown {
        pointer_id: i32,
        down_time: i64,
        anchor_x: i32,
        anchor_y: i32,
    },
}

#[derive(Debug, Clone)]
pub struct SingleTapTransformer {
    device_id: i32,
    config: GestureConfig,
    state: TapState,
    /// Token of the timer armed by the current `FirstDown`.
    generation: u64,
}

impl SingleTapTransformer {
    pub fn new(device_id: i32, config: GestureConfig) -> Self {
        Self {
            device_id,
            config,
            state: TapState::Idle,
            generation: 0,
        }
    }

    pub fn state(&self) -> TapState {
        self.state
    }

    /// Consumes the event only when it completes a tap.
    pub fn on_pointer_event(&mut self, event: &PointerEvent, out: &mut GestureOutput) -> bool {
        let pointer_id = event.pointer_id();
        let Some(item) = event.pointer_item(pointer_id) else {
            self.state = TapState::Idle;
            return false;
        };
        let contacts = pressed_contacts(event).count();

        match (self.state, event.action()) {
            (TapState::Idle, PointerAction::Down) if contacts == 1 => {
                self.generation += 1;
                self.state = TapState::FirstDown {
                    pointer_id,
                    down_time: event.header.action_time,
                    anchor_x: item.local_x,
                    anchor_y: item.local_y,
                };
                out.timer = Some(TimerRequest {
                    token: self.generation,
                    after_ms: self.config.tap_max_interval_ms,
                });
                false
            }
            (TapState::Idle, _) => false,
            (
                TapState::FirstDown {
                    pointer_id: tracked,
                    down_time,
                    anchor_x,
                    anchor_y,
                },
                action,
            ) => {
                let within_delta = (item.local_x - anchor_x).abs() <= self.config.tap_max_delta_x
                    && (item.local_y - anchor_y).abs() <= self.config.tap_max_delta_y;
                match action {
                    PointerAction::Move if pointer_id == tracked && within_delta => false,
                    PointerAction::Up if pointer_id == tracked && contacts == 0 => {
                        self.state = TapState::Idle;
                        let elapsed = event.header.action_time - down_time;
                        if elapsed > self.config.tap_max_interval_ms || !within_delta {
                            trace!(device_id = self.device_id, elapsed, "tap rejected");
                            return false;
                        }
                        self.click(event.header.action_time, out);
                        true
                    }
                    _ => {
                        self.state = TapState::Idle;
                        false
                    }
                }
            }
        }
    }

    /// Abandons a pending tap if `token` is the current one.
    pub fn on_timeout(&mut self, token: u64) {
        if token == self.generation && matches!(self.state, TapState::FirstDown { .. }) {
            trace!(device_id = self.device_id, "tap window expired");
            self.state = TapState::Idle;
        }
    }

    fn click(&self, time: i64, out: &mut GestureOutput) {
        for state in [KeyState::Down, KeyState::Up] {
            out.events.push(KernelEvent::Key(KernelKeyEvent::new(
                self.device_id,
                time,
                codes::BTN_LEFT,
                state,
            )));
        }
    }
}
