//! Touchpad gesture transformers.
//!
//! A [`TransformerChain`] is built per touchpad device.  Every touchpad
//! [`PointerEvent`] is offered to the chain's transformers in order; the first
//! one that *consumes* the event stops the walk.  Transformers never mutate the
//! event they are offered.  Instead they synthesize kernel-level events (a
//! `BTN_LEFT` click, a relative move) into a [`GestureOutput`], which the seat
//! feeds back into its mouse pipeline as if a real mouse had produced them.
//!
//! # Timers
//!
//! The tap recognizer needs to give up if a finger stays down too long.  The
//! core has no clock of its own, so a transformer that wants a timeout puts a
//! [`TimerRequest`] into the output.  The host schedules it and later calls
//! [`TransformerChain::on_timeout`] with the request's token.  A token that no
//! longer matches (the gesture already ended) is ignored.

use serde::{Deserialize, Serialize};

use crate::event::{PointerEvent, PointerItem};
use crate::kernel::KernelEvent;

pub mod single_move;
pub mod single_tap;

pub use single_move::{MoveState, SingleMoveTransformer};
pub use single_tap::{SingleTapTransformer, TapState};

/// Tunables shared by the touchpad transformers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Longest down-to-up time that still counts as a tap.
    pub tap_max_interval_ms: i64,
    /// Largest horizontal drift that still counts as a tap, in touchpad units.
    pub tap_max_delta_x: i32,
    pub tap_max_delta_y: i32,
    /// Moves smaller than this on both axes are not reported.
    pub move_jitter_threshold: i32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            tap_max_interval_ms: 200,
            tap_max_delta_x: 200,
            tap_max_delta_y: 200,
            move_jitter_threshold: 1,
        }
    }
}

/// A one-shot timeout a transformer asks the host to schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRequest {
    pub token: u64,
    pub after_ms: i64,
}

/// What a transformer produced for one input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GestureOutput {
    /// Synthesized events, in emission order.
    pub events: Vec<KernelEvent>,
    pub timer: Option<TimerRequest>,
    /// Whether a transformer consumed the input.
    pub consumed: bool,
}

/// The closed set of transformers.
#[derive(Debug, Clone)]
pub enum Transformer {
    SingleTap(SingleTapTransformer),
    SingleMove(SingleMoveTransformer),
}

impl Transformer {
    /// Offers `event`; returns `true` if it was consumed.
    pub fn on_pointer_event(&mut self, event: &PointerEvent, out: &mut GestureOutput) -> bool {
        match self {
            Transformer::SingleTap(t) => t.on_pointer_event(event, out),
            Transformer::SingleMove(t) => t.on_pointer_event(event, out),
        }
    }

    pub fn on_timeout(&mut self, token: u64) {
        match self {
            Transformer::SingleTap(t) => t.on_timeout(token),
            Transformer::SingleMove(_) => {}
        }
    }
}

/// Ordered transformers of one device.
#[derive(Debug, Clone)]
pub struct TransformerChain {
    device_id: i32,
    transformers: Vec<Transformer>,
}

impl TransformerChain {
    pub fn new(device_id: i32, transformers: Vec<Transformer>) -> Self {
        Self {
            device_id,
            transformers,
        }
    }

    /// The standard touchpad chain: tap recognition, then single-finger move.
    pub fn touchpad(device_id: i32, config: GestureConfig) -> Self {
        Self::new(
            device_id,
            vec![
                Transformer::SingleTap(SingleTapTransformer::new(device_id, config)),
                Transformer::SingleMove(SingleMoveTransformer::new(device_id, config)),
            ],
        )
    }

    pub fn device_id(&self) -> i32 {
        self.device_id
    }

    pub fn transformers(&self) -> &[Transformer] {
        &self.transformers
    }

    /// Walks the chain until a transformer consumes `event`.
    pub fn handle(&mut self, event: &PointerEvent) -> GestureOutput {
        let mut out = GestureOutput::default();
        for transformer in &mut self.transformers {
            if transformer.on_pointer_event(event, &mut out) {
                out.consumed = true;
                break;
            }
        }
        out
    }

    pub fn on_timeout(&mut self, token: u64) {
        for transformer in &mut self.transformers {
            transformer.on_timeout(token);
        }
    }
}

/// Contacts still down in `event`.
pub(crate) fn pressed_contacts(event: &PointerEvent) -> impl Iterator<Item = &PointerItem> {
    event.pointer_items().filter(|item| item.is_pressed())
}
