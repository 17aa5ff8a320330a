//! A pointer/keyboard seat: one cursor and one keyboard state shared by every
//! mouse, keyboard and touchpad assigned to the same seat id.
//!
//! # Routing inside a seat
//!
//! ```text
//! RelEvent ──────────────────────────────▶ RelEventHandler (cursor)
//! KernelKeyEvent ── mouse button? ─ yes ─▶ RelEventHandler
//!                               └─ no ──▶ KeyEventHandler (if a keyboard key)
//! AbsEvent (touchpad) ─▶ AbsEventHandler ─▶ gesture chain ─▶ synthesized Rel/Key
//!                                                             └─▶ as above
//! ```
//!
//! Touchscreen frames never reach a `Seat`; they go to the
//! [`TouchScreenSeat`](super::touch_screen_seat::TouchScreenSeat) instead.

use std::collections::{BTreeMap, BTreeSet};

use inputflow_core::kernel::codes;
use inputflow_core::{
    DeviceCapabilities, DeviceInfo, DisplayChange, GestureConfig, KernelEvent, KernelKeyEvent,
    WindowStateManager,
};
use thiserror::Error;
use tracing::{debug, info, trace};

use super::abs_event_handler::AbsEventHandler;
use super::dispatch::{EventDispatcher, GestureTimer};
use super::key_event_handler::KeyEventHandler;
use super::rel_event_handler::RelEventHandler;

/// Error type for binding devices and displays to seats.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindError {
    #[error("device {device_id} has a degenerate axis {axis:#x}")]
    DegenerateAxis { device_id: i32, axis: u16 },

    #[error("seat {seat} is already bound to {what} {id}")]
    AlreadyBound {
        seat: String,
        what: &'static str,
        id: i32,
    },

    #[error("{what} {id} belongs to seat {found}, not {expected}")]
    SeatMismatch {
        what: &'static str,
        id: i32,
        expected: String,
        found: String,
    },

    #[error("device {device_id} offers nothing this seat can use")]
    UnsupportedDevice { device_id: i32 },
}

#[derive(Debug)]
pub struct Seat {
    seat_id: String,
    devices: BTreeMap<i32, DeviceInfo>,
    displays: BTreeSet<i32>,
    rel: RelEventHandler,
    key: KeyEventHandler,
    abs: AbsEventHandler,
}

impl Seat {
    pub fn new(seat_id: impl Into<String>, gestures: GestureConfig, gestures_enabled: bool) -> Self {
        let seat_id = seat_id.into();
        debug!(seat_id = %seat_id, "seat created");
        Self {
            seat_id,
            devices: BTreeMap::new(),
            displays: BTreeSet::new(),
            rel: RelEventHandler::new(),
            key: KeyEventHandler::new(),
            abs: AbsEventHandler::new(gestures, gestures_enabled),
        }
    }

    pub fn seat_id(&self) -> &str {
        &self.seat_id
    }

    pub fn device_ids(&self) -> Vec<i32> {
        self.devices.keys().copied().collect()
    }

    pub fn has_device(&self, device_id: i32) -> bool {
        self.devices.contains_key(&device_id)
    }

    pub fn display_ids(&self) -> Vec<i32> {
        self.displays.iter().copied().collect()
    }

    /// A seat with neither devices nor displays is destroyed by its manager.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty() && self.displays.is_empty()
    }

    pub fn cursor(&self) -> &RelEventHandler {
        &self.rel
    }

    pub fn keys(&self) -> &KeyEventHandler {
        &self.key
    }

    /// Binds a mouse, keyboard or touchpad.
    ///
    /// # Errors
    ///
    /// - [`BindError::SeatMismatch`] if the device names another seat.
    /// - [`BindError::AlreadyBound`] if the device is bound already.
    /// - [`BindError::UnsupportedDevice`] for devices of no seat class.
    pub fn bind_device(&mut self, info: &DeviceInfo) -> Result<(), BindError> {
        if info.seat_id != self.seat_id {
            return Err(BindError::SeatMismatch {
                what: "device",
                id: info.id,
                expected: self.seat_id.clone(),
                found: info.seat_id.clone(),
            });
        }
        if self.devices.contains_key(&info.id) {
            return Err(BindError::AlreadyBound {
                seat: self.seat_id.clone(),
                what: "device",
                id: info.id,
            });
        }
        if !info.capabilities.is_seat_class() {
            return Err(BindError::UnsupportedDevice { device_id: info.id });
        }
        info!(seat_id = %self.seat_id, device_id = info.id, capabilities = ?info.capabilities, "device bound to seat");
        self.devices.insert(info.id, info.clone());
        Ok(())
    }

    /// Unbinds a device, releasing every key and button it held and dropping
    /// its gesture chain.  Returns `false` if it was not bound.
    pub fn unbind_device(
        &mut self,
        device_id: i32,
        time: i64,
        topology: &WindowStateManager,
        dispatcher: &dyn EventDispatcher,
    ) -> bool {
        if self.devices.remove(&device_id).is_none() {
            return false;
        }
        self.rel.release_device(device_id, time, topology, dispatcher);
        self.key.release_device(device_id, time, dispatcher);
        self.abs.remove_device(device_id);
        info!(seat_id = %self.seat_id, device_id, "device unbound from seat");
        true
    }

    pub fn add_physical_display(&mut self, display_id: i32) {
        if self.displays.insert(display_id) {
            debug!(seat_id = %self.seat_id, display_id, "physical display joined seat");
        }
    }

    pub fn remove_physical_display(&mut self, display_id: i32) -> bool {
        let removed = self.displays.remove(&display_id);
        if removed {
            debug!(seat_id = %self.seat_id, display_id, "physical display left seat");
        }
        removed
    }

    /// Every seat sees every logical display change; the cursor may roam
    /// across all logical displays.
    pub fn on_display_change(&mut self, change: &DisplayChange, topology: &WindowStateManager) {
        self.rel.on_display_change(change, topology);
    }

    /// Handles one kernel event of a bound device.  Returns the gesture
    /// timers the touchpad chain asked for.
    pub fn on_input_event(
        &mut self,
        event: &KernelEvent,
        topology: &WindowStateManager,
        dispatcher: &dyn EventDispatcher,
    ) -> Vec<GestureTimer> {
        let device_id = event.device_id();
        let Some(is_touchpad) = self
            .devices
            .get(&device_id)
            .map(|device| device.has(DeviceCapabilities::TOUCHPAD))
        else {
            trace!(seat_id = %self.seat_id, device_id, "event from unbound device dropped");
            return Vec::new();
        };
        match event {
            KernelEvent::Rel(rel) => {
                self.rel.on_rel(rel, topology, dispatcher);
                Vec::new()
            }
            KernelEvent::Key(key) => {
                self.route_key(key, topology, dispatcher);
                Vec::new()
            }
            KernelEvent::Abs(abs) if is_touchpad => {
                let output = self.abs.on_abs(abs);
                for synthesized in &output.events {
                    match synthesized {
                        KernelEvent::Rel(rel) => self.rel.on_rel(rel, topology, dispatcher),
                        KernelEvent::Key(key) => self.route_key(key, topology, dispatcher),
                        KernelEvent::Abs(_) => {}
                    }
                }
                output
                    .timer
                    .map(|timer| GestureTimer {
                        device_id,
                        token: timer.token,
                        after: timer.after_ms,
                    })
                    .into_iter()
                    .collect()
            }
            KernelEvent::Abs(_) => {
                trace!(seat_id = %self.seat_id, device_id, "abs frame from non-touchpad dropped");
                Vec::new()
            }
        }
    }

    pub fn on_gesture_timeout(&mut self, device_id: i32, token: u64) {
        self.abs.on_timeout(device_id, token);
    }

    fn route_key(&mut self, key: &KernelKeyEvent, topology: &WindowStateManager, dispatcher: &dyn EventDispatcher) {
        if self.rel.on_button(key, topology, dispatcher) {
            return;
        }
        if codes::is_keyboard_key(key.key_code) {
            self.key.on_key(key, dispatcher);
        } else {
            trace!(device_id = key.device_id, key_code = key.key_code, "key code ignored");
        }
    }
}
