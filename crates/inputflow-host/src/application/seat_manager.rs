//! Groups devices and displays into seats and routes kernel events to them.
//!
//! # Two kinds of seat (for beginners)
//!
//! - A [`Seat`] is one user's pointer and keyboard: every mouse, keyboard and
//!   touchpad whose `seat_id` matches drives the same cursor and the same set
//!   of held keys.
//! - A [`TouchScreenSeat`] is one touch panel glued to one physical display.
//!   It is keyed by `(seat_id, seat_name)` because a single seat can own
//!   several panels.
//!
//! A device that is both a keyboard and a touchscreen is bound to both kinds
//! independently; if one binding fails the other still stands.  Seats appear
//! on their first device or display and are dropped once they hold neither.

use std::collections::BTreeMap;
use std::rc::Rc;

use inputflow_core::{
    DeviceCapabilities, DeviceInfo, DisplayChange, GestureConfig, KernelEvent, PhysicalDisplayState,
    WindowStateManager,
};
use tracing::{debug, trace, warn};

use super::dispatch::{EventDispatcher, GestureTimer};
use super::seat::Seat;
use super::touch_screen_seat::TouchScreenSeat;

type TouchSeatKey = (String, String);

pub struct SeatManager {
    dispatcher: Rc<dyn EventDispatcher>,
    gestures: GestureConfig,
    gestures_enabled: bool,
    seats: BTreeMap<String, Seat>,
    touch_seats: BTreeMap<TouchSeatKey, TouchScreenSeat>,
    /// Device id → seat id, for devices bound to a [`Seat`].
    seat_devices: BTreeMap<i32, String>,
    /// Device id → touch seat, for devices bound to a [`TouchScreenSeat`].
    touch_devices: BTreeMap<i32, TouchSeatKey>,
    /// Physical display id → the seat it was attached under.
    display_seats: BTreeMap<i32, TouchSeatKey>,
}

impl SeatManager {
    pub fn new(dispatcher: Rc<dyn EventDispatcher>, gestures: GestureConfig, gestures_enabled: bool) -> Self {
        Self {
            dispatcher,
            gestures,
            gestures_enabled,
            seats: BTreeMap::new(),
            touch_seats: BTreeMap::new(),
            seat_devices: BTreeMap::new(),
            touch_devices: BTreeMap::new(),
            display_seats: BTreeMap::new(),
        }
    }

    pub fn seat(&self, seat_id: &str) -> Option<&Seat> {
        self.seats.get(seat_id)
    }

    pub fn seat_ids(&self) -> Vec<String> {
        self.seats.keys().cloned().collect()
    }

    pub fn touch_seat(&self, seat_id: &str, seat_name: &str) -> Option<&TouchScreenSeat> {
        self.touch_seats
            .get(&(seat_id.to_string(), seat_name.to_string()))
    }

    pub fn touch_seat_count(&self) -> usize {
        self.touch_seats.len()
    }

    /// `true` if any seat of either kind holds the device.
    pub fn is_bound(&self, device_id: i32) -> bool {
        self.seat_devices.contains_key(&device_id) || self.touch_devices.contains_key(&device_id)
    }

    // ── Device lifecycle ──────────────────────────────────────────────────────

    /// Binds a freshly opened device to the seats its capabilities call for.
    /// Bind failures are logged; the device simply stays unbound there.
    pub fn on_device_added(&mut self, info: &DeviceInfo) {
        if info.capabilities.is_seat_class() {
            self.bind_to_seat(info);
        }
        if info.has(DeviceCapabilities::TOUCHSCREEN) {
            self.bind_to_touch_seat(info);
        }
        if !self.is_bound(info.id) {
            debug!(device_id = info.id, name = %info.name, "device not bound to any seat");
        }
    }

    /// Unbinds a device from every seat, releasing whatever it still held.
    pub fn on_device_removed(&mut self, device_id: i32, time: i64, topology: &mut WindowStateManager) {
        if let Some(seat_id) = self.seat_devices.remove(&device_id) {
            if let Some(seat) = self.seats.get_mut(&seat_id) {
                seat.unbind_device(device_id, time, topology, self.dispatcher.as_ref());
            }
            self.drop_seat_if_empty(&seat_id);
        }
        if let Some(key) = self.touch_devices.remove(&device_id) {
            if let Some(touch) = self.touch_seats.get_mut(&key) {
                touch.unbind_device(device_id, time, topology, self.dispatcher.as_ref());
            }
            self.drop_touch_seat_if_empty(&key);
        }
    }

    fn bind_to_seat(&mut self, info: &DeviceInfo) {
        let seat = self.seats.entry(info.seat_id.clone()).or_insert_with(|| {
            Seat::new(info.seat_id.clone(), self.gestures, self.gestures_enabled)
        });
        match seat.bind_device(info) {
            Ok(()) => {
                self.seat_devices.insert(info.id, info.seat_id.clone());
            }
            Err(e) => {
                warn!(device_id = info.id, seat_id = %info.seat_id, error = %e, "seat bind failed");
                self.drop_seat_if_empty(&info.seat_id);
            }
        }
    }

    fn bind_to_touch_seat(&mut self, info: &DeviceInfo) {
        let key = (info.seat_id.clone(), info.seat_name.clone());
        let touch = self
            .touch_seats
            .entry(key.clone())
            .or_insert_with(|| TouchScreenSeat::new(info.seat_id.clone(), info.seat_name.clone()));
        match touch.bind_device(info) {
            Ok(()) => {
                self.touch_devices.insert(info.id, key);
            }
            Err(e) => {
                warn!(
                    device_id = info.id,
                    seat_id = %info.seat_id,
                    seat_name = %info.seat_name,
                    error = %e,
                    "touch seat bind failed"
                );
                self.drop_touch_seat_if_empty(&key);
            }
        }
    }

    // ── Display lifecycle ─────────────────────────────────────────────────────

    /// Applies topology notifications in the order they were produced.
    /// `topology` must already reflect the update.
    pub fn on_display_changes(&mut self, changes: &[DisplayChange], topology: &WindowStateManager) {
        for change in changes {
            match change {
                DisplayChange::PhysicalAdded(display) => self.attach_display(display),
                DisplayChange::PhysicalRemoved(display) => self.detach_display(display.id),
                DisplayChange::PhysicalChanged(display) => {
                    let key = (display.seat_id.clone(), display.seat_name.clone());
                    if self.display_seats.get(&display.id) != Some(&key) {
                        self.detach_display(display.id);
                        self.attach_display(display);
                    }
                }
                DisplayChange::LogicalAdded(_)
                | DisplayChange::LogicalChanged(_)
                | DisplayChange::LogicalRemoved(_) => {
                    for seat in self.seats.values_mut() {
                        seat.on_display_change(change, topology);
                    }
                    for touch in self.touch_seats.values_mut() {
                        touch.on_display_change(change);
                    }
                }
                DisplayChange::WindowRemoved(_)
                | DisplayChange::WindowChanged { .. }
                | DisplayChange::WindowAdded(_) => {
                    trace!(?change, "window change ignored by seats");
                }
            }
        }
    }

    fn attach_display(&mut self, physical: &PhysicalDisplayState) {
        let display_id = physical.id;
        let key = (physical.seat_id.clone(), physical.seat_name.clone());
        self.seats
            .entry(physical.seat_id.clone())
            .or_insert_with(|| Seat::new(physical.seat_id.clone(), self.gestures, self.gestures_enabled))
            .add_physical_display(display_id);

        let touch = self
            .touch_seats
            .entry(key.clone())
            .or_insert_with(|| TouchScreenSeat::new(physical.seat_id.clone(), physical.seat_name.clone()));
        if let Err(e) = touch.bind_display(physical) {
            warn!(display_id, error = %e, "touch seat display bind failed");
            self.drop_touch_seat_if_empty(&key);
        }
        self.display_seats.insert(display_id, key);
    }

    fn detach_display(&mut self, display_id: i32) {
        let Some(key) = self.display_seats.remove(&display_id) else {
            return;
        };
        if let Some(seat) = self.seats.get_mut(&key.0) {
            seat.remove_physical_display(display_id);
        }
        self.drop_seat_if_empty(&key.0);
        if let Some(touch) = self.touch_seats.get_mut(&key) {
            touch.unbind_display(display_id);
        }
        self.drop_touch_seat_if_empty(&key);
    }

    // ── Events ────────────────────────────────────────────────────────────────

    /// Routes one kernel event to the seat that owns its device.
    ///
    /// Touchscreen frames go to the [`TouchScreenSeat`]; everything else,
    /// touchpad frames included, goes to the [`Seat`].  Returns the gesture
    /// timers the runtime has to schedule.
    pub fn on_kernel_event(&mut self, event: &KernelEvent, topology: &mut WindowStateManager) -> Vec<GestureTimer> {
        let device_id = event.device_id();
        if let KernelEvent::Abs(abs) = event {
            if let Some(key) = self.touch_devices.get(&device_id) {
                if let Some(touch) = self.touch_seats.get_mut(key) {
                    touch.on_input_event(abs, topology, self.dispatcher.as_ref());
                }
                return Vec::new();
            }
        }
        match self
            .seat_devices
            .get(&device_id)
            .and_then(|seat_id| self.seats.get_mut(seat_id))
        {
            Some(seat) => seat.on_input_event(event, topology, self.dispatcher.as_ref()),
            None => {
                trace!(device_id, "event from device without a seat dropped");
                Vec::new()
            }
        }
    }

    /// Delivers an expired gesture timer.  Tokens the chain no longer waits
    /// for are ignored there.
    pub fn on_gesture_timeout(&mut self, device_id: i32, token: u64) {
        if let Some(seat) = self
            .seat_devices
            .get(&device_id)
            .and_then(|seat_id| self.seats.get_mut(seat_id))
        {
            seat.on_gesture_timeout(device_id, token);
        }
    }

    fn drop_seat_if_empty(&mut self, seat_id: &str) {
        if self.seats.get(seat_id).is_some_and(Seat::is_empty) {
            self.seats.remove(seat_id);
            debug!(seat_id, "seat destroyed");
        }
    }

    fn drop_touch_seat_if_empty(&mut self, key: &TouchSeatKey) {
        if self.touch_seats.get(key).is_some_and(TouchScreenSeat::is_empty) {
            self.touch_seats.remove(key);
            debug!(seat_id = %key.0, seat_name = %key.1, "touch seat destroyed");
        }
    }
}

impl std::fmt::Debug for SeatManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeatManager")
            .field("seats", &self.seats.keys().collect::<Vec<_>>())
            .field("touch_seats", &self.touch_seats.keys().collect::<Vec<_>>())
            .field("seat_devices", &self.seat_devices)
            .field("touch_devices", &self.touch_devices)
            .finish_non_exhaustive()
    }
}
