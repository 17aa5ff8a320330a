//! A touch panel and the physical display it is glued to.
//!
//! A `TouchScreenSeat` is keyed by `(seat_id, seat_name)` and binds at most
//! one touchscreen device and one physical display.  Every contact goes
//! through the same coordinate pipeline:
//!
//! ```text
//! panel units ──normalize──▶ physical display (logical units)
//!             ──chain walk──▶ physical global
//!             ──rect scan───▶ logical display + local coordinates
//! ```
//!
//! The logical display picked on `Down` is remembered per contact and used
//! for its `Move`s and its `Up`, so a finger that slides across a display
//! border stays with the display it started on.

use std::collections::BTreeMap;

use inputflow_core::kernel::codes;
use inputflow_core::{
    AbsAction, AbsEvent, Contact, DeviceInfo, DispatchedEvent, DisplayChange,
    PhysicalDisplayState, WindowStateManager,
};
use tracing::{debug, info, trace, warn};

use super::dispatch::EventDispatcher;
use super::seat::BindError;

#[derive(Debug)]
pub struct TouchScreenSeat {
    seat_id: String,
    seat_name: String,
    device: Option<DeviceInfo>,
    display_id: Option<i32>,
    /// (device id, kernel pointer id) → logical display chosen on down.
    targets: BTreeMap<(i32, i32), i32>,
}

impl TouchScreenSeat {
    pub fn new(seat_id: impl Into<String>, seat_name: impl Into<String>) -> Self {
        let seat = Self {
            seat_id: seat_id.into(),
            seat_name: seat_name.into(),
            device: None,
            display_id: None,
            targets: BTreeMap::new(),
        };
        debug!(seat_id = %seat.seat_id, seat_name = %seat.seat_name, "touch seat created");
        seat
    }

    pub fn device_id(&self) -> Option<i32> {
        self.device.as_ref().map(|d| d.id)
    }

    pub fn display_id(&self) -> Option<i32> {
        self.display_id
    }

    pub fn is_empty(&self) -> bool {
        self.device.is_none() && self.display_id.is_none()
    }

    /// Contacts whose target display is cached.
    pub fn tracked_contacts(&self) -> usize {
        self.targets.len()
    }

    /// Binds a touchscreen.
    ///
    /// # Errors
    ///
    /// - [`BindError::SeatMismatch`] if the device names another seat.
    /// - [`BindError::AlreadyBound`] if a device is bound already.
    /// - [`BindError::DegenerateAxis`] if the multi-touch X or Y axis is
    ///   missing or has `minimum >= maximum`.
    pub fn bind_device(&mut self, info: &DeviceInfo) -> Result<(), BindError> {
        if info.seat_id != self.seat_id || info.seat_name != self.seat_name {
            return Err(BindError::SeatMismatch {
                what: "device",
                id: info.id,
                expected: format!("{}/{}", self.seat_id, self.seat_name),
                found: format!("{}/{}", info.seat_id, info.seat_name),
            });
        }
        if let Some(bound) = &self.device {
            return Err(BindError::AlreadyBound {
                seat: format!("{}/{}", self.seat_id, self.seat_name),
                what: "device",
                id: bound.id,
            });
        }
        for axis in [codes::ABS_MT_POSITION_X, codes::ABS_MT_POSITION_Y] {
            if info.axis(axis).map_or(true, |a| a.is_degenerate()) {
                return Err(BindError::DegenerateAxis {
                    device_id: info.id,
                    axis,
                });
            }
        }
        info!(seat_id = %self.seat_id, seat_name = %self.seat_name, device_id = info.id, "touchscreen bound");
        self.device = Some(info.clone());
        Ok(())
    }

    /// Unbinds the device, cancelling its contacts on every logical display.
    /// Returns `false` if `device_id` was not the bound device.
    pub fn unbind_device(
        &mut self,
        device_id: i32,
        time: i64,
        topology: &mut WindowStateManager,
        dispatcher: &dyn EventDispatcher,
    ) -> bool {
        if self.device_id() != Some(device_id) {
            return false;
        }
        self.device = None;
        self.targets.retain(|&(dev, _), _| dev != device_id);
        for display in topology.logical_displays_mut() {
            if let Some(cancel) = display.cancel_device(device_id, time) {
                dispatcher.dispatch(DispatchedEvent::Pointer(cancel));
            }
        }
        info!(seat_id = %self.seat_id, seat_name = %self.seat_name, device_id, "touchscreen unbound");
        true
    }

    /// Binds the physical display the panel covers.
    ///
    /// # Errors
    ///
    /// - [`BindError::SeatMismatch`] if the display names another seat.
    /// - [`BindError::AlreadyBound`] if another display is bound.
    pub fn bind_display(&mut self, display: &PhysicalDisplayState) -> Result<(), BindError> {
        if display.seat_id != self.seat_id || display.seat_name != self.seat_name {
            return Err(BindError::SeatMismatch {
                what: "physical display",
                id: display.id,
                expected: format!("{}/{}", self.seat_id, self.seat_name),
                found: format!("{}/{}", display.seat_id, display.seat_name),
            });
        }
        match self.display_id {
            Some(bound) if bound != display.id => Err(BindError::AlreadyBound {
                seat: format!("{}/{}", self.seat_id, self.seat_name),
                what: "physical display",
                id: bound,
            }),
            _ => {
                let display_id = display.id;
                self.display_id = Some(display_id);
                debug!(seat_id = %self.seat_id, seat_name = %self.seat_name, display_id, "touch display bound");
                Ok(())
            }
        }
    }

    pub fn unbind_display(&mut self, display_id: i32) -> bool {
        if self.display_id != Some(display_id) {
            return false;
        }
        self.display_id = None;
        debug!(seat_id = %self.seat_id, seat_name = %self.seat_name, display_id, "touch display unbound");
        true
    }

    /// Forgets cached targets on logical displays that went away.
    pub fn on_display_change(&mut self, change: &DisplayChange) {
        if let DisplayChange::LogicalRemoved(removed) = change {
            let display_id = removed.id;
            let before = self.targets.len();
            self.targets.retain(|_, &mut target| target != display_id);
            let purged = before - self.targets.len();
            if purged > 0 {
                debug!(display_id, purged, "touch targets on removed display dropped");
            }
        }
    }

    /// Runs every contact change of a frame through the coordinate pipeline
    /// and dispatches the resulting touchscreen events.
    pub fn on_input_event(
        &mut self,
        abs: &AbsEvent,
        topology: &mut WindowStateManager,
        dispatcher: &dyn EventDispatcher,
    ) {
        let Some(device) = self.device.as_ref().filter(|d| d.id == abs.device_id) else {
            trace!(device_id = abs.device_id, "frame from unbound touchscreen dropped");
            return;
        };
        let (Some(x_axis), Some(y_axis)) = (
            device.axis(codes::ABS_MT_POSITION_X).copied(),
            device.axis(codes::ABS_MT_POSITION_Y).copied(),
        ) else {
            return;
        };
        let Some(physical) = self.display_id.and_then(|id| topology.physical_display(id)).cloned() else {
            warn!(seat_id = %self.seat_id, seat_name = %self.seat_name, "touch frame without a bound display dropped");
            return;
        };

        for (pointer_id, action) in abs.changes() {
            let Some(pointer) = abs.pointer(pointer_id) else {
                continue;
            };
            let key = (abs.device_id, pointer_id);
            let cached = match action {
                AbsAction::Up => self.targets.remove(&key),
                AbsAction::Down | AbsAction::Move => self.targets.get(&key).copied(),
            };
            if action == AbsAction::Down {
                if let Some(previous) = cached {
                    // The kernel reused the slot without lifting the old contact.
                    self.targets.remove(&key);
                    Self::release_replaced(previous, key, abs.time, topology, dispatcher);
                }
            }

            let px = x_axis.normalize(pointer.x, physical.logical_width);
            let py = y_axis.normalize(pointer.y, physical.logical_height);
            let (global_x, global_y) = match topology.physical_to_global(physical.id, px, py) {
                Ok(global) => global,
                Err(e) => {
                    warn!(display_id = physical.id, error = %e, "touch coordinate transform failed");
                    continue;
                }
            };

            let target = match (action, cached) {
                (AbsAction::Down, _) => match topology.global_to_logical(global_x, global_y) {
                    Some((logical_id, _, _)) => {
                        self.targets.insert(key, logical_id);
                        logical_id
                    }
                    None => {
                        warn!(global_x, global_y, "touch down outside every logical display dropped");
                        continue;
                    }
                },
                (AbsAction::Move | AbsAction::Up, Some(logical_id)) => logical_id,
                (AbsAction::Move | AbsAction::Up, None) => {
                    warn!(
                        device_id = abs.device_id,
                        pointer_id,
                        ?action,
                        "touch contact without a down dropped"
                    );
                    continue;
                }
            };

            let Some(logical) = topology.logical_display_mut(target) else {
                warn!(display_id = target, "touch target display vanished");
                self.targets.remove(&key);
                continue;
            };
            let contact = Contact {
                device_id: abs.device_id,
                kernel_pointer_id: pointer_id,
                action,
                global_x,
                global_y,
                time: abs.time,
            };
            match logical.handle_contact(contact) {
                Some(event) => dispatcher.dispatch(DispatchedEvent::Pointer(event)),
                None => warn!(display_id = target, pointer_id, ?action, "display rejected touch contact"),
            }
        }
    }

    fn release_replaced(
        display_id: i32,
        (device_id, pointer_id): (i32, i32),
        time: i64,
        topology: &mut WindowStateManager,
        dispatcher: &dyn EventDispatcher,
    ) {
        warn!(device_id, pointer_id, display_id, "touch contact replaced without a lift, releasing it");
        let released = topology
            .logical_display_mut(display_id)
            .and_then(|logical| logical.release_contact(device_id, pointer_id, time));
        if let Some(event) = released {
            dispatcher.dispatch(DispatchedEvent::Pointer(event));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatch::RecordingDispatcher;
    use inputflow_core::{
        AbsPointer, AxisInfo, DeviceCapabilities, LogicalDisplay, PointerAction, Rect,
    };

    fn panel(id: i32, max: i32) -> DeviceInfo {
        let mut info = DeviceInfo {
            id,
            name: "panel".to_string(),
            seat_id: "seat0".to_string(),
            seat_name: "front".to_string(),
            capabilities: DeviceCapabilities::TOUCHSCREEN,
            ..DeviceInfo::default()
        };
        for axis in [codes::ABS_MT_POSITION_X, codes::ABS_MT_POSITION_Y] {
            info.axes.insert(
                axis,
                AxisInfo {
                    axis,
                    minimum: 0,
                    maximum: max,
                    ..AxisInfo::default()
                },
            );
        }
        info
    }

    /// One 200x100 physical display split into two logical displays.
    fn topology() -> WindowStateManager {
        let mut topology = WindowStateManager::new();
        topology
            .update_display_info(
                vec![PhysicalDisplayState::new(0, 200, 100).with_seat("seat0", "front")],
                vec![
                    LogicalDisplay::new(1, Rect::new(0, 0, 100, 100)),
                    LogicalDisplay::new(2, Rect::new(100, 0, 100, 100)),
                ],
            )
            .unwrap();
        topology
    }

    fn bound_seat(topology: &WindowStateManager) -> TouchScreenSeat {
        let mut seat = TouchScreenSeat::new("seat0", "front");
        seat.bind_device(&panel(5, 2000)).unwrap();
        seat.bind_display(topology.physical_display(0).unwrap()).unwrap();
        seat
    }

    fn frame(time: i64, slot: i32, x: i32, y: i32, change: AbsAction) -> AbsEvent {
        let pointer = AbsPointer {
            id: slot,
            tracking_id: slot + 10,
            x,
            y,
            released: change == AbsAction::Up,
            change: Some(change),
            ..AbsPointer::default()
        };
        AbsEvent::from_pointers(5, time, [(slot, pointer)].into_iter().collect()).unwrap()
    }

    #[test]
    fn test_bind_device_rejects_degenerate_axis() {
        let mut seat = TouchScreenSeat::new("seat0", "front");
        let mut info = panel(5, 2000);
        if let Some(y) = info.axes.get_mut(&codes::ABS_MT_POSITION_Y) {
            y.maximum = 0;
        }

        let result = seat.bind_device(&info);

        assert_eq!(
            result,
            Err(BindError::DegenerateAxis {
                device_id: 5,
                axis: codes::ABS_MT_POSITION_Y
            })
        );
        assert!(seat.is_empty());
    }

    #[test]
    fn test_bind_rejects_second_device_and_foreign_display() {
        let mut seat = TouchScreenSeat::new("seat0", "front");
        seat.bind_device(&panel(5, 2000)).unwrap();

        let second = seat.bind_device(&panel(6, 2000));
        let foreign = seat.bind_display(&PhysicalDisplayState::new(3, 10, 10).with_seat("seat0", "rear"));

        assert!(matches!(second, Err(BindError::AlreadyBound { id: 5, .. })));
        assert!(matches!(foreign, Err(BindError::SeatMismatch { id: 3, .. })));
    }

    #[test]
    fn test_down_resolves_logical_display_and_local_coordinates() {
        // Arrange
        let mut topology = topology();
        let dispatcher = RecordingDispatcher::new();
        let mut seat = bound_seat(&topology);

        // Act: 1500/2000 of 200 wide is x=150, 1000/2000 of 100 high is y=50.
        seat.on_input_event(&frame(10, 0, 1500, 1000, AbsAction::Down), &mut topology, &dispatcher);

        // Assert
        let events = dispatcher.pointer_events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.action(), PointerAction::Down);
        assert_eq!(event.header.target_display_id, 2);
        let item = event.pointer_item(event.pointer_id()).unwrap();
        assert_eq!((item.global_x, item.global_y), (150, 50));
        assert_eq!((item.local_x, item.local_y), (50, 50));
        assert_eq!(seat.tracked_contacts(), 1);
    }

    #[test]
    fn test_contact_stays_on_display_it_started_on() {
        // Arrange
        let mut topology = topology();
        let dispatcher = RecordingDispatcher::new();
        let mut seat = bound_seat(&topology);
        seat.on_input_event(&frame(10, 0, 900, 1000, AbsAction::Down), &mut topology, &dispatcher);

        // Act: slide from x=90 (display 1) to x=120 (inside display 2), then lift.
        seat.on_input_event(&frame(20, 0, 1200, 1000, AbsAction::Move), &mut topology, &dispatcher);
        seat.on_input_event(&frame(30, 0, 1200, 1000, AbsAction::Up), &mut topology, &dispatcher);

        // Assert
        let events = dispatcher.pointer_events();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.header.target_display_id == 1));
        let moved = events[1].pointer_item(events[1].pointer_id()).unwrap();
        assert_eq!(moved.local_x, 120);
        assert_eq!(events[2].action(), PointerAction::Up);
        assert_eq!(seat.tracked_contacts(), 0);
    }

    #[test]
    fn test_move_without_down_is_dropped() {
        let mut topology = topology();
        let dispatcher = RecordingDispatcher::new();
        let mut seat = bound_seat(&topology);

        seat.on_input_event(&frame(10, 3, 100, 100, AbsAction::Move), &mut topology, &dispatcher);

        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_frame_without_bound_display_is_dropped() {
        let mut topology = topology();
        let dispatcher = RecordingDispatcher::new();
        let mut seat = TouchScreenSeat::new("seat0", "front");
        seat.bind_device(&panel(5, 2000)).unwrap();

        seat.on_input_event(&frame(10, 0, 100, 100, AbsAction::Down), &mut topology, &dispatcher);

        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_unbind_device_cancels_active_contacts() {
        // Arrange
        let mut topology = topology();
        let dispatcher = RecordingDispatcher::new();
        let mut seat = bound_seat(&topology);
        seat.on_input_event(&frame(10, 0, 100, 100, AbsAction::Down), &mut topology, &dispatcher);
        dispatcher.take();

        // Act
        let unbound = seat.unbind_device(5, 40, &mut topology, &dispatcher);

        // Assert
        assert!(unbound);
        let events = dispatcher.pointer_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action(), PointerAction::Cancel);
        assert_eq!(seat.tracked_contacts(), 0);
        assert_eq!(topology.logical_display(1).unwrap().active_contact_count(), 0);
    }

    #[test]
    fn test_logical_removal_purges_cached_targets() {
        let mut topology = topology();
        let dispatcher = RecordingDispatcher::new();
        let mut seat = bound_seat(&topology);
        seat.on_input_event(&frame(10, 0, 100, 100, AbsAction::Down), &mut topology, &dispatcher);

        seat.on_display_change(&DisplayChange::LogicalRemoved(LogicalDisplay::new(
            1,
            Rect::new(0, 0, 100, 100),
        )));

        assert_eq!(seat.tracked_contacts(), 0);
    }

    #[test]
    fn test_replaced_contact_is_released_on_its_old_display() {
        // Arrange: a contact lands on display 1
        let mut topology = topology();
        let dispatcher = RecordingDispatcher::new();
        let mut seat = bound_seat(&topology);
        seat.on_input_event(&frame(10, 0, 500, 1000, AbsAction::Down), &mut topology, &dispatcher);

        // Act: the same slot reports a new contact on display 2, then lifts
        seat.on_input_event(&frame(20, 0, 1500, 1000, AbsAction::Down), &mut topology, &dispatcher);
        seat.on_input_event(&frame(30, 0, 1500, 1000, AbsAction::Up), &mut topology, &dispatcher);

        // Assert
        let actions: Vec<(i32, PointerAction)> = dispatcher
            .pointer_events()
            .iter()
            .map(|e| (e.header.target_display_id, e.action()))
            .collect();
        assert_eq!(
            actions,
            vec![
                (1, PointerAction::Down),
                (1, PointerAction::Up),
                (2, PointerAction::Down),
                (2, PointerAction::Up),
            ]
        );
        assert_eq!(topology.logical_display(1).unwrap().active_contact_count(), 0);
        assert_eq!(topology.logical_display(2).unwrap().active_contact_count(), 0);
        assert_eq!(seat.tracked_contacts(), 0);
    }

    #[test]
    fn test_up_evicts_cached_target_when_target_display_is_gone() {
        // Arrange: the contact's display disappears without a notification
        let mut topology = topology();
        let dispatcher = RecordingDispatcher::new();
        let mut seat = bound_seat(&topology);
        seat.on_input_event(&frame(10, 0, 500, 1000, AbsAction::Down), &mut topology, &dispatcher);
        topology
            .update_display_info(
                vec![PhysicalDisplayState::new(0, 200, 100).with_seat("seat0", "front")],
                vec![LogicalDisplay::new(2, Rect::new(100, 0, 100, 100))],
            )
            .unwrap();
        dispatcher.take();

        // Act
        seat.on_input_event(&frame(20, 0, 500, 1000, AbsAction::Up), &mut topology, &dispatcher);

        // Assert
        assert!(dispatcher.is_empty());
        assert_eq!(seat.tracked_contacts(), 0);
    }
}
