//! Per-device accumulators that turn raw records into kernel-level events.
//!
//! Each collector follows the same contract: `handle_*` folds one record into
//! the pending frame without emitting anything, and `sync` (called on the
//! `SYN_REPORT` barrier) hands back the finished frame and resets the pending
//! state in one step.  Nothing is emitted for a frame that changed nothing.

use std::collections::BTreeMap;

use tracing::{trace, warn};

use super::codes;
use super::events::{AbsAction, AbsEvent, AbsPointer, KernelEvent, KernelKeyEvent, KeyState, RelEvent};
use super::RawEvent;

// ── Rel ───────────────────────────────────────────────────────────────────────

/// Sums `REL_*` deltas until the barrier.
#[derive(Debug, Clone)]
pub struct RelEventCollector {
    pending: RelEvent,
}

impl RelEventCollector {
    pub fn new(device_id: i32) -> Self {
        Self {
            pending: RelEvent {
                device_id,
                ..RelEvent::default()
            },
        }
    }

    pub fn handle_rel(&mut self, code: u16, value: i32) {
        let target = match code {
            codes::REL_X => &mut self.pending.dx,
            codes::REL_Y => &mut self.pending.dy,
            codes::REL_WHEEL => &mut self.pending.wheel_vertical,
            codes::REL_HWHEEL => &mut self.pending.wheel_horizontal,
            _ => {
                trace!(code, value, "ignoring relative axis");
                return;
            }
        };
        *target = target.saturating_add(value);
    }

    /// Flushes the frame; `None` if it carried no motion and no wheel.
    pub fn sync(&mut self, time: i64) -> Option<RelEvent> {
        let device_id = self.pending.device_id;
        let mut event = std::mem::replace(
            &mut self.pending,
            RelEvent {
                device_id,
                ..RelEvent::default()
            },
        );
        if event.is_empty() {
            return None;
        }
        event.time = time;
        Some(event)
    }

    /// Throws the pending frame away.
    pub fn discard(&mut self) {
        let _ = self.sync(0);
    }
}

// ── Key ───────────────────────────────────────────────────────────────────────

/// Queues `EV_KEY` transitions until the barrier.
#[derive(Debug, Clone)]
pub struct KeyEventCollector {
    device_id: i32,
    pending: Vec<KernelKeyEvent>,
}

impl KeyEventCollector {
    pub fn new(device_id: i32) -> Self {
        Self {
            device_id,
            pending: Vec::new(),
        }
    }

    pub fn handle_key(&mut self, code: u16, value: i32, time: i64) {
        match KeyState::from_value(value) {
            Some(state) => self
                .pending
                .push(KernelKeyEvent::new(self.device_id, time, code, state)),
            None => warn!(
                device_id = self.device_id,
                code, value, "unexpected key value, dropping"
            ),
        }
    }

    /// Flushes every queued transition in arrival order.
    pub fn sync(&mut self) -> Vec<KernelKeyEvent> {
        std::mem::take(&mut self.pending)
    }

    pub fn discard(&mut self) {
        self.pending.clear();
    }
}

// ── Abs ───────────────────────────────────────────────────────────────────────

/// Tracks multi-touch slots (protocol B) across frames.
///
/// Contact state persists between barriers; only the per-frame `change`
/// markers are reset by [`sync`](Self::sync).  A contact released in a frame
/// appears once more (flagged `released`) in that frame's snapshot and is
/// dropped afterwards.
#[derive(Debug, Clone)]
pub struct AbsEventCollector {
    device_id: i32,
    current_slot: i32,
    slots: BTreeMap<i32, AbsPointer>,
}

impl AbsEventCollector {
    pub fn new(device_id: i32) -> Self {
        Self {
            device_id,
            current_slot: 0,
            slots: BTreeMap::new(),
        }
    }

    pub fn handle_abs(&mut self, code: u16, value: i32, time: i64) {
        match code {
            codes::ABS_MT_SLOT => self.select_slot(value),
            codes::ABS_MT_TRACKING_ID => self.handle_tracking_id(value, time),
            codes::ABS_MT_POSITION_X
            | codes::ABS_MT_POSITION_Y
            | codes::ABS_MT_PRESSURE
            | codes::ABS_MT_TOUCH_MAJOR => self.handle_position(code, value),
            _ => trace!(code, value, "ignoring absolute axis"),
        }
    }

    /// Flushes the frame; `None` if no contact changed.
    pub fn sync(&mut self, time: i64) -> Option<AbsEvent> {
        let event = AbsEvent::from_pointers(self.device_id, time, self.slots.clone());
        self.slots.retain(|_, p| !p.released);
        for pointer in self.slots.values_mut() {
            pointer.change = None;
        }
        event
    }

    /// Contacts currently down.
    pub fn live_pointer_count(&self) -> usize {
        self.slots.values().filter(|p| !p.released).count()
    }

    fn select_slot(&mut self, slot: i32) {
        if slot < 0 {
            warn!(device_id = self.device_id, slot, "negative slot index, ignoring");
            return;
        }
        self.current_slot = slot;
    }

    fn handle_tracking_id(&mut self, tracking_id: i32, time: i64) {
        let slot = self.current_slot;
        if tracking_id == codes::TRACKING_ID_RELEASED {
            let Some(pointer) = self.slots.get_mut(&slot) else {
                trace!(device_id = self.device_id, slot, "release on empty slot");
                return;
            };
            if pointer.change == Some(AbsAction::Down) {
                // Down and up inside one frame: nobody ever saw the contact.
                self.slots.remove(&slot);
                return;
            }
            pointer.released = true;
            pointer.change = Some(AbsAction::Up);
            return;
        }

        if let Some(existing) = self.slots.get(&slot) {
            if existing.tracking_id == tracking_id && !existing.released {
                return;
            }
            if !existing.released {
                warn!(
                    device_id = self.device_id,
                    slot,
                    old = existing.tracking_id,
                    new = tracking_id,
                    "tracking id replaced without release, treating as new contact"
                );
            }
        }
        self.slots.insert(
            slot,
            AbsPointer {
                id: slot,
                tracking_id,
                down_time: time,
                change: Some(AbsAction::Down),
                ..AbsPointer::default()
            },
        );
    }

    fn handle_position(&mut self, code: u16, value: i32) {
        let Some(pointer) = self.slots.get_mut(&self.current_slot) else {
            return;
        };
        if pointer.released {
            return;
        }
        match code {
            codes::ABS_MT_POSITION_X => pointer.x = value,
            codes::ABS_MT_POSITION_Y => pointer.y = value,
            codes::ABS_MT_PRESSURE => pointer.pressure = value,
            _ => pointer.touch_major = value,
        }
        if pointer.change.is_none() {
            pointer.change = Some(AbsAction::Move);
        }
    }
}

// ── Device collectors ─────────────────────────────────────────────────────────

/// The three collectors of one device plus `SYN_DROPPED` recovery.
#[derive(Debug, Clone)]
pub struct DeviceCollectors {
    device_id: i32,
    rel: RelEventCollector,
    key: KeyEventCollector,
    abs: AbsEventCollector,
    dropping: bool,
}

impl DeviceCollectors {
    pub fn new(device_id: i32) -> Self {
        Self {
            device_id,
            rel: RelEventCollector::new(device_id),
            key: KeyEventCollector::new(device_id),
            abs: AbsEventCollector::new(device_id),
            dropping: false,
        }
    }

    /// Feeds one raw record; returns the events completed by it (only a
    /// `SYN_REPORT` completes anything).  Order within a frame: relative
    /// motion, then keys, then touch.
    pub fn process(&mut self, raw: &RawEvent) -> Vec<KernelEvent> {
        if self.dropping {
            if raw.event_type == codes::EV_SYN && raw.code == codes::SYN_REPORT {
                self.dropping = false;
            }
            return Vec::new();
        }
        match raw.event_type {
            codes::EV_SYN => self.handle_sync(raw),
            codes::EV_KEY => {
                self.key.handle_key(raw.code, raw.value, raw.time);
                Vec::new()
            }
            codes::EV_REL => {
                self.rel.handle_rel(raw.code, raw.value);
                Vec::new()
            }
            codes::EV_ABS => {
                self.abs.handle_abs(raw.code, raw.value, raw.time);
                Vec::new()
            }
            codes::EV_MSC => Vec::new(),
            other => {
                trace!(device_id = self.device_id, event_type = other, "unhandled event type");
                Vec::new()
            }
        }
    }

    pub fn live_pointer_count(&self) -> usize {
        self.abs.live_pointer_count()
    }

    fn handle_sync(&mut self, raw: &RawEvent) -> Vec<KernelEvent> {
        match raw.code {
            codes::SYN_REPORT => {
                let mut out = Vec::new();
                if let Some(rel) = self.rel.sync(raw.time) {
                    out.push(KernelEvent::Rel(rel));
                }
                out.extend(self.key.sync().into_iter().map(KernelEvent::Key));
                if let Some(abs) = self.abs.sync(raw.time) {
                    out.push(KernelEvent::Abs(abs));
                }
                out
            }
            codes::SYN_DROPPED => {
                warn!(device_id = self.device_id, "kernel buffer overrun, dropping frame");
                self.rel.discard();
                self.key.discard();
                self.dropping = true;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEV: i32 = 7;

    fn abs(code: u16, value: i32) -> RawEvent {
        RawEvent::new(10, codes::EV_ABS, code, value)
    }

    fn feed(collectors: &mut DeviceCollectors, records: &[RawEvent]) -> Vec<KernelEvent> {
        records.iter().flat_map(|r| collectors.process(r)).collect()
    }

    #[test]
    fn test_rel_sync_returns_none_when_frame_is_empty() {
        let mut rel = RelEventCollector::new(DEV);
        assert!(rel.sync(1).is_none());
    }

    #[test]
    fn test_rel_sync_sums_deltas_and_resets() {
        // Arrange
        let mut rel = RelEventCollector::new(DEV);
        rel.handle_rel(codes::REL_X, 3);
        rel.handle_rel(codes::REL_X, 2);
        rel.handle_rel(codes::REL_Y, -4);
        rel.handle_rel(codes::REL_WHEEL, 1);

        // Act
        let event = rel.sync(42).unwrap();

        // Assert
        assert_eq!((event.dx, event.dy, event.wheel_vertical), (5, -4, 1));
        assert_eq!(event.time, 42);
        assert_eq!(event.device_id, DEV);
        assert!(rel.sync(43).is_none(), "second sync must see a reset accumulator");
    }

    #[test]
    fn test_key_sync_flushes_all_keys_in_order() {
        let mut key = KeyEventCollector::new(DEV);
        key.handle_key(codes::BTN_LEFT, 1, 5);
        key.handle_key(codes::BTN_RIGHT, 0, 5);
        key.handle_key(30, 2, 5);

        let events = key.sync();

        let states: Vec<_> = events.iter().map(|e| (e.key_code, e.state)).collect();
        assert_eq!(
            states,
            vec![
                (codes::BTN_LEFT, KeyState::Down),
                (codes::BTN_RIGHT, KeyState::Up),
                (30, KeyState::Down),
            ]
        );
        assert!(key.sync().is_empty());
    }

    #[test]
    fn test_abs_tracking_id_on_empty_slot_yields_down() {
        // Arrange
        let mut abs_c = AbsEventCollector::new(DEV);

        // Act
        abs_c.handle_abs(codes::ABS_MT_SLOT, 0, 1);
        abs_c.handle_abs(codes::ABS_MT_TRACKING_ID, 55, 1);
        abs_c.handle_abs(codes::ABS_MT_POSITION_X, 100, 1);
        abs_c.handle_abs(codes::ABS_MT_POSITION_Y, 200, 1);
        let event = abs_c.sync(1).unwrap();

        // Assert
        assert_eq!(event.action(), AbsAction::Down);
        assert_eq!(event.pointer_id(), 0);
        let p = event.pointer(0).unwrap();
        assert_eq!((p.x, p.y, p.tracking_id), (100, 200, 55));
        assert_eq!(abs_c.live_pointer_count(), 1);
    }

    #[test]
    fn test_abs_position_change_yields_move_on_next_frame() {
        let mut abs_c = AbsEventCollector::new(DEV);
        abs_c.handle_abs(codes::ABS_MT_TRACKING_ID, 1, 1);
        abs_c.sync(1);

        abs_c.handle_abs(codes::ABS_MT_POSITION_X, 9, 2);
        let event = abs_c.sync(2).unwrap();

        assert_eq!(event.action(), AbsAction::Move);
        assert_eq!(event.pointer(0).unwrap().x, 9);
    }

    #[test]
    fn test_abs_release_of_one_contact_yields_up_while_others_remain() {
        // Arrange: two contacts down
        let mut abs_c = AbsEventCollector::new(DEV);
        abs_c.handle_abs(codes::ABS_MT_SLOT, 0, 1);
        abs_c.handle_abs(codes::ABS_MT_TRACKING_ID, 10, 1);
        abs_c.handle_abs(codes::ABS_MT_SLOT, 1, 1);
        abs_c.handle_abs(codes::ABS_MT_TRACKING_ID, 11, 1);
        abs_c.sync(1);

        // Act: lift slot 0
        abs_c.handle_abs(codes::ABS_MT_SLOT, 0, 2);
        abs_c.handle_abs(codes::ABS_MT_TRACKING_ID, -1, 2);
        let event = abs_c.sync(2).unwrap();

        // Assert
        assert_eq!(event.action(), AbsAction::Up);
        assert_eq!(event.pointer_id(), 0);
        assert!(event.pointer(0).unwrap().released);
        assert_eq!(event.live_pointer_count(), 1);
        assert_eq!(abs_c.live_pointer_count(), 1);
    }

    #[test]
    fn test_abs_position_for_empty_slot_is_ignored() {
        let mut abs_c = AbsEventCollector::new(DEV);
        abs_c.handle_abs(codes::ABS_MT_SLOT, 3, 1);
        abs_c.handle_abs(codes::ABS_MT_POSITION_X, 100, 1);
        assert!(abs_c.sync(1).is_none());
        assert_eq!(abs_c.live_pointer_count(), 0);
    }

    #[test]
    fn test_abs_tracking_id_replacement_without_release_is_treated_as_down() {
        let mut abs_c = AbsEventCollector::new(DEV);
        abs_c.handle_abs(codes::ABS_MT_TRACKING_ID, 1, 1);
        abs_c.sync(1);

        abs_c.handle_abs(codes::ABS_MT_TRACKING_ID, 2, 2);
        let event = abs_c.sync(2).unwrap();

        assert_eq!(event.action(), AbsAction::Down);
        assert_eq!(event.pointer(0).unwrap().tracking_id, 2);
        assert_eq!(abs_c.live_pointer_count(), 1);
    }

    #[test]
    fn test_abs_down_and_up_in_same_frame_emits_nothing() {
        let mut abs_c = AbsEventCollector::new(DEV);
        abs_c.handle_abs(codes::ABS_MT_TRACKING_ID, 1, 1);
        abs_c.handle_abs(codes::ABS_MT_TRACKING_ID, -1, 1);
        assert!(abs_c.sync(1).is_none());
    }

    #[test]
    fn test_device_collectors_emit_rel_then_key_on_sync() {
        // Arrange
        let mut collectors = DeviceCollectors::new(DEV);
        let records = [
            RawEvent::new(5, codes::EV_KEY, codes::BTN_LEFT, 1),
            RawEvent::new(5, codes::EV_REL, codes::REL_X, 4),
            RawEvent::sync(5),
        ];

        // Act
        let events = feed(&mut collectors, &records);

        // Assert
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], KernelEvent::Rel(RelEvent { dx: 4, .. })));
        assert!(matches!(
            events[1],
            KernelEvent::Key(KernelKeyEvent { key_code: codes::BTN_LEFT, state: KeyState::Down, .. })
        ));
    }

    #[test]
    fn test_device_collectors_discard_frame_after_syn_dropped() {
        let mut collectors = DeviceCollectors::new(DEV);
        let records = [
            RawEvent::new(1, codes::EV_REL, codes::REL_X, 4),
            RawEvent::new(1, codes::EV_SYN, codes::SYN_DROPPED, 0),
            RawEvent::new(1, codes::EV_REL, codes::REL_X, 8),
            RawEvent::sync(1),
            RawEvent::new(2, codes::EV_REL, codes::REL_Y, 1),
            RawEvent::sync(2),
        ];

        let events = feed(&mut collectors, &records);

        assert_eq!(events, vec![KernelEvent::Rel(RelEvent::motion(DEV, 2, 0, 1))]);
    }

    #[test]
    fn test_device_collectors_nothing_before_barrier() {
        let mut collectors = DeviceCollectors::new(DEV);
        let events = feed(
            &mut collectors,
            &[abs(codes::ABS_MT_TRACKING_ID, 3), abs(codes::ABS_MT_POSITION_X, 1)],
        );
        assert!(events.is_empty());
        assert_eq!(collectors.live_pointer_count(), 1);
    }
}
