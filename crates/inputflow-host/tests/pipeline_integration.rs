//! Integration tests for the full host pipeline.
//!
//! # Purpose
//!
//! These tests drive [`HostContext`] through its *public* API with scripted
//! parts in place of the kernel:
//!
//! - `ScriptedMultiplexer` decides which fds are readable,
//! - `ManualClock` decides what time it is,
//! - `MockEventSource` supplies raw evdev records,
//! - `RecordingDispatcher` collects what leaves the pipeline.
//!
//! Everything in between is the production code: collectors, device manager,
//! seat routing, topology transforms and gesture transformers.
//!
//! ```text
//! raw records ─▶ InputDevice ─▶ SeatManager ─▶ Seat / TouchScreenSeat ─▶ RecordingDispatcher
//! ```

use std::path::Path;
use std::rc::Rc;

use inputflow_core::kernel::codes;
use inputflow_core::{
    AxisInfo, DeviceCapabilities, KeyAction, LogicalDisplay, PhysicalDisplayState, PointerAction,
    PointerEvent, Rect, SourceType,
};
use inputflow_host::application::dispatch::RecordingDispatcher;
use inputflow_host::infrastructure::event_loop::mock::{ManualClock, ScriptedMultiplexer};
use inputflow_host::infrastructure::event_loop::EventLoop;
use inputflow_host::infrastructure::input_device::mock::{mouse_probe, touchscreen_probe, MockEventSource};
use inputflow_host::infrastructure::input_device::{device_info, DeviceProbe, InputDevice};
use inputflow_host::infrastructure::runtime::HostContext;
use inputflow_host::infrastructure::storage::config::GesturesConfig;

// ── Harness ───────────────────────────────────────────────────────────────────

struct Pipeline {
    context: Rc<HostContext>,
    mux: ScriptedMultiplexer,
    clock: ManualClock,
    dispatcher: Rc<RecordingDispatcher>,
}

impl Pipeline {
    /// One 200x100 panel on seat0 split into logical displays 1 (left half)
    /// and 2 (right half).
    fn new() -> Self {
        let mux = ScriptedMultiplexer::new();
        let clock = ManualClock::starting_at(1_000);
        let event_loop = EventLoop::with_parts(Box::new(mux.clone()), Box::new(clock.clone()));
        let dispatcher = Rc::new(RecordingDispatcher::new());
        let context = HostContext::new(event_loop, dispatcher.clone(), &GesturesConfig::default());
        context
            .update_display_info(
                vec![PhysicalDisplayState::new(0, 200, 100)],
                vec![
                    LogicalDisplay::new(1, Rect::new(0, 0, 100, 100)),
                    LogicalDisplay::new(2, Rect::new(100, 0, 100, 100)),
                ],
            )
            .expect("valid topology");
        Self {
            context,
            mux,
            clock,
            dispatcher,
        }
    }

    /// Adds a device with id `id` whose source uses fd `100 + id`.
    fn plug(&self, id: i32, probe: DeviceProbe) -> MockEventSource {
        let source = MockEventSource::new(100 + id);
        let info = device_info(
            id,
            Path::new(&format!("/dev/input/event{id}")),
            probe,
            "seat0".to_string(),
            "seat0".to_string(),
        );
        self.context
            .add_device(InputDevice::new(info, Box::new(source.clone())));
        source
    }

    /// Lets the loop read everything queued on `source`.
    fn deliver(&self, source: &MockEventSource) {
        self.mux.set_ready(source_fd(source));
        self.context
            .event_loop()
            .run_once(Some(0))
            .expect("loop pass");
        self.mux.clear_ready(source_fd(source));
    }

    fn pointer_actions(&self) -> Vec<PointerAction> {
        self.dispatcher
            .pointer_events()
            .iter()
            .map(PointerEvent::action)
            .collect()
    }
}

fn source_fd(source: &MockEventSource) -> i32 {
    use inputflow_host::infrastructure::input_device::RawEventSource;
    source.fd()
}

fn touchpad_probe() -> DeviceProbe {
    let mut probe = touchscreen_probe("test touchpad", 1000, 1000);
    probe.capabilities = DeviceCapabilities::TOUCHPAD;
    probe
}

fn keyboard_probe() -> DeviceProbe {
    DeviceProbe {
        name: "test keyboard".to_string(),
        capabilities: DeviceCapabilities::KEYBOARD,
        ..DeviceProbe::default()
    }
}

// ── Mouse ─────────────────────────────────────────────────────────────────────

/// The cursor starts at the centre of the first logical display; a motion
/// that crosses x = 100 hands it to display 2 with local coordinates.
#[test]
fn test_mouse_motion_crosses_into_neighbouring_display() {
    // Arrange
    let pipeline = Pipeline::new();
    let mouse = pipeline.plug(1, mouse_probe("test mouse"));

    // Act: (50, 50) + (70, 0) = (120, 50)
    mouse.push_frame(1_001, &[(codes::EV_REL, codes::REL_X, 70)]);
    pipeline.deliver(&mouse);

    // Assert
    let events = pipeline.dispatcher.pointer_events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.source_type(), SourceType::Mouse);
    assert_eq!(event.action(), PointerAction::Move);
    assert_eq!(event.header.target_display_id, 2);
    let item = event.pointer_item(event.pointer_id()).expect("cursor item");
    assert_eq!((item.global_x, item.global_y), (120, 50));
    assert_eq!((item.local_x, item.local_y), (20, 50));
}

/// Two mice holding the same button keep it down until both release.
#[test]
fn test_shared_button_stays_down_until_last_mouse_releases() {
    // Arrange
    let pipeline = Pipeline::new();
    let first = pipeline.plug(1, mouse_probe("first"));
    let second = pipeline.plug(2, mouse_probe("second"));

    // Act
    first.push_frame(1_001, &[(codes::EV_KEY, codes::BTN_LEFT, 1)]);
    pipeline.deliver(&first);
    second.push_frame(1_002, &[(codes::EV_KEY, codes::BTN_LEFT, 1)]);
    pipeline.deliver(&second);
    first.push_frame(1_003, &[(codes::EV_KEY, codes::BTN_LEFT, 0)]);
    pipeline.deliver(&first);
    second.push_frame(1_004, &[(codes::EV_KEY, codes::BTN_LEFT, 0)]);
    pipeline.deliver(&second);

    // Assert
    assert_eq!(
        pipeline.pointer_actions(),
        vec![PointerAction::ButtonDown, PointerAction::ButtonUp]
    );
}

// ── Keyboard ──────────────────────────────────────────────────────────────────

/// An unplugged keyboard releases the keys it was holding.
#[test]
fn test_unplugged_keyboard_releases_held_key() {
    // Arrange
    let pipeline = Pipeline::new();
    let keyboard = pipeline.plug(3, keyboard_probe());
    keyboard.push_frame(1_001, &[(codes::EV_KEY, 30, 1)]);
    pipeline.deliver(&keyboard);

    // Act
    pipeline
        .context
        .remove_device_node(Path::new("/dev/input/event3"));

    // Assert
    let keys = pipeline.dispatcher.key_events();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0].action(), KeyAction::Down);
    assert_eq!(keys[1].action(), KeyAction::Up);
    assert_eq!(keys[1].key_code(), 30);
    assert!(pipeline.context.device_ids().is_empty());
}

// ── Touchscreen ───────────────────────────────────────────────────────────────

/// A touch on the right half of the panel lands on logical display 2 and the
/// contact keeps that target until it lifts.
#[test]
fn test_touchscreen_contact_resolves_to_logical_display() {
    // Arrange
    let pipeline = Pipeline::new();
    let panel = pipeline.plug(4, touchscreen_probe("test panel", 2000, 1000));

    // Act: 1500/2000 of 200 = 150, 500/1000 of 100 = 50
    panel.push_frame(
        1_001,
        &[
            (codes::EV_ABS, codes::ABS_MT_SLOT, 0),
            (codes::EV_ABS, codes::ABS_MT_TRACKING_ID, 7),
            (codes::EV_ABS, codes::ABS_MT_POSITION_X, 1500),
            (codes::EV_ABS, codes::ABS_MT_POSITION_Y, 500),
        ],
    );
    pipeline.deliver(&panel);
    panel.push_frame(1_002, &[(codes::EV_ABS, codes::ABS_MT_TRACKING_ID, -1)]);
    pipeline.deliver(&panel);

    // Assert
    let events = pipeline.dispatcher.pointer_events();
    assert_eq!(
        events.iter().map(PointerEvent::action).collect::<Vec<_>>(),
        vec![PointerAction::Down, PointerAction::Up]
    );
    assert!(events.iter().all(|e| e.source_type() == SourceType::TouchScreen));
    assert!(events.iter().all(|e| e.header.target_display_id == 2));
    let down = &events[0];
    let item = down.pointer_item(down.pointer_id()).expect("contact item");
    assert_eq!((item.local_x, item.local_y), (50, 50));
}

/// A slot that reports a new tracking id without lifting first releases the
/// old contact on the display it started on before the new one lands.
#[test]
fn test_touchscreen_replaced_tracking_id_releases_old_contact() {
    // Arrange: a contact on display 1 (500/2000 of 200 = 50)
    let pipeline = Pipeline::new();
    let panel = pipeline.plug(4, touchscreen_probe("test panel", 2000, 1000));
    panel.push_frame(
        1_001,
        &[
            (codes::EV_ABS, codes::ABS_MT_SLOT, 0),
            (codes::EV_ABS, codes::ABS_MT_TRACKING_ID, 1),
            (codes::EV_ABS, codes::ABS_MT_POSITION_X, 500),
            (codes::EV_ABS, codes::ABS_MT_POSITION_Y, 500),
        ],
    );
    pipeline.deliver(&panel);

    // Act: slot 0 switches to tracking id 2 on display 2, then lifts
    panel.push_frame(
        1_002,
        &[
            (codes::EV_ABS, codes::ABS_MT_TRACKING_ID, 2),
            (codes::EV_ABS, codes::ABS_MT_POSITION_X, 1500),
        ],
    );
    pipeline.deliver(&panel);
    panel.push_frame(1_003, &[(codes::EV_ABS, codes::ABS_MT_TRACKING_ID, -1)]);
    pipeline.deliver(&panel);

    // Assert
    let actions: Vec<(i32, PointerAction)> = pipeline
        .dispatcher
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
    let topology = pipeline.context.topology();
    assert_eq!(topology.logical_display(1).expect("display 1").active_contact_count(), 0);
    assert_eq!(topology.logical_display(2).expect("display 2").active_contact_count(), 0);
}

/// A panel whose axes cannot be normalized is never bound, so its frames
/// produce nothing.
#[test]
fn test_touchscreen_with_degenerate_axis_is_ignored() {
    // Arrange
    let pipeline = Pipeline::new();
    let mut probe = touchscreen_probe("broken panel", 2000, 1000);
    probe.axes.insert(
        codes::ABS_MT_POSITION_X,
        AxisInfo {
            axis: codes::ABS_MT_POSITION_X,
            minimum: 10,
            maximum: 10,
            ..AxisInfo::default()
        },
    );
    let panel = pipeline.plug(5, probe);

    // Act
    panel.push_frame(
        1_001,
        &[
            (codes::EV_ABS, codes::ABS_MT_TRACKING_ID, 1),
            (codes::EV_ABS, codes::ABS_MT_POSITION_X, 100),
            (codes::EV_ABS, codes::ABS_MT_POSITION_Y, 100),
        ],
    );
    pipeline.deliver(&panel);

    // Assert
    assert!(pipeline.dispatcher.is_empty());
    assert!(!pipeline.context.seats().is_bound(5));
}

// ── Touchpad gestures ─────────────────────────────────────────────────────────

/// A short touch on a touchpad becomes a left click on the seat's cursor.
#[test]
fn test_touchpad_tap_clicks_at_cursor() {
    // Arrange
    let pipeline = Pipeline::new();
    let pad = pipeline.plug(6, touchpad_probe());

    // Act
    pad.push_frame(
        1_001,
        &[
            (codes::EV_ABS, codes::ABS_MT_TRACKING_ID, 3),
            (codes::EV_ABS, codes::ABS_MT_POSITION_X, 300),
            (codes::EV_ABS, codes::ABS_MT_POSITION_Y, 300),
        ],
    );
    pipeline.deliver(&pad);
    pad.push_frame(1_050, &[(codes::EV_ABS, codes::ABS_MT_TRACKING_ID, -1)]);
    pipeline.deliver(&pad);

    // Assert
    let clicks: Vec<PointerAction> = pipeline
        .pointer_actions()
        .into_iter()
        .filter(|a| matches!(a, PointerAction::ButtonDown | PointerAction::ButtonUp))
        .collect();
    assert_eq!(clicks, vec![PointerAction::ButtonDown, PointerAction::ButtonUp]);
    assert!(pipeline
        .dispatcher
        .pointer_events()
        .iter()
        .all(|e| e.source_type() == SourceType::Mouse));
}

/// After a tap, a drag that reuses the same slot still moves the cursor.
#[test]
fn test_touchpad_drag_on_same_slot_after_tap_moves_cursor() {
    // Arrange: a tap on slot 0
    let pipeline = Pipeline::new();
    let pad = pipeline.plug(6, touchpad_probe());
    pad.push_frame(
        1_000,
        &[
            (codes::EV_ABS, codes::ABS_MT_SLOT, 0),
            (codes::EV_ABS, codes::ABS_MT_TRACKING_ID, 1),
            (codes::EV_ABS, codes::ABS_MT_POSITION_X, 300),
            (codes::EV_ABS, codes::ABS_MT_POSITION_Y, 300),
        ],
    );
    pipeline.deliver(&pad);
    pad.push_frame(1_050, &[(codes::EV_ABS, codes::ABS_MT_TRACKING_ID, -1)]);
    pipeline.deliver(&pad);
    pipeline.dispatcher.take();

    // Act: a new contact on slot 0 slides right twice
    pad.push_frame(
        2_000,
        &[
            (codes::EV_ABS, codes::ABS_MT_TRACKING_ID, 2),
            (codes::EV_ABS, codes::ABS_MT_POSITION_X, 300),
            (codes::EV_ABS, codes::ABS_MT_POSITION_Y, 300),
        ],
    );
    pipeline.deliver(&pad);
    pad.push_frame(2_010, &[(codes::EV_ABS, codes::ABS_MT_POSITION_X, 340)]);
    pipeline.deliver(&pad);
    pad.push_frame(2_020, &[(codes::EV_ABS, codes::ABS_MT_POSITION_X, 380)]);
    pipeline.deliver(&pad);

    // Assert
    let moves = pipeline
        .pointer_actions()
        .into_iter()
        .filter(|a| *a == PointerAction::Move)
        .count();
    assert_eq!(moves, 2);
}

/// Once the tap window has expired on the loop clock, lifting the finger
/// no longer clicks.
#[test]
fn test_touchpad_long_press_does_not_click() {
    // Arrange
    let pipeline = Pipeline::new();
    let pad = pipeline.plug(6, touchpad_probe());
    pad.push_frame(
        1_001,
        &[
            (codes::EV_ABS, codes::ABS_MT_TRACKING_ID, 3),
            (codes::EV_ABS, codes::ABS_MT_POSITION_X, 300),
            (codes::EV_ABS, codes::ABS_MT_POSITION_Y, 300),
        ],
    );
    pipeline.deliver(&pad);

    // Act: let the gesture timer fire, then lift.
    pipeline.clock.advance(500);
    pipeline
        .context
        .event_loop()
        .run_once(Some(0))
        .expect("loop pass");
    pad.push_frame(1_600, &[(codes::EV_ABS, codes::ABS_MT_TRACKING_ID, -1)]);
    pipeline.deliver(&pad);

    // Assert
    assert!(pipeline
        .pointer_actions()
        .iter()
        .all(|a| !matches!(a, PointerAction::ButtonDown | PointerAction::ButtonUp)));
}

// ── Topology ──────────────────────────────────────────────────────────────────

/// Removing the display the cursor is on moves the cursor to the centre of
/// the remaining one.
#[test]
fn test_cursor_recentres_when_its_display_is_removed() {
    // Arrange
    let pipeline = Pipeline::new();
    let mouse = pipeline.plug(1, mouse_probe("test mouse"));
    mouse.push_frame(1_001, &[(codes::EV_REL, codes::REL_X, 70)]);
    pipeline.deliver(&mouse);
    pipeline.dispatcher.take();

    // Act
    pipeline
        .context
        .update_display_info(
            vec![PhysicalDisplayState::new(0, 200, 100)],
            vec![LogicalDisplay::new(1, Rect::new(0, 0, 100, 100))],
        )
        .expect("valid topology");
    mouse.push_frame(1_002, &[(codes::EV_REL, codes::REL_Y, 1)]);
    pipeline.deliver(&mouse);

    // Assert
    let events = pipeline.dispatcher.pointer_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].header.target_display_id, 1);
    let item = events[0].pointer_item(events[0].pointer_id()).expect("cursor item");
    assert_eq!((item.global_x, item.global_y), (50, 51));
}
