//! Linux input event codes (`linux/input-event-codes.h`) used by the pipeline.
//!
//! Only the subset the collectors, classifiers and handlers look at is listed.

// Event types
pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_REL: u16 = 0x02;
pub const EV_ABS: u16 = 0x03;
pub const EV_MSC: u16 = 0x04;
pub const EV_MAX: u16 = 0x1f;

// Synchronization
pub const SYN_REPORT: u16 = 0;
pub const SYN_CONFIG: u16 = 1;
pub const SYN_MT_REPORT: u16 = 2;
pub const SYN_DROPPED: u16 = 3;

// Relative axes
pub const REL_X: u16 = 0x00;
pub const REL_Y: u16 = 0x01;
pub const REL_HWHEEL: u16 = 0x06;
pub const REL_WHEEL: u16 = 0x08;
pub const REL_MAX: u16 = 0x0f;

// Absolute axes
pub const ABS_X: u16 = 0x00;
pub const ABS_Y: u16 = 0x01;
pub const ABS_MT_SLOT: u16 = 0x2f;
pub const ABS_MT_TOUCH_MAJOR: u16 = 0x30;
pub const ABS_MT_POSITION_X: u16 = 0x35;
pub const ABS_MT_POSITION_Y: u16 = 0x36;
pub const ABS_MT_TRACKING_ID: u16 = 0x39;
pub const ABS_MT_PRESSURE: u16 = 0x3a;
pub const ABS_MAX: u16 = 0x3f;

// Keys and buttons
pub const KEY_RESERVED: u16 = 0;
pub const BTN_MISC: u16 = 0x100;
pub const BTN_LEFT: u16 = 0x110;
pub const BTN_RIGHT: u16 = 0x111;
pub const BTN_MIDDLE: u16 = 0x112;
pub const BTN_SIDE: u16 = 0x113;
pub const BTN_EXTRA: u16 = 0x114;
pub const BTN_FORWARD: u16 = 0x115;
pub const BTN_BACK: u16 = 0x116;
pub const BTN_TASK: u16 = 0x117;
pub const BTN_TOOL_FINGER: u16 = 0x145;
pub const BTN_TOUCH: u16 = 0x14a;
pub const KEY_OK: u16 = 0x160;
pub const BTN_TRIGGER_HAPPY: u16 = 0x2c0;
pub const KEY_MAX: u16 = 0x2ff;

// Input properties
pub const INPUT_PROP_POINTER: u16 = 0x00;
pub const INPUT_PROP_DIRECT: u16 = 0x01;
pub const INPUT_PROP_BUTTONPAD: u16 = 0x02;
pub const INPUT_PROP_MAX: u16 = 0x1f;

/// Tracking id value that ends a contact.
pub const TRACKING_ID_RELEASED: i32 = -1;

/// Returns `true` for codes that belong to a keyboard rather than to a
/// mouse, touch surface or joystick button block.
pub fn is_keyboard_key(code: u16) -> bool {
    (code > KEY_RESERVED && code < BTN_MISC) || (KEY_OK..BTN_TRIGGER_HAPPY).contains(&code)
}
