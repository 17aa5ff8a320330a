//! Kernel-level input: raw evdev records, device descriptions and the
//! per-device accumulators that turn record streams into discrete events.
//!
//! # The evdev protocol in one paragraph (for beginners)
//!
//! A Linux input device node (`/dev/input/eventN`) yields a stream of fixed-size
//! records `{type, code, value}`.  A single physical action, such as a mouse
//! moving diagonally, arrives as several records (`REL_X`, then `REL_Y`)
//! followed by an `EV_SYN`/`SYN_REPORT` record that says "this frame is
//! complete".  The collectors in [`collector`] accumulate records until that
//! barrier and then emit one [`KernelEvent`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use bitflags::bitflags;

pub mod codes;
pub mod collector;
pub mod events;

pub use collector::{AbsEventCollector, DeviceCollectors, KeyEventCollector, RelEventCollector};
pub use events::{AbsAction, AbsEvent, AbsPointer, KernelEvent, KernelKeyEvent, KeyState, RelEvent};

/// One raw record as read from a device node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    /// Kernel timestamp in milliseconds.
    pub time: i64,
    pub event_type: u16,
    pub code: u16,
    pub value: i32,
}

impl RawEvent {
    pub fn new(time: i64, event_type: u16, code: u16, value: i32) -> Self {
        Self {
            time,
            event_type,
            code,
            value,
        }
    }

    /// Convenience constructor for a `SYN_REPORT` barrier.
    pub fn sync(time: i64) -> Self {
        Self::new(time, codes::EV_SYN, codes::SYN_REPORT, 0)
    }
}

/// A little-endian bit vector as returned by the `EVIOCGBIT`/`EVIOCGPROP` ioctls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitVector {
    bytes: Vec<u8>,
}

impl BitVector {
    /// Creates an all-zero vector able to hold bits `0..=max_bit`.
    pub fn with_max_bit(max_bit: u16) -> Self {
        Self {
            bytes: vec![0; usize::from(max_bit) / 8 + 1],
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn contains(&self, bit: u16) -> bool {
        let bit = usize::from(bit);
        self.bytes
            .get(bit / 8)
            .is_some_and(|byte| byte & (1 << (bit % 8)) != 0)
    }

    pub fn set(&mut self, bit: u16) {
        let bit = usize::from(bit);
        if bit / 8 >= self.bytes.len() {
            self.bytes.resize(bit / 8 + 1, 0);
        }
        self.bytes[bit / 8] |= 1 << (bit % 8);
    }

    /// Returns `true` if any bit in `range` is set.
    pub fn any_in(&self, range: std::ops::Range<u16>) -> bool {
        range.into_iter().any(|bit| self.contains(bit))
    }
}

/// Calibration of one absolute axis (`struct input_absinfo`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisInfo {
    pub axis: u16,
    pub minimum: i32,
    pub maximum: i32,
    pub fuzz: i32,
    pub flat: i32,
    pub resolution: i32,
}

impl AxisInfo {
    /// An axis whose range is empty or inverted cannot be normalized.
    pub fn is_degenerate(&self) -> bool {
        self.minimum >= self.maximum
    }

    /// Maps `value` from `[minimum, maximum]` onto `[0, extent)`.
    pub fn normalize(&self, value: i32, extent: i32) -> i32 {
        if self.is_degenerate() {
            return 0;
        }
        let span = i64::from(self.maximum) - i64::from(self.minimum);
        let offset = i64::from(value) - i64::from(self.minimum);
        let scaled = offset * i64::from(extent) / span;
        scaled.clamp(0, i64::from(extent.max(1) - 1)) as i32
    }
}

bitflags! {
    /// Device classes a device can act as.  Not mutually exclusive: a
    /// keyboard with an integrated touchpad carries both flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceCapabilities: u32 {
        const MOUSE = 1 << 0;
        const KEYBOARD = 1 << 1;
        const TOUCHSCREEN = 1 << 2;
        const TOUCHPAD = 1 << 3;
    }
}

impl DeviceCapabilities {
    /// Classifies a device from its capability bitmaps.
    ///
    /// - mouse: relative `REL_X` and `REL_Y`
    /// - keyboard: `EV_KEY` with at least one code below `BTN_MISC` (plain
    ///   button-only devices such as mice are not keyboards)
    /// - touchscreen: `EV_ABS` without `INPUT_PROP_POINTER`
    /// - touchpad: `EV_ABS` with `INPUT_PROP_POINTER`
    pub fn classify(
        event_types: &BitVector,
        key_bits: &BitVector,
        rel_bits: &BitVector,
        props: &BitVector,
    ) -> Self {
        let mut caps = Self::empty();
        if event_types.contains(codes::EV_REL)
            && rel_bits.contains(codes::REL_X)
            && rel_bits.contains(codes::REL_Y)
        {
            caps |= Self::MOUSE;
        }
        if event_types.contains(codes::EV_KEY)
            && key_bits.any_in(codes::KEY_RESERVED + 1..codes::BTN_MISC)
        {
            caps |= Self::KEYBOARD;
        }
        if event_types.contains(codes::EV_ABS) {
            if props.contains(codes::INPUT_PROP_POINTER) {
                caps |= Self::TOUCHPAD;
            } else {
                caps |= Self::TOUCHSCREEN;
            }
        }
        caps
    }

    /// Device classes served by a pointer/keyboard [`Seat`](crate).
    pub fn is_seat_class(self) -> bool {
        self.intersects(Self::MOUSE | Self::KEYBOARD | Self::TOUCHPAD)
    }
}

/// `struct input_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputId {
    pub bus_type: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
}

/// Static description of an opened input device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    pub id: i32,
    pub device_file: PathBuf,
    pub name: String,
    pub seat_id: String,
    pub seat_name: String,
    pub capabilities: DeviceCapabilities,
    pub input_id: InputId,
    /// Calibration of every supported absolute axis, keyed by axis code.
    pub axes: BTreeMap<u16, AxisInfo>,
}

impl DeviceInfo {
    pub fn axis(&self, axis: u16) -> Option<&AxisInfo> {
        self.axes.get(&axis)
    }

    pub fn has(&self, capability: DeviceCapabilities) -> bool {
        self.capabilities.contains(capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(set: &[u16]) -> BitVector {
        let mut v = BitVector::default();
        for &b in set {
            v.set(b);
        }
        v
    }

    #[test]
    fn test_bit_vector_contains_reads_little_endian_bits() {
        let v = BitVector::from_bytes(vec![0b0000_0101, 0b1000_0000]);
        assert!(v.contains(0));
        assert!(!v.contains(1));
        assert!(v.contains(2));
        assert!(v.contains(15));
        assert!(!v.contains(16), "out of range bit must read as unset");
    }

    #[test]
    fn test_classify_mouse_with_buttons_is_not_keyboard() {
        // Arrange
        let types = bits(&[codes::EV_REL, codes::EV_KEY]);
        let keys = bits(&[codes::BTN_LEFT, codes::BTN_RIGHT]);
        let rel = bits(&[codes::REL_X, codes::REL_Y, codes::REL_WHEEL]);

        // Act
        let caps = DeviceCapabilities::classify(&types, &keys, &rel, &BitVector::default());

        // Assert
        assert_eq!(caps, DeviceCapabilities::MOUSE);
    }

    #[test]
    fn test_classify_keyboard_requires_real_key_codes() {
        let types = bits(&[codes::EV_KEY]);
        let keys = bits(&[30, 31, 32]);
        let caps =
            DeviceCapabilities::classify(&types, &keys, &BitVector::default(), &BitVector::default());
        assert_eq!(caps, DeviceCapabilities::KEYBOARD);
    }

    #[test]
    fn test_classify_abs_without_pointer_prop_is_touchscreen() {
        let types = bits(&[codes::EV_ABS, codes::EV_KEY]);
        let keys = bits(&[codes::BTN_TOUCH]);
        let caps = DeviceCapabilities::classify(
            &types,
            &keys,
            &BitVector::default(),
            &bits(&[codes::INPUT_PROP_DIRECT]),
        );
        assert_eq!(caps, DeviceCapabilities::TOUCHSCREEN);
    }

    #[test]
    fn test_classify_abs_with_pointer_prop_is_touchpad() {
        let types = bits(&[codes::EV_ABS]);
        let caps = DeviceCapabilities::classify(
            &types,
            &BitVector::default(),
            &BitVector::default(),
            &bits(&[codes::INPUT_PROP_POINTER]),
        );
        assert_eq!(caps, DeviceCapabilities::TOUCHPAD);
    }

    #[test]
    fn test_classify_combo_device_carries_multiple_capabilities() {
        let types = bits(&[codes::EV_KEY, codes::EV_ABS]);
        let keys = bits(&[30, codes::BTN_LEFT]);
        let caps = DeviceCapabilities::classify(
            &types,
            &keys,
            &BitVector::default(),
            &bits(&[codes::INPUT_PROP_POINTER]),
        );
        assert_eq!(caps, DeviceCapabilities::KEYBOARD | DeviceCapabilities::TOUCHPAD);
    }

    #[test]
    fn test_axis_info_is_degenerate_when_min_not_below_max() {
        let axis = AxisInfo { minimum: 10, maximum: 10, ..AxisInfo::default() };
        assert!(axis.is_degenerate());
        let axis = AxisInfo { minimum: 0, maximum: 4095, ..AxisInfo::default() };
        assert!(!axis.is_degenerate());
    }

    #[test]
    fn test_axis_info_normalize_maps_range_onto_extent() {
        let axis = AxisInfo { minimum: 0, maximum: 1000, ..AxisInfo::default() };
        assert_eq!(axis.normalize(0, 1920), 0);
        assert_eq!(axis.normalize(500, 1920), 960);
        assert_eq!(axis.normalize(1000, 1920), 1919, "max clamps to last pixel");
        assert_eq!(axis.normalize(-50, 1920), 0);
    }
}
