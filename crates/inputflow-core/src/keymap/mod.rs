//! Human-readable names for evdev key codes, used in log output.

mod evdev_names;

use evdev_names::KEY_NAMES;

/// Returns the `KEY_*` / `BTN_*` name of `code`, if it is in the table.
pub fn key_name(code: u16) -> Option<&'static str> {
    KEY_NAMES
        .binary_search_by_key(&code, |&(c, _)| c)
        .ok()
        .map(|index| KEY_NAMES[index].1)
}

/// Like [`key_name`] but falls back to the hex code, for log fields.
pub fn describe_key(code: u16) -> String {
    match key_name(code) {
        Some(name) => name.to_string(),
        None => format!("{code:#05x}"),
    }
}
