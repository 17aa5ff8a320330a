//! # inputflow-core
//!
//! Pure-logic half of the inputflow host input pipeline: the event model,
//! kernel-level events and their collectors, the display topology and the
//! touchpad gesture transformers.
//!
//! This crate has no OS dependencies and performs no I/O.  The Linux-facing
//! half (event loop, evdev devices, hot-plug discovery, seats) lives in
//! `inputflow-host`.
//!
//! # Architecture overview (for beginners)
//!
//! A keyboard, mouse or touch panel under Linux shows up as a file such as
//! `/dev/input/event3`.  Reading it yields a stream of tiny records.  The
//! pipeline turns those records into events a window system can use:
//!
//! ```text
//! raw records ─▶ collectors ─▶ kernel events ─▶ seat handlers ─▶ PointerEvent / KeyEvent
//!   (kernel)      (kernel)       (kernel)         (host)             (event)
//!                                                   │
//!                                         topology (domain) + gestures (gesture)
//! ```
//!
//! - **`kernel`** – evdev codes, raw records, device descriptions, and the
//!   collectors that fold a frame of records into one kernel-level event.
//! - **`event`** – the display-space `PointerEvent` / `KeyEvent` pair handed to
//!   consumers.
//! - **`domain`** – physical and logical displays, windows, and the
//!   `WindowStateManager` that validates topology updates and transforms
//!   coordinates across displays.
//! - **`gesture`** – touchpad tap and drag recognizers.
//! - **`keymap`** – evdev key names for logging.

pub mod domain;
pub mod event;
pub mod gesture;
pub mod kernel;
pub mod keymap;

pub use domain::display::{
    Contact, LogicalDisplay, LogicalDisplayState, PhysicalDisplayState, DEFAULT_SEAT_ID,
    DEFAULT_SEAT_NAME,
};
pub use domain::topology::{DisplayChange, DisplayKind, TopologyError, WindowStateManager};
pub use domain::window::{InputWindowState, WindowChanges, WindowInfo};
pub use domain::Rect;
pub use event::{
    DispatchedEvent, EventHeader, EventType, KeyAction, KeyEvent, MouseButton, PointerAction,
    PointerEvent, PointerItem, SourceType, NONE_ID,
};
pub use gesture::{GestureConfig, GestureOutput, TimerRequest, TransformerChain};
pub use kernel::{
    AbsAction, AbsEvent, AbsPointer, AxisInfo, BitVector, DeviceCapabilities, DeviceCollectors, DeviceInfo,
    InputId, KernelEvent, KernelKeyEvent, KeyState, RawEvent, RelEvent,
};
