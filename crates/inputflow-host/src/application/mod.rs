//! Application layer of the host: seats and their event handlers.
//!
//! # What lives here? (for beginners)
//!
//! This layer turns *kernel-level* events (a relative mouse step, a key
//! transition, a multi-touch frame) into *display-space* events a window
//! system understands.  It knows about seats, cursors and displays, but it
//! never opens a file, never touches `epoll` and never reads a clock: the
//! infrastructure layer feeds it events and schedules its timers.
//!
//! # Sub-modules
//!
//! - **`seat_manager`** – Groups devices and physical displays into seats
//!   and routes every kernel event to the seat that owns its device.
//! - **`seat`** – One user's cursor and keyboard: mice, keyboards and
//!   touchpads bound by `seat_id`.
//! - **`touch_screen_seat`** – One touch panel on one physical display, with
//!   the panel → display → logical display coordinate pipeline.
//! - **`rel_event_handler`** – Cursor motion, wheel and button reference
//!   counting.
//! - **`key_event_handler`** – Keyboard key state shared by a seat's devices.
//! - **`abs_event_handler`** – Touchpad frames fed through the gesture chain.
//! - **`dispatch`** – The [`EventDispatcher`](dispatch::EventDispatcher) seam
//!   through which finished events leave.
//!
//! **Dependency rule**: this layer depends on `inputflow_core` only and MUST
//! NOT import `infrastructure`.

pub mod abs_event_handler;
pub mod dispatch;
pub mod key_event_handler;
pub mod rel_event_handler;
pub mod seat;
pub mod seat_manager;
pub mod touch_screen_seat;
