//! Infrastructure layer of the host.
//!
//! Contains the OS-facing adapters: the epoll event loop, evdev device nodes,
//! inotify hot-plug discovery, the TOML config file, the tracing dispatcher,
//! and the runtime that wires them to the seat layer.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `inputflow_core`, but MUST NOT be imported by the `application` layer.

pub mod device_manager;
pub mod discovery;
pub mod dispatch;
pub mod event_loop;
pub mod input_device;
pub mod runtime;
pub mod storage;
