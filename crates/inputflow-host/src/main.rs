//! inputflow host binary entry point.
//!
//! Loads the configuration, builds the pipeline around an epoll event loop
//! and runs it until SIGINT or SIGTERM.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()            -- TOML file, CLI overrides on top
//!  └─ EventLoop::new()         -- epoll + timer wheel
//!  └─ HostContext::new()       -- devices, seats, topology
//!       ├─ update_display_info -- initial topology from [displays]
//!       └─ start_discovery     -- inotify watch + deferred scan
//!  └─ run()                    -- until a shutdown signal arrives
//! ```

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use inputflow_host::infrastructure::dispatch::TracingDispatcher;
use inputflow_host::infrastructure::event_loop::EventLoop;
use inputflow_host::infrastructure::input_device::EvdevOpener;
use inputflow_host::infrastructure::runtime::HostContext;
use inputflow_host::infrastructure::storage::config::{config_file_path, load_config_from};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Linux input pipeline host.
///
/// Reads evdev devices, groups them into seats and turns their events into
/// display-space pointer and key events.
#[derive(Debug, Parser)]
#[command(name = "inputflow", about = "Host-side Linux input pipeline", version)]
struct Cli {
    /// Path of the TOML configuration file.
    ///
    /// Defaults to `$XDG_CONFIG_HOME/inputflow/config.toml`.  A missing file
    /// means built-in defaults.
    #[arg(long, env = "INPUTFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Directory watched for `event*` device nodes; overrides the config.
    #[arg(long, env = "INPUTFLOW_DEVICE_DIR")]
    device_dir: Option<PathBuf>,

    /// Log level when `RUST_LOG` is unset; overrides the config.
    #[arg(long, env = "INPUTFLOW_LOG_LEVEL")]
    log_level: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => config_file_path().context("cannot locate the config file")?,
    };
    let mut config = load_config_from(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    if let Some(dir) = cli.device_dir {
        config.host.device_dir = dir;
    }
    if let Some(level) = cli.log_level {
        config.host.log_level = level;
    }

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.host.log_level)),
        )
        .init();

    info!(config = %config_path.display(), "inputflow starting");

    let event_loop = EventLoop::new().context("failed to create the event loop")?;
    event_loop
        .add_signal_exit(&[libc::SIGINT, libc::SIGTERM])
        .context("failed to install shutdown signals")?;

    let context = HostContext::new(Rc::clone(&event_loop), Rc::new(TracingDispatcher), &config.gestures);

    // ── Initial topology ──────────────────────────────────────────────────────
    if !config.displays.physical.is_empty() || !config.displays.logical.is_empty() {
        context
            .update_display_info(config.displays.physical.clone(), config.displays.logical.clone())
            .context("invalid display topology in config")?;
    }

    // ── Devices ───────────────────────────────────────────────────────────────
    context
        .start_discovery(config.host.device_dir.clone(), Box::new(EvdevOpener), config.seats.clone())
        .with_context(|| format!("failed to watch {}", config.host.device_dir.display()))?;

    info!(device_dir = %config.host.device_dir.display(), "inputflow ready.  Press Ctrl-C to exit.");
    context.run().context("event loop failed")?;

    context.shutdown();
    info!("inputflow stopped");
    Ok(())
}
