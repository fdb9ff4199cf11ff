//! Subscriber setup for hook handlers.
//!
//! The store only emits `tracing` events (opens at `info`, per-key
//! mutations at `debug`, close failures at `warn`). A hook handler that
//! wants to see them calls one of these once at startup. Without the
//! `logging` feature they are no-ops, so handlers can call them
//! unconditionally.

#[cfg(feature = "logging")]
use tracing_subscriber::{EnvFilter, fmt};

/// Install a stderr subscriber at `info`, or whatever `RUST_LOG` asks for.
///
/// ```rust
/// hookstate_core::logging::init();
/// // a second call is ignored
/// hookstate_core::logging::init();
/// ```
#[cfg(feature = "logging")]
pub fn init() {
    init_with_level("info")
}

/// Same as [`init`] with a different fallback level.
///
/// Stdout belongs to the hook's response, so events always go to stderr.
/// Does nothing if a global subscriber is already installed.
#[cfg(feature = "logging")]
pub fn init_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Store events at `debug`, captured by the test harness.
#[cfg(feature = "logging")]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("hookstate_core=debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(not(feature = "logging"))]
pub fn init() {}

#[cfg(not(feature = "logging"))]
pub fn init_with_level(_level: &str) {}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}
