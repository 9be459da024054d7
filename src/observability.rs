//! Structured logging setup. The engine itself only emits `tracing` spans and events; wiring up
//! a subscriber is left to the caller, with [`init_tracing`] offered as the default used by the
//! test and benchmark binaries in this crate.

use tracing_subscriber::EnvFilter;

/// Install a `tracing-subscriber` that reads its filter from `RUST_LOG`, defaulting to `info`.
/// Safe to call more than once; subsequent calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
