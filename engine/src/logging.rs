//! Tracing setup for binaries embedding the engine.
//!
//! The engine itself only emits `tracing` events: runner construction at
//! `info`, worker lifecycle at `debug`, retries at `warn`. Validators log under
//! the span carried by their [`crate::deps::Dependencies`].

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber.
///
/// Reads `RUST_LOG` env var. Defaults to `warn` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=check_engine=debug my-addon-cli validate ./addon
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    // No-op when a global subscriber is already set.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
