//! Tracing setup for the farm client.
//!
//! Logs go to stderr; sploit output printed by the harvester goes to stdout,
//! so the two can be redirected separately.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `info` if unset, which is the level of the
/// per-round progress messages.
///
/// # Example
/// ```bash
/// RUST_LOG=farm_client=debug start-sploit ./sploit.py
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
