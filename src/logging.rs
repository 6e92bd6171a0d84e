//! Logging initialisation.
//!
//! Plain `tracing` + `tracing_subscriber`, matching this codebase's
//! server binaries. No IPC-forwarding log client here - there is no
//! sibling log-aggregation process for a standalone bridge.

use tracing_subscriber::EnvFilter;

/// Initialise the global tracing subscriber. Safe to call once at startup.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
