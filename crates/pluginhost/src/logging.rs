//! Optional `tracing` subscriber bootstrap.
//!
//! This crate never installs a subscriber on its own — library code only
//! emits `tracing` events and leaves the embedding host in control of
//! where they go. `init_logging` is a convenience for hosts (and this
//! crate's own integration tests) that don't already have one.

use tracing_subscriber::EnvFilter;

/// Install a process-wide `tracing` subscriber reading its filter from
/// `RUST_LOG` (defaulting to `info`). Call at most once, as early as
/// possible in the embedding host's `main`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
