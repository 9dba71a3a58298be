//! Structured logging setup.
//!
//! Unlike the Lightning node this crate is descended from, squeak-node has no
//! LDK `Logger` trait to bridge into `tracing` — every component here already
//! speaks `tracing` natively, so initialization is a plain `EnvFilter` +
//! `fmt` subscriber.

use tracing_subscriber::{fmt, EnvFilter};

/// The environment variable consulted for the log filter directive, e.g.
/// `SQUEAK_LOG=squeak_p2p=debug,info`.
const LOG_ENV_VAR: &str = "SQUEAK_LOG";

/// Install a global `tracing` subscriber. Call once, at process start.
///
/// `default_directive` is used when `SQUEAK_LOG` is unset; pass `"info"` for
/// normal operation or `"debug"` for verbose CLI invocations.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .try_init()
        .ok();
}
