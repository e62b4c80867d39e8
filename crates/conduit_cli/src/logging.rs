//! Structured logging setup for the conduit binary
//!
//! Logs go to stderr so JSON written to stdout stays machine readable.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static INIT: Once = Once::new();

/// Initialize tracing for the binary
///
/// This sets up a tracing subscriber with:
/// - Env filter from RUST_LOG (defaults to "off")
/// - Compact formatting on stderr
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new("off"))
            .unwrap();

        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .compact()
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    });
}
