//! Process-level logging via `tracing`.
//!
//! Output goes to stderr so command output on stdout stays machine-readable.
//! The filter defaults to `info` and can be overridden with `RUST_LOG`.

use std::sync::Once;

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the global tracing subscriber with human-readable output.
///
/// Subsequent calls (of either initializer) are ignored.
pub fn init_tracing() {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
        let _ = tracing_subscriber::registry().with(env_filter()).with(fmt_layer).try_init();
        info!("tracing initialized");
    });
}

/// Initialize tracing with JSON output for structured logging.
pub fn init_tracing_json() {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_current_span(true);
        let _ = tracing_subscriber::registry().with(env_filter()).with(fmt_layer).try_init();
        info!("tracing initialized (JSON mode)");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
        init_tracing_json();
    }
}
