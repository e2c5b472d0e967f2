//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info,engine=debug";

/// Initialize the logging system with tracing.
///
/// This sets up tracing-subscriber with:
/// - Environment-based filtering (RUST_LOG)
/// - Targets and thread ids on every line
///
/// # Example
/// ```
/// engine_core::init_logging();
/// tracing::info!("Engine initialized");
/// ```
pub fn init_logging() {
    init_logging_with_filter(DEFAULT_FILTER);
}

/// Initialize logging with an explicit fallback directive.
///
/// `RUST_LOG` still wins when it is set. Calling this twice is harmless: the
/// second registration is ignored.
pub fn init_logging_with_filter(fallback: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
