//! apiwatch - LLM provider balance and liveness monitor
//!
//! Probes DeepSeek balances and Gemini key validity, pings both with a tiny
//! completion, and serves the combined view from a short-lived cache.

pub mod commands;
pub mod config;
pub mod logging;
pub mod monitor;
pub mod providers;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "apiwatch=info";

/// Initialize logging to stderr plus the log file layer, which only writes
/// while file logging is enabled. Safe to call more than once; later calls
/// only update the file toggle.
pub fn init_logging(file: bool) {
    logging::set_file_logging(file);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(logging::file_writer()),
        )
        .try_init();
}
