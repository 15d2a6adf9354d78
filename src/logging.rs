//! File-based logging.
//!
//! stdout and stderr belong to the command surface, so tracing output goes to
//! a daily rotated file instead.

use std::fs;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingSettings;

const LOG_FILE_PREFIX: &str = "cadenza";

/// Install the global subscriber.
///
/// Logs are written to `<directory>/cadenza.YYYY-MM-DD`. `RUST_LOG` wins over
/// the configured filter.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(&settings.directory)?;

    let file_appender =
        RollingFileAppender::new(Rotation::DAILY, &settings.directory, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    // The guard flushes on drop; logging lives as long as the process.
    Box::leak(Box::new(guard));

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .unwrap_or_else(|_| EnvFilter::new("cadenza=info,warn"));

    let fmt_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::info!(directory = %settings.directory.display(), "logging initialized");
    Ok(())
}
