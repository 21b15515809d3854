//! Subscriber setup for the `chaincalc` binary.

use std::io::{self, IsTerminal};

use chaincalc_config::{Config, LogFormat};
use tracing::Subscriber;
use tracing_subscriber::{EnvFilter, fmt};

use crate::errors::AppError;

/// Installs a stderr subscriber unless one is already in place.
pub(crate) fn install(config: &Config) -> Result<(), AppError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| AppError::LogFilter(error.to_string()))?;
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(fmt::time::UtcTime::rfc_3339());
    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };
    // A subscriber installed earlier in the process wins.
    tracing::subscriber::set_global_default(subscriber).ok();
    Ok(())
}
