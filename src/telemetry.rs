//! Console tracing setup.
//!
//! Installs a fmt subscriber filtered by `RUST_LOG` when set, falling
//! back to the configured log level for this crate only so dependency
//! spam stays out of the console.

use thiserror::Error;
use tracing_subscriber::Registry;
use tracing_subscriber::layer::{Layer, SubscriberExt};

use crate::config::LogLevel;

pub fn init_tracing(log_level: LogLevel) -> Result<(), TelemetryError> {
    let level: tracing::Level = log_level.into();
    let default_filter = format!("webshop={level}");

    let fmt_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(fmt_filter);

    let subscriber = Registry::default().with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to set global subscriber")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}
