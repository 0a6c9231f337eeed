//! Tracing setup
//!
//! `RUST_LOG` wins over `LOG_LEVEL` when both are set, so a single module can
//! be turned up without touching the service configuration.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .try_init(),
        LogFormat::Plain => registry.with(fmt::layer().with_target(true)).try_init(),
    };

    // A second init (tests, embedded use) keeps the first subscriber.
    if let Err(e) = result {
        eprintln!("tracing already initialised: {}", e);
    }
}
