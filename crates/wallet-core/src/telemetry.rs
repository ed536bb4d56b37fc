//! Structured logging setup.
//!
//! Environment variables:
//! - `RUST_LOG` - filter directive, overrides `logging.filter`
//! - `LOG_FORMAT` - `json` or `pretty`, overrides `logging.format`

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{Result, WalletError};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Install the global subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let config = config.clone().with_env_overrides();

    // Redirect log crate to tracing; harmless if already done
    let _ = LogTracer::init();

    let env_filter = build_filter(&config)?;

    match config.format {
        LogFormat::Json => {
            let formatting_layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_target(true);
            let subscriber = Registry::default().with(env_filter).with(formatting_layer);
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| WalletError::Telemetry(e.to_string()))
        }
        LogFormat::Pretty => {
            let formatting_layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false);
            let subscriber = Registry::default().with(env_filter).with(formatting_layer);
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| WalletError::Telemetry(e.to_string()))
        }
    }
}

/// Initialize logging for tests. Output is suppressed unless `TEST_LOG` is set.
pub fn init_test() {
    if std::env::var("TEST_LOG").is_err() {
        return;
    }

    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = LogTracer::init();
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        let subscriber = Registry::default()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_test_writer());
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.filter)
        .map_err(|e| WalletError::Telemetry(format!("invalid filter {:?}: {}", config.filter, e)))
}
