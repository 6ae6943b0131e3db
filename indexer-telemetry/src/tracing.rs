use std::sync::Once;

use indexer_config::Environment;
use indexer_config::shared::LoggingConfig;
use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, filter::ParseError, fmt};

/// Environment variable enabling log output inside tests.
const ENABLE_TEST_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

static INIT_TEST_TRACING: Once = Once::new();

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("invalid log filter directive: {0}")]
    Filter(#[from] ParseError),
    #[error("failed to install the global tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Keeps the background log-file writer alive.
///
/// Dropping it flushes buffered lines, so hold it until the process exits.
#[must_use]
pub struct LogFlusher {
    _guard: Option<WorkerGuard>,
}

/// Installs the global tracing subscriber.
///
/// Filters with `RUST_LOG` when set, otherwise with `config.level`. Writes JSON lines to
/// stdout in production and human-readable lines otherwise. When `config.directory` is
/// set, logs are also appended to a daily-rolling file named after `config.file_prefix`.
pub fn init_tracing(
    app_name: &str,
    config: &LoggingConfig,
    environment: Environment,
) -> Result<LogFlusher, TracingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let json_stdout_layer = environment.is_prod().then(|| fmt::layer().json());
    let plain_stdout_layer = (!environment.is_prod()).then(fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(json_stdout_layer)
        .with(plain_stdout_layer)
        .with(file_layer)
        .try_init()?;

    info!(app = app_name, environment = %environment, "tracing initialized");

    Ok(LogFlusher { _guard: guard })
}

/// Installs a test-friendly subscriber once per process when `ENABLE_TRACING` is set.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var(ENABLE_TEST_TRACING_ENV_NAME).is_err() {
            return;
        }

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}
