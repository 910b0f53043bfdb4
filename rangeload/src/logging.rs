//! Tracing subscriber set-up.
//!
//! Logs go to `<directory>/rangeload.log` through a non-blocking writer, and
//! optionally to stderr. `RUST_LOG` takes precedence over the configured
//! level.

use std::fs;
use std::path::PathBuf;

use time::format_description::well_known::Rfc3339;
use time::UtcOffset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{EngineError, EngineResult};

/// Name of the log file inside the log directory.
pub const LOG_FILE_NAME: &str = "rangeload.log";

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory that receives the log file.
    pub directory: PathBuf,
    /// Filter directive used when `RUST_LOG` is unset (e.g. `info`, `rangeload=debug`).
    pub level: String,
    /// Also write to stderr.
    pub stderr: bool,
}

impl LoggingConfig {
    /// Create a configuration logging to `directory` at `info`.
    pub fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            level: "info".to_string(),
            stderr: false,
        }
    }

    /// Set the filter directive.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Enable or disable the stderr layer.
    pub fn with_stderr(mut self, enabled: bool) -> Self {
        self.stderr = enabled;
        self
    }

    /// Full path of the log file.
    pub fn log_file(&self) -> PathBuf {
        self.directory.join(LOG_FILE_NAME)
    }
}

/// Keeps the background log writer alive; flushes on drop.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: WorkerGuard,
}

/// Install the global subscriber.
///
/// Fails if the log directory cannot be created, the filter does not parse,
/// or a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> EngineResult<LoggingGuard> {
    fs::create_dir_all(&config.directory).map_err(|e| EngineError::CreateDir {
        path: config.directory.clone(),
        source: e,
    })?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(LOG_FILE_NAME)
        .build(&config.directory)
        .map_err(|e| EngineError::InvalidConfig(format!("log file: {}", e)))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| EngineError::InvalidConfig(format!("log level '{}': {}", config.level, e)))?;

    let timer = local_timer();

    let file_layer = fmt::layer()
        .with_timer(timer.clone())
        .with_ansi(false)
        .with_thread_names(true)
        .with_writer(writer);

    let stderr_layer = config.stderr.then(|| {
        fmt::layer()
            .with_timer(timer)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| EngineError::InvalidConfig(format!("logging already initialized: {}", e)))?;

    Ok(LoggingGuard { _file: guard })
}

// Local offset lookup fails on some multi-threaded Unix processes.
fn local_timer() -> OffsetTime<Rfc3339> {
    OffsetTime::local_rfc_3339().unwrap_or_else(|_| OffsetTime::new(UtcOffset::UTC, Rfc3339))
}
