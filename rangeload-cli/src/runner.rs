//! Shared command set-up: configuration and logging.

use rangeload::{init_logging, ConfigFile, LoggingGuard};
use tracing::info;

use crate::error::CliError;

/// Loaded configuration plus the logging guard for one command run.
pub struct CliRunner {
    config: ConfigFile,
    _logging: LoggingGuard,
}

impl CliRunner {
    /// Load `config.ini` and install logging. `verbose` mirrors logs to stderr.
    pub fn new(verbose: bool) -> Result<Self, CliError> {
        let config = ConfigFile::load()?;
        let logging = init_logging(&config.to_logging_config().with_stderr(verbose))?;

        Ok(Self {
            config,
            _logging: logging,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log the command being run.
    pub fn log_startup(&self, command: &str) {
        info!(
            version = rangeload::VERSION,
            command,
            log_file = %self.config.to_logging_config().log_file().display(),
            "rangeload starting"
        );
    }
}
