//! Error types for the download engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Broad classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The capability probe failed before any bytes were fetched.
    Probe,
    /// A transfer failed mid-stream.
    Transfer,
    /// Segment concatenation or cleanup failed.
    Merge,
    /// The destination could not be prepared.
    Validation,
    /// Configuration could not be loaded or was invalid.
    Config,
    /// The engine is shutting down.
    Engine,
}

/// Errors that can occur while managing downloads.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Capability probe (HEAD) failed.
    #[error("failed to probe {url}: {reason}")]
    Probe { url: String, reason: String },

    /// Transfer failed after the request was issued.
    #[error("failed to download {url}: {reason}")]
    Transfer { url: String, reason: String },

    /// Network timeout while connecting or reading.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    /// Failed to write received bytes to disk.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to concatenate segment files.
    #[error("error merging chunks into {}: {reason}", path.display())]
    Merge { path: PathBuf, reason: String },

    /// Failed to create the destination directory.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    /// The engine no longer accepts work.
    #[error("engine is shutting down")]
    ShuttingDown,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to read, parse or write the configuration file.
    #[error("configuration file {}: {reason}", path.display())]
    ConfigFile { path: PathBuf, reason: String },
}

impl EngineError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Probe { .. } => ErrorKind::Probe,
            Self::Transfer { .. } | Self::Timeout { .. } | Self::WriteFailed { .. } => {
                ErrorKind::Transfer
            }
            Self::Merge { .. } => ErrorKind::Merge,
            Self::CreateDir { .. } => ErrorKind::Validation,
            Self::InvalidConfig(_) | Self::ConfigFile { .. } => ErrorKind::Config,
            Self::ShuttingDown => ErrorKind::Engine,
        }
    }

    /// Convert a reqwest error raised during a transfer.
    pub(crate) fn from_transfer(url: &str, err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
                timeout_secs,
            }
        } else {
            Self::Transfer {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::Probe {
            url: "http://example.com/a.bin".to_string(),
            reason: "HEAD request failed with status 404 Not Found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to probe http://example.com/a.bin: HEAD request failed with status 404 Not Found"
        );
    }

    #[test]
    fn test_merge_display() {
        let err = EngineError::Merge {
            path: PathBuf::from("/tmp/out.bin"),
            reason: "disk full".to_string(),
        };
        assert!(err.to_string().contains("error merging chunks"));
        assert!(err.to_string().contains("/tmp/out.bin"));
    }

    #[test]
    fn test_error_kind() {
        let timeout = EngineError::Timeout {
            url: "http://a".to_string(),
            timeout_secs: 5,
        };
        assert_eq!(timeout.kind(), ErrorKind::Transfer);

        let create = EngineError::CreateDir {
            path: PathBuf::from("/nope"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(create.kind(), ErrorKind::Validation);
        assert_eq!(EngineError::ShuttingDown.kind(), ErrorKind::Engine);
    }

    #[test]
    fn test_io_source_preserved() {
        use std::error::Error as _;

        let err = EngineError::WriteFailed {
            path: PathBuf::from("/a"),
            source: io::Error::new(io::ErrorKind::Other, "boom"),
        };
        assert!(err.source().is_some());
    }
}
