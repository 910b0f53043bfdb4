//! Rangeload - concurrent, resumable HTTP downloads
//!
//! This library provides a download engine that queues requests, runs a
//! bounded number of them at once, and splits large resources into byte
//! ranges fetched in parallel over separate connections.
//!
//! # Modules
//!
//! - [`engine`]: the engine, download records, segmentation and events
//! - [`config`]: engine settings and the INI configuration file
//! - [`logging`]: file and stderr tracing setup
//! - [`error`]: error types shared across the crate

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;

pub use config::{ConfigFile, EngineConfig};
pub use engine::{
    DownloadEvent, DownloadId, DownloadRecord, DownloadStatus, Engine, EventKind, EventReceiver,
};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use logging::{init_logging, LoggingConfig, LoggingGuard};
