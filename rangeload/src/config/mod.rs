//! Engine and configuration-file settings.

mod engine;
mod file;

pub use engine::{
    default_user_agent, EngineConfig, DEFAULT_BUFFER_SIZE, DEFAULT_CHUNK_SIZE,
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENT_DOWNLOADS,
    DEFAULT_MAX_THREADS_PER_DOWNLOAD, DEFAULT_READ_TIMEOUT_SECS,
};
pub use file::{
    config_file_path, default_download_dir, default_log_dir, ConfigFile, DownloadsSection,
    LoggingSection, NetworkSection,
};
