//! Runtime configuration for the download engine.

use std::time::Duration;

/// Default number of records transferring at once.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 3;

/// Default number of parallel segments per record.
pub const DEFAULT_MAX_THREADS_PER_DOWNLOAD: usize = 3;

/// Default minimum segment span (1 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Buffer size for reading/writing during transfers (64KB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Default read timeout in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;

/// Configuration for the download engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of records in an active (probing, downloading or paused) state.
    pub max_concurrent_downloads: usize,

    /// Maximum number of parallel segments for one record.
    pub max_threads_per_download: usize,

    /// Minimum span per segment; smaller resources get fewer segments.
    pub chunk_size: u64,

    /// Size of one read increment.
    pub buffer_size: usize,

    /// TCP connect timeout.
    pub connect_timeout: Duration,

    /// Timeout applied to each read on a response body.
    pub read_timeout: Duration,

    /// `User-Agent` sent with every request.
    pub user_agent: String,

    /// Upper bound on how long `shutdown()` waits for transfers to exit.
    pub shutdown_timeout: Duration,

    /// Minimum interval between speed recalculations.
    pub speed_sample_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            max_threads_per_download: DEFAULT_MAX_THREADS_PER_DOWNLOAD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            user_agent: default_user_agent(),
            shutdown_timeout: Duration::from_secs(5),
            speed_sample_interval: Duration::from_secs(1),
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of concurrently active downloads (minimum 1).
    pub fn with_max_concurrent_downloads(mut self, max: usize) -> Self {
        self.max_concurrent_downloads = max.max(1);
        self
    }

    /// Set the maximum number of segments per download (minimum 1).
    pub fn with_max_threads_per_download(mut self, max: usize) -> Self {
        self.max_threads_per_download = max.max(1);
        self
    }

    /// Set the segment chunk size in bytes (minimum 1).
    pub fn with_chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size = bytes.max(1);
        self
    }

    /// Set the read increment size in bytes (minimum 1).
    pub fn with_buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes.max(1);
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the user agent.
    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Set the shutdown wait bound.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the speed sampling interval.
    pub fn with_speed_sample_interval(mut self, interval: Duration) -> Self {
        self.speed_sample_interval = interval;
        self
    }

    /// Apply the builders' lower bounds to every numeric limit.
    ///
    /// Fields are public, so a struct literal can carry zeros; the engine
    /// normalizes its configuration before using it.
    pub fn normalized(self) -> Self {
        let max_concurrent = self.max_concurrent_downloads;
        let max_threads = self.max_threads_per_download;
        let chunk_size = self.chunk_size;
        let buffer_size = self.buffer_size;
        self.with_max_concurrent_downloads(max_concurrent)
            .with_max_threads_per_download(max_threads)
            .with_chunk_size(chunk_size)
            .with_buffer_size(buffer_size)
    }
}

/// `rangeload/<crate version>`.
pub fn default_user_agent() -> String {
    format!("rangeload/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrent_downloads, 3);
        assert_eq!(config.max_threads_per_download, 3);
        assert_eq!(config.chunk_size, 1024 * 1024);
        assert_eq!(config.buffer_size, 64 * 1024);
        assert!(config.user_agent.starts_with("rangeload/"));
    }

    #[test]
    fn test_builder_pattern() {
        let config = EngineConfig::new()
            .with_max_concurrent_downloads(5)
            .with_max_threads_per_download(8)
            .with_chunk_size(4096)
            .with_read_timeout(Duration::from_secs(10))
            .with_user_agent("test-agent");

        assert_eq!(config.max_concurrent_downloads, 5);
        assert_eq!(config.max_threads_per_download, 8);
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.read_timeout, Duration::from_secs(10));
        assert_eq!(config.user_agent, "test-agent");
    }

    #[test]
    fn test_builder_clamps_to_one() {
        let config = EngineConfig::new()
            .with_max_concurrent_downloads(0)
            .with_max_threads_per_download(0)
            .with_chunk_size(0)
            .with_buffer_size(0);

        assert_eq!(config.max_concurrent_downloads, 1);
        assert_eq!(config.max_threads_per_download, 1);
        assert_eq!(config.chunk_size, 1);
        assert_eq!(config.buffer_size, 1);
    }

    #[test]
    fn test_normalized_clamps_struct_literal() {
        let config = EngineConfig {
            max_concurrent_downloads: 0,
            max_threads_per_download: 0,
            chunk_size: 0,
            buffer_size: 0,
            ..EngineConfig::default()
        }
        .normalized();

        assert_eq!(config.max_concurrent_downloads, 1);
        assert_eq!(config.max_threads_per_download, 1);
        assert_eq!(config.chunk_size, 1);
        assert_eq!(config.buffer_size, 1);
    }

    #[test]
    fn test_normalized_keeps_valid_values() {
        let config = EngineConfig::new()
            .with_max_concurrent_downloads(7)
            .with_chunk_size(4096)
            .normalized();

        assert_eq!(config.max_concurrent_downloads, 7);
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
    }
}
