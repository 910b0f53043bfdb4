//! INI configuration file (`config.ini`).
//!
//! The file is optional. Missing sections or keys fall back to defaults,
//! while values that are present but cannot be parsed are reported as
//! [`EngineError::ConfigFile`].
//!
//! ```ini
//! [downloads]
//! directory = /home/user/Downloads
//! max_concurrent = 3
//! threads_per_download = 3
//! chunk_size = 1048576
//!
//! [network]
//! connect_timeout_secs = 15
//! read_timeout_secs = 60
//! user_agent = rangeload/0.3.0
//!
//! [logging]
//! level = info
//! directory = /home/user/.local/share/rangeload/logs
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};

use super::engine::{
    default_user_agent, EngineConfig, DEFAULT_CHUNK_SIZE, DEFAULT_CONNECT_TIMEOUT_SECS,
    DEFAULT_MAX_CONCURRENT_DOWNLOADS, DEFAULT_MAX_THREADS_PER_DOWNLOAD, DEFAULT_READ_TIMEOUT_SECS,
};
use crate::error::{EngineError, EngineResult};
use crate::logging::LoggingConfig;

const SECTION_DOWNLOADS: &str = "downloads";
const SECTION_NETWORK: &str = "network";
const SECTION_LOGGING: &str = "logging";

/// `[downloads]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadsSection {
    pub directory: PathBuf,
    pub max_concurrent: usize,
    pub threads_per_download: usize,
    pub chunk_size: u64,
}

impl Default for DownloadsSection {
    fn default() -> Self {
        Self {
            directory: default_download_dir(),
            max_concurrent: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            threads_per_download: DEFAULT_MAX_THREADS_PER_DOWNLOAD,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// `[network]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSection {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            user_agent: default_user_agent(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSection {
    pub level: String,
    pub directory: PathBuf,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: default_log_dir(),
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub downloads: DownloadsSection,
    pub network: NetworkSection,
    pub logging: LoggingSection,
}

impl ConfigFile {
    /// Load from the default location, returning defaults when the file is absent.
    pub fn load() -> EngineResult<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load from an explicit path, returning defaults when the file is absent.
    pub fn load_from(path: &Path) -> EngineResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| EngineError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::from_ini(&ini).map_err(|reason| EngineError::ConfigFile {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Save to the default location.
    pub fn save(&self) -> EngineResult<()> {
        self.save_to(&config_file_path())
    }

    /// Save to an explicit path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> EngineResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| EngineError::CreateDir {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        self.to_ini()
            .write_to_file(path)
            .map_err(|e| EngineError::ConfigFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Build the engine configuration described by this file.
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig::new()
            .with_max_concurrent_downloads(self.downloads.max_concurrent)
            .with_max_threads_per_download(self.downloads.threads_per_download)
            .with_chunk_size(self.downloads.chunk_size)
            .with_connect_timeout(Duration::from_secs(self.network.connect_timeout_secs))
            .with_read_timeout(Duration::from_secs(self.network.read_timeout_secs))
            .with_user_agent(self.network.user_agent.clone())
    }

    /// Build the logging configuration described by this file.
    pub fn to_logging_config(&self) -> LoggingConfig {
        LoggingConfig::new(self.logging.directory.clone()).with_level(self.logging.level.clone())
    }

    /// Every setting as `(section, key, value)`, in file order.
    pub fn entries(&self) -> Vec<(&'static str, &'static str, String)> {
        vec![
            (
                SECTION_DOWNLOADS,
                "directory",
                self.downloads.directory.display().to_string(),
            ),
            (
                SECTION_DOWNLOADS,
                "max_concurrent",
                self.downloads.max_concurrent.to_string(),
            ),
            (
                SECTION_DOWNLOADS,
                "threads_per_download",
                self.downloads.threads_per_download.to_string(),
            ),
            (
                SECTION_DOWNLOADS,
                "chunk_size",
                self.downloads.chunk_size.to_string(),
            ),
            (
                SECTION_NETWORK,
                "connect_timeout_secs",
                self.network.connect_timeout_secs.to_string(),
            ),
            (
                SECTION_NETWORK,
                "read_timeout_secs",
                self.network.read_timeout_secs.to_string(),
            ),
            (SECTION_NETWORK, "user_agent", self.network.user_agent.clone()),
            (SECTION_LOGGING, "level", self.logging.level.clone()),
            (
                SECTION_LOGGING,
                "directory",
                self.logging.directory.display().to_string(),
            ),
        ]
    }

    /// Value of a `section.key` setting.
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries()
            .into_iter()
            .find(|(section, name, _)| split_key(key) == Some((section, name)))
            .map(|(_, _, value)| value)
    }

    /// Change a `section.key` setting, validating the new value.
    pub fn set(&mut self, key: &str, value: &str) -> EngineResult<()> {
        let known = self.get(key).is_some();
        let (section, name) = split_key(key)
            .filter(|_| known)
            .ok_or_else(|| EngineError::InvalidConfig(format!("unknown setting '{}'", key)))?;

        let mut ini = self.to_ini();
        ini.with_section(Some(section)).set(name, value);
        *self = Self::from_ini(&ini).map_err(EngineError::InvalidConfig)?;
        Ok(())
    }

    fn from_ini(ini: &Ini) -> Result<Self, String> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some(SECTION_DOWNLOADS)) {
            let downloads = &mut config.downloads;
            if let Some(dir) = section.get("directory") {
                downloads.directory = PathBuf::from(dir);
            }
            parse_into(section, SECTION_DOWNLOADS, "max_concurrent", &mut downloads.max_concurrent)?;
            parse_into(
                section,
                SECTION_DOWNLOADS,
                "threads_per_download",
                &mut downloads.threads_per_download,
            )?;
            parse_into(section, SECTION_DOWNLOADS, "chunk_size", &mut downloads.chunk_size)?;
        }

        if let Some(section) = ini.section(Some(SECTION_NETWORK)) {
            let network = &mut config.network;
            parse_into(
                section,
                SECTION_NETWORK,
                "connect_timeout_secs",
                &mut network.connect_timeout_secs,
            )?;
            parse_into(
                section,
                SECTION_NETWORK,
                "read_timeout_secs",
                &mut network.read_timeout_secs,
            )?;
            if let Some(agent) = section.get("user_agent") {
                network.user_agent = agent.to_string();
            }
        }

        if let Some(section) = ini.section(Some(SECTION_LOGGING)) {
            if let Some(level) = section.get("level") {
                config.logging.level = level.to_string();
            }
            if let Some(dir) = section.get("directory") {
                config.logging.directory = PathBuf::from(dir);
            }
        }

        Ok(config)
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for (section, key, value) in self.entries() {
            ini.with_section(Some(section)).set(key, value);
        }
        ini
    }
}

fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('.')
}

fn parse_into<T: FromStr>(
    section: &Properties,
    section_name: &str,
    key: &str,
    target: &mut T,
) -> Result<(), String> {
    if let Some(raw) = section.get(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| format!("invalid value '{}' for {}.{}", raw, section_name, key))?;
    }
    Ok(())
}

/// Path of the configuration file.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rangeload")
        .join("config.ini")
}

/// The user's download directory, or the current directory.
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Default directory for log files.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("rangeload")
        .join("logs")
}
