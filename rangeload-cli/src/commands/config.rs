//! Configuration management CLI commands.
//!
//! Provides `config get`, `config set`, `config list`, and `config path` commands
//! for viewing and modifying configuration settings from the command line.

use clap::Subcommand;
use rangeload::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// Configuration key in format section.key (e.g., downloads.max_concurrent)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key in format section.key (e.g., downloads.max_concurrent)
        key: String,

        /// Value to set
        value: String,
    },

    /// List all configuration settings
    List,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => run_get(&key),
        ConfigCommands::Set { key, value } => run_set(&key, &value),
        ConfigCommands::List => run_list(),
        ConfigCommands::Path => run_path(),
    }
}

fn unknown_key(key: &str) -> CliError {
    CliError::Config(format!(
        "Unknown configuration key '{}'. Use 'rangeload config list' to see available keys.",
        key
    ))
}

/// Get a configuration value.
fn run_get(key: &str) -> Result<(), CliError> {
    let config = ConfigFile::load()?;
    let value = config.get(key).ok_or_else(|| unknown_key(key))?;
    println!("{}", value);
    Ok(())
}

/// Set a configuration value.
fn run_set(key: &str, value: &str) -> Result<(), CliError> {
    let mut config = ConfigFile::load()?;
    if config.get(key).is_none() {
        return Err(unknown_key(key));
    }
    config.set(key, value)?;
    config.save()?;

    println!("Set {} = {}", key, value);
    Ok(())
}

/// List all configuration settings.
fn run_list() -> Result<(), CliError> {
    let config = ConfigFile::load()?;

    println!("Configuration Settings");
    println!("======================");
    println!();

    let mut current_section = "";

    for (section, key, value) in config.entries() {
        // Print section header when section changes
        if section != current_section {
            if !current_section.is_empty() {
                println!();
            }
            println!("[{}]", section);
            current_section = section;
        }
        println!("  {} = {}", key, value);
    }

    Ok(())
}

/// Show the configuration file path.
fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path().display());
    Ok(())
}
