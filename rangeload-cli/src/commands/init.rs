//! Init command - initialize configuration file.

use std::path::Path;

use rangeload::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Run the init command.
pub fn run() -> Result<(), CliError> {
    let path = config_file_path();
    let created = init_at(&path)?;

    if created {
        println!("Created configuration file: {}", path.display());
    } else {
        println!("Configuration file already exists: {}", path.display());
    }
    println!();
    println!("Edit this file to customize rangeload settings.");
    println!("CLI arguments override config file values when specified.");
    Ok(())
}

/// Write a default file at `path` unless one exists. Returns whether it was created.
fn init_at(path: &Path) -> Result<bool, CliError> {
    if path.exists() {
        // Validate it still parses.
        ConfigFile::load_from(path)?;
        return Ok(false);
    }
    ConfigFile::default().save_to(path)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_then_keeps_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rangeload").join("config.ini");

        assert!(init_at(&path).unwrap());
        assert!(path.exists());

        std::fs::write(&path, "[downloads]\nmax_concurrent = 9\n").unwrap();
        assert!(!init_at(&path).unwrap());
        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.downloads.max_concurrent, 9);
    }

    #[test]
    fn test_init_reports_broken_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        std::fs::write(&path, "[downloads]\nchunk_size = huge\n").unwrap();

        assert!(matches!(init_at(&path), Err(CliError::Engine(_))));
    }
}
