//! Get command - download one or more URLs.

use std::path::PathBuf;
use std::sync::Arc;

use rangeload::{DownloadId, Engine, EngineConfig};
use tracing::info;

use crate::error::CliError;
use crate::progress::ProgressDisplay;
use crate::runner::CliRunner;

/// Arguments for the get command.
pub struct GetArgs {
    pub urls: Vec<String>,
    pub output_dir: Option<PathBuf>,
    pub filename: Option<String>,
    pub referrer: Option<String>,
    pub threads: Option<usize>,
    pub concurrent: Option<usize>,
    pub chunk_size: Option<u64>,
    pub quiet: bool,
    pub verbose: bool,
}

/// Run the get command.
pub fn run(args: GetArgs) -> Result<(), CliError> {
    if args.urls.is_empty() {
        return Err(CliError::Config("no URLs given".to_string()));
    }
    if args.filename.is_some() && args.urls.len() > 1 {
        return Err(CliError::Config(
            "--output-name can only be used with a single URL".to_string(),
        ));
    }

    let runner = CliRunner::new(args.verbose)?;
    runner.log_startup("get");
    let config = runner.config();

    // CLI > config file > defaults
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.downloads.directory.clone());
    let engine_config = apply_overrides(config.to_engine_config(), &args);

    let engine = Arc::new(Engine::new(engine_config)?);
    let mut events = engine.subscribe();

    // Weak so the handler does not keep the engine alive after we return.
    let handle = Arc::downgrade(&engine);
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received interrupt, canceling downloads...");
        if let Some(engine) = handle.upgrade() {
            engine.shutdown();
        }
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let ids = args
        .urls
        .iter()
        .map(|url| {
            engine.submit(
                url.clone(),
                &output_dir,
                args.filename.clone(),
                args.referrer.clone(),
            )
        })
        .collect::<Result<Vec<DownloadId>, _>>()?;

    if !args.quiet {
        println!(
            "Downloading {} file(s) to {}",
            ids.len(),
            output_dir.display()
        );
    }

    let summary = ProgressDisplay::new(args.quiet).run(&mut events, &ids);
    engine.shutdown();

    info!(
        completed = summary.completed,
        failed = summary.failed,
        canceled = summary.canceled,
        "Downloads finished"
    );

    if !args.quiet {
        for record in engine.list() {
            if let Some(message) = &record.error_message {
                eprintln!("{}: {}", record.url, message);
            }
        }
    }

    let failed = ids.len() - summary.completed;
    if failed > 0 {
        return Err(CliError::Incomplete {
            failed,
            total: ids.len(),
        });
    }
    Ok(())
}

fn apply_overrides(mut config: EngineConfig, args: &GetArgs) -> EngineConfig {
    if let Some(threads) = args.threads {
        config = config.with_max_threads_per_download(threads);
    }
    if let Some(concurrent) = args.concurrent {
        config = config.with_max_concurrent_downloads(concurrent);
    }
    if let Some(chunk_size) = args.chunk_size {
        config = config.with_chunk_size(chunk_size);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> GetArgs {
        GetArgs {
            urls: vec!["http://example.com/a".to_string()],
            output_dir: None,
            filename: None,
            referrer: None,
            threads: None,
            concurrent: None,
            chunk_size: None,
            quiet: true,
            verbose: false,
        }
    }

    #[test]
    fn test_overrides_win_over_config() {
        let mut args = args();
        args.threads = Some(8);
        args.chunk_size = Some(4096);

        let config = apply_overrides(EngineConfig::default(), &args);
        assert_eq!(config.max_threads_per_download, 8);
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(
            config.max_concurrent_downloads,
            EngineConfig::default().max_concurrent_downloads
        );
    }

    #[test]
    fn test_filename_requires_single_url() {
        let mut args = args();
        args.urls.push("http://example.com/b".to_string());
        args.filename = Some("x.bin".to_string());

        assert!(matches!(run(args), Err(CliError::Config(_))));
    }

    #[test]
    fn test_no_urls_rejected() {
        let mut args = args();
        args.urls.clear();
        assert!(matches!(run(args), Err(CliError::Config(_))));
    }
}
