//! Rangeload CLI - Command-line interface
//!
//! This binary provides a command-line interface to the rangeload library.

mod commands;
mod error;
mod progress;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::get::GetArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "rangeload", version, about = "Concurrent, resumable HTTP downloads")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download one or more URLs
    Get {
        /// URLs to download
        #[arg(required = true)]
        urls: Vec<String>,

        /// Destination directory (default: downloads.directory from config)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Output filename (single URL only; default: last URL path component)
        #[arg(short = 'n', long)]
        output_name: Option<String>,

        /// Referer header sent with every request
        #[arg(long)]
        referrer: Option<String>,

        /// Parallel segments per download
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Downloads running at the same time
        #[arg(short, long)]
        concurrent: Option<usize>,

        /// Target segment size in bytes
        #[arg(long)]
        chunk_size: Option<u64>,

        /// Hide progress bars
        #[arg(short, long)]
        quiet: bool,

        /// Mirror logs to stderr
        #[arg(short, long)]
        verbose: bool,
    },

    /// Create the configuration file with default settings
    Init,

    /// View or change configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Get {
            urls,
            output_dir,
            output_name,
            referrer,
            threads,
            concurrent,
            chunk_size,
            quiet,
            verbose,
        } => commands::get::run(GetArgs {
            urls,
            output_dir,
            filename: output_name,
            referrer,
            threads,
            concurrent,
            chunk_size,
            quiet,
            verbose,
        }),
        Commands::Init => commands::init::run(),
        Commands::Config { command } => commands::config::run(command),
    }
}
