//! Depthwatch CLI - depthwatch command

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

/// Depthwatch - depth-bounded recursive directory watching
#[derive(Parser)]
#[command(name = "depthwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (TOML, optional [watcher] table)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a directory tree and print events as they happen
    Watch {
        /// Directory to watch
        path: PathBuf,
        /// Levels below the root to watch (default: 1)
        #[arg(short, long, default_value = "1")]
        depth: usize,
        /// Comma-separated event kinds: created, deleted, modified, overflow
        #[arg(short, long, value_delimiter = ',', default_value = "created,deleted,modified")]
        events: Vec<String>,
        /// Stop after this many seconds (default: run until interrupted)
        #[arg(long)]
        duration: Option<u64>,
    },
    /// Register a directory tree and list the directories that get watched
    Paths {
        /// Directory to register
        path: PathBuf,
        /// Levels below the root to watch (default: 1)
        #[arg(short, long, default_value = "1")]
        depth: usize,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cmd::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Watch {
            path,
            depth,
            events,
            duration,
        } => cmd::watch::run(config, &path, depth, &events, duration),
        Commands::Paths { path, depth } => cmd::paths::run(config, &path, depth),
    }
}
