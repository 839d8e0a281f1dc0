//! Stream events for a watched tree

use anyhow::{Context, Result};
use crossbeam_channel::RecvTimeoutError;
use depthwatch::{TreeWatcher, WatchConfig, WatchEventKind};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Longest wait before checking for an interrupt
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(
    config: WatchConfig,
    path: &Path,
    depth: usize,
    events: &[String],
    duration: Option<u64>,
) -> Result<()> {
    // Installed first so an early Ctrl-C still ends with a summary
    let interrupted = Arc::new(AtomicBool::new(false));
    for signal in signal_hook::consts::TERM_SIGNALS {
        signal_hook::flag::register(*signal, Arc::clone(&interrupted))
            .context("Failed to install signal handler")?;
    }

    let kinds = events
        .iter()
        .map(|name| name.parse::<WatchEventKind>())
        .collect::<Result<Vec<_>, _>>()?;

    let watcher = TreeWatcher::new(config);
    let (tx, rx) = crossbeam_channel::unbounded::<(PathBuf, WatchEventKind)>();

    let stats = watcher
        .register(path, depth, &kinds, move |changed, event| {
            let _ = tx.send((changed.to_path_buf(), event.kind));
        })
        .with_context(|| format!("Failed to watch {}", path.display()))?;

    eprintln!(
        "Watching {} ({} directories, depth {})",
        path.display().to_string().cyan(),
        stats.directories,
        depth
    );

    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    debug!("Watch config: {:?}", watcher.config());

    loop {
        if interrupted.load(Ordering::Relaxed) {
            info!("Interrupted, stopping watch");
            break;
        }

        let wait = match deadline {
            Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) => remaining.min(POLL_INTERVAL),
                None => break,
            },
            None => POLL_INTERVAL,
        };

        match rx.recv_timeout(wait) {
            Ok((changed, kind)) => println!("{}\t{}", colored(kind), changed.display()),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    watcher.shutdown();
    info!("Dispatcher stopped for {}", path.display());
    print_summary(&watcher);
    Ok(())
}

fn colored(kind: WatchEventKind) -> String {
    match kind {
        WatchEventKind::Created => kind.green().to_string(),
        WatchEventKind::Deleted => kind.red().to_string(),
        WatchEventKind::Modified => kind.yellow().to_string(),
        WatchEventKind::Overflow => kind.magenta().to_string(),
    }
}

fn print_summary(watcher: &TreeWatcher) {
    let mut recorded: Vec<_> = watcher.triggered_events().into_iter().collect();
    recorded.sort_by(|a, b| a.0.cmp(&b.0));

    eprintln!();
    eprintln!("{}", "Event summary".bold());
    for (path, kinds) in recorded {
        eprintln!("  {:>4}  {}", kinds.len(), path.display());
    }
}
