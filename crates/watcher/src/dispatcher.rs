//! Background dispatcher
//!
//! A single thread sweeps every registered watch in path order, drains its
//! pending events and:
//! - registers newly created subdirectories that fit the depth budget
//! - retracts watches for deleted directories
//! - records each event in the event log
//! - invokes the registration's callback in-line
//!
//! Errors inside a sweep are logged and never reach callers.

use crate::event::{WatchEvent, WatchEventKind};
use crate::registry::WatchRegistration;
use crate::state::WatchState;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Lifecycle of the dispatcher thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// No thread running
    Idle,
    /// Thread started and sweeping
    Running,
    /// Stop requested; the current sweep is finishing
    Stopping,
}

/// Counters for one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Registrations polled
    pub watches_polled: usize,
    /// Events recorded and dispatched
    pub events: usize,
    /// Registrations skipped because polling failed
    pub failures: usize,
}

/// Run one full sweep over a snapshot of the registry
pub(crate) fn sweep(state: &WatchState) -> SweepStats {
    let mut stats = SweepStats::default();

    // Snapshot is sorted by path so processing order is deterministic
    for (path, registration) in state.registry.snapshot() {
        stats.watches_polled += 1;

        let events = match registration.poll() {
            Ok(events) => events,
            Err(err) => {
                warn!("Skipping watch {} for this sweep: {}", path.display(), err);
                stats.failures += 1;
                continue;
            }
        };

        for native in events {
            let changed = if native.name.as_os_str().is_empty() {
                path.clone()
            } else {
                path.join(&native.name)
            };

            // Coverage follows the tree whatever the registration subscribes to
            match native.kind {
                WatchEventKind::Created => {
                    if changed.is_dir() {
                        propagate(state, &registration, &changed);
                    } else {
                        debug!("No propagation for non-directory {}", changed.display());
                    }
                }
                WatchEventKind::Deleted => {
                    if state.registry.contains(&changed) {
                        let retracted = state.deregister_subtree(&changed);
                        debug!("Deleted {} retracted {} watches", changed.display(), retracted);
                    }
                }
                WatchEventKind::Modified | WatchEventKind::Overflow => {}
            }

            // Overflow is delivered regardless of subscription
            if native.kind != WatchEventKind::Overflow && !registration.kinds().contains(native.kind) {
                continue;
            }

            state.log.record(&changed, native.kind);

            let event = WatchEvent {
                kind: native.kind,
                context: native.name,
            };
            dispatch(&registration, &changed, &event);
            stats.events += 1;
        }
    }

    stats
}

/// Register a newly created directory if its nearest registered ancestor
/// still has budget for it
fn propagate(state: &WatchState, reporter: &WatchRegistration, created: &Path) {
    let Some(ancestor) = state.registry.nearest_ancestor(created) else {
        debug!("No registered ancestor for {}", created.display());
        return;
    };

    let distance = created
        .strip_prefix(ancestor.path())
        .map(|rel| rel.components().count())
        .unwrap_or(0);
    if distance == 0 {
        debug!("Skipped registration of {}: already registered", created.display());
        return;
    }

    if !state.config.follow_links && is_symlink(created) {
        debug!("Not following symbolic link {}", created.display());
        return;
    }

    let budget = ancestor.remaining_depth();
    if distance > budget {
        debug!(
            "Skipping registration of {} past max depth {}",
            created.display(),
            budget
        );
        return;
    }

    match state.register_tree(created, budget - 1, reporter.kinds(), reporter.callback()) {
        Ok(stats) => debug!(
            "Propagated watch to {} ({} directories)",
            created.display(),
            stats.directories
        ),
        Err(err) => warn!("Failed to propagate watch to {}: {}", created.display(), err),
    }
}

fn is_symlink(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|metadata| metadata.file_type().is_symlink())
        .unwrap_or(false)
}

fn dispatch(registration: &WatchRegistration, changed: &Path, event: &WatchEvent) {
    let callback = registration.callback();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(changed, event)));
    if outcome.is_err() {
        error!(
            "Callback panicked handling {} on {}",
            event.kind,
            changed.display()
        );
    }
}

struct Lifecycle {
    state: DispatcherState,
    /// Bumped on every start so a finished thread only resets its own run
    generation: u64,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

/// Owner of the single dispatcher thread
pub(crate) struct Dispatcher {
    lifecycle: Arc<Mutex<Lifecycle>>,
    switch: Arc<AtomicBool>,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self {
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                state: DispatcherState::Idle,
                generation: 0,
                stop_tx: None,
                thread: None,
            })),
            switch: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn state(&self) -> DispatcherState {
        self.lifecycle.lock().state
    }

    /// Start the thread unless it is already running
    ///
    /// Returns whether a new thread was started.
    pub(crate) fn start(&self, state: Arc<WatchState>) -> crate::Result<bool> {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.state {
            DispatcherState::Running => return Ok(false),
            DispatcherState::Stopping => {
                warn!("Dispatcher is stopping; not starting a new one");
                return Ok(false);
            }
            DispatcherState::Idle => {}
        }
        if !state.config.dispatcher_enabled {
            debug!("Dispatcher disabled by configuration");
            return Ok(false);
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let generation = lifecycle.generation + 1;
        let interval = state.config.sweep_interval();
        let switch = Arc::clone(&self.switch);
        let shared_lifecycle = Arc::clone(&self.lifecycle);
        switch.store(true, Ordering::Release);

        let thread = thread::Builder::new()
            .name("depthwatch-dispatcher".to_string())
            .spawn(move || {
                run(&state, &switch, &stop_rx, interval);

                let mut lifecycle = shared_lifecycle.lock();
                if lifecycle.generation == generation {
                    lifecycle.state = DispatcherState::Idle;
                    lifecycle.stop_tx = None;
                    lifecycle.thread = None;
                }
            })
            .map_err(crate::WatchError::DispatcherSpawn)?;

        lifecycle.generation = generation;
        lifecycle.state = DispatcherState::Running;
        lifecycle.stop_tx = Some(stop_tx);
        lifecycle.thread = Some(thread);
        Ok(true)
    }

    /// Flip the switch, interrupt the pause between sweeps and wait for the
    /// thread to finish
    ///
    /// Called from a callback on the dispatcher thread itself, this returns
    /// without waiting; the thread exits after the current sweep.
    pub(crate) fn shutdown(&self) {
        let (thread, generation) = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state != DispatcherState::Running {
                return;
            }
            lifecycle.state = DispatcherState::Stopping;
            self.switch.store(false, Ordering::Release);
            if let Some(stop_tx) = lifecycle.stop_tx.take() {
                let _ = stop_tx.try_send(());
            }
            (lifecycle.thread.take(), lifecycle.generation)
        };

        let Some(thread) = thread else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            error!("Dispatcher thread panicked");
        }

        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.generation == generation {
            lifecycle.state = DispatcherState::Idle;
        }
    }
}

fn run(state: &WatchState, switch: &AtomicBool, stop_rx: &Receiver<()>, interval: Duration) {
    info!("Dispatcher started (sweep interval: {:?})", interval);

    // The switch is read once per sweep, not per watch
    while switch.load(Ordering::Acquire) {
        sweep(state);

        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!("Dispatcher stopped");
}
