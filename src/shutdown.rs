//! Process exit: quit both units and wait for them, within a grace period.

// Rust guideline compliant 2026-02

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::ENGINE_UNIT;
use crate::irc::CLIENT_UNIT;
use crate::supervisor::{Registry, Supervisor, UnitReport};

/// Longest the process waits for units to wind down after a quit.
pub const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Units told to quit on shutdown, in order.
const SHUTDOWN_ORDER: [&str; 2] = [ENGINE_UNIT, CLIENT_UNIT];

/// Stops supervision and sends `quit` to every unit.
#[derive(Debug, Clone)]
pub struct ShutdownHook {
    registry: Registry,
    stopping: Arc<AtomicBool>,
}

impl ShutdownHook {
    /// Hook bound to `supervisor`'s units.
    pub fn new(supervisor: &Supervisor) -> Self {
        Self {
            registry: supervisor.registry().clone(),
            stopping: supervisor.stopping_flag(),
        }
    }

    /// Disable restarts and quit the engine, then the connection.
    ///
    /// Fire-and-forget; calling it again only resends the quits.
    pub fn trigger(&self) {
        if !self.stopping.swap(true, Ordering::SeqCst) {
            log::info!("[Shutdown] Stopping units");
        }
        for name in SHUTDOWN_ORDER {
            match self.registry.lookup(name) {
                Some(handle) => handle.quit(),
                None => log::debug!("[Shutdown] Unit '{}' not registered", name),
            }
        }
    }

    /// Whether shutdown has started.
    pub fn is_triggered(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

/// How often [`wait_for_flag`] checks the signal flag.
const SIGNAL_POLL: Duration = Duration::from_millis(100);

/// Set `flag` on SIGINT, SIGTERM or SIGHUP.
pub fn register_signals(flag: &Arc<AtomicBool>) -> std::io::Result<()> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};

    for signal in [SIGINT, SIGTERM, SIGHUP] {
        signal_hook::flag::register(signal, Arc::clone(flag))?;
    }
    Ok(())
}

/// Resolve once `flag` is set.
pub async fn wait_for_flag(flag: &AtomicBool) {
    while !flag.load(Ordering::Relaxed) {
        tokio::time::sleep(SIGNAL_POLL).await;
    }
}

/// Wait for every supervised unit, giving up after `grace`.
///
/// Returns `None` if the grace period ran out first.
pub async fn wait_for_units(supervisor: Supervisor, grace: Duration) -> Option<Vec<UnitReport>> {
    match tokio::time::timeout(grace, supervisor.wait()).await {
        Ok(reports) => {
            for report in &reports {
                log::info!(
                    "[Shutdown] Unit '{}' finished after {} restart(s)",
                    report.name,
                    report.restarts
                );
            }
            Some(reports)
        }
        Err(_elapsed) => {
            log::warn!(
                "[Shutdown] Units still running after {:?}, exiting anyway",
                grace
            );
            None
        }
    }
}
