//! Unit supervision and name-based handle lookup.
//!
//! A [`Unit`] is an independently failing piece of the bridge (the engine,
//! the IRC connection). Each call to [`Unit::run`] is one incarnation:
//! it starts from scratch and runs until it is told to stop or fails.
//!
//! The supervisor runs every unit on its own task and restarts it whenever
//! an incarnation returns an error or panics. How often, and how quickly,
//! is governed by an explicit [`RestartPolicy`]. The default is unlimited
//! restarts with no backoff.
//!
//! Units never see each other's internals. The [`Registry`] maps unit names
//! to [`UnitHandle`]s for things like the shutdown hook and the operator
//! console; chat traffic goes through handles injected at construction.

// Rust guideline compliant 2026-02

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

/// One independently supervised piece of the bridge.
#[async_trait]
pub trait Unit: Send + Sync + 'static {
    /// Registry name.
    fn name(&self) -> &'static str;

    /// Run one incarnation.
    ///
    /// `Ok(())` means the unit stopped on request and must not be
    /// restarted. An error means the incarnation died unexpectedly.
    async fn run(&self) -> anyhow::Result<()>;
}

/// Control surface every unit exposes through the registry.
pub trait UnitHandle: Send + Sync + fmt::Debug {
    /// Registry name.
    fn name(&self) -> &'static str;

    /// Ask the unit to stop. Fire-and-forget; takes effect at the unit's
    /// next loop iteration.
    fn quit(&self);
}

/// When to restart a failed unit.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Give up after this many restarts. `None` restarts forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_restarts: Option<u32>,
    /// Delay before each restart, in milliseconds.
    #[serde(default)]
    pub backoff_ms: u64,
}

impl RestartPolicy {
    /// Unlimited restarts, no delay.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Whether another restart is allowed after `restarts` so far.
    pub fn allows(&self, restarts: u32) -> bool {
        self.max_restarts.map_or(true, |max| restarts < max)
    }

    /// Delay before a restart.
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Name → handle lookup for supervised units.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    units: HashMap<&'static str, Arc<dyn UnitHandle>>,
}

impl Registry {
    /// Register a handle under its own name, replacing any previous one.
    pub fn register(&mut self, handle: Arc<dyn UnitHandle>) {
        self.units.insert(handle.name(), handle);
    }

    /// Look up a unit by name.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn UnitHandle>> {
        self.units.get(name).map(Arc::clone)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.units.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Summary of a supervised unit once it is no longer running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    /// Unit name.
    pub name: &'static str,
    /// How many times the unit was restarted.
    pub restarts: u32,
    /// `true` if the restart policy ran out.
    pub gave_up: bool,
}

/// Starts units and restarts them when they fail.
#[derive(Debug)]
pub struct Supervisor {
    policy: RestartPolicy,
    registry: Registry,
    stopping: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<UnitReport>>,
}

impl Supervisor {
    /// Create a supervisor with the given restart policy.
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            registry: Registry::default(),
            stopping: Arc::new(AtomicBool::new(false)),
            tasks: Vec::new(),
        }
    }

    /// Register `handle` and start supervising `unit`.
    pub fn supervise(&mut self, unit: Arc<dyn Unit>, handle: Arc<dyn UnitHandle>) {
        log::info!("[Supervisor] Supervising unit '{}'", unit.name());
        self.registry.register(handle);
        self.tasks.push(tokio::spawn(supervise_unit(
            unit,
            self.policy,
            Arc::clone(&self.stopping),
        )));
    }

    /// Registered unit handles.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Flag that, once set, stops all further restarts.
    pub fn stopping_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stopping)
    }

    /// Wait for every supervised unit to finish for good.
    pub async fn wait(self) -> Vec<UnitReport> {
        let mut reports = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            match task.await {
                Ok(report) => reports.push(report),
                Err(e) => log::error!("[Supervisor] Supervision task failed: {}", e),
            }
        }
        reports
    }
}

/// Run incarnations of `unit` until it stops cleanly, supervision is
/// stopping, or the policy gives up.
async fn supervise_unit(
    unit: Arc<dyn Unit>,
    policy: RestartPolicy,
    stopping: Arc<AtomicBool>,
) -> UnitReport {
    let name = unit.name();
    let mut restarts = 0;

    loop {
        let incarnation = Arc::clone(&unit);
        let outcome = tokio::spawn(async move { incarnation.run().await }).await;

        let reason = match outcome {
            Ok(Ok(())) => {
                log::info!("[Supervisor] Unit '{}' stopped", name);
                return UnitReport {
                    name,
                    restarts,
                    gave_up: false,
                };
            }
            Ok(Err(e)) => format!("{:#}", e),
            Err(e) if e.is_panic() => "panicked".to_string(),
            Err(e) => e.to_string(),
        };

        if stopping.load(Ordering::SeqCst) {
            log::info!(
                "[Supervisor] Unit '{}' ended during shutdown: {}",
                name,
                reason
            );
            return UnitReport {
                name,
                restarts,
                gave_up: false,
            };
        }

        if !policy.allows(restarts) {
            log::error!(
                "[Supervisor] Unit '{}' failed: {} (giving up after {} restart(s))",
                name,
                reason,
                restarts
            );
            return UnitReport {
                name,
                restarts,
                gave_up: true,
            };
        }

        restarts += 1;
        log::warn!(
            "[Supervisor] Unit '{}' failed: {} (restart #{})",
            name,
            reason,
            restarts
        );

        let backoff = policy.backoff();
        if !backoff.is_zero() {
            tokio::time::sleep(backoff).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    /// Fails the first `failures` incarnations, then stops cleanly.
    struct FlakyUnit {
        failures: u32,
        runs: AtomicU32,
        panic_instead: bool,
    }

    impl FlakyUnit {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                runs: AtomicU32::new(0),
                panic_instead: false,
            }
        }
    }

    #[async_trait]
    impl Unit for FlakyUnit {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn run(&self) -> anyhow::Result<()> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            if run < self.failures {
                if self.panic_instead {
                    panic!("incarnation {} blew up", run);
                }
                anyhow::bail!("incarnation {} failed", run);
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    struct NamedHandle(&'static str, Arc<AtomicBool>);

    impl UnitHandle for NamedHandle {
        fn name(&self) -> &'static str {
            self.0
        }

        fn quit(&self) {
            self.1.store(true, Ordering::SeqCst);
        }
    }

    fn handle(name: &'static str) -> Arc<dyn UnitHandle> {
        Arc::new(NamedHandle(name, Arc::new(AtomicBool::new(false))))
    }

    #[tokio::test]
    async fn test_failed_unit_is_restarted_until_it_stops() {
        let unit = Arc::new(FlakyUnit::new(3));
        let mut supervisor = Supervisor::new(RestartPolicy::unlimited());
        supervisor.supervise(Arc::clone(&unit) as Arc<dyn Unit>, handle("flaky"));

        let reports = supervisor.wait().await;
        assert_eq!(
            reports,
            vec![UnitReport {
                name: "flaky",
                restarts: 3,
                gave_up: false
            }]
        );
        assert_eq!(unit.runs.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_panicking_unit_is_restarted() {
        let unit = Arc::new(FlakyUnit {
            panic_instead: true,
            ..FlakyUnit::new(1)
        });
        let mut supervisor = Supervisor::new(RestartPolicy::unlimited());
        supervisor.supervise(Arc::clone(&unit) as Arc<dyn Unit>, handle("flaky"));

        let reports = supervisor.wait().await;
        assert_eq!(reports[0].restarts, 1);
        assert_eq!(unit.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_policy_limit_gives_up() {
        let unit = Arc::new(FlakyUnit::new(u32::MAX));
        let policy = RestartPolicy {
            max_restarts: Some(2),
            backoff_ms: 1,
        };
        let mut supervisor = Supervisor::new(policy);
        supervisor.supervise(Arc::clone(&unit) as Arc<dyn Unit>, handle("flaky"));

        let reports = supervisor.wait().await;
        assert!(reports[0].gave_up);
        assert_eq!(reports[0].restarts, 2);
        assert_eq!(unit.runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_restart_while_stopping() {
        let unit = Arc::new(FlakyUnit::new(u32::MAX));
        let mut supervisor = Supervisor::new(RestartPolicy::unlimited());
        supervisor.stopping_flag().store(true, Ordering::SeqCst);
        supervisor.supervise(Arc::clone(&unit) as Arc<dyn Unit>, handle("flaky"));

        let reports = supervisor.wait().await;
        assert_eq!(reports[0].restarts, 0);
        assert_eq!(unit.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registry_lookup() {
        let quit_flag = Arc::new(AtomicBool::new(false));
        let mut registry = Registry::default();
        registry.register(Arc::new(NamedHandle("megahal", Arc::clone(&quit_flag))));
        registry.register(handle("client"));

        assert_eq!(registry.names(), vec!["client", "megahal"]);
        assert!(registry.lookup("nobody").is_none());

        registry.lookup("megahal").unwrap().quit();
        assert!(quit_flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_restart_policy() {
        let unlimited = RestartPolicy::unlimited();
        assert!(unlimited.allows(u32::MAX - 1));
        assert!(unlimited.backoff().is_zero());

        let capped = RestartPolicy {
            max_restarts: Some(1),
            backoff_ms: 250,
        };
        assert!(capped.allows(0));
        assert!(!capped.allows(1));
        assert_eq!(capped.backoff(), Duration::from_millis(250));
    }
}
