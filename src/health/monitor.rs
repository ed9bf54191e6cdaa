//! Periodic background probing of both tiers.

use crate::circuit_breaker::CircuitStatus;
use crate::executor::{attempt_once, ReplaySummary, ResilientQueryExecutor};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Configuration for the health monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMonitorConfig {
    /// Time between probes.
    pub interval: Duration,

    /// Deadline for each probe.
    pub probe_timeout: Duration,

    /// Deferred writes replayed per tick after a successful durable probe.
    pub replay_batch: usize,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(5),
            replay_batch: 100,
        }
    }
}

impl HealthMonitorConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the probe interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the probe deadline.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sets how many deferred writes are replayed per tick.
    pub fn with_replay_batch(mut self, batch: usize) -> Self {
        self.replay_batch = batch;
        self
    }
}

/// What a single tick observed.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Whether the durable probe succeeded.
    pub durable_ok: bool,
    /// Whether the cache probe succeeded. `None` when no cache backend is configured.
    pub cache_ok: Option<bool>,
    /// Replay results, when deferred writes were replayed.
    pub replayed: Option<ReplaySummary>,
}

/// Probes the durable store and the cache backend on a fixed interval.
///
/// Each tick updates the shared [`ConnectionHealth`](crate::health::ConnectionHealth).
/// While the breaker is closed, probe outcomes are reported to it like any
/// other call, so an idle system still trips on a dead store. After a
/// successful durable probe any deferred writes are replayed.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    executor: Arc<ResilientQueryExecutor>,
    config: HealthMonitorConfig,
}

impl HealthMonitor {
    /// Creates a monitor for `executor`.
    pub fn new(executor: Arc<ResilientQueryExecutor>, config: HealthMonitorConfig) -> Self {
        Self { executor, config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &HealthMonitorConfig {
        &self.config
    }

    /// Runs one round of probes.
    pub async fn tick(&self) -> TickReport {
        let store = self.executor.store();
        let breaker = self.executor.breaker();
        let health = self.executor.health();

        let durable_ok = match attempt_once(store.name(), self.config.probe_timeout, store.probe()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(backend = store.name(), error = %e, "Durable store probe failed");
                false
            }
        };
        health.set_durable_available(durable_ok);

        if breaker.status() == CircuitStatus::Closed {
            if durable_ok {
                breaker.record_success();
            } else {
                breaker.record_failure();
            }
        }

        let cache_ok = match self.executor.cache() {
            Some(cache) if cache.has_backend() => {
                let ok = cache.probe().await;
                health.set_cache_available(ok);
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(purged = purged, "Purged expired fallback cache entries");
                }
                Some(ok)
            }
            Some(cache) => {
                cache.purge_expired();
                None
            }
            None => None,
        };

        health.record_probe(Utc::now());

        let replayed = if durable_ok && self.executor.deferred_len() > 0 {
            Some(self.executor.replay_deferred(self.config.replay_batch).await)
        } else {
            None
        };

        debug!(
            durable_ok = durable_ok,
            cache_ok = ?cache_ok,
            breaker = %breaker.status(),
            "Health probe complete"
        );

        TickReport {
            durable_ok,
            cache_ok,
            replayed,
        }
    }

    /// Runs [`tick`](Self::tick) on the configured interval in a background task.
    ///
    /// The first tick runs immediately. Dropping the returned handle stops
    /// the task before its next tick.
    pub fn spawn(self) -> MonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        info!(
            interval_secs = self.config.interval.as_secs(),
            backend = self.executor.store().name(),
            "Starting health monitor"
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Health monitor stopped");
        });

        MonitorHandle { shutdown_tx, task }
    }
}

/// Handle to a running [`HealthMonitor`] task.
#[derive(Debug)]
pub struct MonitorHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stops the monitor after any in-progress tick and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                warn!(error = %e, "Health monitor task ended abnormally");
            }
        }
    }

    /// Cancels the monitor immediately, even mid-tick.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Returns `true` once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
