// SPDX-License-Identifier: MIT
//! Check-execution runner.
//!
//! The runner owns the dispatch queue, the set of currently-executing check
//! identities, and the worker pool:
//! - Unbounded multi-producer queue; submission never blocks.
//! - A pool of worker tasks, either pinned at a size chosen at start or
//!   grown one worker at a time as observed demand outpaces the pool.
//! - At most one in-flight execution per check identity; re-entrant
//!   submissions are skipped at dispatch time, not rejected at submission.
//! - Cooperative shutdown: closing the queue drains the workers, and
//!   in-flight checks get a bounded grace period to acknowledge `stop`.

pub mod stats;
mod worker;

pub use stats::{CounterSnapshot, StatsRegistry};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::check::{Check, CheckId, CheckStats};
use crate::hostname::{HostnameSource, SystemHostname};
use crate::report::{NullSinkResolver, SinkResolver};
use stats::RunnerCounters;
use worker::Worker;

/// Pool size when the runner starts in elastic mode.
pub const DEFAULT_NUM_WORKERS: usize = 6;
/// Hard cap on the worker pool, elastic mode included.
pub const MAX_NUM_WORKERS: usize = 100;
/// How long a check gets to acknowledge a stop request.
pub const STOP_CHECK_GRACE: Duration = Duration::from_millis(500);

/// Errors returned by the runner's public operations.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A targeted stop was not acknowledged within the grace period.
    #[error("timeout during stop operation on check id {0}")]
    StopTimeout(CheckId),
}

/// Construction options for [`Runner::new`].
pub struct RunnerOptions {
    /// Pool size. `None` starts the pool at [`DEFAULT_NUM_WORKERS`] and
    /// lets it grow with demand; `Some(n)` pins it at `n` forever (values
    /// below 1 are clamped to 1).
    pub num_workers: Option<usize>,
    /// Resolves the reporting sink for each check identity.
    pub sinks: Arc<dyn SinkResolver>,
    /// Hostname attached to synthetic service checks.
    pub hostname: Arc<dyn HostnameSource>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            num_workers: None,
            sinks: Arc::new(NullSinkResolver),
            hostname: Arc::new(SystemHostname::new()),
        }
    }
}

/// The check-execution runner.
///
/// Cheaply shareable: create once with [`Runner::new`] and hand the `Arc`
/// to producers and introspection endpoints.
pub struct Runner {
    pub(crate) pending_tx: async_channel::Sender<Arc<dyn Check>>,
    pub(crate) pending_rx: async_channel::Receiver<Arc<dyn Check>>,
    /// Checks currently executing, at most one entry per identity.
    pub(crate) running_checks: Mutex<HashMap<CheckId, Arc<dyn Check>>>,
    running: AtomicBool,
    static_pool: bool,
    pub(crate) counters: RunnerCounters,
    pub(crate) check_stats: StatsRegistry,
    pub(crate) sinks: Arc<dyn SinkResolver>,
    pub(crate) hostname: Arc<dyn HostnameSource>,
}

impl Runner {
    /// Start a runner and spawn its initial worker pool.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(options: RunnerOptions) -> Arc<Self> {
        let (pending_tx, pending_rx) = async_channel::unbounded();
        let static_pool = options.num_workers.is_some();
        let num_workers = options.num_workers.unwrap_or(DEFAULT_NUM_WORKERS).max(1);

        let runner = Arc::new(Self {
            pending_tx,
            pending_rx,
            running_checks: Mutex::new(HashMap::new()),
            running: AtomicBool::new(true),
            static_pool,
            counters: RunnerCounters::new(),
            check_stats: StatsRegistry::new(),
            sinks: options.sinks,
            hostname: options.hostname,
        });

        runner.counters.workers.store(num_workers, Ordering::SeqCst);
        for _ in 0..num_workers {
            runner.spawn_worker();
        }

        info!(
            workers = num_workers,
            mode = if static_pool { "static" } else { "elastic" },
            "runner started"
        );
        runner
    }

    /// Enqueue a check for execution. Never blocks.
    ///
    /// Duplicate identities are tolerated here; deduplication happens at
    /// dispatch time. Once the runner is stopped the check is dropped with
    /// a warning.
    pub fn submit(&self, check: Arc<dyn Check>) {
        if !self.is_running() {
            warn!(check = %check.name(), "runner is stopped, dropping submitted check");
            return;
        }
        if let Err(err) = self.pending_tx.try_send(check) {
            // Unbounded queue: only reachable if the queue closed between
            // the state check and the send.
            warn!(check = %err.into_inner().name(), "dispatch queue closed, dropping submitted check");
        }
    }

    /// Submit-only handle to the dispatch queue for producer components.
    pub fn sender(&self) -> async_channel::Sender<Arc<dyn Check>> {
        self.pending_tx.clone()
    }

    /// Grow the worker pool if observed demand warrants it.
    ///
    /// Called by the external scheduler after it has inserted load into the
    /// queue. Adds at most one worker per call, and only while the demand
    /// exceeds the current pool by more than 5; no-op in static mode or at
    /// [`MAX_NUM_WORKERS`]. The pool never shrinks.
    pub fn update_num_workers(self: &Arc<Self>, num_checks: usize) {
        if self.static_pool {
            return;
        }
        loop {
            let current = self.counters.workers.load(Ordering::SeqCst);
            if current >= MAX_NUM_WORKERS {
                return;
            }
            if num_checks.saturating_sub(current) <= 5 {
                return;
            }
            if self
                .counters
                .workers
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                info!(workers = current + 1, "added worker to runner");
                self.spawn_worker();
                return;
            }
            // Lost a race with a concurrent resize; re-evaluate the demand
            // against the new count.
        }
    }

    /// Shut the runner down. Idempotent.
    ///
    /// Closes the dispatch queue, so workers exit once the backlog is
    /// drained, then asks every check still executing to stop. The requests
    /// run concurrently, so the call returns within roughly one grace
    /// period no matter how many checks are in flight; checks that do not
    /// acknowledge in time are logged and abandoned.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("runner already stopped, nothing to do");
            return;
        }

        info!("runner is shutting down");
        self.pending_rx.close();

        let still_running: Vec<Arc<dyn Check>> = {
            let running_checks = self.running_checks.lock().await;
            running_checks.values().cloned().collect()
        };

        let stops = still_running.into_iter().map(|check| async move {
            info!(check = %check.name(), "stopping check that is still running");
            if timeout(STOP_CHECK_GRACE, check.stop()).await.is_err() {
                error!(check = %check.name(), "check not responding to stop, timing out");
            }
        });
        join_all(stops).await;
    }

    /// Request a cooperative stop of one running check.
    ///
    /// A check that is not currently running is a successful no-op. A
    /// running check that does not acknowledge within the grace period
    /// yields [`RunnerError::StopTimeout`].
    pub async fn stop_check(&self, id: &CheckId) -> Result<(), RunnerError> {
        let check = {
            let running_checks = self.running_checks.lock().await;
            running_checks.get(id).cloned()
        };
        let Some(check) = check else {
            return Ok(());
        };

        debug!(check = %check.name(), "stopping check");
        timeout(STOP_CHECK_GRACE, check.stop())
            .await
            .map_err(|_| RunnerError::StopTimeout(id.clone()))
    }

    /// Whether the runner still accepts submissions.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Snapshot of the per-check statistics registry.
    pub async fn check_stats(&self) -> HashMap<CheckId, CheckStats> {
        self.check_stats.snapshot().await
    }

    /// Snapshot of the aggregate execution counters.
    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    fn spawn_worker(self: &Arc<Self>) {
        let worker = Worker::new(Arc::clone(self), self.pending_rx.clone());
        tokio::spawn(worker.run());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::ConfigData;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use std::time::Instant;

    struct TestCheck {
        name: String,
        fail: bool,
        has_run: AtomicBool,
    }

    impl TestCheck {
        fn named(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail: false,
                has_run: AtomicBool::new(false),
            })
        }

        fn failing(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail: true,
                has_run: AtomicBool::new(false),
            })
        }

        fn has_run(&self) -> bool {
            self.has_run.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Check for TestCheck {
        fn name(&self) -> &str {
            &self.name
        }
        fn configure(&mut self, _instance: ConfigData, _init: ConfigData) -> anyhow::Result<()> {
            Ok(())
        }
        fn interval(&self) -> Duration {
            Duration::from_secs(1)
        }
        async fn run(&self) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("a tremendous error occurred");
            }
            self.has_run.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn stop(&self) {}
        fn warnings(&self) -> Vec<String> {
            Vec::new()
        }
    }

    /// Check whose stop request is never acknowledged.
    struct UnstoppableCheck {
        name: String,
    }

    #[async_trait]
    impl Check for UnstoppableCheck {
        fn name(&self) -> &str {
            &self.name
        }
        fn configure(&mut self, _instance: ConfigData, _init: ConfigData) -> anyhow::Result<()> {
            Ok(())
        }
        fn interval(&self) -> Duration {
            Duration::from_secs(1)
        }
        async fn run(&self) -> anyhow::Result<()> {
            std::future::pending().await
        }
        async fn stop(&self) {
            std::future::pending().await
        }
        fn warnings(&self) -> Vec<String> {
            Vec::new()
        }
    }

    fn elastic_runner() -> Arc<Runner> {
        Runner::new(RunnerOptions::default())
    }

    /// Poll until `condition` holds, panicking after two seconds.
    async fn wait_until(what: &str, condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting until {what}");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn starts_with_default_pool_in_elastic_mode() {
        let runner = elastic_runner();
        assert!(runner.is_running());
        assert_eq!(runner.counters().workers, DEFAULT_NUM_WORKERS);
    }

    #[tokio::test]
    async fn runs_submitted_checks_and_records_outcomes() {
        let runner = elastic_runner();
        let ok = TestCheck::named("ok_check");
        let failing = TestCheck::failing("failing_check");

        runner.submit(ok.clone());
        runner.submit(failing.clone());
        wait_until("both checks have run", || runner.counters().runs == 2).await;

        assert!(ok.has_run());
        assert!(!failing.has_run());
        assert_eq!(runner.counters().errors, 1);

        let stats = runner.check_stats().await;
        assert_eq!(stats.get(&CheckId::new("ok_check")).unwrap().total_errors, 0);
        let failing_stats = stats.get(&CheckId::new("failing_check")).unwrap();
        assert_eq!(failing_stats.total_errors, 1);
        assert_eq!(
            failing_stats.last_error.as_deref(),
            Some("a tremendous error occurred")
        );

        runner.stop().await;
    }

    #[tokio::test]
    async fn skips_check_whose_identity_is_already_running() {
        let runner = elastic_runner();
        let check = TestCheck::named("dup_check");

        // Pin the identity as running, then submit a second instance of it.
        runner
            .running_checks
            .lock()
            .await
            .insert(check.id(), Arc::clone(&check) as Arc<dyn Check>);
        runner.submit(Arc::clone(&check) as Arc<dyn Check>);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!check.has_run());
        assert_eq!(runner.counters().runs, 0);

        runner.stop().await;
    }

    #[tokio::test]
    async fn stop_closes_the_queue_and_is_idempotent() {
        let runner = elastic_runner();
        runner.stop().await;
        assert!(!runner.is_running());
        assert!(runner.pending_rx.is_closed());

        // Stopping a stopped runner is a no-op.
        runner.stop().await;
    }

    #[tokio::test]
    async fn stop_returns_despite_unresponsive_checks() {
        let runner = elastic_runner();
        let hung: Arc<dyn Check> = Arc::new(UnstoppableCheck {
            name: "hung_check".to_string(),
        });
        runner
            .running_checks
            .lock()
            .await
            .insert(hung.id(), hung);

        let started = Instant::now();
        timeout(Duration::from_secs(2), runner.stop())
            .await
            .expect("stop must terminate with an unresponsive check in flight");
        assert!(started.elapsed() >= STOP_CHECK_GRACE);
    }

    #[tokio::test]
    async fn submit_after_stop_is_dropped() {
        let runner = elastic_runner();
        runner.stop().await;

        let check = TestCheck::named("late_check");
        runner.submit(check.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!check.has_run());
        assert_eq!(runner.counters().runs, 0);
    }

    #[tokio::test]
    async fn stop_check_on_absent_id_is_a_noop() {
        let runner = elastic_runner();
        assert!(runner.stop_check(&CheckId::new("absent")).await.is_ok());
        runner.stop().await;
    }

    #[tokio::test]
    async fn stop_check_stops_a_running_check() {
        let runner = elastic_runner();
        let check = TestCheck::named("stoppable");
        runner
            .running_checks
            .lock()
            .await
            .insert(check.id(), Arc::clone(&check) as Arc<dyn Check>);

        assert!(runner.stop_check(&check.id()).await.is_ok());
        runner.stop().await;
    }

    #[tokio::test]
    async fn stop_check_times_out_on_unresponsive_check() {
        let runner = elastic_runner();
        let hung: Arc<dyn Check> = Arc::new(UnstoppableCheck {
            name: "TestCheck".to_string(),
        });
        runner
            .running_checks
            .lock()
            .await
            .insert(hung.id(), hung);

        let err = runner
            .stop_check(&CheckId::new("TestCheck"))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "timeout during stop operation on check id TestCheck"
        );
        runner.stop().await;
    }

    #[tokio::test]
    async fn elastic_pool_grows_by_one_when_demand_warrants() {
        let runner = elastic_runner();
        assert_eq!(runner.counters().workers, 6);

        // 12 − 6 > 5: one worker is added.
        runner.update_num_workers(12);
        assert_eq!(runner.counters().workers, 7);

        // 12 − 7 = 5: not enough pressure to grow again.
        runner.update_num_workers(12);
        assert_eq!(runner.counters().workers, 7);

        // 13 − 7 > 5: grows again, one at a time.
        runner.update_num_workers(13);
        assert_eq!(runner.counters().workers, 8);

        runner.stop().await;
    }

    #[tokio::test]
    async fn elastic_pool_never_exceeds_the_cap() {
        let runner = elastic_runner();
        runner.counters.workers.store(MAX_NUM_WORKERS, Ordering::SeqCst);

        runner.update_num_workers(MAX_NUM_WORKERS + 50);
        assert_eq!(runner.counters().workers, MAX_NUM_WORKERS);

        runner.stop().await;
    }

    #[tokio::test]
    async fn static_pool_ignores_demand() {
        let runner = Runner::new(RunnerOptions {
            num_workers: Some(2),
            ..Default::default()
        });
        assert_eq!(runner.counters().workers, 2);

        runner.update_num_workers(100);
        assert_eq!(runner.counters().workers, 2);

        runner.stop().await;
    }
}
