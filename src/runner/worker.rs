// SPDX-License-Identifier: MIT
//! Worker task: pulls checks off the dispatch queue and executes them.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error};

use crate::check::{Check, CheckId};
use crate::report::{ServiceCheckSink, ServiceCheckStatus, CHECK_STATUS_NAME};

use super::Runner;

/// One unit of concurrency in the runner's pool.
pub(crate) struct Worker {
    runner: Arc<Runner>,
    queue: async_channel::Receiver<Arc<dyn Check>>,
}

impl Worker {
    pub(crate) fn new(
        runner: Arc<Runner>,
        queue: async_channel::Receiver<Arc<dyn Check>>,
    ) -> Self {
        Self { runner, queue }
    }

    /// Receive and execute checks until the queue is closed and drained.
    pub(crate) async fn run(self) {
        debug!("worker ready to process checks");
        while let Ok(check) = self.queue.recv().await {
            self.process(check).await;
        }
        debug!("worker finished processing checks");
    }

    async fn process(&self, check: Arc<dyn Check>) {
        let id = check.id();

        // Claim the identity, or skip if another instance of it is already
        // executing. Check-and-insert happens under one lock acquisition.
        {
            let mut running_checks = self.runner.running_checks.lock().await;
            if running_checks.contains_key(&id) {
                debug!(check = %check.name(), "check is already running, skipping execution");
                return;
            }
            running_checks.insert(id.clone(), Arc::clone(&check));
        }
        self.runner
            .counters
            .running_checks
            .fetch_add(1, Ordering::Relaxed);

        debug!(check = %check.name(), "running check");
        let started = Instant::now();
        let result = check.run().await;
        let warnings = check.warnings();
        let elapsed = started.elapsed();

        if !warnings.is_empty() {
            self.runner
                .counters
                .warnings
                .fetch_add(warnings.len() as u64, Ordering::Relaxed);
        }
        if let Err(err) = &result {
            error!(check = %check.name(), error = %err, "error running check");
            self.runner.counters.errors.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(sink) = self.resolve_sink(&id, check.name()) {
            let status = ServiceCheckStatus::from_outcome(result.is_err(), !warnings.is_empty());
            let hostname = self.runner.hostname.hostname().unwrap_or_default();
            let tags = vec![format!("check:{}", check.name())];
            sink.service_check(CHECK_STATUS_NAME, status, &hostname, &tags, "");
            sink.commit();
        }

        self.runner.running_checks.lock().await.remove(&id);
        self.runner
            .counters
            .running_checks
            .fetch_sub(1, Ordering::Relaxed);
        self.runner
            .check_stats
            .record(check.as_ref(), elapsed, result.as_ref().err(), &warnings)
            .await;
        // Bumped last: once the run counter moves, the registry already
        // reflects this run.
        self.runner.counters.runs.fetch_add(1, Ordering::Relaxed);

        debug!(
            check = %check.name(),
            elapsed_ms = elapsed.as_millis() as u64,
            "done running check"
        );
    }

    fn resolve_sink(&self, id: &CheckId, name: &str) -> Option<Arc<dyn ServiceCheckSink>> {
        match self.runner.sinks.sink_for(id) {
            Ok(sink) => Some(sink),
            Err(err) => {
                debug!(check = %name, error = %err, "no dedicated sink for check, trying the default");
                match self.runner.sinks.default_sink() {
                    Ok(sink) => Some(sink),
                    Err(err) => {
                        error!(check = %name, error = %err, "no default sink available, skipping status report");
                        None
                    }
                }
            }
        }
    }
}
