// SPDX-License-Identifier: MIT
//! Runner statistics: aggregate counters and the per-check registry.
//!
//! Both live on the runner instance itself; introspection endpoints read
//! them through snapshots instead of ambient global state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::check::{Check, CheckId, CheckStats};

/// In-process counters shared by all workers of one runner.
#[derive(Debug, Default)]
pub struct RunnerCounters {
    /// Live worker tasks.
    pub(crate) workers: AtomicUsize,
    /// Checks currently executing.
    pub(crate) running_checks: AtomicU64,
    /// Completed runs, successful or not.
    pub(crate) runs: AtomicU64,
    /// Runs that returned an error.
    pub(crate) errors: AtomicU64,
    /// Warnings produced across all runs.
    pub(crate) warnings: AtomicU64,
}

impl RunnerCounters {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Consistent-enough point-in-time view for diagnostics.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            workers: self.workers.load(Ordering::Relaxed),
            running_checks: self.running_checks.load(Ordering::Relaxed),
            runs: self.runs.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`RunnerCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub workers: usize,
    pub running_checks: u64,
    pub runs: u64,
    pub errors: u64,
    pub warnings: u64,
}

/// Per-check-identity execution statistics, safe under concurrent workers.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    checks: RwLock<HashMap<CheckId, CheckStats>>,
}

impl StatsRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fold one completed run into the entry for the check's identity,
    /// creating the entry on first use.
    pub(crate) async fn record(
        &self,
        check: &dyn Check,
        elapsed: Duration,
        error: Option<&anyhow::Error>,
        warnings: &[String],
    ) {
        let mut checks = self.checks.write().await;
        checks
            .entry(check.id())
            .or_insert_with(|| CheckStats::new(check.name()))
            .add(elapsed, error, warnings);
    }

    /// Copy of the full registry for external introspection.
    pub async fn snapshot(&self) -> HashMap<CheckId, CheckStats> {
        self.checks.read().await.clone()
    }
}
