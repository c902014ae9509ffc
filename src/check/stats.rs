// SPDX-License-Identifier: MIT
//! Per-check execution statistics.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Accumulated execution history for one check identity.
///
/// Created lazily by the stats registry on the first completed run and
/// retained for the lifetime of the process. Durations are recorded in
/// whole milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckStats {
    /// Display name of the check.
    pub check_name: String,
    /// Completed runs, successful or not.
    pub total_runs: u64,
    /// Runs that returned an error.
    pub total_errors: u64,
    /// Warnings accumulated across all runs.
    pub total_warnings: u64,
    /// Duration of the most recent run.
    pub last_execution_ms: u64,
    /// Mean duration across all runs.
    pub average_execution_ms: u64,
    /// Fastest run observed.
    pub min_execution_ms: u64,
    /// Slowest run observed.
    pub max_execution_ms: u64,
    /// Error message of the most recent run, if it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Warnings produced by the most recent run.
    pub last_warnings: Vec<String>,
    /// ISO-8601 timestamp of the most recent update.
    pub updated_at: String,
}

impl CheckStats {
    /// Create an empty entry for the named check.
    pub fn new(check_name: impl Into<String>) -> Self {
        Self {
            check_name: check_name.into(),
            total_runs: 0,
            total_errors: 0,
            total_warnings: 0,
            last_execution_ms: 0,
            average_execution_ms: 0,
            min_execution_ms: 0,
            max_execution_ms: 0,
            last_error: None,
            last_warnings: Vec::new(),
            updated_at: Utc::now().to_rfc3339(),
        }
    }

    /// Fold one completed run into the entry.
    pub fn add(&mut self, elapsed: Duration, error: Option<&anyhow::Error>, warnings: &[String]) {
        let elapsed_ms = elapsed.as_millis() as u64;

        if self.total_runs == 0 {
            self.min_execution_ms = elapsed_ms;
            self.max_execution_ms = elapsed_ms;
        } else {
            self.min_execution_ms = self.min_execution_ms.min(elapsed_ms);
            self.max_execution_ms = self.max_execution_ms.max(elapsed_ms);
        }

        // Incremental mean; integer rounding is fine at millisecond grain.
        self.average_execution_ms =
            (self.average_execution_ms * self.total_runs + elapsed_ms) / (self.total_runs + 1);
        self.total_runs += 1;
        self.last_execution_ms = elapsed_ms;

        match error {
            Some(err) => {
                self.total_errors += 1;
                self.last_error = Some(err.to_string());
            }
            None => {
                self.last_error = None;
            }
        }

        self.total_warnings += warnings.len() as u64;
        self.last_warnings = warnings.to_vec();
        self.updated_at = Utc::now().to_rfc3339();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn first_run_seeds_min_and_max() {
        let mut stats = CheckStats::new("disk");
        stats.add(Duration::from_millis(40), None, &[]);

        assert_eq!(stats.total_runs, 1);
        assert_eq!(stats.total_errors, 0);
        assert_eq!(stats.last_execution_ms, 40);
        assert_eq!(stats.average_execution_ms, 40);
        assert_eq!(stats.min_execution_ms, 40);
        assert_eq!(stats.max_execution_ms, 40);
    }

    #[test]
    fn accumulates_durations_across_runs() {
        let mut stats = CheckStats::new("disk");
        stats.add(Duration::from_millis(10), None, &[]);
        stats.add(Duration::from_millis(30), None, &[]);
        stats.add(Duration::from_millis(20), None, &[]);

        assert_eq!(stats.total_runs, 3);
        assert_eq!(stats.last_execution_ms, 20);
        assert_eq!(stats.average_execution_ms, 20);
        assert_eq!(stats.min_execution_ms, 10);
        assert_eq!(stats.max_execution_ms, 30);
    }

    #[test]
    fn records_errors_and_clears_on_success() {
        let mut stats = CheckStats::new("ntp");
        stats.add(Duration::from_millis(5), Some(&anyhow!("clock skew")), &[]);
        assert_eq!(stats.total_errors, 1);
        assert_eq!(stats.last_error.as_deref(), Some("clock skew"));

        stats.add(Duration::from_millis(5), None, &[]);
        assert_eq!(stats.total_errors, 1);
        assert_eq!(stats.last_error, None);
    }

    #[test]
    fn records_warnings_per_run_and_in_total() {
        let mut stats = CheckStats::new("http");
        let warnings = vec!["slow response".to_string(), "cert expires soon".to_string()];
        stats.add(Duration::from_millis(5), None, &warnings);
        assert_eq!(stats.total_warnings, 2);
        assert_eq!(stats.last_warnings, warnings);

        stats.add(Duration::from_millis(5), None, &[]);
        assert_eq!(stats.total_warnings, 2);
        assert!(stats.last_warnings.is_empty());
    }
}
