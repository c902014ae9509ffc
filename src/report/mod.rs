// SPDX-License-Identifier: MIT
//! Reporting-sink contract.
//!
//! After every run, a worker emits a synthetic service check describing the
//! run's outcome. The sinks that receive those events live in the metric
//! aggregation subsystem; this module only defines the seam the runner
//! depends on.

use std::fmt;
use std::sync::Arc;

use crate::check::CheckId;
use serde::{Deserialize, Serialize};

/// Name of the synthetic service check emitted after every run.
pub const CHECK_STATUS_NAME: &str = "vigil.agent.check_status";

/// Severity of a service-check event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCheckStatus {
    /// The run completed without errors or warnings.
    Ok,
    /// The run completed but produced non-fatal warnings.
    Warning,
    /// The run returned an error.
    Critical,
}

impl ServiceCheckStatus {
    /// Derive the status of a run from its outcome.
    ///
    /// An error always wins over warnings.
    pub fn from_outcome(failed: bool, has_warnings: bool) -> Self {
        if failed {
            ServiceCheckStatus::Critical
        } else if has_warnings {
            ServiceCheckStatus::Warning
        } else {
            ServiceCheckStatus::Ok
        }
    }
}

impl fmt::Display for ServiceCheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceCheckStatus::Ok => write!(f, "ok"),
            ServiceCheckStatus::Warning => write!(f, "warning"),
            ServiceCheckStatus::Critical => write!(f, "critical"),
        }
    }
}

/// Destination for service-check events.
///
/// Implementations buffer events; [`commit`](ServiceCheckSink::commit)
/// flushes everything recorded since the previous commit.
pub trait ServiceCheckSink: Send + Sync {
    /// Record a named service-check event.
    fn service_check(
        &self,
        name: &str,
        status: ServiceCheckStatus,
        hostname: &str,
        tags: &[String],
        message: &str,
    );

    /// Flush recorded events to the aggregation pipeline.
    fn commit(&self);
}

/// Resolves the sink a given check should report through.
///
/// Workers fall back to [`default_sink`](SinkResolver::default_sink) when
/// identity-specific resolution fails, and skip reporting entirely when no
/// sink resolves at all.
pub trait SinkResolver: Send + Sync {
    /// Sink dedicated to the given check identity.
    fn sink_for(&self, id: &CheckId) -> anyhow::Result<Arc<dyn ServiceCheckSink>>;

    /// Fallback sink shared by checks without a dedicated one.
    fn default_sink(&self) -> anyhow::Result<Arc<dyn ServiceCheckSink>>;
}

/// Resolver that never yields a sink.
///
/// For embedders that do not forward run outcomes anywhere; the runner
/// still executes checks and tracks statistics.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSinkResolver;

impl SinkResolver for NullSinkResolver {
    fn sink_for(&self, id: &CheckId) -> anyhow::Result<Arc<dyn ServiceCheckSink>> {
        anyhow::bail!("no sink configured for check id {id}")
    }

    fn default_sink(&self) -> anyhow::Result<Arc<dyn ServiceCheckSink>> {
        anyhow::bail!("no default sink configured")
    }
}
