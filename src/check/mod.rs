// SPDX-License-Identifier: MIT
//! The check capability contract.
//!
//! A check is a unit of monitoring work: it collects metrics or health
//! signals from a local or remote source each time it runs. Checks are
//! implemented, configured, and loaded by subsystems outside this crate;
//! the runner only depends on the [`Check`] trait defined here.

pub mod stats;

pub use stats::CheckStats;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque configuration payload handed to [`Check::configure`].
///
/// Loaders read instance and init config as raw YAML; what the value means
/// is entirely up to the check implementation.
pub type ConfigData = serde_yaml::Value;

/// Stable, comparable check identity, derived from the check's name.
///
/// Two check instances with the same id are considered the same running
/// unit: the runner never executes them concurrently and accumulates their
/// statistics under one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckId(String);

impl CheckId {
    /// Derive an id from a check name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CheckId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for CheckId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Capability set the runner requires from every check.
///
/// Checks are submitted as `Arc<dyn Check>` and may execute truly
/// concurrently with one another, bounded only by the worker pool size.
///
/// # Cancellation is cooperative
///
/// [`stop`](Check::stop) is a request, not a guarantee. An implementation
/// that busy-loops or blocks on I/O without a cancel path cannot be
/// terminated; the runner's grace-period timeout bounds how long the
/// *runner* waits, not how long the check actually runs.
#[async_trait]
pub trait Check: Send + Sync {
    /// Human-readable display name.
    fn name(&self) -> &str;

    /// Stable identity, derived from the name.
    fn id(&self) -> CheckId {
        CheckId::new(self.name())
    }

    /// Configure the check from raw instance and init payloads.
    ///
    /// Called once by the loader before the check is ever submitted.
    fn configure(&mut self, instance: ConfigData, init: ConfigData) -> anyhow::Result<()>;

    /// How often the external scheduler should run this check.
    ///
    /// The runner itself ignores this — it executes whatever it is handed —
    /// but scheduling code relies on it being part of the contract.
    fn interval(&self) -> Duration;

    /// Execute the check once.
    async fn run(&self) -> anyhow::Result<()>;

    /// Request cooperative cancellation of an in-flight run. Best effort.
    async fn stop(&self);

    /// Non-fatal warnings produced by the most recent run.
    fn warnings(&self) -> Vec<String>;
}
