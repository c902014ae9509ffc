// SPDX-License-Identifier: MIT
//! Vigil Host Agent — check execution core.
//!
//! This crate is the execution heart of the agent: it takes check instances
//! handed to it by scheduling code, runs them on an elastic worker pool,
//! reports each run's outcome as a synthetic service check, and keeps
//! per-check execution statistics for introspection.
//!
//! What this crate deliberately does not do: decide *when* a check runs
//! (interval scheduling lives upstream), load or configure checks (the
//! loader supplies ready instances of [`check::Check`]), or ship metrics
//! anywhere (workers talk to a [`report::SinkResolver`] owned by the
//! aggregation subsystem).

pub mod check;
pub mod hostname;
pub mod report;
pub mod runner;

pub use check::{Check, CheckId, CheckStats, ConfigData};
pub use hostname::{HostnameSource, SystemHostname};
pub use report::{
    NullSinkResolver, ServiceCheckSink, ServiceCheckStatus, SinkResolver, CHECK_STATUS_NAME,
};
pub use runner::{
    CounterSnapshot, Runner, RunnerError, RunnerOptions, DEFAULT_NUM_WORKERS, MAX_NUM_WORKERS,
    STOP_CHECK_GRACE,
};
