// SPDX-License-Identifier: MIT
//! Best-effort hostname lookup for service-check tagging.

use once_cell::sync::OnceCell;

/// Source of the hostname attached to synthetic service checks.
///
/// Lookup is best effort: `None` means the events carry an empty hostname,
/// which the aggregation pipeline accepts.
pub trait HostnameSource: Send + Sync {
    /// The host's name, if one can be determined.
    fn hostname(&self) -> Option<String>;
}

/// [`HostnameSource`] backed by the operating system.
///
/// The lookup result is cached on first use; the hostname is not expected
/// to change for the lifetime of the agent process.
#[derive(Debug, Default)]
pub struct SystemHostname {
    cached: OnceCell<Option<String>>,
}

impl SystemHostname {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HostnameSource for SystemHostname {
    fn hostname(&self) -> Option<String> {
        self.cached
            .get_or_init(sysinfo::System::host_name)
            .clone()
    }
}
