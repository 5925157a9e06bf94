// # Network Maintenance Capability
//
// OS-level maintenance that usually follows a hosts change: flushing the
// resolver cache and resetting the network stack. The engine never calls
// these itself and never depends on their outcome; callers invoke them
// independently. Platform-specific command selection belongs to the
// implementation, so the core stays platform-neutral.

/// Outcome of one maintenance command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaintenanceReport {
    /// Command ran and succeeded
    Done(String),
    /// Command ran and reported failure
    Failed(String),
    /// The operation does not exist on this platform
    Unsupported(String),
}

impl MaintenanceReport {
    /// Whether the command succeeded
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

/// Injected maintenance capability
pub trait NetworkMaintenance: Send + Sync {
    /// Flush the OS DNS resolver cache
    fn flush_dns_cache(&self) -> MaintenanceReport;

    /// Reset the OS network stack
    fn reset_stack(&self) -> MaintenanceReport;
}
