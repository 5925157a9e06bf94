//! Confirmation gate for mutating operations
//!
//! Every update and restore waits for an explicit yes/no from the caller. The
//! request carries any validation warnings so the caller can decide to
//! override them or abort.

use crate::error::Error;
use crate::registry::ServiceTag;
use std::fmt;

/// What the engine is about to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmAction {
    /// Replace the managed block of a service
    Apply {
        /// Service whose block will be replaced
        service: ServiceTag,
        /// Entry lines in the candidate block
        entry_count: usize,
    },
    /// Overwrite the live file with a snapshot
    Restore {
        /// Snapshot being restored
        snapshot_id: String,
    },
}

impl fmt::Display for ConfirmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apply {
                service,
                entry_count,
            } => write!(
                f,
                "replace the '{}' block with {} entr{}",
                service,
                entry_count,
                if *entry_count == 1 { "y" } else { "ies" }
            ),
            Self::Restore { snapshot_id } => write!(f, "restore the hosts file from {}", snapshot_id),
        }
    }
}

/// A pending confirmation
#[derive(Debug)]
pub struct ConfirmRequest {
    /// Planned action
    pub action: ConfirmAction,
    /// Non-fatal validation problems found in the candidate
    pub warnings: Vec<Error>,
}

impl ConfirmRequest {
    /// Whether the sanity check raised anything
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// External confirmation signal
pub trait ConfirmApply {
    /// Return `true` to proceed, `false` to abort with no side effects
    fn confirm(&self, request: &ConfirmRequest) -> bool;
}

/// Proceeds unconditionally, warnings included
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl ConfirmApply for AutoConfirm {
    fn confirm(&self, _request: &ConfirmRequest) -> bool {
        true
    }
}

/// Aborts every request
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl ConfirmApply for DenyAll {
    fn confirm(&self, _request: &ConfirmRequest) -> bool {
        false
    }
}

impl<F> ConfirmApply for F
where
    F: Fn(&ConfirmRequest) -> bool,
{
    fn confirm(&self, request: &ConfirmRequest) -> bool {
        self(request)
    }
}
