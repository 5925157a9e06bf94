//! Capability traits consumed by the engine
//!
//! - [`SourceTransport`]: perform one network read of a URL
//! - [`ConfirmApply`]: external confirmation signal gating every mutation
//! - [`NetworkMaintenance`]: DNS cache / network stack maintenance, invoked by
//!   callers independently of the engine

pub mod confirm;
pub mod maintenance;
pub mod transport;

pub use confirm::{AutoConfirm, ConfirmAction, ConfirmApply, ConfirmRequest, DenyAll};
pub use maintenance::{MaintenanceReport, NetworkMaintenance};
pub use transport::SourceTransport;
