//! Fleet simulation driving the dispatch core end to end.
//!
//! Drivers and riders run as independent tokio tasks that talk to one
//! [`dispatch_core::service::DispatchService`] the way transport clients would.

pub mod agents;
pub mod config_file;
pub mod scenario;
pub mod summary;
