pub mod geometry;
pub mod model;
pub mod error;
pub mod config;
pub mod directory;
pub mod broadcast;
pub mod registry;
pub mod matching;
pub mod ledger;
pub mod dispatcher;
pub mod motion;
pub mod coordinator;
pub mod service;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;
