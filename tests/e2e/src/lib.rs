//! End-to-end test support for Prescient
//!
//! - `harness`: isolated on-disk pattern stores
//! - `mocks`: scripted query clients, recording event sinks and session data

pub mod harness;
pub mod mocks;

pub use harness::TestPatternDb;
pub use mocks::{MockQueryClient, RecordingSink, TestDataFactory};
