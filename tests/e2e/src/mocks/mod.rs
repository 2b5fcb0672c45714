//! Test doubles and data factories

mod client;
mod fixtures;

pub use client::{MockQueryClient, RecordingSink};
pub use fixtures::TestDataFactory;
