//! Test harness: isolated pattern databases

mod db_manager;

pub use db_manager::TestPatternDb;
