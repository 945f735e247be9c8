//! Test Helper Utilities
//!
//! Shared utilities for testing nrp-server

#![allow(dead_code)]

pub mod doubles;
pub mod fixtures;

pub use doubles::{FlakyJobLedger, SelectiveReportStore};
pub use fixtures::{memory_state, sqlite_state, wait_for_terminal, wait_until_empty, write_upload};
