//! # NRP Common Library
//!
//! Shared code for the NGO Reporting Platform services:
//! - Error type shared by every crate
//! - Configuration loading and root folder resolution
//! - SQLite initialization and schema
//! - Event types (NrpEvent enum) and the broadcast EventBus

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
