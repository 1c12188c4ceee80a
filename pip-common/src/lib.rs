//! # PiP Common Library
//!
//! Shared code for the PiP statistics service including:
//! - Error taxonomy
//! - Configuration loading and root folder resolution
//! - SQLite initialization for the document store and local task queue
//! - Domain models (publications, aggregates, cache entries, refresh tasks)
//! - Timestamp utilities

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod time;

pub use error::{Error, Result};
