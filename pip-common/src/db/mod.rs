//! Database initialization for the document store and local task queue

pub mod init;

pub use init::*;
