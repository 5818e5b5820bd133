//! Command implementations for the CLI
//!
//! - start: Tail the access log and serve queries
//! - config: Configuration display and validation

pub mod config;
pub mod start;
