//! I/O helpers for the research pipeline.

pub mod client;
pub mod config;
pub mod notes;
pub mod prompt;
pub mod reports;
pub mod session_log;
