//! Usage: Configuration and process-level plumbing.

pub mod logging;
pub mod settings;
