//! CLI command implementations.

pub mod escalation;
pub mod history;
pub mod idea;
pub mod init;
pub mod intervention;
pub mod snapshot;
pub mod step;
pub mod task;
