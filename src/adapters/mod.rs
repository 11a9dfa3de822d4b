//! Adapters implementing the domain ports.

pub mod notifier;
pub mod sqlite;

pub use notifier::LogNotifier;
