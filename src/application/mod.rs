//! Application layer: the supervision facade that wires services to storage.

pub mod supervisor;

pub use supervisor::{Supervisor, SupervisorComponents};
