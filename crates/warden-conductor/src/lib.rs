//! Runs a queue of tasks through a coding agent, one process per task,
//! with every detected action scored and ruled on before it is allowed.

pub mod agent;
pub mod config;
pub mod observer;
pub mod queue;
pub mod runner;

pub use config::{AgentConfig, SessionConfig};
pub use observer::{ControlCommand, ObserverHub, SessionControl};
pub use runner::{SessionOutcome, SessionReport, SessionRunner};
