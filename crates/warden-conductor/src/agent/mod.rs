pub mod launcher;

pub use launcher::{
    session_id, AgentEvent, AgentLauncher, AgentProcess, CommandLauncher, MockLauncher,
    OutputStream,
};
