pub mod event_log;
pub mod notify;
pub mod session;

pub use session::{compose_prompt, ordered_tasks, SessionOutcome, SessionReport, SessionRunner};
