pub mod parser;
pub mod schema;

pub use parser::{load_queue, parse_queue};
pub use schema::{ContextSection, Queue};
