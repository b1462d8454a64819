//! Execution side: config resolution and flow processing.

mod processor;
mod resolver;

pub use processor::{FlowRun, Processor};
pub use resolver::resolve_config;
