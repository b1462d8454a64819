//! Flow definitions and parsing.
//!
//! A flow is an ordered list of nodes defined in YAML. Each node has an id,
//! a type and a configuration that may reference earlier results.

mod parser;
mod types;

pub use parser::{parse_flow, parse_flow_file};
pub use types::{Flow, FlowNode};
