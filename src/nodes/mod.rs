//! Node implementations.
//!
//! Nodes are the steps of a workflow. Each node type performs one action and
//! reports a job status back to the engine.

pub mod duplicate_record;
mod registry;
mod types;

pub use duplicate_record::{
    build_record, classify_field, should_copy_field, DuplicateRecordNode, DuplicationConfig,
    FieldDisposition, OverrideSpec, RESERVED_FIELDS,
};
pub use registry::NodeRegistry;
pub use types::{ErrorPayload, ExecutionOutcome, JobStatus, Node, NodeContext};
