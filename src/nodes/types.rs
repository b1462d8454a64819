//! Node trait, context and job-status types.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Status a node reports back to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Resolved,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolved => write!(f, "resolved"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resolved" => Ok(Self::Resolved),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Error details placed in an outcome's result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl From<&Error> for ErrorPayload {
    fn from(err: &Error) -> Self {
        Self {
            message: err.to_string(),
            code: err.code().to_string(),
            trace: Some(err.trace()),
        }
    }
}

/// What a node run hands back to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: JobStatus,
    /// Node output on success, an [`ErrorPayload`] on failure.
    pub result: Value,
}

impl ExecutionOutcome {
    pub fn resolved(result: Value) -> Self {
        Self {
            status: JobStatus::Resolved,
            result,
        }
    }

    /// Failed outcome carrying the error as its result.
    pub fn failed(err: &Error) -> Self {
        let payload = ErrorPayload::from(err);
        Self {
            status: JobStatus::Failed,
            result: serde_json::to_value(payload).unwrap_or(Value::Null),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status == JobStatus::Resolved
    }

    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }

    /// The error payload, if the result holds one.
    pub fn error(&self) -> Option<ErrorPayload> {
        serde_json::from_value(self.result.clone()).ok()
    }

    /// Turn a failure into a resolution, keeping the error payload.
    ///
    /// Returns true if the status changed.
    pub fn downgrade_failure(&mut self) -> bool {
        if self.status == JobStatus::Failed {
            self.status = JobStatus::Resolved;
            true
        } else {
            false
        }
    }

    /// Apply a node's ignore-failure policy to a computed outcome.
    pub fn with_failure_policy(mut self, ignore_failure: bool) -> Self {
        if ignore_failure {
            self.downgrade_failure();
        }
        self
    }
}

/// Context passed to a node during execution.
#[derive(Debug, Clone)]
pub struct NodeContext {
    /// Workflow input
    pub input: Value,

    /// Result of the step that ran right before this node (Null if none)
    pub previous: Value,

    /// All node outputs so far (keyed by node ID)
    pub node_outputs: HashMap<String, Value>,

    /// Execution ID
    pub execution_id: String,

    /// ID of the node being run
    pub node_id: String,
}

impl NodeContext {
    /// Create a new context.
    pub fn new(execution_id: &str, node_id: &str) -> Self {
        Self {
            input: Value::Null,
            previous: Value::Null,
            node_outputs: HashMap::new(),
            execution_id: execution_id.to_string(),
            node_id: node_id.to_string(),
        }
    }

    /// Set the input data.
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    /// Set the previous step's result.
    pub fn with_previous(mut self, previous: Value) -> Self {
        self.previous = previous;
        self
    }

    /// Add a node output.
    pub fn add_output(&mut self, node_id: &str, output: Value) {
        self.node_outputs.insert(node_id.to_string(), output);
    }

    /// Get a previous node's output.
    pub fn get_output(&self, node_id: &str) -> Option<&Value> {
        self.node_outputs.get(node_id)
    }
}

/// Trait that all node types must implement.
///
/// Nodes are shared across concurrent workflow runs and keep no per-run
/// state.
#[async_trait]
pub trait Node: Send + Sync {
    /// Get the node type name (e.g., "duplicate-record").
    fn node_type(&self) -> &str;

    /// Run the node with its resolved configuration.
    ///
    /// Failures are reported through the outcome, never as a panic or an
    /// escaped error.
    async fn run(&self, config: &Value, ctx: &NodeContext) -> ExecutionOutcome;

    /// Re-enter the node on a job it produced earlier.
    ///
    /// `config` is the node configuration, resolved against whatever context
    /// the engine has at resume time.
    fn resume(&self, _config: &Value, outcome: ExecutionOutcome) -> ExecutionOutcome {
        outcome
    }

    /// Get a description of this node type.
    fn description(&self) -> &str {
        "A workflow node"
    }
}
