//! Storage models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::nodes::{ExecutionOutcome, JobStatus};

/// A node run as persisted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub execution_id: String,
    pub node_id: String,
    pub node_type: String,
    pub status: JobStatus,
    pub result: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a job record for a fresh node outcome.
    pub fn new(execution_id: &str, node_id: &str, node_type: &str, outcome: ExecutionOutcome) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            execution_id: execution_id.to_string(),
            node_id: node_id.to_string(),
            node_type: node_type.to_string(),
            status: outcome.status,
            result: outcome.result,
            created_at: now,
            updated_at: now,
        }
    }

    /// The status and result as a node outcome.
    pub fn outcome(&self) -> ExecutionOutcome {
        ExecutionOutcome {
            status: self.status,
            result: self.result.clone(),
        }
    }

    /// Replace status and result with a new outcome.
    pub fn apply(&mut self, outcome: ExecutionOutcome) {
        self.status = outcome.status;
        self.result = outcome.result;
        self.updated_at = Utc::now();
    }
}
