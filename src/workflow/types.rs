//! Flow and node definitions.

use serde::{Deserialize, Serialize};

/// A linear flow: nodes run in order, each seeing the previous result.
///
/// # Example YAML
///
/// ```yaml
/// name: clone-task
/// nodes:
///   - id: dup
///     type: duplicate-record
///     config:
///       collection_name: tasks
///       source_record_id: "{{ input.task_id }}"
///       overrides:
///         - field: status
///           value: open
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    /// Flow name
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Nodes (steps), run top to bottom
    pub nodes: Vec<FlowNode>,
}

impl Flow {
    /// Get a node by ID.
    pub fn get_node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Get unique node types used in this flow, in first-use order.
    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = Vec::new();
        for node in &self.nodes {
            if !types.contains(&node.node_type.as_str()) {
                types.push(node.node_type.as_str());
            }
        }
        types
    }
}

/// A node (step) in a flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    /// Unique node ID within this flow
    pub id: String,

    /// Node type (e.g. duplicate-record)
    #[serde(rename = "type")]
    pub node_type: String,

    /// Node-specific configuration; may contain `{{ ... }}` templates
    #[serde(default)]
    pub config: serde_json::Value,
}
