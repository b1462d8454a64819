//! Node registry - manages available node types.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::types::{ExecutionOutcome, Node, NodeContext};
use super::DuplicateRecordNode;
use crate::collections::CollectionService;
use crate::error::Error;

/// Registry of available node types.
#[derive(Clone)]
pub struct NodeRegistry {
    nodes: HashMap<String, Arc<dyn Node>>,
}

impl NodeRegistry {
    /// Create a registry with the built-in nodes wired to a collection service.
    pub fn with_collections(collections: Arc<dyn CollectionService>) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(DuplicateRecordNode::new(collections)));
        registry
    }

    /// Create an empty registry (for testing).
    pub fn empty() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Register a node type.
    pub fn register(&mut self, node: Arc<dyn Node>) {
        self.nodes.insert(node.node_type().to_string(), node);
    }

    /// Get a node by type name.
    pub fn get(&self, node_type: &str) -> Option<Arc<dyn Node>> {
        self.nodes.get(node_type).cloned()
    }

    /// Check if a node type is registered.
    pub fn has(&self, node_type: &str) -> bool {
        self.nodes.contains_key(node_type)
    }

    /// Run a node by type.
    ///
    /// An unknown type produces a failed outcome.
    pub async fn run(&self, node_type: &str, config: &Value, ctx: &NodeContext) -> ExecutionOutcome {
        match self.get(node_type) {
            Some(node) => node.run(config, ctx).await,
            None => ExecutionOutcome::failed(&Error::Node(format!(
                "Unknown node type: {}",
                node_type
            ))),
        }
    }

    /// List all registered node types, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.nodes.keys().map(|s| s.as_str()).collect();
        types.sort_unstable();
        types
    }

    /// Get descriptions of all registered nodes.
    pub fn descriptions(&self) -> Vec<(&str, &str)> {
        self.nodes
            .iter()
            .map(|(name, node)| (name.as_str(), node.description()))
            .collect()
    }
}
