//! Flow YAML parser.

use std::collections::HashSet;
use std::path::Path;

use super::types::Flow;
use crate::error::{Error, Result};

/// Parse a flow from a YAML string.
pub fn parse_flow(yaml: &str) -> Result<Flow> {
    if yaml.trim().is_empty() {
        return Err(Error::Parse("Empty flow definition".to_string()));
    }

    let flow: Flow = serde_yaml::from_str(yaml).map_err(|e| {
        let msg = e.to_string();
        if let Some(field) = extract_missing_field(&msg) {
            Error::Parse(format!("Missing required field: {}", field))
        } else {
            Error::Parse(format!("Invalid YAML: {}", msg))
        }
    })?;

    let mut seen = HashSet::new();
    for node in &flow.nodes {
        if node.id.trim().is_empty() {
            return Err(Error::Parse("Node id cannot be empty".to_string()));
        }
        if !seen.insert(node.id.as_str()) {
            return Err(Error::Parse(format!("Duplicate node id: {}", node.id)));
        }
    }

    Ok(flow)
}

/// Parse a flow from a file path.
pub fn parse_flow_file(path: &Path) -> Result<Flow> {
    let content = std::fs::read_to_string(path)?;
    parse_flow(&content)
}

fn extract_missing_field(error_message: &str) -> Option<&str> {
    let marker = "missing field `";
    let start = error_message.find(marker)? + marker.len();
    let rest = &error_message[start..];
    let end = rest.find('`')?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_flow() {
        let yaml = r#"
name: clone-task
description: Copy a task and reopen it

nodes:
  - id: dup
    type: duplicate-record
    config:
      collection_name: tasks
      source_record_id: "{{ input.task_id }}"
      overrides:
        - field: status
          value: open
      ignore_failure: true
"#;

        let flow = parse_flow(yaml).unwrap();
        assert_eq!(flow.name, "clone-task");
        assert_eq!(flow.nodes.len(), 1);

        let node = flow.get_node("dup").unwrap();
        assert_eq!(node.node_type, "duplicate-record");
        assert_eq!(node.config["overrides"][0]["field"], "status");
        assert_eq!(node.config["ignore_failure"], true);
        assert_eq!(flow.node_types(), vec!["duplicate-record"]);
    }

    #[test]
    fn test_parse_empty_flow() {
        let result = parse_flow("");
        assert!(result
            .unwrap_err()
            .to_string()
            .to_lowercase()
            .contains("empty flow"));
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = parse_flow("name: [broken");
        assert!(result
            .unwrap_err()
            .to_string()
            .to_lowercase()
            .contains("invalid yaml"));
    }

    #[test]
    fn test_parse_missing_required_field_name() {
        let yaml = r#"
nodes:
  - id: dup
    type: duplicate-record
"#;
        let result = parse_flow(yaml);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Missing required field: name"));
    }

    #[test]
    fn test_parse_duplicate_node_ids() {
        let yaml = r#"
name: twice
nodes:
  - id: dup
    type: duplicate-record
  - id: dup
    type: duplicate-record
"#;
        let err = parse_flow(yaml).unwrap_err();
        assert!(err.to_string().contains("Duplicate node id: dup"));
    }
}
