//! Expand `{{ expr }}` templates in node configuration.
//!
//! Supported expressions:
//! - `input`, `input.<path>` - workflow input
//! - `prev`, `prev.<path>` - result of the previous step
//! - `nodes.<id>.output`, `nodes.<id>.output.<path>` - earlier node outputs
//! - `now()` - current time, RFC 3339
//!
//! A string that is exactly one template takes the raw value, so an id stays
//! a number. Unknown expressions resolve to null.

use std::sync::OnceLock;

use chrono::Utc;
use regex_lite::{Captures, Regex};
use serde_json::{Map, Value};

use crate::nodes::NodeContext;

fn full_template() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\{\{\s*([^{}]+?)\s*\}\}\s*$").expect("valid regex"))
}

fn inline_template() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*(.+?)\s*\}\}").expect("valid regex"))
}

/// Resolve every template in a configuration value.
pub fn resolve_config(config: &Value, ctx: &NodeContext) -> Value {
    match config {
        Value::String(s) => resolve_string(s, ctx),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_config(v, ctx)).collect()),
        Value::Object(obj) => {
            let mut out = Map::new();
            for (k, v) in obj {
                out.insert(k.clone(), resolve_config(v, ctx));
            }
            Value::Object(out)
        }
        _ => config.clone(),
    }
}

fn resolve_string(template: &str, ctx: &NodeContext) -> Value {
    if let Some(captures) = full_template().captures(template) {
        let expr = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        return resolve_expression(expr, ctx);
    }

    if !template.contains("{{") {
        return Value::String(template.to_string());
    }

    let rendered = inline_template()
        .replace_all(template, |caps: &Captures| {
            let expr = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            match resolve_expression(expr, ctx) {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            }
        })
        .to_string();

    Value::String(rendered)
}

fn resolve_expression(expr: &str, ctx: &NodeContext) -> Value {
    let expr = expr.trim();

    if expr == "now()" {
        return Value::String(Utc::now().to_rfc3339());
    }

    for (root, base) in [("input", &ctx.input), ("prev", &ctx.previous)] {
        if expr == root {
            return base.clone();
        }
        if let Some(path) = expr.strip_prefix(root).and_then(|p| p.strip_prefix('.')) {
            return get_path_value(base, path).unwrap_or(Value::Null);
        }
    }

    if let Some(rest) = expr.strip_prefix("nodes.") {
        if let Some((node_id, path)) = rest.split_once(".output") {
            let Some(base) = ctx.get_output(node_id) else {
                return Value::Null;
            };
            let path = path.strip_prefix('.').unwrap_or(path);
            if path.is_empty() {
                return base.clone();
            }
            return get_path_value(base, path).unwrap_or(Value::Null);
        }
    }

    Value::Null
}

fn get_path_value(root: &Value, path: &str) -> Option<Value> {
    let mut current = root;
    for segment in path.split('.') {
        if segment.is_empty() {
            continue;
        }
        match current {
            Value::Object(map) => current = map.get(segment)?,
            Value::Array(items) => {
                let index = segment.parse::<usize>().ok()?;
                current = items.get(index)?;
            }
            _ => return None,
        }
    }
    Some(current.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> NodeContext {
        let mut ctx = NodeContext::new("exec", "dup")
            .with_input(json!({"collection": "tasks", "ids": [3, 4]}))
            .with_previous(json!({"id": 42, "title": "T"}));
        ctx.add_output("create-task", json!({"id": 7, "owner": {"id": 5}}));
        ctx
    }

    #[test]
    fn test_whole_template_keeps_type() {
        let config = json!({
            "collection_name": "{{ input.collection }}",
            "source_record_id": "{{ prev.id }}",
            "first": "{{input.ids.0}}",
            "owner": "{{ nodes.create-task.output.owner }}",
        });

        let resolved = resolve_config(&config, &ctx());
        assert_eq!(resolved["collection_name"], "tasks");
        assert_eq!(resolved["source_record_id"], 42);
        assert_eq!(resolved["first"], 3);
        assert_eq!(resolved["owner"], json!({"id": 5}));
    }

    #[test]
    fn test_inline_template_renders_text() {
        let config = json!({
            "overrides": [
                {"field": "title", "value": "Copy of {{ prev.title }} (#{{ nodes.create-task.output.id }})"}
            ]
        });

        let resolved = resolve_config(&config, &ctx());
        assert_eq!(resolved["overrides"][0]["value"], "Copy of T (#7)");
        assert_eq!(resolved["overrides"][0]["field"], "title");
    }

    #[test]
    fn test_unknown_expressions_are_null() {
        let resolved = resolve_config(
            &json!({"a": "{{ nodes.missing.output }}", "b": "{{ whatever }}", "c": "x{{ prev.none }}y"}),
            &ctx(),
        );
        assert_eq!(resolved["a"], Value::Null);
        assert_eq!(resolved["b"], Value::Null);
        assert_eq!(resolved["c"], "xy");
    }

    #[test]
    fn test_non_strings_untouched() {
        let config = json!({"ignore_failure": true, "n": 3, "s": "plain"});
        assert_eq!(resolve_config(&config, &ctx()), config);
    }

    #[test]
    fn test_now() {
        let resolved = resolve_config(&json!("{{ now() }}"), &ctx());
        assert!(chrono::DateTime::parse_from_rfc3339(resolved.as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_prefix_is_not_a_root() {
        let resolved = resolve_config(&json!("{{ previous.id }}"), &ctx());
        assert_eq!(resolved, Value::Null);
    }
}
