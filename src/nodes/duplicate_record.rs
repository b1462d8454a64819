//! Duplicate-record node - copy a record within its collection.
//!
//! The new record gets every copyable field of the source, then the
//! configured overrides on top. The collection store assigns the new primary
//! key and timestamps.
//!
//! Only direct values are copied. A belongsTo foreign key such as
//! `assigneeId` is a plain scalar field and comes along; the relation field
//! itself (`assignee`) and any to-many relations are left out.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, error, info};

use super::types::{ExecutionOutcome, Node, NodeContext};
use crate::collections::{
    CollectionSchema, CollectionService, FieldKind, Record, DEFAULT_PRIMARY_KEY,
};
use crate::error::{Error, Result};
use crate::metrics;

/// Bookkeeping fields that are never copied.
pub const RESERVED_FIELDS: &[&str] = &[
    "id",
    "createdAt",
    "updatedAt",
    "createdById",
    "updatedById",
    "createdBy",
    "updatedBy",
    "__v",
    "sort",
];

/// Node type name the engine registers this node under.
pub const NODE_TYPE: &str = "duplicate-record";

/// Duplicate-record node.
pub struct DuplicateRecordNode {
    collections: Arc<dyn CollectionService>,
}

impl DuplicateRecordNode {
    pub fn new(collections: Arc<dyn CollectionService>) -> Self {
        Self { collections }
    }
}

/// Resolved configuration of one duplicate-record node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DuplicationConfig {
    /// Collection holding the source record
    #[serde(
        default,
        alias = "collectionName",
        alias = "collection",
        deserialize_with = "null_as_default"
    )]
    pub collection_name: String,

    /// Source record key; falls back to the previous step's result
    #[serde(default, alias = "sourceRecordId")]
    pub source_record_id: Option<Value>,

    /// Field values to set on the copy, applied in order
    #[serde(
        default,
        alias = "overrideFields",
        deserialize_with = "null_as_default"
    )]
    pub overrides: Vec<OverrideSpec>,

    /// Resolve the job even if duplication fails
    #[serde(
        default,
        alias = "ignoreFailure",
        alias = "ignoreFail",
        deserialize_with = "null_as_default"
    )]
    pub ignore_failure: bool,
}

/// A single field override.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OverrideSpec {
    #[serde(default, deserialize_with = "null_as_default")]
    pub field: String,
    #[serde(default)]
    pub value: Value,
}

impl OverrideSpec {
    pub fn new(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }
}

/// Only the ignore-failure flag, read leniently.
///
/// Used where a broken config must not turn into a new error.
#[derive(Debug, Default, Deserialize)]
struct FailurePolicy {
    #[serde(
        default,
        alias = "ignoreFailure",
        alias = "ignoreFail",
        deserialize_with = "null_as_default"
    )]
    ignore_failure: bool,
}

impl FailurePolicy {
    fn from_config(config: &Value) -> Self {
        serde_json::from_value(config.clone()).unwrap_or_default()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Why a source field is or isn't copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDisposition {
    Copy,
    /// Bookkeeping field or the primary key
    Reserved,
    /// Present in the snapshot but not defined by the schema
    NotInSchema,
    Relation(FieldKind),
}

impl FieldDisposition {
    pub fn is_copy(&self) -> bool {
        matches!(self, FieldDisposition::Copy)
    }
}

/// Classify a source field against the collection schema.
pub fn classify_field(name: &str, schema: &CollectionSchema) -> FieldDisposition {
    if RESERVED_FIELDS.contains(&name) || name == schema.primary_key {
        return FieldDisposition::Reserved;
    }

    match schema.field(name) {
        None => FieldDisposition::NotInSchema,
        Some(field) if field.kind.is_relation() => FieldDisposition::Relation(field.kind),
        Some(_) => FieldDisposition::Copy,
    }
}

/// Whether a source field is copied to the new record.
pub fn should_copy_field(name: &str, schema: &CollectionSchema) -> bool {
    classify_field(name, schema).is_copy()
}

/// Build the field map of the new record from a source snapshot.
///
/// Overrides on unknown fields are passed through; the store decides
/// whether it accepts them.
pub fn build_record(source: &Record, schema: &CollectionSchema, overrides: &[OverrideSpec]) -> Record {
    let mut values: Record = source
        .iter()
        .filter(|(name, _)| should_copy_field(name, schema))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    for entry in overrides {
        if entry.field.is_empty()
            || entry.field == schema.primary_key
            || entry.field == DEFAULT_PRIMARY_KEY
        {
            continue;
        }
        debug!(field = %entry.field, value = %entry.value, "Overriding field");
        values.insert(entry.field.clone(), entry.value.clone());
    }

    values
}

/// Pick the key of the record to duplicate.
///
/// The configured id wins; otherwise the previous step's result is read
/// under the collection's primary key, then `id`.
fn resolve_source_id(
    config: &DuplicationConfig,
    previous: &Value,
    primary_key: &str,
) -> Option<Value> {
    present_key(config.source_record_id.as_ref())
        .or_else(|| present_key(previous.get(primary_key)))
        .or_else(|| present_key(previous.get(DEFAULT_PRIMARY_KEY)))
}

fn present_key(value: Option<&Value>) -> Option<Value> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        other => Some(other.clone()),
    }
}

fn display_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn into_persistence(err: Error) -> Error {
    match err {
        Error::Persistence(_) => err,
        other => Error::Persistence(other.to_string()),
    }
}

impl DuplicateRecordNode {
    /// Validate, fetch the source, and create the copy.
    pub async fn duplicate(&self, config: &Value, ctx: &NodeContext) -> Result<Record> {
        let config: DuplicationConfig = serde_json::from_value(config.clone())
            .map_err(|e| Error::Config(format!("Invalid duplicate-record config: {}", e)))?;

        info!(
            node_id = %ctx.node_id,
            collection = %config.collection_name,
            "duplicate-record starting"
        );

        if config.collection_name.is_empty() {
            return Err(Error::Config("Collection is required".to_string()));
        }

        let collection = self
            .collections
            .get_collection(&config.collection_name)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Collection \"{}\" not found",
                    config.collection_name
                ))
            })?;

        let source_id = resolve_source_id(&config, &ctx.previous, collection.primary_key())
            .ok_or_else(|| Error::Config("Source record ID is required".to_string()))?;

        debug!(
            node_id = %ctx.node_id,
            source_id = %display_key(&source_id),
            "Fetching source record"
        );

        let source = collection
            .find_one(&source_id)
            .await
            .map_err(into_persistence)?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Source record with ID \"{}\" not found in collection \"{}\"",
                    display_key(&source_id),
                    config.collection_name
                ))
            })?;

        let values = build_record(&source, collection.schema(), &config.overrides);
        debug!(
            node_id = %ctx.node_id,
            fields = values.len(),
            skipped = source.len().saturating_sub(values.len()),
            "Duplicating record"
        );
        metrics::record_fields_copied(values.len());

        let created = collection.create(values).await.map_err(into_persistence)?;

        debug!(
            node_id = %ctx.node_id,
            new_id = %created.get(collection.primary_key()).map(display_key).unwrap_or_default(),
            "Created record; belongsTo links carried by foreign keys"
        );

        Ok(created)
    }
}

#[async_trait]
impl Node for DuplicateRecordNode {
    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    fn description(&self) -> &str {
        "Duplicate a record, optionally overriding fields"
    }

    async fn run(&self, config: &Value, ctx: &NodeContext) -> ExecutionOutcome {
        let policy = FailurePolicy::from_config(config);
        let start = Instant::now();

        let outcome = match self.duplicate(config, ctx).await {
            Ok(record) => {
                info!(
                    node_id = %ctx.node_id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "duplicate-record completed"
                );
                ExecutionOutcome::resolved(Value::Object(record))
            }
            Err(e) => {
                error!(
                    node_id = %ctx.node_id,
                    code = e.code(),
                    error = %e,
                    "duplicate-record failed"
                );
                ExecutionOutcome::failed(&e)
            }
        };

        let outcome = outcome.with_failure_policy(policy.ignore_failure);
        metrics::record_duplication(&outcome.status.to_string(), start.elapsed());
        outcome
    }

    fn resume(&self, config: &Value, mut outcome: ExecutionOutcome) -> ExecutionOutcome {
        let policy = FailurePolicy::from_config(config);

        if policy.ignore_failure && outcome.downgrade_failure() {
            info!("duplicate-record failure resolved on resume (ignore_failure)");
            metrics::record_resume("downgraded");
        } else {
            metrics::record_resume("unchanged");
        }

        outcome
    }
}
