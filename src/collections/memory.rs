//! In-process collection store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::{
    integer_key, Collection, CollectionSchema, CollectionService, Record, CREATED_AT_FIELD,
    UPDATED_AT_FIELD,
};
use crate::error::{Error, Result};

/// Collections held in memory, keyed by name.
#[derive(Clone, Default)]
pub struct MemoryCollections {
    collections: HashMap<String, Arc<MemoryCollection>>,
}

impl MemoryCollections {
    pub fn new(schemas: Vec<CollectionSchema>) -> Self {
        let collections = schemas
            .into_iter()
            .map(|schema| (schema.name.clone(), Arc::new(MemoryCollection::new(schema))))
            .collect();
        Self { collections }
    }

    /// Get the concrete collection (for seeding in tests and demos).
    pub fn collection(&self, name: &str) -> Option<Arc<MemoryCollection>> {
        self.collections.get(name).cloned()
    }
}

impl CollectionService for MemoryCollections {
    fn get_collection(&self, name: &str) -> Option<Arc<dyn Collection>> {
        self.collections
            .get(name)
            .map(|c| c.clone() as Arc<dyn Collection>)
    }

    fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.keys().cloned().collect();
        names.sort();
        names
    }
}

#[derive(Default)]
struct MemoryState {
    rows: BTreeMap<i64, Record>,
    next_id: i64,
}

/// A single in-memory collection with integer primary keys.
pub struct MemoryCollection {
    schema: CollectionSchema,
    state: Mutex<MemoryState>,
}

impl MemoryCollection {
    pub fn new(schema: CollectionSchema) -> Self {
        Self {
            schema,
            state: Mutex::new(MemoryState {
                rows: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Store a raw snapshot as-is. The snapshot must carry an integer
    /// primary key; any other keys are kept even if the schema lacks them.
    pub async fn insert_raw(&self, record: Value) -> Result<()> {
        let Value::Object(record) = record else {
            return Err(Error::Storage("Record must be a JSON object".to_string()));
        };
        let id = record
            .get(&self.schema.primary_key)
            .and_then(integer_key)
            .ok_or_else(|| {
                Error::Storage(format!(
                    "Record is missing integer primary key \"{}\"",
                    self.schema.primary_key
                ))
            })?;

        let mut state = self.state.lock().await;
        state.rows.insert(id, record);
        if id >= state.next_id {
            state.next_id = id + 1;
        }
        Ok(())
    }

    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.state.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    async fn find_one(&self, key: &Value) -> Result<Option<Record>> {
        let Some(id) = integer_key(key) else {
            return Ok(None);
        };
        let state = self.state.lock().await;
        Ok(state.rows.get(&id).cloned())
    }

    async fn create(&self, mut values: Record) -> Result<Record> {
        let now = Utc::now().to_rfc3339();
        let mut state = self.state.lock().await;

        let id = state.next_id;
        state.next_id += 1;

        values.insert(self.schema.primary_key.clone(), json!(id));
        values.insert(CREATED_AT_FIELD.to_string(), json!(now));
        values.insert(UPDATED_AT_FIELD.to_string(), json!(now));

        state.rows.insert(id, values.clone());
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::FieldDefinition;

    fn notes() -> MemoryCollections {
        MemoryCollections::new(vec![
            CollectionSchema::new("notes").with_field(FieldDefinition::scalar("body"))
        ])
    }

    #[tokio::test]
    async fn test_create_assigns_key_and_timestamps() {
        let service = notes();
        let notes = service.get_collection("notes").unwrap();

        let mut values = Record::new();
        values.insert("body".to_string(), json!("hello"));
        values.insert("id".to_string(), json!(999));

        let created = notes.create(values).await.unwrap();
        assert_eq!(created["id"], 1);
        assert_eq!(created["body"], "hello");
        assert!(created["createdAt"].is_string());
        assert_eq!(created["createdAt"], created["updatedAt"]);

        let fetched = notes.find_one(&json!("1")).await.unwrap().unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_insert_raw_advances_sequence() {
        let service = notes();
        let raw = service.collection("notes").unwrap();
        raw.insert_raw(json!({"id": 10, "body": "seed", "computed": true}))
            .await
            .unwrap();

        let notes = service.get_collection("notes").unwrap();
        let created = notes.create(Record::new()).await.unwrap();
        assert_eq!(created["id"], 11);
        assert_eq!(raw.len().await, 2);

        let seeded = notes.find_one(&json!(10)).await.unwrap().unwrap();
        assert_eq!(seeded["computed"], true);
    }

    #[tokio::test]
    async fn test_insert_raw_requires_key() {
        let service = notes();
        let raw = service.collection("notes").unwrap();
        assert!(raw.insert_raw(json!({"body": "no key"})).await.is_err());
        assert!(raw.insert_raw(json!("not an object")).await.is_err());
        assert!(raw.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_collection_and_key() {
        let service = notes();
        assert!(service.get_collection("missing").is_none());
        assert_eq!(service.collection_names(), vec!["notes".to_string()]);

        let notes = service.get_collection("notes").unwrap();
        assert!(notes.find_one(&json!(1)).await.unwrap().is_none());
        assert!(notes.find_one(&json!("abc")).await.unwrap().is_none());
    }
}
