//! Collection service: schema lookup plus fetch/create by primary key.
//!
//! The duplicate-record node only sees these traits. The engine decides which
//! store backs them.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

mod memory;
mod schema;
mod sqlite;

pub use memory::{MemoryCollection, MemoryCollections};
pub use schema::{
    load_schemas, parse_schemas, CollectionSchema, FieldDefinition, FieldKind,
    DEFAULT_PRIMARY_KEY,
};
pub use sqlite::{SqliteCollection, SqliteCollections};

/// A row snapshot: field name to value.
pub type Record = Map<String, Value>;

/// Field name the store sets on create.
pub const CREATED_AT_FIELD: &str = "createdAt";
/// Field name the store sets on create and update.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// One schema-defined collection.
#[async_trait]
pub trait Collection: Send + Sync {
    fn schema(&self) -> &CollectionSchema;

    fn name(&self) -> &str {
        &self.schema().name
    }

    fn primary_key(&self) -> &str {
        &self.schema().primary_key
    }

    fn get_field(&self, name: &str) -> Option<&FieldDefinition> {
        self.schema().field(name)
    }

    /// Fetch one record by primary key. No relations are expanded.
    async fn find_one(&self, key: &Value) -> Result<Option<Record>>;

    /// Insert a record. The store assigns the primary key and timestamps
    /// and returns the stored row.
    async fn create(&self, values: Record) -> Result<Record>;
}

/// Lookup of collections by name.
pub trait CollectionService: Send + Sync {
    fn get_collection(&self, name: &str) -> Option<Arc<dyn Collection>>;

    /// Names of all known collections, sorted.
    fn collection_names(&self) -> Vec<String>;
}

/// Normalize a key value to an integer primary key.
///
/// Accepts numbers and numeric strings.
pub(crate) fn integer_key(key: &Value) -> Option<i64> {
    match key {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_key() {
        assert_eq!(integer_key(&json!(42)), Some(42));
        assert_eq!(integer_key(&json!("42")), Some(42));
        assert_eq!(integer_key(&json!(" 7 ")), Some(7));
        assert_eq!(integer_key(&json!("abc")), None);
        assert_eq!(integer_key(&json!(1.5)), None);
        assert_eq!(integer_key(&Value::Null), None);
    }
}
