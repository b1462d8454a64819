//! SQLite-backed collections: one table per schema.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    integer_key, Collection, CollectionSchema, CollectionService, Record, CREATED_AT_FIELD,
    UPDATED_AT_FIELD,
};
use crate::error::{Error, Result};

/// SQLite-backed collection service.
#[derive(Clone)]
pub struct SqliteCollections {
    collections: HashMap<String, Arc<SqliteCollection>>,
}

impl SqliteCollections {
    /// Open or create a database at the given path and ensure a table exists
    /// for every schema.
    pub fn open(path: &Path, schemas: Vec<CollectionSchema>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, schemas)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory(schemas: Vec<CollectionSchema>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, schemas)
    }

    fn from_connection(conn: Connection, schemas: Vec<CollectionSchema>) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;

        for schema in &schemas {
            conn.execute_batch(&create_table_sql(schema))?;
            debug!(collection = %schema.name, "Ensured collection table");
        }

        let conn = Arc::new(Mutex::new(conn));
        let collections = schemas
            .into_iter()
            .map(|schema| {
                let collection = SqliteCollection {
                    schema,
                    conn: conn.clone(),
                };
                (collection.schema.name.clone(), Arc::new(collection))
            })
            .collect();

        Ok(Self { collections })
    }
}

impl CollectionService for SqliteCollections {
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

/// A collection stored in one SQLite table.
pub struct SqliteCollection {
    schema: CollectionSchema,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCollection {
    fn is_managed(&self, field: &str) -> bool {
        field == self.schema.primary_key || field == CREATED_AT_FIELD || field == UPDATED_AT_FIELD
    }
}

#[async_trait]
impl Collection for SqliteCollection {
    fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    async fn find_one(&self, key: &Value) -> Result<Option<Record>> {
        let Some(id) = integer_key(key) else {
            return Ok(None);
        };
        let conn = self.conn.lock().await;
        select_by_key(&conn, &self.schema, id)
    }

    async fn create(&self, values: Record) -> Result<Record> {
        let now = Utc::now().to_rfc3339();

        let mut columns = vec![quote_ident(CREATED_AT_FIELD), quote_ident(UPDATED_AT_FIELD)];
        let mut params = vec![SqlValue::Text(now.clone()), SqlValue::Text(now)];
        for (name, value) in &values {
            if self.is_managed(name) {
                continue;
            }
            columns.push(quote_ident(name));
            params.push(json_to_sql(value));
        }

        let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.schema.name),
            columns.join(", "),
            placeholders.join(", ")
        );

        let conn = self.conn.lock().await;
        conn.execute(&sql, params_from_iter(params.iter()))
            .map_err(|e| {
                Error::Persistence(format!(
                    "Failed to create record in collection \"{}\": {}",
                    self.schema.name, e
                ))
            })?;
        let id = conn.last_insert_rowid();

        select_by_key(&conn, &self.schema, id)?.ok_or_else(|| {
            Error::Persistence(format!(
                "Created record {} vanished from collection \"{}\"",
                id, self.schema.name
            ))
        })
    }
}

fn select_by_key(conn: &Connection, schema: &CollectionSchema, id: i64) -> Result<Option<Record>> {
    let sql = format!(
        "SELECT * FROM {} WHERE {} = ?1",
        quote_ident(&schema.name),
        quote_ident(&schema.primary_key)
    );
    let mut stmt = conn.prepare(&sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

    let record = stmt
        .query_row([id], |row| {
            let mut record = Record::new();
            for (i, column) in columns.iter().enumerate() {
                record.insert(column.clone(), sql_to_json(row.get_ref(i)?));
            }
            Ok(record)
        })
        .optional()?;
    Ok(record)
}

fn create_table_sql(schema: &CollectionSchema) -> String {
    let mut columns = vec![
        format!(
            "{} INTEGER PRIMARY KEY AUTOINCREMENT",
            quote_ident(&schema.primary_key)
        ),
        format!("{} TEXT NOT NULL", quote_ident(CREATED_AT_FIELD)),
        format!("{} TEXT NOT NULL", quote_ident(UPDATED_AT_FIELD)),
    ];

    for field in schema.scalar_fields() {
        if field.name == schema.primary_key
            || field.name == CREATED_AT_FIELD
            || field.name == UPDATED_AT_FIELD
        {
            continue;
        }
        // Untyped column: SQLite keeps whatever storage class is bound.
        columns.push(quote_ident(&field.name));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(&schema.name),
        columns.join(", ")
    )
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                SqlValue::Text(n.to_string())
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            // Objects and arrays are written as JSON text.
            if text.starts_with('{') || text.starts_with('[') {
                if let Ok(parsed) = serde_json::from_str::<Value>(&text) {
                    return parsed;
                }
            }
            Value::String(text.into_owned())
        }
        ValueRef::Blob(bytes) => json!(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            bytes
        )),
    }
}
