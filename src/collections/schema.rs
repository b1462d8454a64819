//! Collection schemas and field definitions.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default primary key field name.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// What a field is: a plain value or one side of a relation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    /// Plain column value (string, number, foreign key, JSON, ...)
    #[default]
    Scalar,
    BelongsTo,
    HasOne,
    HasMany,
    BelongsToMany,
}

impl FieldKind {
    /// Whether this field describes a relation rather than holding a value.
    pub fn is_relation(&self) -> bool {
        !matches!(self, FieldKind::Scalar)
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::BelongsTo => write!(f, "belongsTo"),
            Self::HasOne => write!(f, "hasOne"),
            Self::HasMany => write!(f, "hasMany"),
            Self::BelongsToMany => write!(f, "belongsToMany"),
        }
    }
}

/// A single field in a collection schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: FieldKind,

    /// Target collection for relation fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Backing foreign key column for belongsTo relations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
}

impl FieldDefinition {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Scalar,
            target: None,
            foreign_key: None,
        }
    }

    pub fn relation(name: impl Into<String>, kind: FieldKind, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            target: Some(target.into()),
            foreign_key: None,
        }
    }

    pub fn with_foreign_key(mut self, foreign_key: impl Into<String>) -> Self {
        self.foreign_key = Some(foreign_key.into());
        self
    }
}

/// Field definitions of one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,

    #[serde(default = "default_primary_key")]
    pub primary_key: String,

    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

fn default_primary_key() -> String {
    DEFAULT_PRIMARY_KEY.to_string()
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: default_primary_key(),
            fields: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Scalar fields, in declaration order.
    pub fn scalar_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| !f.kind.is_relation())
    }
}

#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default)]
    collections: Vec<CollectionSchema>,
}

/// Parse collection schemas from a YAML document with a `collections:` list.
pub fn parse_schemas(yaml: &str) -> Result<Vec<CollectionSchema>> {
    if yaml.trim().is_empty() {
        return Err(Error::Parse("Empty schema definition".to_string()));
    }

    let file: SchemaFile = serde_yaml::from_str(yaml)
        .map_err(|e| Error::Parse(format!("Invalid schema YAML: {}", e)))?;

    for schema in &file.collections {
        if schema.name.trim().is_empty() {
            return Err(Error::Parse("Collection name cannot be empty".to_string()));
        }
        if let Some(field) = schema.fields.iter().find(|f| f.name.trim().is_empty()) {
            return Err(Error::Parse(format!(
                "Collection \"{}\" has a field with an empty name (type {})",
                schema.name, field.kind
            )));
        }
    }

    Ok(file.collections)
}

/// Load collection schemas from a YAML file.
pub fn load_schemas(path: &Path) -> Result<Vec<CollectionSchema>> {
    let content = std::fs::read_to_string(path)?;
    parse_schemas(&content)
}
