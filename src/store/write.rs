use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use super::{DocumentPath, StoreError};

/// A field in a write payload: either a literal value or a transform the
/// store resolves at commit time.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Value(Value),
    ServerTimestamp,
    /// Missing or null fields count as 0.
    Increment(i64),
    ArrayUnion(Vec<Value>),
    ArrayRemove(Vec<Value>),
    Delete,
}

/// 写入负载
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(BTreeMap<String, FieldValue>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes a model into literal fields. The `id` key is dropped since
    /// it lives in the document path.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, StoreError> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self(
                map.into_iter()
                    .filter(|(k, _)| k != "id")
                    .map(|(k, v)| (k, FieldValue::Value(v)))
                    .collect(),
            )),
            other => Err(StoreError::Serialization(serde::ser::Error::custom(format!(
                "document must serialize to an object, got {}",
                other
            )))),
        }
    }

    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        self.0.insert(field.into(), value);
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.insert(field, FieldValue::Value(value.into()));
        self
    }

    pub fn server_timestamp(mut self, field: &str) -> Self {
        self.insert(field, FieldValue::ServerTimestamp);
        self
    }

    pub fn increment(mut self, field: &str, by: i64) -> Self {
        self.insert(field, FieldValue::Increment(by));
        self
    }

    pub fn delete(mut self, field: &str) -> Self {
        self.insert(field, FieldValue::Delete);
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precondition {
    #[default]
    None,
    Exists,
    Missing,
    /// Document must exist at exactly this version.
    Version(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Replaces the whole document.
    Set {
        path: DocumentPath,
        fields: Fields,
        precondition: Precondition,
    },
    /// Merges into an existing document; fails if it does not exist.
    Update {
        path: DocumentPath,
        fields: Fields,
        precondition: Precondition,
    },
    Delete {
        path: DocumentPath,
        precondition: Precondition,
    },
}

impl Write {
    pub fn path(&self) -> &DocumentPath {
        match self {
            Write::Set { path, .. } | Write::Update { path, .. } | Write::Delete { path, .. } => path,
        }
    }
}

/// 原子批量写入
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: DocumentPath, fields: Fields) -> &mut Self {
        self.set_with(path, fields, Precondition::None)
    }

    /// Set that fails with `AlreadyExists` if the document is present.
    pub fn create(&mut self, path: DocumentPath, fields: Fields) -> &mut Self {
        self.set_with(path, fields, Precondition::Missing)
    }

    pub fn set_with(&mut self, path: DocumentPath, fields: Fields, precondition: Precondition) -> &mut Self {
        self.writes.push(Write::Set {
            path,
            fields,
            precondition,
        });
        self
    }

    pub fn update(&mut self, path: DocumentPath, fields: Fields) -> &mut Self {
        self.update_with(path, fields, Precondition::Exists)
    }

    pub fn update_with(&mut self, path: DocumentPath, fields: Fields, precondition: Precondition) -> &mut Self {
        self.writes.push(Write::Update {
            path,
            fields,
            precondition,
        });
        self
    }

    pub fn delete(&mut self, path: DocumentPath) -> &mut Self {
        self.delete_with(path, Precondition::None)
    }

    pub fn delete_with(&mut self, path: DocumentPath, precondition: Precondition) -> &mut Self {
        self.writes.push(Write::Delete { path, precondition });
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}
