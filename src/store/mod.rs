//! 文档存储端口
//!
//! A keyed document store: collections of JSON objects addressed by
//! slash-separated paths, with atomic write batches, filtered queries and
//! live query subscriptions.

mod memory;
mod query;
mod write;

pub use memory::MemoryStore;
pub use query::{compare_values, Direction, Filter, Operator, Query};
pub use write::{FieldValue, Fields, Precondition, Write, WriteBatch};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("document not found: {path}")]
    NotFound { path: String },

    #[error("document already exists: {path}")]
    AlreadyExists { path: String },

    #[error("precondition failed for {path}")]
    PreconditionFailed { path: String },

    #[error("permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 集合路径，例如 `readings` 或 `custom_lists/{id}/likes`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn doc(&self, id: impl Into<String>) -> DocumentPath {
        DocumentPath {
            collection: self.clone(),
            id: id.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 文档路径 = 集合路径 + 文档 id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath {
    collection: CollectionPath,
    id: String,
}

impl DocumentPath {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        CollectionPath::new(collection).doc(id)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    /// Sub-collection nested under this document.
    pub fn sub_collection(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}/{}", self.collection, self.id, name))
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A document as read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub path: DocumentPath,
    pub data: Map<String, Value>,
    /// Bumped on every write; used for optimistic concurrency.
    pub version: u64,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl DocumentSnapshot {
    pub fn id(&self) -> &str {
        self.path.id()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// 反序列化为模型类型，文档 id 以 `id` 字段注入
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut data = self.data.clone();
        data.insert("id".to_string(), Value::String(self.id().to_string()));
        Ok(serde_json::from_value(Value::Object(data))?)
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocumentPath) -> Result<Option<DocumentSnapshot>, StoreError>;

    /// Creates a document with a store-generated id and returns it with all
    /// field transforms (server timestamps, increments) resolved.
    async fn add(
        &self,
        collection: &CollectionPath,
        fields: Fields,
    ) -> Result<DocumentSnapshot, StoreError>;

    /// Applies every write or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    async fn query(&self, query: &Query) -> Result<Vec<DocumentSnapshot>, StoreError>;

    /// 实时订阅：接收端立即持有当前结果集，之后每次结果集变化都会更新
    async fn watch(
        &self,
        query: Query,
    ) -> Result<watch::Receiver<Vec<DocumentSnapshot>>, StoreError>;
}
