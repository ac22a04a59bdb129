use async_trait::async_trait;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use super::{
    CollectionPath, DocumentPath, DocumentSnapshot, DocumentStore, FieldValue, Fields, Precondition,
    Query, StoreError, Write, WriteBatch,
};
use crate::utils::serde_helpers::format_timestamp;

#[derive(Debug, Clone)]
struct StoredDocument {
    data: Map<String, Value>,
    version: u64,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
}

struct Watcher {
    query: Query,
    sender: watch::Sender<Vec<DocumentSnapshot>>,
}

type Collections = HashMap<CollectionPath, BTreeMap<String, StoredDocument>>;

#[derive(Default)]
struct Inner {
    collections: Collections,
    version: u64,
    last_timestamp: Option<DateTime<Utc>>,
    watchers: Vec<Watcher>,
}

/// 内存文档存储
///
/// Every operation runs under a single lock, so a batch commit is atomic with
/// respect to all readers and writers. Live queries are re-evaluated after
/// each successful commit.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    injected_failure: Mutex<Option<StoreError>>,
    interleaved_commit: Mutex<Option<WriteBatch>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next store call fail with `err`.
    pub fn fail_next(&self, err: StoreError) {
        *self.injected_failure.lock() = Some(err);
    }

    /// Commits `batch` just ahead of the next commit, as a concurrent writer
    /// landing between a caller's read and its write would.
    pub fn interleave_next_commit(&self, batch: WriteBatch) {
        *self.interleaved_commit.lock() = Some(batch);
    }

    fn check_injected(&self) -> Result<(), StoreError> {
        match self.injected_failure.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Inner {
    // 服务端时间戳单调递增，精度为微秒
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now().trunc_subsecs(6);
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_timestamp = Some(now);
        now
    }

    fn lookup(&self, path: &DocumentPath) -> Option<&StoredDocument> {
        self.collections
            .get(path.collection())
            .and_then(|docs| docs.get(path.id()))
    }

    fn commit(&mut self, writes: Vec<Write>) -> Result<(), StoreError> {
        let now = self.next_timestamp();
        let version = self.version + 1;
        let mut staged: HashMap<DocumentPath, Option<StoredDocument>> = HashMap::new();

        for write in writes {
            let path = write.path().clone();
            let current = match staged.get(&path) {
                Some(doc) => doc.clone(),
                None => self.lookup(&path).cloned(),
            };

            let next = match write {
                Write::Set {
                    fields,
                    precondition,
                    ..
                } => {
                    check_precondition(&path, current.as_ref(), precondition)?;
                    let mut data = Map::new();
                    apply_fields(&mut data, &fields, now);
                    Some(StoredDocument {
                        data,
                        version,
                        create_time: current.map(|d| d.create_time).unwrap_or(now),
                        update_time: now,
                    })
                }
                Write::Update {
                    fields,
                    precondition,
                    ..
                } => {
                    let Some(mut doc) = current else {
                        return Err(StoreError::NotFound {
                            path: path.to_string(),
                        });
                    };
                    check_precondition(&path, Some(&doc), precondition)?;
                    apply_fields(&mut doc.data, &fields, now);
                    doc.version = version;
                    doc.update_time = now;
                    Some(doc)
                }
                Write::Delete { precondition, .. } => {
                    check_precondition(&path, current.as_ref(), precondition)?;
                    None
                }
            };
            staged.insert(path, next);
        }

        self.version = version;
        for (path, doc) in staged {
            match doc {
                Some(doc) => {
                    self.collections
                        .entry(path.collection().clone())
                        .or_default()
                        .insert(path.id().to_string(), doc);
                }
                None => {
                    if let Some(docs) = self.collections.get_mut(path.collection()) {
                        docs.remove(path.id());
                    }
                }
            }
        }
        Ok(())
    }

    fn notify_watchers(&mut self) {
        self.watchers.retain(|w| !w.sender.is_closed());
        let collections = &self.collections;
        for watcher in &self.watchers {
            let results = evaluate(collections, &watcher.query);
            watcher.sender.send_if_modified(|current| {
                if *current != results {
                    *current = results;
                    true
                } else {
                    false
                }
            });
        }
    }
}

fn snapshot(path: DocumentPath, doc: &StoredDocument) -> DocumentSnapshot {
    DocumentSnapshot {
        path,
        data: doc.data.clone(),
        version: doc.version,
        create_time: doc.create_time,
        update_time: doc.update_time,
    }
}

fn evaluate(collections: &Collections, query: &Query) -> Vec<DocumentSnapshot> {
    let candidates = collections
        .get(&query.collection)
        .map(|docs| {
            docs.iter()
                .map(|(id, doc)| snapshot(query.collection.doc(id.clone()), doc))
                .collect()
        })
        .unwrap_or_default();
    query.apply(candidates)
}

fn check_precondition(
    path: &DocumentPath,
    current: Option<&StoredDocument>,
    precondition: Precondition,
) -> Result<(), StoreError> {
    match (precondition, current) {
        (Precondition::None, _) | (Precondition::Exists, Some(_)) | (Precondition::Missing, None) => Ok(()),
        (Precondition::Exists, None) => Err(StoreError::NotFound {
            path: path.to_string(),
        }),
        (Precondition::Missing, Some(_)) => Err(StoreError::AlreadyExists {
            path: path.to_string(),
        }),
        (Precondition::Version(expected), Some(doc)) if doc.version == expected => Ok(()),
        (Precondition::Version(_), _) => Err(StoreError::PreconditionFailed {
            path: path.to_string(),
        }),
    }
}

fn apply_fields(data: &mut Map<String, Value>, fields: &Fields, now: DateTime<Utc>) {
    for (field, value) in fields.iter() {
        match value {
            FieldValue::Value(v) => {
                data.insert(field.clone(), v.clone());
            }
            FieldValue::ServerTimestamp => {
                data.insert(field.clone(), Value::String(format_timestamp(&now)));
            }
            FieldValue::Increment(by) => {
                let current = data.get(field).and_then(Value::as_i64).unwrap_or(0);
                data.insert(field.clone(), Value::from(current + by));
            }
            FieldValue::ArrayUnion(values) => {
                let mut items = match data.remove(field) {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                for v in values {
                    if !items.contains(v) {
                        items.push(v.clone());
                    }
                }
                data.insert(field.clone(), Value::Array(items));
            }
            FieldValue::ArrayRemove(values) => {
                let mut items = match data.remove(field) {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                items.retain(|item| !values.contains(item));
                data.insert(field.clone(), Value::Array(items));
            }
            FieldValue::Delete => {
                data.remove(field);
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<DocumentSnapshot>, StoreError> {
        self.check_injected()?;
        let inner = self.inner.read();
        Ok(inner.lookup(path).map(|doc| snapshot(path.clone(), doc)))
    }

    async fn add(
        &self,
        collection: &CollectionPath,
        fields: Fields,
    ) -> Result<DocumentSnapshot, StoreError> {
        self.check_injected()?;
        let path = collection.doc(Uuid::new_v4().simple().to_string());
        let mut inner = self.inner.write();
        inner.commit(vec![Write::Set {
            path: path.clone(),
            fields,
            precondition: Precondition::Missing,
        }])?;
        inner.notify_watchers();

        let doc = inner.lookup(&path).ok_or_else(|| StoreError::NotFound {
            path: path.to_string(),
        })?;
        debug!("Added document {}", path);
        Ok(snapshot(path, doc))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.check_injected()?;
        if batch.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.write();
        if let Some(concurrent) = self.interleaved_commit.lock().take() {
            if let Err(e) = inner.commit(concurrent.into_writes()) {
                debug!("Interleaved commit rejected: {}", e);
            }
            inner.notify_watchers();
        }
        inner.commit(batch.into_writes())?;
        inner.notify_watchers();
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<DocumentSnapshot>, StoreError> {
        self.check_injected()?;
        let inner = self.inner.read();
        Ok(evaluate(&inner.collections, query))
    }

    async fn watch(
        &self,
        query: Query,
    ) -> Result<watch::Receiver<Vec<DocumentSnapshot>>, StoreError> {
        self.check_injected()?;
        let mut inner = self.inner.write();
        let (sender, receiver) = watch::channel(evaluate(&inner.collections, &query));
        inner.watchers.push(Watcher { query, sender });
        Ok(receiver)
    }
}
