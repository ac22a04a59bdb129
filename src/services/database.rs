use crate::error::{AppError, Result};
use crate::store::{
    CollectionPath, DocumentPath, DocumentSnapshot, DocumentStore, Fields, Query, StoreError,
    WriteBatch,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// 集合名称
pub mod collections {
    use crate::store::{CollectionPath, DocumentPath};

    pub const USERS: &str = "users";
    pub const USERNAMES: &str = "usernames";
    pub const READINGS: &str = "readings";
    pub const CUSTOM_LISTS: &str = "custom_lists";
    pub const FRIEND_REQUESTS: &str = "friend_requests";
    pub const NOTIFICATIONS: &str = "notifications";

    pub const LIKES: &str = "likes";
    pub const COMMENTS: &str = "comments";
    pub const FRIENDS: &str = "friends";

    pub fn users() -> CollectionPath {
        CollectionPath::new(USERS)
    }

    pub fn usernames() -> CollectionPath {
        CollectionPath::new(USERNAMES)
    }

    pub fn readings() -> CollectionPath {
        CollectionPath::new(READINGS)
    }

    pub fn custom_lists() -> CollectionPath {
        CollectionPath::new(CUSTOM_LISTS)
    }

    pub fn friend_requests() -> CollectionPath {
        CollectionPath::new(FRIEND_REQUESTS)
    }

    pub fn notifications() -> CollectionPath {
        CollectionPath::new(NOTIFICATIONS)
    }

    pub fn list_likes(list_id: &str) -> CollectionPath {
        custom_lists().doc(list_id).sub_collection(LIKES)
    }

    pub fn list_comments(list_id: &str) -> CollectionPath {
        custom_lists().doc(list_id).sub_collection(COMMENTS)
    }

    pub fn friends_of(user_id: &str) -> CollectionPath {
        users().doc(user_id).sub_collection(FRIENDS)
    }

    pub fn friend_edge(owner_id: &str, other_id: &str) -> DocumentPath {
        friends_of(owner_id).doc(other_id)
    }
}

/// 数据库服务
///
/// Typed facade over a `DocumentStore`: every read deserializes into a model
/// with the document id injected as `id`, and store errors surface as
/// `AppError`.
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn DocumentStore>,
}

impl Database {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// 读取原始文档
    pub async fn get(&self, path: &DocumentPath) -> Result<Option<DocumentSnapshot>> {
        Ok(self.store.get(path).await?)
    }

    /// 通过路径获取单个记录
    pub async fn get_by_path<T: DeserializeOwned>(&self, path: &DocumentPath) -> Result<Option<T>> {
        match self.store.get(path).await? {
            Some(snapshot) => Ok(Some(snapshot.deserialize()?)),
            None => Ok(None),
        }
    }

    /// 通过ID获取单个记录
    pub async fn get_by_id<T: DeserializeOwned>(&self, collection: &CollectionPath, id: &str) -> Result<Option<T>> {
        self.get_by_path(&collection.doc(id)).await
    }

    /// Like `get_by_id`, but a missing document is `NotFound`.
    pub async fn require<T: DeserializeOwned>(&self, collection: &CollectionPath, id: &str, what: &str) -> Result<T> {
        self.get_by_id(collection, id)
            .await?
            .ok_or_else(|| AppError::not_found(what))
    }

    /// 创建记录（自动生成 id）并返回解析后的模型
    pub async fn create<T: DeserializeOwned>(&self, collection: &CollectionPath, fields: Fields) -> Result<T> {
        let snapshot = self.store.add(collection, fields).await?;
        debug!("Created {}", snapshot.path);
        Ok(snapshot.deserialize()?)
    }

    pub async fn add(&self, collection: &CollectionPath, fields: Fields) -> Result<DocumentSnapshot> {
        Ok(self.store.add(collection, fields).await?)
    }

    pub async fn set(&self, path: DocumentPath, fields: Fields) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.set(path, fields);
        self.commit(batch).await
    }

    /// 部分更新，文档不存在时返回 NotFound
    pub async fn update(&self, path: DocumentPath, fields: Fields) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.update(path, fields);
        self.commit(batch).await
    }

    /// 更新后重新读取
    pub async fn update_and_get<T: DeserializeOwned>(&self, path: DocumentPath, fields: Fields) -> Result<T> {
        self.update(path.clone(), fields).await?;
        self.get_by_path(&path)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} not found", path)))
    }

    pub async fn delete(&self, path: DocumentPath) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(path);
        self.commit(batch).await
    }

    pub async fn commit(&self, batch: WriteBatch) -> Result<()> {
        Ok(self.store.commit(batch).await?)
    }

    /// Commit without error translation, for callers that give a failed
    /// precondition a domain meaning.
    pub async fn commit_raw(&self, batch: WriteBatch) -> std::result::Result<(), StoreError> {
        self.store.commit(batch).await
    }

    pub async fn query(&self, query: &Query) -> Result<Vec<DocumentSnapshot>> {
        Ok(self.store.query(query).await?)
    }

    pub async fn query_as<T: DeserializeOwned>(&self, query: &Query) -> Result<Vec<T>> {
        self.store
            .query(query)
            .await?
            .iter()
            .map(|snapshot| snapshot.deserialize().map_err(AppError::from))
            .collect()
    }

    /// 查找单个记录
    pub async fn find_one<T: DeserializeOwned>(&self, query: Query) -> Result<Option<T>> {
        Ok(self.query_as(&query.limit(1)).await?.into_iter().next())
    }

    pub async fn exists(&self, path: &DocumentPath) -> Result<bool> {
        Ok(self.store.get(path).await?.is_some())
    }

    pub async fn watch(&self, query: Query) -> Result<watch::Receiver<Vec<DocumentSnapshot>>> {
        Ok(self.store.watch(query).await?)
    }
}
