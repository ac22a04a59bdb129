use crate::{
    config::Config,
    error::{AppError, Result},
    models::{custom_list::*, reading::Reading},
    services::{database::collections, Database},
    store::{Direction, DocumentPath, Fields, Precondition, Query, StoreError, WriteBatch},
    utils::{
        slug::{generate_list_slug, is_valid_slug},
        validation::validate_comment_content,
    },
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;

#[derive(Serialize)]
struct ListDocument<'a> {
    user_id: &'a str,
    user_name: &'a str,
    name: &'a str,
    description: Option<&'a str>,
    slug: &'a str,
    cover_image: Option<&'a str>,
    readings: &'a [ListReading],
    visibility: ListVisibility,
    likes_count: i64,
}

/// 自定义列表服务：列表、嵌入的阅读快照、点赞与评论
#[derive(Clone)]
pub struct CustomListService {
    db: Arc<Database>,
    config: Config,
}

impl CustomListService {
    pub async fn new(db: Arc<Database>, config: &Config) -> Result<Self> {
        Ok(Self {
            db,
            config: config.clone(),
        })
    }

    fn list_path(list_id: &str) -> DocumentPath {
        collections::custom_lists().doc(list_id)
    }

    fn like_path(list_id: &str, user_id: &str) -> DocumentPath {
        collections::list_likes(list_id).doc(user_id)
    }

    /// 创建列表，slug 由名称和时间后缀生成，点赞数从 0 开始
    pub async fn create(
        &self,
        owner_id: &str,
        owner_name: &str,
        request: CreateCustomListRequest,
    ) -> Result<CustomList> {
        request.validate()?;
        debug!("Creating list '{}' for user {}", request.name, owner_id);

        let slug = generate_list_slug(&request.name);
        let document = ListDocument {
            user_id: owner_id,
            user_name: owner_name,
            name: request.name.trim(),
            description: request.description.as_deref(),
            slug: &slug,
            cover_image: request.cover_image.as_deref(),
            readings: &request.readings,
            visibility: request.visibility,
            likes_count: 0,
        };
        let fields = Fields::from_serializable(&document)?
            .server_timestamp("created_at")
            .server_timestamp("updated_at");

        let list: CustomList = self.db.create(&collections::custom_lists(), fields).await?;
        info!("Created list {} with slug {}", list.id, list.slug);
        Ok(list)
    }

    /// 部分更新；提供 readings 时整体替换，slug 不可修改
    pub async fn update(&self, list_id: &str, request: UpdateCustomListRequest) -> Result<CustomList> {
        request.validate()?;

        let mut fields = Fields::new();
        if let Some(name) = &request.name {
            fields = fields.set("name", name.trim());
        }
        if let Some(description) = &request.description {
            fields = fields.set("description", serde_json::to_value(description)?);
        }
        if let Some(visibility) = request.visibility {
            fields = fields.set("visibility", serde_json::to_value(visibility)?);
        }
        if let Some(user_name) = &request.user_name {
            fields = fields.set("user_name", user_name.trim());
        }
        if let Some(cover_image) = &request.cover_image {
            fields = fields.set("cover_image", serde_json::to_value(cover_image)?);
        }
        if let Some(readings) = &request.readings {
            fields = fields.set("readings", serde_json::to_value(readings)?);
        }
        let fields = fields.server_timestamp("updated_at");

        let list: CustomList = self.db.update_and_get(Self::list_path(list_id), fields).await?;
        info!("Updated list {}", list_id);
        Ok(list)
    }

    /// Deletes the list together with its like and comment records.
    pub async fn delete(&self, list_id: &str) -> Result<()> {
        let likes_query = Query::new(collections::list_likes(list_id));
        let comments_query = Query::new(collections::list_comments(list_id));
        let (likes, comments) = futures::try_join!(
            self.db.query(&likes_query),
            self.db.query(&comments_query),
        )?;

        let mut batch = WriteBatch::new();
        for snapshot in likes.iter().chain(comments.iter()) {
            batch.delete(snapshot.path.clone());
        }
        batch.delete(Self::list_path(list_id));
        self.db.commit(batch).await?;

        info!(
            "Deleted list {} ({} likes, {} comments)",
            list_id,
            likes.len(),
            comments.len()
        );
        Ok(())
    }

    pub async fn get_by_id(&self, list_id: &str) -> Result<Option<CustomList>> {
        self.db.get_by_id(&collections::custom_lists(), list_id).await
    }

    /// 通过 slug 查找
    ///
    /// Shared lists resolve for anyone. A private list resolves only when
    /// `viewer_id` is its owner; for everyone else it is `None`, exactly as
    /// if the slug did not exist.
    pub async fn get_by_slug(&self, slug: &str, viewer_id: Option<&str>) -> Result<Option<CustomList>> {
        if !is_valid_slug(slug) {
            return Ok(None);
        }
        let shared = Query::new(collections::custom_lists())
            .where_eq("slug", slug)
            .where_in(
                "visibility",
                vec![
                    serde_json::to_value(ListVisibility::Public)?,
                    serde_json::to_value(ListVisibility::Link)?,
                ],
            );
        if let Some(list) = self.db.find_one(shared).await? {
            return Ok(Some(list));
        }

        match viewer_id {
            Some(viewer_id) => {
                let owned = Query::new(collections::custom_lists())
                    .where_eq("slug", slug)
                    .where_eq("user_id", viewer_id);
                self.db.find_one(owned).await
            }
            None => Ok(None),
        }
    }

    pub async fn get_by_user_id(&self, user_id: &str) -> Result<Vec<CustomList>> {
        let query = Query::new(collections::custom_lists())
            .where_eq("user_id", user_id)
            .order_by("updated_at", Direction::Descending);
        self.db.query_as(&query).await
    }

    /// Public lists, most liked first.
    pub async fn get_public_lists(&self) -> Result<Vec<CustomList>> {
        let query = Query::new(collections::custom_lists())
            .where_eq("visibility", serde_json::to_value(ListVisibility::Public)?)
            .order_by("likes_count", Direction::Descending);
        self.db.query_as(&query).await
    }

    /// 读取-修改-写回嵌入的快照数组，以读取时的版本为前提条件
    async fn edit_readings<F>(&self, list_id: &str, edit: F) -> Result<CustomList>
    where
        F: FnOnce(&mut Vec<ListReading>) -> bool,
    {
        let path = Self::list_path(list_id);
        let snapshot = self
            .db
            .get(&path)
            .await?
            .ok_or_else(|| AppError::not_found("Custom list"))?;
        let mut list: CustomList = snapshot.deserialize()?;
        if !edit(&mut list.readings) {
            return Ok(list);
        }

        let fields = Fields::new()
            .set("readings", serde_json::to_value(&list.readings)?)
            .server_timestamp("updated_at");
        let mut batch = WriteBatch::new();
        batch.update_with(path.clone(), fields, Precondition::Version(snapshot.version));
        self.db.commit(batch).await?;

        self.db
            .get_by_path(&path)
            .await?
            .ok_or_else(|| AppError::not_found("Custom list"))
    }

    /// Appends a snapshot unless an entry with the same reading id is present.
    pub async fn add_reading(&self, list_id: &str, snapshot: ListReading) -> Result<CustomList> {
        debug!("Adding reading {} to list {}", snapshot.id, list_id);
        self.edit_readings(list_id, |readings| {
            if readings.iter().any(|r| r.id == snapshot.id) {
                return false;
            }
            readings.push(snapshot);
            true
        })
        .await
    }

    /// 按条目 id 移除快照，快照字段是否过期不影响匹配
    pub async fn remove_reading(&self, list_id: &str, reading_id: &str) -> Result<CustomList> {
        debug!("Removing reading {} from list {}", reading_id, list_id);
        self.edit_readings(list_id, |readings| {
            let before = readings.len();
            readings.retain(|r| r.id != reading_id);
            readings.len() != before
        })
        .await
    }

    /// Re-copies the current state of `reading` into the list's snapshot of it.
    pub async fn refresh_reading_snapshot(&self, list_id: &str, reading: &Reading) -> Result<CustomList> {
        let fresh = ListReading::from(reading);
        self.edit_readings(list_id, |readings| {
            match readings.iter_mut().find(|r| r.id == fresh.id) {
                Some(entry) if *entry != fresh => {
                    *entry = fresh;
                    true
                }
                _ => false,
            }
        })
        .await
    }

    /// 切换点赞，点赞记录与计数在同一批次中提交
    ///
    /// Returns whether the user likes the list afterwards. A concurrent toggle
    /// by the same user fails the batch precondition and surfaces as
    /// `Transient`; a missing list is `NotFound`.
    pub async fn toggle_like(&self, list_id: &str, user_id: &str) -> Result<bool> {
        let like_path = Self::like_path(list_id, user_id);
        let liked = self.db.exists(&like_path).await?;

        let mut batch = WriteBatch::new();
        if liked {
            batch
                .delete_with(like_path.clone(), Precondition::Exists)
                .update(Self::list_path(list_id), Fields::new().increment("likes_count", -1));
        } else {
            let like = Fields::new()
                .set("user_id", user_id)
                .server_timestamp("created_at");
            batch
                .create(like_path.clone(), like)
                .update(Self::list_path(list_id), Fields::new().increment("likes_count", 1));
        }

        let like_key = like_path.to_string();
        self.db.commit_raw(batch).await.map_err(|e| match e {
            // 点赞记录在读取后被并发修改
            StoreError::NotFound { path } | StoreError::AlreadyExists { path } if path == like_key => {
                AppError::transient(&format!("concurrent like toggle on {}", path))
            }
            other => other.into(),
        })?;

        info!("User {} {} list {}", user_id, if liked { "unliked" } else { "liked" }, list_id);
        Ok(!liked)
    }

    pub async fn has_user_liked(&self, list_id: &str, user_id: &str) -> Result<bool> {
        let like: Option<ListLike> = self.db.get_by_path(&Self::like_path(list_id, user_id)).await?;
        Ok(like.is_some())
    }

    pub async fn add_comment(
        &self,
        list_id: &str,
        user_id: &str,
        user_name: &str,
        content: &str,
    ) -> Result<ListComment> {
        let content = validate_comment_content(content, self.config.max_comment_length)?;
        if !self.db.exists(&Self::list_path(list_id)).await? {
            return Err(AppError::not_found("Custom list"));
        }

        let fields = Fields::new()
            .set("list_id", list_id)
            .set("user_id", user_id)
            .set("user_name", user_name)
            .set("content", content)
            .server_timestamp("created_at");
        let comment: ListComment = self.db.create(&collections::list_comments(list_id), fields).await?;

        info!("User {} commented on list {}", user_id, list_id);
        Ok(comment)
    }

    /// Newest first.
    pub async fn get_comments(&self, list_id: &str) -> Result<Vec<ListComment>> {
        let query = Query::new(collections::list_comments(list_id)).order_by("created_at", Direction::Descending);
        self.db.query_as(&query).await
    }

    pub async fn delete_comment(&self, list_id: &str, comment_id: &str) -> Result<()> {
        self.db
            .delete(collections::list_comments(list_id).doc(comment_id))
            .await?;
        info!("Deleted comment {} from list {}", comment_id, list_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::reading::{ReadingCategory, ReadingStatus};
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn service() -> CustomListService {
        service_with_store().await.0
    }

    async fn service_with_store() -> (CustomListService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let db = Arc::new(Database::new(store.clone()));
        (CustomListService::new(db, &Config::default()).await.unwrap(), store)
    }

    fn snapshot(id: &str, title: &str) -> ListReading {
        ListReading {
            id: id.to_string(),
            title: title.to_string(),
            image_url: None,
            category: ReadingCategory::Manhwa,
            status: ReadingStatus::Reading,
        }
    }

    fn request(name: &str, visibility: ListVisibility) -> CreateCustomListRequest {
        CreateCustomListRequest {
            name: name.to_string(),
            description: None,
            visibility,
            cover_image: None,
            readings: Vec::new(),
        }
    }

    #[tokio::test]
    async fn identical_names_get_distinct_stable_slugs() {
        let service = service().await;
        let first = service.create("alice", "Alice", request("Favs", ListVisibility::Public)).await.unwrap();
        let second = service.create("bob", "Bob", request("Favs", ListVisibility::Public)).await.unwrap();

        assert!(first.slug.starts_with("favs-"));
        assert_ne!(first.slug, second.slug);
        assert_eq!(first.likes_count, 0);

        let renamed = service
            .update(
                &first.id,
                UpdateCustomListRequest {
                    name: Some("Best of 2024".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.slug, first.slug);
        assert_eq!(renamed.name, "Best of 2024");
    }

    #[tokio::test]
    async fn private_lists_resolve_only_for_their_owner() {
        let service = service().await;
        let list = service.create("alice", "Alice", request("Secret", ListVisibility::Private)).await.unwrap();

        assert!(service.get_by_slug(&list.slug, Some("alice")).await.unwrap().is_some());
        assert!(service.get_by_slug(&list.slug, Some("bob")).await.unwrap().is_none());
        assert!(service.get_by_slug(&list.slug, None).await.unwrap().is_none());

        let link = service.create("alice", "Alice", request("Shared", ListVisibility::Link)).await.unwrap();
        assert!(service.get_by_slug(&link.slug, None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_replaces_readings_wholesale() {
        let service = service().await;
        let mut create = request("Favs", ListVisibility::Public);
        create.readings = vec![snapshot("r1", "One"), snapshot("r2", "Two")];
        let list = service.create("alice", "Alice", create).await.unwrap();

        let updated = service
            .update(
                &list.id,
                UpdateCustomListRequest {
                    readings: Some(vec![snapshot("r3", "Three")]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.readings, vec![snapshot("r3", "Three")]);
    }

    #[tokio::test]
    async fn remove_matches_by_id_even_after_drift() {
        let service = service().await;
        let list = service.create("alice", "Alice", request("Favs", ListVisibility::Public)).await.unwrap();
        service.add_reading(&list.id, snapshot("r1", "Old title")).await.unwrap();
        let again = service.add_reading(&list.id, snapshot("r1", "Old title")).await.unwrap();
        assert_eq!(again.readings.len(), 1);

        let removed = service.remove_reading(&list.id, "r1").await.unwrap();
        assert!(removed.readings.is_empty());
        let raw = service.db.get(&CustomListService::list_path(&list.id)).await.unwrap().unwrap();
        assert_eq!(raw.get("readings"), Some(&json!([])));
    }

    #[tokio::test]
    async fn legacy_entries_are_removable_by_id() {
        let service = service().await;
        let list = service.create("alice", "Alice", request("Favs", ListVisibility::Public)).await.unwrap();
        service
            .db
            .update(
                CustomListService::list_path(&list.id),
                Fields::new().set("readings", json!(["legacy-1", {"id": "r2", "title": "Two", "category": "manga", "status": "to-read"}])),
            )
            .await
            .unwrap();

        let loaded = service.get_by_id(&list.id).await.unwrap().unwrap();
        assert_eq!(loaded.readings[0].title, ListReading::PLACEHOLDER_TITLE);

        let removed = service.remove_reading(&list.id, "legacy-1").await.unwrap();
        assert_eq!(removed.readings.len(), 1);
        assert_eq!(removed.readings[0].id, "r2");
    }

    #[tokio::test]
    async fn toggle_like_moves_record_and_counter_together() {
        let service = service().await;
        let list = service.create("alice", "Alice", request("Favs", ListVisibility::Public)).await.unwrap();

        assert!(service.toggle_like(&list.id, "bob").await.unwrap());
        assert!(service.has_user_liked(&list.id, "bob").await.unwrap());
        assert_eq!(service.get_by_id(&list.id).await.unwrap().unwrap().likes_count, 1);

        assert!(!service.toggle_like(&list.id, "bob").await.unwrap());
        assert!(!service.has_user_liked(&list.id, "bob").await.unwrap());
        assert_eq!(service.get_by_id(&list.id).await.unwrap().unwrap().likes_count, 0);
    }

    #[tokio::test]
    async fn liking_a_missing_list_leaves_no_like_record() {
        let service = service().await;
        assert!(matches!(
            service.toggle_like("ghost", "bob").await,
            Err(AppError::NotFound(_))
        ));
        assert!(!service.has_user_liked("ghost", "bob").await.unwrap());
    }

    #[tokio::test]
    async fn unlike_racing_another_unlike_is_transient() {
        let (service, store) = service_with_store().await;
        let list = service.create("alice", "Alice", request("Favs", ListVisibility::Public)).await.unwrap();
        service.toggle_like(&list.id, "bob").await.unwrap();

        let mut concurrent = WriteBatch::new();
        concurrent
            .delete(CustomListService::like_path(&list.id, "bob"))
            .update(CustomListService::list_path(&list.id), Fields::new().increment("likes_count", -1));
        store.interleave_next_commit(concurrent);

        assert!(matches!(
            service.toggle_like(&list.id, "bob").await,
            Err(AppError::Transient(_))
        ));
        assert!(!service.has_user_liked(&list.id, "bob").await.unwrap());
        assert_eq!(service.get_by_id(&list.id).await.unwrap().unwrap().likes_count, 0);
    }

    #[tokio::test]
    async fn like_racing_another_like_keeps_counter_in_step() {
        let (service, store) = service_with_store().await;
        let list = service.create("alice", "Alice", request("Favs", ListVisibility::Public)).await.unwrap();

        let mut concurrent = WriteBatch::new();
        concurrent
            .create(
                CustomListService::like_path(&list.id, "bob"),
                Fields::new().set("user_id", "bob").server_timestamp("created_at"),
            )
            .update(CustomListService::list_path(&list.id), Fields::new().increment("likes_count", 1));
        store.interleave_next_commit(concurrent);

        assert!(matches!(
            service.toggle_like(&list.id, "bob").await,
            Err(AppError::Transient(_))
        ));
        let likes = service
            .db
            .query(&Query::new(collections::list_likes(&list.id)))
            .await
            .unwrap();
        assert_eq!(likes.len(), 1);
        assert_eq!(service.get_by_id(&list.id).await.unwrap().unwrap().likes_count, 1);
        assert!(service.has_user_liked(&list.id, "bob").await.unwrap());
    }

    #[tokio::test]
    async fn edit_against_stale_snapshot_is_transient() {
        let (service, store) = service_with_store().await;
        let list = service.create("alice", "Alice", request("Favs", ListVisibility::Public)).await.unwrap();

        let mut concurrent = WriteBatch::new();
        concurrent.update(
            CustomListService::list_path(&list.id),
            Fields::new().set("name", "Renamed elsewhere"),
        );
        store.interleave_next_commit(concurrent);

        assert!(matches!(
            service.add_reading(&list.id, snapshot("r1", "One")).await,
            Err(AppError::Transient(_))
        ));
        let current = service.get_by_id(&list.id).await.unwrap().unwrap();
        assert_eq!(current.name, "Renamed elsewhere");
        assert!(current.readings.is_empty());
    }

    #[tokio::test]
    async fn malformed_slugs_resolve_to_nothing() {
        let service = service().await;
        service.create("alice", "Alice", request("Favs", ListVisibility::Public)).await.unwrap();
        assert!(service.get_by_slug("Not A Slug!", Some("alice")).await.unwrap().is_none());
        assert!(service.get_by_slug("", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_refreshes_owner_display_name() {
        let service = service().await;
        let list = service.create("alice", "Alice", request("Favs", ListVisibility::Public)).await.unwrap();

        let updated = service
            .update(
                &list.id,
                UpdateCustomListRequest {
                    user_name: Some("  Alice Renamed ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.user_name, "Alice Renamed");
        assert_eq!(updated.name, "Favs");
    }

    #[tokio::test]
    async fn public_lists_are_ordered_by_likes() {
        let service = service().await;
        let quiet = service.create("alice", "Alice", request("Quiet", ListVisibility::Public)).await.unwrap();
        let popular = service.create("alice", "Alice", request("Popular", ListVisibility::Public)).await.unwrap();
        service.create("alice", "Alice", request("Hidden", ListVisibility::Private)).await.unwrap();
        service.toggle_like(&popular.id, "bob").await.unwrap();
        service.toggle_like(&popular.id, "carol").await.unwrap();
        service.toggle_like(&quiet.id, "bob").await.unwrap();

        let names: Vec<_> = service
            .get_public_lists()
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["Popular", "Quiet"]);
        assert_eq!(service.get_by_user_id("alice").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn comments_are_validated_and_newest_first() {
        let service = service().await;
        let list = service.create("alice", "Alice", request("Favs", ListVisibility::Public)).await.unwrap();

        assert!(service.add_comment(&list.id, "bob", "Bob", "   ").await.is_err());
        let first = service.add_comment(&list.id, "bob", "Bob", " great picks ").await.unwrap();
        assert_eq!(first.content, "great picks");
        service.add_comment(&list.id, "carol", "Carol", "agreed").await.unwrap();

        let comments = service.get_comments(&list.id).await.unwrap();
        assert_eq!(comments[0].content, "agreed");
        assert_eq!(comments[1].content, "great picks");

        service.delete_comment(&list.id, &first.id).await.unwrap();
        assert_eq!(service.get_comments(&list.id).await.unwrap().len(), 1);

        assert!(matches!(
            service.add_comment("ghost", "bob", "Bob", "hi").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_cascades_likes_and_comments() {
        let service = service().await;
        let list = service.create("alice", "Alice", request("Favs", ListVisibility::Public)).await.unwrap();
        service.toggle_like(&list.id, "bob").await.unwrap();
        service.add_comment(&list.id, "bob", "Bob", "nice").await.unwrap();

        service.delete(&list.id).await.unwrap();

        assert!(service.get_by_id(&list.id).await.unwrap().is_none());
        assert!(!service.has_user_liked(&list.id, "bob").await.unwrap());
        assert!(service.get_comments(&list.id).await.unwrap().is_empty());
    }
}
