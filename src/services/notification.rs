use crate::{
    config::Config,
    error::Result,
    models::notification::*,
    services::{database::collections, Database, Subscription},
    store::{Direction, Fields, Query, WriteBatch},
};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct NotificationService {
    db: Arc<Database>,
    config: Config,
}

impl NotificationService {
    pub async fn new(db: Arc<Database>, config: &Config) -> Result<Self> {
        Ok(Self {
            db,
            config: config.clone(),
        })
    }

    fn unread_query(user_id: &str) -> Query {
        Query::new(collections::notifications())
            .where_eq("user_id", user_id)
            .where_eq("read", false)
    }

    /// 创建通知，未设置的可选字段不写入
    pub async fn create_notification(&self, request: CreateNotificationRequest) -> Result<Notification> {
        debug!(
            "Creating {:?} notification for user {}",
            request.notification_type, request.user_id
        );

        let fields = Fields::from_serializable(&request)?
            .set("read", false)
            .server_timestamp("created_at");
        let notification: Notification = self.db.create(&collections::notifications(), fields).await?;

        info!("Created notification {} for user {}", notification.id, notification.user_id);
        Ok(notification)
    }

    /// Newest first; `limit` defaults to the configured page size.
    pub async fn get_notifications(&self, user_id: &str, limit: Option<usize>) -> Result<Vec<Notification>> {
        let limit = limit.unwrap_or(self.config.notifications_page_size);
        let query = Query::new(collections::notifications())
            .where_eq("user_id", user_id)
            .order_by("created_at", Direction::Descending)
            .limit(limit);
        self.db.query_as(&query).await
    }

    pub async fn get_unread_count(&self, user_id: &str) -> Result<usize> {
        Ok(self.db.query(&Self::unread_query(user_id)).await?.len())
    }

    /// 未读数实时订阅：立即推送当前值，之后每次未读集合变化时推送
    pub async fn on_unread_count_changed<F>(&self, user_id: &str, callback: F) -> Result<Subscription>
    where
        F: FnMut(usize) + Send + 'static,
    {
        let changes = self.db.watch(Self::unread_query(user_id)).await?;
        debug!("Subscribed to unread count for user {}", user_id);
        Ok(Subscription::spawn(
            changes,
            |unread| async move { unread.len() },
            callback,
        ))
    }

    pub async fn mark_as_read(&self, notification_id: &str) -> Result<()> {
        self.db
            .update(
                collections::notifications().doc(notification_id),
                Fields::new().set("read", true),
            )
            .await
    }

    /// 批量标记已读，单个原子批次
    pub async fn mark_all_as_read(&self, user_id: &str) -> Result<usize> {
        let unread = self.db.query(&Self::unread_query(user_id)).await?;
        if unread.is_empty() {
            return Ok(0);
        }

        let mut batch = WriteBatch::new();
        for snapshot in &unread {
            batch.update(snapshot.path.clone(), Fields::new().set("read", true));
        }
        self.db.commit(batch).await?;

        info!("Marked {} notifications as read for user {}", unread.len(), user_id);
        Ok(unread.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tokio::sync::mpsc;

    async fn service() -> NotificationService {
        let db = Arc::new(Database::new(Arc::new(MemoryStore::new())));
        NotificationService::new(db, &Config::default()).await.unwrap()
    }

    fn request(user_id: &str, from: &str) -> CreateNotificationRequest {
        CreateNotificationRequest {
            user_id: user_id.to_string(),
            notification_type: NotificationType::FriendRequestReceived,
            title: "New friend request".to_string(),
            message: format!("{} sent you a friend request", from),
            from_user_id: format!("{}-id", from),
            from_username: from.to_string(),
            from_user_photo_url: None,
        }
    }

    #[tokio::test]
    async fn optional_fields_are_omitted_not_nulled() {
        let service = service().await;
        let created = service.create_notification(request("alice", "bob")).await.unwrap();

        let raw = service
            .db
            .get(&collections::notifications().doc(&created.id))
            .await
            .unwrap()
            .unwrap();
        assert!(!raw.data.contains_key("from_user_photo_url"));
        assert_eq!(created.from_user_photo_url, None);
        assert!(!created.read);
    }

    #[tokio::test]
    async fn notifications_are_newest_first_and_bounded() {
        let service = service().await;
        for from in ["bob", "carol", "dave"] {
            service.create_notification(request("alice", from)).await.unwrap();
        }
        service.create_notification(request("zed", "bob")).await.unwrap();

        let latest = service.get_notifications("alice", Some(2)).await.unwrap();
        let senders: Vec<_> = latest.iter().map(|n| n.from_username.as_str()).collect();
        assert_eq!(senders, vec!["dave", "carol"]);
        assert_eq!(service.get_notifications("alice", None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn mark_as_read_flips_one_record() {
        let service = service().await;
        let first = service.create_notification(request("alice", "bob")).await.unwrap();
        service.create_notification(request("alice", "carol")).await.unwrap();

        service.mark_as_read(&first.id).await.unwrap();
        assert_eq!(service.get_unread_count("alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unread_subscription_reaches_zero_after_mark_all() {
        let service = service().await;
        service.create_notification(request("alice", "bob")).await.unwrap();
        service.create_notification(request("alice", "carol")).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = service
            .on_unread_count_changed("alice", move |count| {
                let _ = tx.send(count);
            })
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(2));

        assert_eq!(service.mark_all_as_read("alice").await.unwrap(), 2);
        assert_eq!(rx.recv().await, Some(0));
        assert_eq!(service.get_unread_count("alice").await.unwrap(), 0);

        subscription.unsubscribe();
        service.create_notification(request("alice", "dave")).await.unwrap();
        assert_eq!(rx.recv().await, None);
    }
}
