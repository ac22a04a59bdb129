use crate::{
    config::Config,
    error::{AppError, Result},
    models::{friend::*, notification::*, user::*},
    services::{database::collections, Database, NotificationService},
    store::{Direction, DocumentPath, Fields, Precondition, Query, StoreError, WriteBatch},
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 好友关系服务
///
/// Requests live in a top-level collection; an accepted request becomes two
/// mirrored edges under `users/{id}/friends`. Requester and friend details
/// are copied at write time and never refreshed.
#[derive(Clone)]
pub struct FriendService {
    db: Arc<Database>,
    notification_service: NotificationService,
    config: Config,
}

impl FriendService {
    pub async fn new(db: Arc<Database>, notification_service: NotificationService, config: &Config) -> Result<Self> {
        Ok(Self {
            db,
            notification_service,
            config: config.clone(),
        })
    }

    fn request_path(request_id: &str) -> DocumentPath {
        collections::friend_requests().doc(request_id)
    }

    fn pending_between(from_user_id: &str, to_user_id: &str) -> Query {
        Query::new(collections::friend_requests())
            .where_eq("from_user_id", from_user_id)
            .where_eq("to_user_id", to_user_id)
            .where_eq("status", "pending")
            .limit(1)
    }

    fn edge_fields(user_id: &str, username: &str, photo_url: Option<&str>) -> Fields {
        Fields::new()
            .set("user_id", user_id)
            .set("username", username)
            .set("photo_url", photo_url.map_or(Value::Null, Value::from))
            .server_timestamp("added_at")
    }

    /// 按用户名前缀搜索（大小写不敏感），排除调用者本人
    ///
    /// Queries shorter than the configured minimum return no results.
    pub async fn search_users(&self, query: &str, exclude_user_id: &str) -> Result<Vec<User>> {
        let query = query.trim();
        if query.chars().count() < self.config.search_min_length {
            return Ok(Vec::new());
        }
        debug!("Searching users with prefix '{}'", query);

        let prefix = query.to_lowercase();
        let upper = format!("{}\u{f8ff}", prefix);
        let max = self.config.search_max_results;
        let search = Query::new(collections::users())
            .where_gte("username_lower", prefix.as_str())
            .where_lte("username_lower", upper)
            .order_by("username_lower", Direction::Ascending)
            .limit(max + 1);

        let records: Vec<UserProfileRecord> = self.db.query_as(&search).await?;
        Ok(records
            .into_iter()
            .filter(|r| r.id != exclude_user_id)
            .take(max)
            .map(User::from)
            .collect())
    }

    /// Friendship first, then an outgoing pending request, then an incoming one.
    pub async fn check_friendship_status(&self, user_id: &str, other_user_id: &str) -> Result<FriendshipStatus> {
        if self.db.exists(&collections::friend_edge(user_id, other_user_id)).await? {
            return Ok(FriendshipStatus::Friends);
        }
        if !self.db.query(&Self::pending_between(user_id, other_user_id)).await?.is_empty() {
            return Ok(FriendshipStatus::PendingSent);
        }
        if !self.db.query(&Self::pending_between(other_user_id, user_id)).await?.is_empty() {
            return Ok(FriendshipStatus::PendingReceived);
        }
        Ok(FriendshipStatus::None)
    }

    pub async fn send_friend_request(&self, from_user: &User, to_user_id: &str) -> Result<FriendRequest> {
        if from_user.id == to_user_id {
            return Err(AppError::validation("Cannot send a friend request to yourself"));
        }
        if !self.db.exists(&collections::users().doc(to_user_id)).await? {
            return Err(AppError::not_found("User"));
        }

        let status = self.check_friendship_status(&from_user.id, to_user_id).await?;
        if status != FriendshipStatus::None {
            return Err(AppError::DuplicateOrExisting(format!(
                "friendship status with {} is {:?}",
                to_user_id, status
            )));
        }

        let fields = Fields::new()
            .set("from_user_id", from_user.id.as_str())
            .set("from_username", from_user.username.as_str())
            .set("from_user_photo_url", from_user.photo_url.as_deref().map_or(Value::Null, Value::from))
            .set("to_user_id", to_user_id)
            .set("status", "pending")
            .set("responded_at", Value::Null)
            .server_timestamp("created_at");
        let request: FriendRequest = self.db.create(&collections::friend_requests(), fields).await?;
        info!("Friend request {} sent from {} to {}", request.id, from_user.id, to_user_id);

        let notification = CreateNotificationRequest {
            user_id: to_user_id.to_string(),
            notification_type: NotificationType::FriendRequestReceived,
            title: "New friend request".to_string(),
            message: format!("{} sent you a friend request", from_user.username),
            from_user_id: from_user.id.clone(),
            from_username: from_user.username.clone(),
            from_user_photo_url: from_user.photo_url.clone(),
        };
        if let Err(e) = self.notification_service.create_notification(notification).await {
            warn!("Failed to notify {} of friend request {}: {}", to_user_id, request.id, e);
        }

        Ok(request)
    }

    /// Pending requests addressed to the user, newest first.
    pub async fn get_pending_requests(&self, user_id: &str) -> Result<Vec<FriendRequest>> {
        let query = Query::new(collections::friend_requests())
            .where_eq("to_user_id", user_id)
            .where_eq("status", "pending")
            .order_by("created_at", Direction::Descending);
        self.db.query_as(&query).await
    }

    /// 处理好友请求
    ///
    /// Both decisions commit only if the request is unchanged since it was
    /// read as pending; otherwise `AlreadyResolved`. Acceptance writes both
    /// friend edges and the status in one batch.
    pub async fn respond_to_request(&self, request_id: &str, decision: FriendDecision) -> Result<FriendRequest> {
        let path = Self::request_path(request_id);
        let snapshot = self
            .db
            .get(&path)
            .await?
            .ok_or_else(|| AppError::not_found("Friend request"))?;
        let request: FriendRequest = snapshot.deserialize()?;
        if request.status != FriendRequestStatus::Pending {
            return Err(AppError::AlreadyResolved(request_id.to_string()));
        }

        let status: FriendRequestStatus = decision.into();
        let resolution = Fields::new()
            .set("status", serde_json::to_value(status)?)
            .server_timestamp("responded_at");

        let mut batch = WriteBatch::new();
        let mut recipient = None;
        if decision == FriendDecision::Accepted {
            let target: UserProfileRecord = self
                .db
                .require(&collections::users(), &request.to_user_id, "User")
                .await?;
            batch
                .set(
                    collections::friend_edge(&request.from_user_id, &request.to_user_id),
                    Self::edge_fields(&target.id, &target.username, target.photo_url.as_deref()),
                )
                .set(
                    collections::friend_edge(&request.to_user_id, &request.from_user_id),
                    Self::edge_fields(
                        &request.from_user_id,
                        &request.from_username,
                        request.from_user_photo_url.as_deref(),
                    ),
                );
            recipient = Some(target);
        }
        batch.update_with(path.clone(), resolution, Precondition::Version(snapshot.version));

        self.db.commit_raw(batch).await.map_err(|e| match e {
            StoreError::PreconditionFailed { .. } => AppError::AlreadyResolved(request_id.to_string()),
            other => other.into(),
        })?;
        info!("Friend request {} {:?}", request_id, status);

        if let Some(target) = recipient {
            let notification = CreateNotificationRequest {
                user_id: request.from_user_id.clone(),
                notification_type: NotificationType::FriendRequestAccepted,
                title: "Friend request accepted".to_string(),
                message: format!("{} accepted your friend request", target.username),
                from_user_id: target.id.clone(),
                from_username: target.username.clone(),
                from_user_photo_url: target.photo_url.clone(),
            };
            if let Err(e) = self.notification_service.create_notification(notification).await {
                warn!(
                    "Failed to notify {} of accepted request {}: {}",
                    request.from_user_id, request_id, e
                );
            }
        }

        self.db
            .get_by_path(&path)
            .await?
            .ok_or_else(|| AppError::not_found("Friend request"))
    }

    pub async fn get_friends(&self, user_id: &str) -> Result<Vec<Friend>> {
        let query = Query::new(collections::friends_of(user_id)).order_by("added_at", Direction::Descending);
        self.db.query_as(&query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::UserService;
    use crate::store::MemoryStore;
    use chrono::Utc;

    struct Fixture {
        friends: FriendService,
        users: UserService,
        notifications: NotificationService,
        store: Arc<MemoryStore>,
    }

    async fn fixture() -> Fixture {
        let config = Config::default();
        let store = Arc::new(MemoryStore::new());
        let db = Arc::new(Database::new(store.clone()));
        let notifications = NotificationService::new(db.clone(), &config).await.unwrap();
        Fixture {
            friends: FriendService::new(db.clone(), notifications.clone(), &config).await.unwrap(),
            users: UserService::new(db, &config).await.unwrap(),
            notifications,
            store,
        }
    }

    async fn register(fixture: &Fixture, id: &str, username: &str) -> User {
        let user = User {
            id: id.to_string(),
            email: format!("{}@x.com", id),
            username: username.to_string(),
            display_name: Some(username.to_string()),
            photo_url: Some(format!("https://img.example.com/{}.png", id)),
            age: None,
            country: None,
            created_at: Utc::now(),
            is_profile_complete: true,
        };
        fixture.users.create_account_records(&user).await.unwrap();
        user
    }

    #[tokio::test]
    async fn request_lifecycle_statuses() {
        let f = fixture().await;
        let alice = register(&f, "alice", "alice_01").await;
        let bob = register(&f, "bob", "bob_0001").await;

        assert_eq!(f.friends.check_friendship_status("bob", "alice").await.unwrap(), FriendshipStatus::None);
        f.friends.send_friend_request(&bob, &alice.id).await.unwrap();

        assert_eq!(
            f.friends.check_friendship_status("bob", "alice").await.unwrap(),
            FriendshipStatus::PendingSent
        );
        assert_eq!(
            f.friends.check_friendship_status("alice", "bob").await.unwrap(),
            FriendshipStatus::PendingReceived
        );

        assert!(matches!(
            f.friends.send_friend_request(&bob, &alice.id).await,
            Err(AppError::DuplicateOrExisting(_))
        ));
        assert!(matches!(
            f.friends.send_friend_request(&alice, &bob.id).await,
            Err(AppError::DuplicateOrExisting(_))
        ));
    }

    #[tokio::test]
    async fn sending_notifies_the_target() {
        let f = fixture().await;
        let alice = register(&f, "alice", "alice_01").await;
        let bob = register(&f, "bob", "bob_0001").await;
        f.friends.send_friend_request(&bob, &alice.id).await.unwrap();

        let inbox = f.notifications.get_notifications("alice", None).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].notification_type, NotificationType::FriendRequestReceived);
        assert_eq!(inbox[0].from_username, "bob_0001");
    }

    #[tokio::test]
    async fn self_and_unknown_targets_are_rejected() {
        let f = fixture().await;
        let alice = register(&f, "alice", "alice_01").await;

        assert!(matches!(
            f.friends.send_friend_request(&alice, "alice").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            f.friends.send_friend_request(&alice, "ghost").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn acceptance_creates_symmetric_edges_and_notifies_requester() {
        let f = fixture().await;
        let alice = register(&f, "alice", "alice_01").await;
        let bob = register(&f, "bob", "bob_0001").await;
        let request = f.friends.send_friend_request(&bob, &alice.id).await.unwrap();

        let pending = f.friends.get_pending_requests("alice").await.unwrap();
        assert_eq!(pending.len(), 1);

        let accepted = f
            .friends
            .respond_to_request(&request.id, FriendDecision::Accepted)
            .await
            .unwrap();
        assert_eq!(accepted.status, FriendRequestStatus::Accepted);
        assert!(accepted.responded_at.is_some());

        let alice_friends = f.friends.get_friends("alice").await.unwrap();
        let bob_friends = f.friends.get_friends("bob").await.unwrap();
        assert_eq!(alice_friends[0].user_id, "bob");
        assert_eq!(alice_friends[0].username, "bob_0001");
        assert_eq!(bob_friends[0].user_id, "alice");
        assert_eq!(bob_friends[0].username, "alice_01");

        assert_eq!(f.friends.check_friendship_status("alice", "bob").await.unwrap(), FriendshipStatus::Friends);
        assert_eq!(f.friends.check_friendship_status("bob", "alice").await.unwrap(), FriendshipStatus::Friends);
        assert!(f.friends.get_pending_requests("alice").await.unwrap().is_empty());

        let bob_inbox = f.notifications.get_notifications("bob", None).await.unwrap();
        assert!(bob_inbox
            .iter()
            .any(|n| n.notification_type == NotificationType::FriendRequestAccepted && n.from_user_id == "alice"));

        assert!(matches!(
            f.friends.send_friend_request(&bob, &alice.id).await,
            Err(AppError::DuplicateOrExisting(_))
        ));
    }

    #[tokio::test]
    async fn resolved_requests_are_terminal() {
        let f = fixture().await;
        let alice = register(&f, "alice", "alice_01").await;
        let bob = register(&f, "bob", "bob_0001").await;
        let request = f.friends.send_friend_request(&bob, &alice.id).await.unwrap();

        let rejected = f
            .friends
            .respond_to_request(&request.id, FriendDecision::Rejected)
            .await
            .unwrap();
        assert_eq!(rejected.status, FriendRequestStatus::Rejected);

        for decision in [FriendDecision::Accepted, FriendDecision::Rejected] {
            assert!(matches!(
                f.friends.respond_to_request(&request.id, decision).await,
                Err(AppError::AlreadyResolved(_))
            ));
        }
        assert!(f.friends.get_friends("alice").await.unwrap().is_empty());
        assert!(matches!(
            f.friends.respond_to_request("missing", FriendDecision::Accepted).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn acceptance_losing_to_a_concurrent_rejection_writes_no_edges() {
        let f = fixture().await;
        let alice = register(&f, "alice", "alice_01").await;
        let bob = register(&f, "bob", "bob_0001").await;
        let request = f.friends.send_friend_request(&bob, &alice.id).await.unwrap();

        let mut concurrent = WriteBatch::new();
        concurrent.update(
            FriendService::request_path(&request.id),
            Fields::new()
                .set("status", serde_json::to_value(FriendRequestStatus::Rejected).unwrap())
                .server_timestamp("responded_at"),
        );
        f.store.interleave_next_commit(concurrent);

        assert!(matches!(
            f.friends.respond_to_request(&request.id, FriendDecision::Accepted).await,
            Err(AppError::AlreadyResolved(_))
        ));
        assert!(f.friends.get_friends("alice").await.unwrap().is_empty());
        assert!(f.friends.get_friends("bob").await.unwrap().is_empty());
        assert_eq!(f.friends.check_friendship_status("alice", "bob").await.unwrap(), FriendshipStatus::None);

        let bob_inbox = f.notifications.get_notifications("bob", None).await.unwrap();
        assert!(!bob_inbox
            .iter()
            .any(|n| n.notification_type == NotificationType::FriendRequestAccepted));
    }

    #[tokio::test]
    async fn denormalized_copies_do_not_follow_profile_changes() {
        let f = fixture().await;
        let alice = register(&f, "alice", "alice_01").await;
        let bob = register(&f, "bob", "bob_0001").await;
        let request = f.friends.send_friend_request(&bob, &alice.id).await.unwrap();
        f.friends
            .respond_to_request(&request.id, FriendDecision::Accepted)
            .await
            .unwrap();

        f.users
            .update_user_profile(
                "bob",
                UpdateProfileRequest {
                    photo_url: Some("https://img.example.com/new.png".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let edge = &f.friends.get_friends("alice").await.unwrap()[0];
        assert_eq!(edge.photo_url, bob.photo_url);
        let stored: FriendRequest = f
            .friends
            .db
            .get_by_path(&FriendService::request_path(&request.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.from_user_photo_url, bob.photo_url);
    }

    #[tokio::test]
    async fn search_is_case_insensitive_prefix_and_excludes_caller() {
        let f = fixture().await;
        register(&f, "u1", "Reader_One").await;
        register(&f, "u2", "reader_two").await;
        register(&f, "u3", "writer_01").await;

        let found = f.friends.search_users("READ", "u1").await.unwrap();
        let names: Vec<_> = found.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["reader_two"]);

        assert!(f.friends.search_users("r", "u9").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_results_are_capped() {
        let f = fixture().await;
        for i in 0..12 {
            register(&f, &format!("u{}", i), &format!("manga_fan_{:02}", i)).await;
        }

        assert_eq!(f.friends.search_users("manga", "nobody").await.unwrap().len(), 10);
        assert_eq!(f.friends.search_users("manga", "u0").await.unwrap().len(), 10);
    }
}
