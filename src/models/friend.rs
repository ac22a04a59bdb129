use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::utils::serde_helpers::timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    Pending,
    /// Terminal.
    Accepted,
    /// Terminal.
    Rejected,
}

/// 好友请求：请求方信息在发送时冻结
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub id: String,
    pub from_user_id: String,
    pub from_username: String,
    #[serde(default)]
    pub from_user_photo_url: Option<String>,
    pub to_user_id: String,
    pub status: FriendRequestStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub responded_at: Option<DateTime<Utc>>,
}

/// One side of a friendship, stored under `users/{owner}/friends/{user_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Friend {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(with = "timestamp")]
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendshipStatus {
    None,
    PendingSent,
    PendingReceived,
    Friends,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendDecision {
    Accepted,
    Rejected,
}

impl From<FriendDecision> for FriendRequestStatus {
    fn from(decision: FriendDecision) -> Self {
        match decision {
            FriendDecision::Accepted => FriendRequestStatus::Accepted,
            FriendDecision::Rejected => FriendRequestStatus::Rejected,
        }
    }
}
