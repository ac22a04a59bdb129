use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::utils::serde_helpers::timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    FriendRequestReceived,
    FriendRequestAccepted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    /// Recipient.
    pub user_id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub from_user_id: String,
    pub from_username: String,
    #[serde(default)]
    pub from_user_photo_url: Option<String>,
    pub read: bool,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Unset optional fields are omitted from the stored document, not nulled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateNotificationRequest {
    pub user_id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub from_user_id: String,
    pub from_username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_user_photo_url: Option<String>,
}
