use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use validator::Validate;

use crate::utils::serde_helpers::timestamp;

/// Canonical profile handed to callers: provider identity merged with the
/// stored profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub age: Option<u32>,
    pub country: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// False until a username has been reserved for the account.
    pub is_profile_complete: bool,
}

/// 存储在 `users/{id}` 的资料文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfileRecord {
    pub id: String,
    pub email: String,
    pub username: String,
    /// Lowercased copy used for case-insensitive prefix search.
    pub username_lower: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfileRecord {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            username: user.username.clone(),
            username_lower: user.username.to_lowercase(),
            display_name: user.display_name.clone(),
            photo_url: user.photo_url.clone(),
            age: user.age,
            country: user.country.clone(),
            created_at: user.created_at,
        }
    }
}

impl From<UserProfileRecord> for User {
    fn from(record: UserProfileRecord) -> Self {
        Self {
            id: record.id,
            email: record.email,
            username: record.username,
            display_name: record.display_name,
            photo_url: record.photo_url,
            age: record.age,
            country: record.country,
            created_at: record.created_at,
            is_profile_complete: true,
        }
    }
}

/// 用户名注册表文档，键为小写用户名
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsernameRecord {
    pub user_id: String,
    pub email: String,
    pub username: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 50))]
    pub display_name: Option<String>,

    #[validate(url)]
    pub photo_url: Option<String>,

    #[validate(range(min = 1, max = 150))]
    pub age: Option<u32>,

    #[validate(length(min = 2, max = 60))]
    pub country: Option<String>,
}

impl UpdateProfileRequest {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.photo_url.is_none()
            && self.age.is_none()
            && self.country.is_none()
    }
}
