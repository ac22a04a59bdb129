use serde::{Deserialize, Deserializer, Serialize};
use chrono::{DateTime, Utc};
use validator::Validate;

use super::reading::{Reading, ReadingCategory, ReadingStatus};
use crate::utils::serde_helpers::{double_option, timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListVisibility {
    /// Owner only.
    Private,
    Public,
    /// Anyone holding the slug; not listed publicly.
    Link,
}

/// 阅读条目快照，加入列表时复制，之后不随源条目变化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListReading {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub category: ReadingCategory,
    pub status: ReadingStatus,
}

impl ListReading {
    pub const PLACEHOLDER_TITLE: &'static str = "Untitled";

    /// Stand-in for entries stored as a bare reading id.
    pub fn placeholder(id: String) -> Self {
        Self {
            id,
            title: Self::PLACEHOLDER_TITLE.to_string(),
            image_url: None,
            category: ReadingCategory::Other,
            status: ReadingStatus::ToRead,
        }
    }
}

impl From<&Reading> for ListReading {
    fn from(reading: &Reading) -> Self {
        Self {
            id: reading.id.clone(),
            title: reading.title.clone(),
            image_url: reading.image_url.clone(),
            category: reading.category,
            status: reading.status,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredListReading {
    Snapshot(ListReading),
    LegacyId(String),
}

// 兼容旧数据：readings 中可能直接存放条目 id 字符串
fn deserialize_list_readings<'de, D>(deserializer: D) -> Result<Vec<ListReading>, D::Error>
where
    D: Deserializer<'de>,
{
    let stored = Option::<Vec<StoredListReading>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(stored
        .into_iter()
        .map(|entry| match entry {
            StoredListReading::Snapshot(snapshot) => snapshot,
            StoredListReading::LegacyId(id) => ListReading::placeholder(id),
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomList {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub name: String,
    pub description: Option<String>,
    pub slug: String,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default, deserialize_with = "deserialize_list_readings")]
    pub readings: Vec<ListReading>,
    pub visibility: ListVisibility,
    #[serde(default)]
    pub likes_count: i64,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCustomListRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    #[validate(length(max = 500))]
    pub description: Option<String>,

    pub visibility: ListVisibility,

    #[validate(url)]
    pub cover_image: Option<String>,

    #[serde(default)]
    pub readings: Vec<ListReading>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateCustomListRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,

    pub visibility: Option<ListVisibility>,

    /// Owner display name copied onto the list on each edit.
    #[validate(length(min = 1, max = 50))]
    pub user_name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub cover_image: Option<Option<String>>,

    /// Replaces the whole collection when present.
    pub readings: Option<Vec<ListReading>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListComment {
    pub id: String,
    pub list_id: String,
    pub user_id: String,
    pub user_name: String,
    pub content: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Per-user like record under `custom_lists/{id}/likes/{user_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListLike {
    pub user_id: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}
