use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use validator::Validate;

use crate::utils::serde_helpers::{double_option, timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadingStatus {
    ToRead,
    Reading,
    Completed,
    Dropped,
    OnHold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadingCategory {
    Manga,
    Manhwa,
    Manhua,
    Novel,
    LightNovel,
    Webtoon,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeasureUnit {
    #[default]
    Chapters,
    Pages,
    Percentage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub image_url: Option<String>,
    pub category: ReadingCategory,
    pub status: ReadingStatus,
    #[serde(default)]
    pub measure_unit: MeasureUnit,
    #[serde(default)]
    pub tags: Vec<String>,
    pub current_chapter: Option<u32>,
    pub total_chapters: Option<u32>,
    pub notes: Option<String>,
    pub reference_url: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Reading {
    /// Progress value implied by completion: the total, or 100 for percentages.
    pub fn completed_progress(unit: MeasureUnit, total: Option<u32>) -> Option<u32> {
        match unit {
            MeasureUnit::Percentage => Some(100),
            _ => total,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateReadingRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,

    #[validate(url)]
    pub image_url: Option<String>,

    pub category: ReadingCategory,
    pub status: ReadingStatus,

    #[serde(default)]
    pub measure_unit: MeasureUnit,

    #[serde(default)]
    pub tags: Vec<String>,

    pub current_chapter: Option<u32>,
    pub total_chapters: Option<u32>,

    #[validate(length(max = 5000))]
    pub notes: Option<String>,

    #[validate(url)]
    pub reference_url: Option<String>,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub is_favorite: bool,
}

impl CreateReadingRequest {
    pub fn new(title: &str, category: ReadingCategory, status: ReadingStatus) -> Self {
        Self {
            title: title.to_string(),
            image_url: None,
            category,
            status,
            measure_unit: MeasureUnit::default(),
            tags: Vec::new(),
            current_chapter: None,
            total_chapters: None,
            notes: None,
            reference_url: None,
            started_at: None,
            finished_at: None,
            is_favorite: false,
        }
    }
}

/// 部分更新：`None` 表示不修改，`Some(None)` 表示清空
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateReadingRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub image_url: Option<Option<String>>,

    pub category: Option<ReadingCategory>,
    pub status: Option<ReadingStatus>,
    pub measure_unit: Option<MeasureUnit>,
    pub tags: Option<Vec<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub current_chapter: Option<Option<u32>>,

    #[serde(default, deserialize_with = "double_option")]
    pub total_chapters: Option<Option<u32>>,

    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub reference_url: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub started_at: Option<Option<DateTime<Utc>>>,

    #[serde(default, deserialize_with = "double_option")]
    pub finished_at: Option<Option<DateTime<Utc>>>,

    pub is_favorite: Option<bool>,
}

/// Conjunction of filters for `ReadingService::get_by_user_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingFilters {
    pub status: Option<ReadingStatus>,
    pub category: Option<ReadingCategory>,
    /// Matches items carrying any of these tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Case-insensitive title substring.
    pub search_query: Option<String>,
    #[serde(default)]
    pub favorites_only: bool,
}

impl ReadingFilters {
    /// Filters applied after the status-filtered fetch.
    pub fn matches(&self, reading: &Reading) -> bool {
        if let Some(status) = self.status {
            if reading.status != status {
                return false;
            }
        }
        if let Some(category) = self.category {
            if reading.category != category {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| reading.tags.contains(t)) {
            return false;
        }
        if let Some(query) = self.search_query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            if !reading.title.to_lowercase().contains(&query.to_lowercase()) {
                return false;
            }
        }
        !self.favorites_only || reading.is_favorite
    }
}

/// Values a caller must supply when an item moves into `reading`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StartReading {
    pub started_at: DateTime<Utc>,
    pub current_chapter: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn enum_wire_values() {
        assert_eq!(json!(ReadingStatus::ToRead), json!("to-read"));
        assert_eq!(json!(ReadingStatus::OnHold), json!("on-hold"));
        assert_eq!(json!(ReadingCategory::LightNovel), json!("light-novel"));
        assert_eq!(json!(MeasureUnit::Percentage), json!("percentage"));
    }

    #[test]
    fn completed_progress_uses_hundred_for_percentages() {
        assert_eq!(Reading::completed_progress(MeasureUnit::Chapters, Some(200)), Some(200));
        assert_eq!(Reading::completed_progress(MeasureUnit::Percentage, Some(7)), Some(100));
        assert_eq!(Reading::completed_progress(MeasureUnit::Pages, None), None);
    }
}
