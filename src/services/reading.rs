use crate::{
    error::{AppError, Result},
    models::reading::*,
    services::{database::collections, Database},
    store::{Direction, Fields, Query},
    utils::serde_helpers::timestamp,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;

/// 新建条目的存储形态：未设置的可选字段显式写为 null
#[derive(Serialize)]
struct ReadingDocument<'a> {
    user_id: &'a str,
    title: &'a str,
    image_url: Option<&'a str>,
    category: ReadingCategory,
    status: ReadingStatus,
    measure_unit: MeasureUnit,
    tags: Vec<String>,
    current_chapter: Option<u32>,
    total_chapters: Option<u32>,
    notes: Option<&'a str>,
    reference_url: Option<&'a str>,
    #[serde(with = "timestamp::option")]
    started_at: Option<DateTime<Utc>>,
    #[serde(with = "timestamp::option")]
    finished_at: Option<DateTime<Utc>>,
    is_favorite: bool,
}

fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty() && seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn timestamp_value(value: &Option<DateTime<Utc>>) -> Value {
    match value {
        Some(ts) => Value::String(crate::utils::serde_helpers::format_timestamp(ts)),
        None => Value::Null,
    }
}

#[derive(Clone)]
pub struct ReadingService {
    db: Arc<Database>,
}

impl ReadingService {
    pub async fn new(db: Arc<Database>) -> Result<Self> {
        Ok(Self { db })
    }

    pub async fn create(&self, user_id: &str, request: CreateReadingRequest) -> Result<Reading> {
        request.validate()?;
        debug!("Creating reading '{}' for user {}", request.title, user_id);

        let mut current_chapter = request.current_chapter;
        if request.status == ReadingStatus::Completed {
            if let Some(progress) = Reading::completed_progress(request.measure_unit, request.total_chapters) {
                current_chapter = Some(progress);
            }
        }

        let document = ReadingDocument {
            user_id,
            title: request.title.trim(),
            image_url: request.image_url.as_deref(),
            category: request.category,
            status: request.status,
            measure_unit: request.measure_unit,
            tags: normalize_tags(&request.tags),
            current_chapter,
            total_chapters: request.total_chapters,
            notes: request.notes.as_deref(),
            reference_url: request.reference_url.as_deref(),
            started_at: request.started_at,
            finished_at: request.finished_at,
            is_favorite: request.is_favorite,
        };

        let mut fields = Fields::from_serializable(&document)?
            .server_timestamp("created_at")
            .server_timestamp("updated_at");
        if request.status == ReadingStatus::Completed && request.finished_at.is_none() {
            fields = fields.server_timestamp("finished_at");
        }

        let reading: Reading = self.db.create(&collections::readings(), fields).await?;
        info!("Created reading {} for user {}", reading.id, user_id);
        Ok(reading)
    }

    /// 部分更新，并应用状态迁移规则
    ///
    /// Moving to `completed` forces progress to the total (100 for
    /// percentages) and stamps `finished_at` unless the patch sets it.
    /// Moving to `reading` requires `started_at` and `current_chapter` in the
    /// same patch.
    pub async fn update(&self, reading_id: &str, request: UpdateReadingRequest) -> Result<Reading> {
        request.validate()?;
        let current: Reading = self
            .db
            .require(&collections::readings(), reading_id, "Reading")
            .await?;

        let mut fields = Fields::new();
        if let Some(title) = &request.title {
            fields = fields.set("title", title.trim());
        }
        if let Some(image_url) = &request.image_url {
            fields = fields.set("image_url", to_value(image_url)?);
        }
        if let Some(category) = request.category {
            fields = fields.set("category", to_value(&category)?);
        }
        if let Some(status) = request.status {
            fields = fields.set("status", to_value(&status)?);
        }
        if let Some(unit) = request.measure_unit {
            fields = fields.set("measure_unit", to_value(&unit)?);
        }
        if let Some(tags) = &request.tags {
            fields = fields.set("tags", to_value(&normalize_tags(tags))?);
        }
        if let Some(current_chapter) = request.current_chapter {
            fields = fields.set("current_chapter", to_value(&current_chapter)?);
        }
        if let Some(total_chapters) = request.total_chapters {
            fields = fields.set("total_chapters", to_value(&total_chapters)?);
        }
        if let Some(notes) = &request.notes {
            fields = fields.set("notes", to_value(notes)?);
        }
        if let Some(reference_url) = &request.reference_url {
            fields = fields.set("reference_url", to_value(reference_url)?);
        }
        if let Some(started_at) = &request.started_at {
            fields = fields.set("started_at", timestamp_value(started_at));
        }
        if let Some(finished_at) = &request.finished_at {
            fields = fields.set("finished_at", timestamp_value(finished_at));
        }
        if let Some(is_favorite) = request.is_favorite {
            fields = fields.set("is_favorite", is_favorite);
        }

        match request.status {
            Some(ReadingStatus::Completed) => {
                let unit = request.measure_unit.unwrap_or(current.measure_unit);
                let total = request.total_chapters.unwrap_or(current.total_chapters);
                if let Some(progress) = Reading::completed_progress(unit, total) {
                    fields = fields.set("current_chapter", progress);
                }
                if current.status != ReadingStatus::Completed && request.finished_at.is_none() {
                    fields = fields.server_timestamp("finished_at");
                }
            }
            Some(ReadingStatus::Reading) if current.status != ReadingStatus::Reading => {
                let has_start = matches!(request.started_at, Some(Some(_)));
                let has_progress = matches!(request.current_chapter, Some(Some(_)));
                if !has_start || !has_progress {
                    return Err(AppError::validation(
                        "Starting a reading requires a start date and current progress",
                    ));
                }
            }
            _ => {}
        }

        let fields = fields.server_timestamp("updated_at");
        let reading: Reading = self
            .db
            .update_and_get(collections::readings().doc(reading_id), fields)
            .await?;
        info!("Updated reading {}", reading_id);
        Ok(reading)
    }

    /// Status change with the values a move into `reading` needs.
    pub async fn change_status(
        &self,
        reading_id: &str,
        status: ReadingStatus,
        start: Option<StartReading>,
    ) -> Result<Reading> {
        let request = UpdateReadingRequest {
            status: Some(status),
            started_at: start.map(|s| Some(s.started_at)),
            current_chapter: start.map(|s| Some(s.current_chapter)),
            ..Default::default()
        };
        self.update(reading_id, request).await
    }

    /// 硬删除；归属校验由存储层访问规则负责
    pub async fn delete(&self, reading_id: &str) -> Result<()> {
        self.db.delete(collections::readings().doc(reading_id)).await?;
        info!("Deleted reading {}", reading_id);
        Ok(())
    }

    pub async fn get_by_id(&self, reading_id: &str) -> Result<Option<Reading>> {
        self.db.get_by_id(&collections::readings(), reading_id).await
    }

    /// 状态在查询端过滤，其余条件在读取后过滤；结果按更新时间倒序
    pub async fn get_by_user_id(&self, user_id: &str, filters: Option<&ReadingFilters>) -> Result<Vec<Reading>> {
        let mut query = Query::new(collections::readings()).where_eq("user_id", user_id);
        if let Some(status) = filters.and_then(|f| f.status) {
            query = query.where_eq("status", to_value(&status)?);
        }
        let query = query.order_by("updated_at", Direction::Descending);

        let readings: Vec<Reading> = self.db.query_as(&query).await?;
        Ok(match filters {
            Some(filters) => readings.into_iter().filter(|r| filters.matches(r)).collect(),
            None => readings,
        })
    }

    /// Sorted, deduplicated tag vocabulary across a user's items.
    pub async fn get_user_tags(&self, user_id: &str) -> Result<Vec<String>> {
        let readings = self.get_by_user_id(user_id, None).await?;
        let tags: BTreeSet<String> = readings.into_iter().flat_map(|r| r.tags).collect();
        Ok(tags.into_iter().collect())
    }
}
