use crate::{
    config::Config,
    error::{AppError, Result},
    models::user::*,
    services::{database::collections, Database},
    store::{DocumentPath, Fields, StoreError, WriteBatch},
    utils::validation::validate_username,
};
use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;

/// 用户服务：用户名注册表与用户资料
#[derive(Clone)]
pub struct UserService {
    db: Arc<Database>,
    config: Config,
}

impl UserService {
    pub async fn new(db: Arc<Database>, config: &Config) -> Result<Self> {
        Ok(Self {
            db,
            config: config.clone(),
        })
    }

    fn username_path(username: &str) -> DocumentPath {
        collections::usernames().doc(username.trim().to_lowercase())
    }

    /// Rules for choosing a username during federated onboarding.
    pub fn validate_username(&self, username: &str) -> Result<()> {
        validate_username(
            username,
            self.config.username_min_length,
            self.config.username_max_length,
        )
    }

    /// 注册表单只要求字符合法，不限制最短长度
    pub fn validate_registration_username(&self, username: &str) -> Result<()> {
        validate_username(username, 1, self.config.username_max_length)
    }

    /// 用户名是否可用（大小写不敏感）
    pub async fn check_username_availability(&self, username: &str) -> Result<bool> {
        let taken = self.db.exists(&Self::username_path(username)).await?;
        debug!("Username {} available: {}", username, !taken);
        Ok(!taken)
    }

    fn reservation_fields(username: &str, user_id: &str, email: &str) -> Result<Fields> {
        Ok(Fields::from_serializable(&UsernameRecord {
            user_id: user_id.to_string(),
            email: email.to_string(),
            username: username.to_string(),
        })?)
    }

    fn profile_fields(user: &User) -> Result<Fields> {
        Ok(Fields::from_serializable(&UserProfileRecord::from(user))?)
    }

    fn map_reservation_conflict(username: &str, err: StoreError) -> AppError {
        match err {
            StoreError::AlreadyExists { .. } => AppError::UsernameTaken(username.to_string()),
            other => other.into(),
        }
    }

    /// 创建用户名注册记录，已存在时返回 UsernameTaken
    pub async fn create_username_reservation(&self, username: &str, user_id: &str, email: &str) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.create(
            Self::username_path(username),
            Self::reservation_fields(username, user_id, email)?,
        );
        self.db
            .commit_raw(batch)
            .await
            .map_err(|e| Self::map_reservation_conflict(username, e))
    }

    pub async fn create_user_profile(&self, user: &User) -> Result<()> {
        self.db
            .set(collections::users().doc(&user.id), Self::profile_fields(user)?)
            .await
    }

    /// Reservation and profile in one atomic batch. The reservation only
    /// succeeds if no one holds the name, whatever the earlier pre-check saw.
    pub async fn create_account_records(&self, user: &User) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch
            .create(
                Self::username_path(&user.username),
                Self::reservation_fields(&user.username, &user.id, &user.email)?,
            )
            .set(collections::users().doc(&user.id), Self::profile_fields(user)?);

        self.db
            .commit_raw(batch)
            .await
            .map_err(|e| Self::map_reservation_conflict(&user.username, e))?;

        info!("Created account records for {} ({})", user.username, user.id);
        Ok(())
    }

    pub async fn get_user_profile(&self, user_id: &str) -> Result<Option<User>> {
        let record: Option<UserProfileRecord> = self.db.get_by_id(&collections::users(), user_id).await?;
        Ok(record.map(User::from))
    }

    /// 部分更新：只写入提供的字段
    pub async fn update_user_profile(&self, user_id: &str, request: UpdateProfileRequest) -> Result<User> {
        request.validate()?;
        debug!("Updating profile for user {}", user_id);

        if request.is_empty() {
            return self
                .get_user_profile(user_id)
                .await?
                .ok_or_else(|| AppError::not_found("User profile"));
        }

        let mut fields = Fields::new();
        if let Some(display_name) = &request.display_name {
            fields = fields.set("display_name", display_name.trim());
        }
        if let Some(photo_url) = &request.photo_url {
            fields = fields.set("photo_url", photo_url.as_str());
        }
        if let Some(age) = request.age {
            fields = fields.set("age", age);
        }
        if let Some(country) = &request.country {
            fields = fields.set("country", country.trim());
        }

        let record: UserProfileRecord = self
            .db
            .update_and_get(collections::users().doc(user_id), fields)
            .await?;
        info!("Updated profile for user {}", user_id);
        Ok(record.into())
    }

    /// 通过用户名反查邮箱
    pub async fn get_email_by_username(&self, username: &str) -> Result<Option<String>> {
        let record: Option<UsernameRecord> = self.db.get_by_path(&Self::username_path(username)).await?;
        Ok(record.map(|r| r.email))
    }
}
