use thiserror::Error;

use crate::identity::ProviderError;
use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Password is too weak")]
    WeakPassword,

    #[error("Email is already in use")]
    EmailAlreadyInUse,

    #[error("Username is already taken: {0}")]
    UsernameTaken(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Already resolved: {0}")]
    AlreadyResolved(String),

    #[error("Duplicate or existing relationship: {0}")]
    DuplicateOrExisting(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Validation error: {0}")]
    ValidatorError(#[from] validator::ValidationErrors),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code for callers that render their own messages.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::UserNotFound => "USER_NOT_FOUND",
            AppError::InvalidEmail => "INVALID_EMAIL",
            AppError::WeakPassword => "WEAK_PASSWORD",
            AppError::EmailAlreadyInUse => "EMAIL_ALREADY_IN_USE",
            AppError::UsernameTaken(_) => "USERNAME_TAKEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::PermissionDenied(_) => "PERMISSION_DENIED",
            AppError::AlreadyResolved(_) => "ALREADY_RESOLVED",
            AppError::DuplicateOrExisting(_) => "DUPLICATE_OR_EXISTING",
            AppError::Transient(_) => "TRANSIENT",
            AppError::Authentication(_) => "AUTHENTICATION_ERROR",
            AppError::Validation(_) | AppError::ValidatorError(_) => "VALIDATION_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Only transport/store hiccups are worth retrying, and never by this crate.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }
}

// 便利函数，用于创建常见错误
impl AppError {
    pub fn not_found(resource: &str) -> Self {
        Self::NotFound(format!("{} not found", resource))
    }

    pub fn validation(msg: &str) -> Self {
        Self::Validation(msg.to_string())
    }

    pub fn transient(msg: &str) -> Self {
        Self::Transient(msg.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { path } => AppError::NotFound(format!("{} not found", path)),
            StoreError::PermissionDenied { message } => AppError::PermissionDenied(message),
            StoreError::AlreadyExists { path } | StoreError::PreconditionFailed { path } => {
                AppError::Transient(format!("concurrent modification of {}", path))
            }
            StoreError::Unavailable { message } => AppError::Transient(message),
            StoreError::Serialization(e) => AppError::Serialization(e),
        }
    }
}

impl From<ProviderError> for AppError {
    /// Fallback translation; `AuthService` classifies rejections before this is reached.
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Rejected { .. } => {
                AppError::Authentication("identity provider rejected the request".to_string())
            }
            ProviderError::Transport(message) => AppError::Transient(message),
        }
    }
}
