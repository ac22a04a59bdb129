//! 身份提供方端口
//!
//! Credential sign-in and sign-up, federated OAuth sign-in, a mutable display
//! name and a session-change stream. Adapters return provider-native error
//! codes; classification into user-facing kinds happens in `AuthService`.

mod memory;
mod rest;

pub use memory::MemoryIdentityProvider;
pub use rest::RestIdentityProvider;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider refused the request; `code` is provider-native
    /// (`auth/wrong-password`, `EMAIL_NOT_FOUND`, ...).
    #[error("identity provider rejected the request ({code})")]
    Rejected { code: String, message: String },

    #[error("identity provider unreachable: {0}")]
    Transport(String),
}

impl ProviderError {
    pub fn rejected(code: &str, message: &str) -> Self {
        Self::Rejected {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// The provider's view of a signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAccount {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Token issued by a federated identity provider (e.g. `google.com`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthCredential {
    pub provider_id: String,
    pub id_token: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderAccount, ProviderError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<ProviderAccount, ProviderError>;

    async fn sign_in_with_oauth(
        &self,
        credential: &OAuthCredential,
    ) -> Result<ProviderAccount, ProviderError>;

    /// Updates the signed-in account's display name.
    async fn update_display_name(&self, display_name: &str) -> Result<(), ProviderError>;

    async fn delete_current_account(&self) -> Result<(), ProviderError>;

    /// Re-issues the session token; listeners observe this as a change.
    async fn refresh_session(&self) -> Result<ProviderAccount, ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;

    fn current_account(&self) -> Option<ProviderAccount>;

    fn session_changes(&self) -> watch::Receiver<Option<ProviderAccount>>;
}
