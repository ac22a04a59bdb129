use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use super::{IdentityProvider, OAuthCredential, ProviderAccount, ProviderError};

const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Clone)]
struct AccountRecord {
    account: ProviderAccount,
    password_hash: Option<String>,
}

#[derive(Debug, Clone)]
struct FederatedIdentity {
    email: String,
    display_name: Option<String>,
    photo_url: Option<String>,
}

/// 内存身份提供方
///
/// Accounts are keyed by lowercased email and passwords are stored as argon2
/// hashes. Error codes follow the `auth/...` convention of the hosted SDK.
pub struct MemoryIdentityProvider {
    accounts: DashMap<String, AccountRecord>,
    federated: DashMap<(String, String), FederatedIdentity>,
    session: watch::Sender<Option<ProviderAccount>>,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        let (session, _) = watch::channel(None);
        Self {
            accounts: DashMap::new(),
            federated: DashMap::new(),
            session,
        }
    }

    /// Registers an identity that `sign_in_with_oauth` will accept for
    /// `(provider_id, id_token)`.
    pub fn register_federated_identity(
        &self,
        credential: &OAuthCredential,
        email: &str,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) {
        self.federated.insert(
            (credential.provider_id.clone(), credential.id_token.clone()),
            FederatedIdentity {
                email: email.to_string(),
                display_name: display_name.map(str::to_string),
                photo_url: photo_url.map(str::to_string),
            },
        );
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    fn hash_password(password: &str) -> Result<String, ProviderError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ProviderError::Transport(format!("password hashing failed: {}", e)))
    }

    fn verify_password(password: &str, hash: &str) -> bool {
        PasswordHash::new(hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }

    fn start_session(&self, account: ProviderAccount) -> ProviderAccount {
        self.session.send_replace(Some(account.clone()));
        account
    }

    fn current_key(&self) -> Result<String, ProviderError> {
        self.session
            .borrow()
            .as_ref()
            .map(|account| account.email.to_lowercase())
            .ok_or_else(|| ProviderError::rejected("auth/no-current-user", "no signed-in user"))
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderAccount, ProviderError> {
        if !validator::validate_email(email) {
            return Err(ProviderError::rejected("auth/invalid-email", "badly formatted email"));
        }

        let record = self
            .accounts
            .get(&email.to_lowercase())
            .map(|r| r.clone())
            .ok_or_else(|| ProviderError::rejected("auth/user-not-found", "no account for email"))?;

        let valid = record
            .password_hash
            .as_deref()
            .map(|hash| Self::verify_password(password, hash))
            .unwrap_or(false);
        if !valid {
            return Err(ProviderError::rejected("auth/wrong-password", "password mismatch"));
        }

        debug!("Signed in {}", record.account.uid);
        Ok(self.start_session(record.account))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<ProviderAccount, ProviderError> {
        if !validator::validate_email(email) {
            return Err(ProviderError::rejected("auth/invalid-email", "badly formatted email"));
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ProviderError::rejected(
                "auth/weak-password",
                "password should be at least 6 characters",
            ));
        }

        let key = email.to_lowercase();
        let password_hash = Self::hash_password(password)?;
        let account = ProviderAccount {
            uid: Uuid::new_v4().simple().to_string(),
            email: email.to_string(),
            display_name: None,
            photo_url: None,
            created_at: Utc::now(),
        };

        match self.accounts.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(ProviderError::rejected(
                    "auth/email-already-in-use",
                    "email already registered",
                ))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(AccountRecord {
                    account: account.clone(),
                    password_hash: Some(password_hash),
                });
            }
        }

        info!("Created account {}", account.uid);
        Ok(self.start_session(account))
    }

    async fn sign_in_with_oauth(
        &self,
        credential: &OAuthCredential,
    ) -> Result<ProviderAccount, ProviderError> {
        let identity = self
            .federated
            .get(&(credential.provider_id.clone(), credential.id_token.clone()))
            .map(|i| i.clone())
            .ok_or_else(|| ProviderError::rejected("auth/invalid-credential", "unknown federated token"))?;

        let record = self
            .accounts
            .entry(identity.email.to_lowercase())
            .or_insert_with(|| AccountRecord {
                account: ProviderAccount {
                    uid: Uuid::new_v4().simple().to_string(),
                    email: identity.email.clone(),
                    display_name: identity.display_name.clone(),
                    photo_url: identity.photo_url.clone(),
                    created_at: Utc::now(),
                },
                password_hash: None,
            })
            .clone();

        debug!("Federated sign-in via {} for {}", credential.provider_id, record.account.uid);
        Ok(self.start_session(record.account))
    }

    async fn update_display_name(&self, display_name: &str) -> Result<(), ProviderError> {
        let key = self.current_key()?;
        if let Some(mut record) = self.accounts.get_mut(&key) {
            record.account.display_name = Some(display_name.to_string());
        }
        // 资料更新不算会话变化，不通知订阅者
        self.session.send_if_modified(|current| {
            if let Some(account) = current {
                account.display_name = Some(display_name.to_string());
            }
            false
        });
        Ok(())
    }

    async fn delete_current_account(&self) -> Result<(), ProviderError> {
        let key = self.current_key()?;
        self.accounts.remove(&key);
        self.session.send_replace(None);
        info!("Deleted account {}", key);
        Ok(())
    }

    async fn refresh_session(&self) -> Result<ProviderAccount, ProviderError> {
        let account = self
            .current_account()
            .ok_or_else(|| ProviderError::rejected("auth/no-current-user", "no signed-in user"))?;
        Ok(self.start_session(account))
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.session.send_replace(None);
        Ok(())
    }

    fn current_account(&self) -> Option<ProviderAccount> {
        self.session.borrow().clone()
    }

    fn session_changes(&self) -> watch::Receiver<Option<ProviderAccount>> {
        self.session.subscribe()
    }
}
