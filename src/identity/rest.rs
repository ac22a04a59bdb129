use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{IdentityProvider, OAuthCredential, ProviderAccount, ProviderError};
use crate::config::Config;

#[derive(Debug, Clone)]
struct Session {
    account: ProviderAccount,
    id_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    id_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    /// Milliseconds since the epoch, as a string.
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Identity Toolkit v1 REST 适配器
pub struct RestIdentityProvider {
    http_client: Client,
    api_url: String,
    token_url: String,
    api_key: Option<String>,
    redirect_uri: String,
    session: Mutex<Option<Session>>,
    changes: watch::Sender<Option<ProviderAccount>>,
}

impl RestIdentityProvider {
    pub fn new(config: &Config) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| ProviderError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        let (changes, _) = watch::channel(None);
        Ok(Self {
            http_client,
            api_url: config.identity_api_url.trim_end_matches('/').to_string(),
            token_url: config.identity_token_url.trim_end_matches('/').to_string(),
            api_key: config.identity_api_key.clone(),
            redirect_uri: config.identity_oauth_redirect_uri.clone(),
            session: Mutex::new(None),
            changes,
        })
    }

    async fn call<B, R>(&self, url: String, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut request = self.http_client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key)]);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<R>()
                .await
                .map_err(|e| ProviderError::Transport(format!("malformed provider response: {}", e)));
        }

        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorEnvelope>(&text) {
            Ok(envelope) => {
                // e.g. "WEAK_PASSWORD : Password should be at least 6 characters"
                let (code, detail) = match envelope.error.message.split_once(" : ") {
                    Some((code, detail)) => (code.to_string(), detail.to_string()),
                    None => (envelope.error.message.clone(), envelope.error.message),
                };
                debug!("Identity provider rejected request: {}", code);
                Err(ProviderError::Rejected {
                    code,
                    message: detail,
                })
            }
            Err(_) => {
                warn!("Identity provider returned {} without an error envelope", status);
                Err(ProviderError::Transport(format!("unexpected status {}", status)))
            }
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/v1/accounts:{}", self.api_url, method)
    }

    async fn lookup(&self, id_token: &str) -> Result<LookupUser, ProviderError> {
        let response: LookupResponse = self
            .call(self.endpoint("lookup"), &json!({ "idToken": id_token }))
            .await?;
        response
            .users
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::rejected("USER_NOT_FOUND", "no user for token"))
    }

    /// Completes a sign-in: enriches the account from `accounts:lookup` and
    /// publishes the new session.
    async fn establish(&self, auth: AuthResponse) -> Result<ProviderAccount, ProviderError> {
        let details = self.lookup(&auth.id_token).await?;
        let created_at = details
            .created_at
            .as_deref()
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        let account = ProviderAccount {
            uid: details.local_id,
            email: details.email.or(auth.email).unwrap_or_default(),
            display_name: details.display_name.or(auth.display_name),
            photo_url: details.photo_url.or(auth.photo_url),
            created_at,
        };
        debug!("Session established for {}", account.uid);

        *self.session.lock() = Some(Session {
            account: account.clone(),
            id_token: auth.id_token,
            refresh_token: auth.refresh_token,
        });
        self.changes.send_replace(Some(account.clone()));
        Ok(account)
    }

    fn active_session(&self) -> Result<Session, ProviderError> {
        self.session
            .lock()
            .clone()
            .ok_or_else(|| ProviderError::rejected("auth/no-current-user", "no signed-in user"))
    }

    fn clear_session(&self) {
        *self.session.lock() = None;
        self.changes.send_replace(None);
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderAccount, ProviderError> {
        let auth: AuthResponse = self
            .call(
                self.endpoint("signInWithPassword"),
                &json!({ "email": email, "password": password, "returnSecureToken": true }),
            )
            .await?;
        self.establish(auth).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<ProviderAccount, ProviderError> {
        let auth: AuthResponse = self
            .call(
                self.endpoint("signUp"),
                &json!({ "email": email, "password": password, "returnSecureToken": true }),
            )
            .await?;
        self.establish(auth).await
    }

    async fn sign_in_with_oauth(
        &self,
        credential: &OAuthCredential,
    ) -> Result<ProviderAccount, ProviderError> {
        let post_body = format!(
            "id_token={}&providerId={}",
            credential.id_token, credential.provider_id
        );
        let auth: AuthResponse = self
            .call(
                self.endpoint("signInWithIdp"),
                &json!({
                    "postBody": post_body,
                    "requestUri": self.redirect_uri,
                    "returnSecureToken": true,
                    "returnIdpCredential": true,
                }),
            )
            .await?;
        self.establish(auth).await
    }

    async fn update_display_name(&self, display_name: &str) -> Result<(), ProviderError> {
        let session = self.active_session()?;
        let _: serde_json::Value = self
            .call(
                self.endpoint("update"),
                &json!({
                    "idToken": session.id_token,
                    "displayName": display_name,
                    "returnSecureToken": false,
                }),
            )
            .await?;

        let mut guard = self.session.lock();
        if let Some(current) = guard.as_mut() {
            current.account.display_name = Some(display_name.to_string());
        }
        Ok(())
    }

    async fn delete_current_account(&self) -> Result<(), ProviderError> {
        let session = self.active_session()?;
        let _: serde_json::Value = self
            .call(self.endpoint("delete"), &json!({ "idToken": session.id_token }))
            .await?;
        self.clear_session();
        Ok(())
    }

    async fn refresh_session(&self) -> Result<ProviderAccount, ProviderError> {
        let session = self.active_session()?;
        let mut request = self.http_client.post(format!("{}/v1/token", self.token_url)).form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", session.refresh_token.as_str()),
        ]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key)]);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let refreshed: RefreshResponse = Self::decode(response).await?;

        let account = session.account.clone();
        *self.session.lock() = Some(Session {
            account: account.clone(),
            id_token: refreshed.id_token,
            refresh_token: refreshed.refresh_token,
        });
        self.changes.send_replace(Some(account.clone()));
        Ok(account)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.clear_session();
        Ok(())
    }

    fn current_account(&self) -> Option<ProviderAccount> {
        self.session.lock().as_ref().map(|s| s.account.clone())
    }

    fn session_changes(&self) -> watch::Receiver<Option<ProviderAccount>> {
        self.changes.subscribe()
    }
}
