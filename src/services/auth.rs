use crate::{
    error::{AppError, Result},
    identity::{IdentityProvider, OAuthCredential, ProviderAccount, ProviderError},
    models::user::User,
    services::{Subscription, UserService},
    utils::validation::validate_email_format,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 身份解析服务
///
/// Maps credentials to an authenticated identity and merges provider data
/// with the stored profile. Provider-native error codes are translated here
/// and never reach callers.
#[derive(Clone)]
pub struct AuthService {
    provider: Arc<dyn IdentityProvider>,
    user_service: UserService,
}

/// Minimal profile built from provider data alone; always incomplete.
fn minimal_profile(account: &ProviderAccount) -> User {
    let username = account
        .display_name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| format!("user_{}", account.uid.chars().take(6).collect::<String>()));

    User {
        id: account.uid.clone(),
        email: account.email.clone(),
        username,
        display_name: account.display_name.clone(),
        photo_url: account.photo_url.clone(),
        age: None,
        country: None,
        created_at: account.created_at,
        is_profile_complete: false,
    }
}

/// 读取完整资料；读取失败时记录日志并退回最小资料
async fn resolve_profile(user_service: &UserService, account: &ProviderAccount) -> User {
    match user_service.get_user_profile(&account.uid).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            debug!("No stored profile for {}, using provider data", account.uid);
            minimal_profile(account)
        }
        Err(e) => {
            warn!("Failed to load profile for {}: {}", account.uid, e);
            minimal_profile(account)
        }
    }
}

impl AuthService {
    pub async fn new(provider: Arc<dyn IdentityProvider>, user_service: UserService) -> Result<Self> {
        Ok(Self {
            provider,
            user_service,
        })
    }

    /// Translates provider-native codes into stable error kinds.
    pub fn classify(err: ProviderError) -> AppError {
        let classified = match &err {
            ProviderError::Rejected { code, .. } => match code.as_str() {
                "auth/wrong-password"
                | "auth/invalid-credential"
                | "auth/invalid-login-credentials"
                | "INVALID_PASSWORD"
                | "INVALID_LOGIN_CREDENTIALS" => Some(AppError::InvalidCredentials),
                "auth/user-not-found" | "EMAIL_NOT_FOUND" | "USER_NOT_FOUND" => Some(AppError::UserNotFound),
                "auth/invalid-email" | "INVALID_EMAIL" => Some(AppError::InvalidEmail),
                "auth/weak-password" | "WEAK_PASSWORD" => Some(AppError::WeakPassword),
                "auth/email-already-in-use" | "EMAIL_EXISTS" => Some(AppError::EmailAlreadyInUse),
                other => {
                    warn!("Unclassified identity provider rejection: {}", other);
                    None
                }
            },
            ProviderError::Transport(_) => None,
        };
        classified.unwrap_or_else(|| err.into())
    }

    /// `identifier` is an email if it contains `@`, otherwise a username
    /// resolved through the registry.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<User> {
        let identifier = identifier.trim();
        debug!("Login attempt for {}", identifier);

        let email = if identifier.contains('@') {
            identifier.to_string()
        } else {
            self.user_service
                .get_email_by_username(identifier)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("No account for username {}", identifier)))?
        };

        let account = self
            .provider
            .sign_in_with_password(&email, password)
            .await
            .map_err(Self::classify)?;

        info!("User {} logged in", account.uid);
        Ok(resolve_profile(&self.user_service, &account).await)
    }

    /// 注册：先检查用户名，再创建账号，最后原子写入注册表与资料
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<User> {
        let username = username.trim();
        let email = email.trim();
        self.user_service.validate_registration_username(username)?;
        validate_email_format(email)?;

        if !self.user_service.check_username_availability(username).await? {
            return Err(AppError::UsernameTaken(username.to_string()));
        }

        let account = self
            .provider
            .sign_up(email, password)
            .await
            .map_err(Self::classify)?;

        if let Err(e) = self.provider.update_display_name(username).await {
            self.roll_back_account(&account.uid).await;
            return Err(Self::classify(e));
        }

        let user = User {
            id: account.uid.clone(),
            email: account.email.clone(),
            username: username.to_string(),
            display_name: Some(username.to_string()),
            photo_url: account.photo_url.clone(),
            age: None,
            country: None,
            created_at: account.created_at,
            is_profile_complete: true,
        };

        if let Err(e) = self.user_service.create_account_records(&user).await {
            self.roll_back_account(&user.id).await;
            return Err(e);
        }

        info!("Registered user {} ({})", user.username, user.id);
        Ok(user)
    }

    // 补偿：删除刚创建的身份账号，避免遗留无资料的账号
    async fn roll_back_account(&self, uid: &str) {
        match self.provider.delete_current_account().await {
            Ok(()) => warn!("Rolled back provider account {} after failed registration", uid),
            Err(e) => error!("Failed to roll back provider account {}: {}", uid, e),
        }
    }

    /// Federated sign-in. First-time accounts come back incomplete and must go
    /// through `complete_username_setup`.
    pub async fn login_with_social_provider(&self, credential: &OAuthCredential) -> Result<User> {
        let account = self
            .provider
            .sign_in_with_oauth(credential)
            .await
            .map_err(Self::classify)?;

        let user = resolve_profile(&self.user_service, &account).await;
        info!(
            "User {} logged in via {} (profile complete: {})",
            user.id, credential.provider_id, user.is_profile_complete
        );
        Ok(user)
    }

    /// 为首次社交登录的用户设置用户名并创建资料
    pub async fn complete_username_setup(&self, user: &User, username: &str) -> Result<User> {
        let username = username.trim();
        self.user_service.validate_username(username)?;

        if self.user_service.get_user_profile(&user.id).await?.is_some() {
            return Err(AppError::validation("Username has already been set for this account"));
        }
        if !self.user_service.check_username_availability(username).await? {
            return Err(AppError::UsernameTaken(username.to_string()));
        }

        self.provider
            .update_display_name(username)
            .await
            .map_err(Self::classify)?;

        let completed = User {
            username: username.to_string(),
            display_name: Some(username.to_string()),
            is_profile_complete: true,
            ..user.clone()
        };
        self.user_service.create_account_records(&completed).await?;

        info!("Username {} set up for user {}", completed.username, completed.id);
        Ok(completed)
    }

    /// Fires on every session change (login, logout, token refresh) with the
    /// re-resolved profile, or `None` when signed out.
    pub fn on_identity_changed<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(Option<User>) + Send + 'static,
    {
        let user_service = self.user_service.clone();
        Subscription::spawn(
            self.provider.session_changes(),
            move |account: Option<ProviderAccount>| {
                let user_service = user_service.clone();
                async move {
                    match account {
                        Some(account) => Some(resolve_profile(&user_service, &account).await),
                        None => None,
                    }
                }
            },
            callback,
        )
    }

    pub async fn logout(&self) -> Result<()> {
        self.provider.sign_out().await.map_err(Self::classify)?;
        info!("User logged out");
        Ok(())
    }

    pub async fn current_user(&self) -> Option<User> {
        match self.provider.current_account() {
            Some(account) => Some(resolve_profile(&self.user_service, &account).await),
            None => None,
        }
    }
}
