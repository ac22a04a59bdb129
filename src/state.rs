use crate::{
    config::Config,
    error::Result,
    identity::{IdentityProvider, MemoryIdentityProvider},
    services::{
        database::Database,
        auth::AuthService,
        user::UserService,
        reading::ReadingService,
        custom_list::CustomListService,
        friend::FriendService,
        notification::NotificationService,
    },
    store::{DocumentStore, MemoryStore},
};
use std::sync::Arc;
use tracing::info;

/// 应用程序的共享状态
/// 包含所有服务和配置的引用
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Config,

    /// 数据库
    pub db: Arc<Database>,

    /// 认证服务
    pub auth_service: AuthService,

    /// 用户服务
    pub user_service: UserService,

    /// 阅读条目服务
    pub reading_service: ReadingService,

    /// 自定义列表服务
    pub custom_list_service: CustomListService,

    /// 好友服务
    pub friend_service: FriendService,

    /// 通知服务
    pub notification_service: NotificationService,
}

impl AppState {
    /// Wires every service over the given store and identity provider.
    pub async fn new(
        config: Config,
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn IdentityProvider>,
    ) -> Result<Self> {
        let db = Arc::new(Database::new(store));

        let user_service = UserService::new(db.clone(), &config).await?;
        let notification_service = NotificationService::new(db.clone(), &config).await?;
        let auth_service = AuthService::new(provider, user_service.clone()).await?;
        let reading_service = ReadingService::new(db.clone()).await?;
        let custom_list_service = CustomListService::new(db.clone(), &config).await?;
        let friend_service = FriendService::new(db.clone(), notification_service.clone(), &config).await?;

        info!("Application state initialized ({})", config.environment);

        Ok(Self {
            config,
            db,
            auth_service,
            user_service,
            reading_service,
            custom_list_service,
            friend_service,
            notification_service,
        })
    }

    /// In-process store and identity provider, for tests and local runs.
    pub async fn in_memory(config: Config) -> Result<Self> {
        Self::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryIdentityProvider::new()),
        )
        .await
    }
}
