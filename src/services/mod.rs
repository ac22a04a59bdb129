pub mod database;
pub mod subscription;
pub mod auth;
pub mod user;
pub mod reading;
pub mod custom_list;
pub mod friend;
pub mod notification;

// 重新导出常用类型
pub use database::Database;
pub use subscription::Subscription;
pub use auth::AuthService;
pub use user::UserService;
pub use reading::ReadingService;
pub use custom_list::CustomListService;
pub use friend::FriendService;
pub use notification::NotificationService;
