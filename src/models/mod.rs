pub mod custom_list;
pub mod friend;
pub mod notification;
pub mod reading;
pub mod user;

pub use custom_list::*;
pub use friend::*;
pub use notification::*;
pub use reading::*;
pub use user::*;
