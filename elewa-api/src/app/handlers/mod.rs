mod auth;
mod health;
mod users;

pub use auth::{login, refresh, signup};
pub use health::{handler_404, health};
pub use users::{get_me, get_user, list_users, update_user};
