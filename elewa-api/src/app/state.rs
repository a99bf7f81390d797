use elewa_core::UserManager;
use std::sync::Arc;

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    /// 注册、登录、刷新与用户资料
    pub users: Arc<UserManager>,
}
