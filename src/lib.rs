//! Leaderboard API client: typed route wrappers over an authenticated HTTP session that
//! persists tokens and transparently refreshes them once on `401`.

pub mod api;
pub mod cli;
pub mod identity;
pub mod infra;
pub mod session;
pub mod shared;
pub mod storage;
pub mod test_support;

pub use identity::{Credentials, IdentityProvider};
pub use infra::settings::ClientSettings;
pub use session::{
    AuthSession, AuthorizationToken, PendingRequest, SessionOptions, SessionSnapshot,
    SessionState,
};
pub use shared::error::{AppError, AppResult};
pub use shared::error_code::ErrorCode;
pub use storage::{FileStorage, MemoryStorage, TokenKeys, TokenStorage};
