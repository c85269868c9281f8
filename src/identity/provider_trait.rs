//! Usage: IdentityProvider trait - the seam between the session and whoever mints tokens.
//!
//! The backend (REST variant), a managed identity service and a plain OAuth2 token endpoint
//! each implement it; `AuthSession` only ever talks to `&dyn IdentityProvider`.

use crate::api::models::{RegisterRequest, UserProfile};
use crate::shared::error::{AppError, AppResult};
use crate::shared::error_code::ErrorCode;
use crate::storage::TokenSet;
use std::future::Future;
use std::pin::Pin;

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = AppResult<T>> + Send + 'a>>;

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Tokens from a login or registration, plus the profile when the provider returns one
/// in the same response.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub tokens: TokenSet,
    pub user: Option<UserProfile>,
}

/// The object-safe boxed-future shape allows `Arc<dyn IdentityProvider>`.
pub trait IdentityProvider: Send + Sync {
    /// Stable short name used in logs (e.g. "backend", "cognito").
    fn name(&self) -> &'static str;

    fn login<'a>(&'a self, credentials: &'a Credentials) -> ProviderFuture<'a, LoginOutcome>;

    fn register<'a>(&'a self, _registration: &'a RegisterRequest) -> ProviderFuture<'a, LoginOutcome> {
        let name = self.name();
        Box::pin(async move {
            Err(AppError::from_code(
                ErrorCode::AuthUnsupported,
                format!("{name} identity provider does not support registration"),
            ))
        })
    }

    /// Mint a new token set from a refresh token. A failure means the refresh token is
    /// no longer usable; the session decides what to clear.
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> ProviderFuture<'a, TokenSet>;

    /// Read the profile of the user the access token belongs to. A 401-equivalent
    /// rejection must be reported with status 401 so the session can refresh.
    fn fetch_user<'a>(&'a self, tokens: &'a TokenSet) -> ProviderFuture<'a, UserProfile>;

    /// Revoke the session on the provider side. Local state is cleared regardless.
    fn sign_out<'a>(&'a self, _tokens: &'a TokenSet) -> ProviderFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }
}
