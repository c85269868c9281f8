//! Usage: Identity backed by the game server's own `/auth` routes (REST variant).
//!
//! The server issues a single long-lived bearer token and no refresh token, so a refresh
//! can never succeed: a 401 ends the session.

use super::provider_trait::{Credentials, IdentityProvider, LoginOutcome, ProviderFuture};
use crate::api::models::{LoginRequest, LoginResponse, RegisterRequest, UserProfile};
use crate::session::{decode_json, ensure_success, PendingRequest};
use crate::shared::error::{AppError, AppResult};
use crate::shared::error_code::ErrorCode;
use crate::storage::TokenSet;

#[derive(Debug, Clone)]
pub struct BackendIdentity {
    http: reqwest::Client,
    api_root: String,
}

impl BackendIdentity {
    /// `api_root` includes the base path, e.g. `http://localhost:8080/api`.
    pub fn new(http: reqwest::Client, api_root: impl Into<String>) -> Self {
        Self {
            http,
            api_root: api_root.into(),
        }
    }

    async fn exchange(&self, request: PendingRequest) -> AppResult<LoginOutcome> {
        let response = request.build(&self.http, &self.api_root, None)?.send().await?;
        let body: LoginResponse = decode_json(ensure_success(response).await?).await?;
        Ok(LoginOutcome {
            tokens: TokenSet::bearer(body.token),
            user: Some(body.user),
        })
    }
}

impl IdentityProvider for BackendIdentity {
    fn name(&self) -> &'static str {
        "backend"
    }

    fn login<'a>(&'a self, credentials: &'a Credentials) -> ProviderFuture<'a, LoginOutcome> {
        Box::pin(async move {
            let body = LoginRequest {
                email: credentials.username.trim().to_string(),
                password: credentials.password.clone(),
            };
            self.exchange(PendingRequest::post("/auth/login").json(&body)?)
                .await
        })
    }

    fn register<'a>(&'a self, registration: &'a RegisterRequest) -> ProviderFuture<'a, LoginOutcome> {
        Box::pin(async move {
            self.exchange(PendingRequest::post("/auth/register").json(registration)?)
                .await
        })
    }

    fn refresh<'a>(&'a self, _refresh_token: &'a str) -> ProviderFuture<'a, TokenSet> {
        Box::pin(async {
            Err(AppError::from_code(
                ErrorCode::AuthReloginRequired,
                "backend sessions cannot be refreshed",
            ))
        })
    }

    fn fetch_user<'a>(&'a self, tokens: &'a TokenSet) -> ProviderFuture<'a, UserProfile> {
        Box::pin(async move {
            let response = PendingRequest::get("/auth/me")
                .build(&self.http, &self.api_root, Some(&tokens.access_token))?
                .send()
                .await?;
            decode_json(ensure_success(response).await?).await
        })
    }
}
