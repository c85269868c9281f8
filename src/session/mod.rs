//! Usage: Authenticated HTTP session (bearer from storage, one transparent refresh on 401).
//!
//! `send` reads the current token from storage for every dispatch. A 401 triggers one
//! refresh through the identity provider (shared by every request that hit the same 401),
//! then a single redispatch. If the refresh fails the stored session is cleared and the
//! unrecoverable-auth callback fires.

mod errors;
mod refresh;
mod request;

pub(crate) use errors::{decode_json, ensure_success};
pub(crate) use request::id_segment;
pub use request::{MultipartPart, PendingRequest, RequestBody};

use crate::api::models::{RegisterRequest, UserProfile};
use crate::identity::{Credentials, IdentityProvider, LoginOutcome};
use crate::infra::settings::ClientSettings;
use crate::shared::error::{AppError, AppResult};
use crate::shared::error_code::ErrorCode;
use crate::shared::security::mask_token;
use crate::shared::time::now_unix_seconds;
use crate::storage::{TokenKeys, TokenSet, TokenStorage, TokenStore};
use errors::{error_from_body, read_error_body};
use refresh::{LedgerGuard, RefreshGate};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Which stored token goes into `Authorization: Bearer ...`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationToken {
    #[default]
    Access,
    /// The id token, falling back to the access token when none is stored.
    Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Anonymous,
    Authenticated,
    Refreshing,
}

pub type UnrecoverableAuthCallback = Arc<dyn Fn(&AppError) + Send + Sync>;

#[derive(Clone)]
pub struct SessionOptions {
    pub base_url: String,
    pub token_keys: TokenKeys,
    pub authorization_token: AuthorizationToken,
    pub on_unrecoverable_auth_failure: Option<UnrecoverableAuthCallback>,
}

impl SessionOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token_keys: TokenKeys::default(),
            authorization_token: AuthorizationToken::default(),
            on_unrecoverable_auth_failure: None,
        }
    }

    pub fn token_keys(mut self, keys: TokenKeys) -> Self {
        self.token_keys = keys;
        self
    }

    pub fn authorization_token(mut self, which: AuthorizationToken) -> Self {
        self.authorization_token = which;
        self
    }

    pub fn on_unrecoverable_auth_failure(
        mut self,
        callback: impl Fn(&AppError) + Send + Sync + 'static,
    ) -> Self {
        self.on_unrecoverable_auth_failure = Some(Arc::new(callback));
        self
    }
}

impl std::fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("base_url", &self.base_url)
            .field("token_keys", &self.token_keys)
            .field("authorization_token", &self.authorization_token)
            .field(
                "on_unrecoverable_auth_failure",
                &self.on_unrecoverable_auth_failure.is_some(),
            )
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub identity: &'static str,
    pub base_url: String,
    pub access_token: Option<String>,
    pub has_id_token: bool,
    pub has_refresh_token: bool,
    pub expires_at: Option<i64>,
    pub expires_in_seconds: Option<i64>,
    pub email: Option<String>,
    pub user: Option<UserProfile>,
    pub last_refresh_ok: Option<bool>,
    pub last_refresh_at: Option<i64>,
}

enum Attempt<T> {
    Completed(T),
    Unauthorized(AppError),
}

pub struct AuthSession {
    base_url: String,
    http: reqwest::Client,
    store: TokenStore,
    identity: Arc<dyn IdentityProvider>,
    gate: RefreshGate,
    authorization_token: AuthorizationToken,
    on_unrecoverable: Option<UnrecoverableAuthCallback>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("base_url", &self.base_url)
            .field("identity", &self.identity.name())
            .field("token_keys", self.store.keys())
            .finish_non_exhaustive()
    }
}

impl AuthSession {
    pub fn new(
        options: SessionOptions,
        storage: Arc<dyn TokenStorage>,
        identity: Arc<dyn IdentityProvider>,
        http: reqwest::Client,
    ) -> AppResult<Self> {
        let base_url = options.base_url.trim().trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url).map_err(|e| {
            AppError::from_code(
                ErrorCode::InvalidInput,
                format!("invalid session base_url {base_url}: {e}"),
            )
        })?;

        Ok(Self {
            base_url,
            http,
            store: TokenStore::new(storage, options.token_keys),
            identity,
            gate: RefreshGate::new(),
            authorization_token: options.authorization_token,
            on_unrecoverable: options.on_unrecoverable_auth_failure,
        })
    }

    /// Wires storage, identity provider and HTTP client from settings.
    pub fn from_settings(
        settings: &ClientSettings,
        on_unrecoverable: Option<UnrecoverableAuthCallback>,
    ) -> AppResult<Arc<Self>> {
        let http = settings.http_client()?;
        let identity = crate::identity::build_identity(settings, http.clone())?;
        let options = SessionOptions {
            base_url: settings.api_root(),
            token_keys: settings.token_keys.keys(),
            authorization_token: settings.authorization_token,
            on_unrecoverable_auth_failure: on_unrecoverable,
        };
        let session = Self::new(options, settings.storage.open(), identity, http)?;
        tracing::debug!(
            base_url = %session.base_url,
            identity = session.identity.name(),
            "auth session configured"
        );
        Ok(Arc::new(session))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn identity_name(&self) -> &'static str {
        self.identity.name()
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    pub fn state(&self) -> SessionState {
        if self.gate.is_refreshing() {
            return SessionState::Refreshing;
        }
        match self.store.access_token() {
            Ok(Some(_)) => SessionState::Authenticated,
            Ok(None) => SessionState::Anonymous,
            Err(err) => {
                tracing::warn!("token storage unreadable; reporting anonymous: {}", err);
                SessionState::Anonymous
            }
        }
    }

    fn bearer_for(&self, tokens: Option<&TokenSet>) -> Option<String> {
        let tokens = tokens?;
        match self.authorization_token {
            AuthorizationToken::Access => Some(tokens.access_token.clone()),
            AuthorizationToken::Id => Some(
                tokens
                    .id_token
                    .clone()
                    .unwrap_or_else(|| tokens.access_token.clone()),
            ),
        }
    }

    async fn dispatch(
        &self,
        request: &PendingRequest,
        bearer: Option<&str>,
    ) -> AppResult<reqwest::Response> {
        let started = Instant::now();
        let response = request
            .build(&self.http, &self.base_url, bearer)?
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(
                    method = %request.method,
                    path = %request.path,
                    "request transport failure: {}",
                    e
                );
                AppError::from(e)
            })?;
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            status = response.status().as_u16(),
            authenticated = bearer.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );
        Ok(response)
    }

    /// Authenticated dispatch: bearer from storage, one refresh and one redispatch on 401.
    pub async fn send(&self, request: PendingRequest) -> AppResult<reqwest::Response> {
        let request = &request;
        let label = request.describe();
        self.run_authenticated(&label, move |tokens| async move {
            let bearer = self.bearer_for(tokens.as_ref());
            let response = self.dispatch(request, bearer.as_deref()).await?;
            if response.status() == StatusCode::UNAUTHORIZED {
                let body = read_error_body(response).await;
                return Ok(Attempt::Unauthorized(error_from_body(
                    StatusCode::UNAUTHORIZED,
                    &body,
                )));
            }
            ensure_success(response).await.map(Attempt::Completed)
        })
        .await
    }

    pub async fn send_json<T: DeserializeOwned>(&self, request: PendingRequest) -> AppResult<T> {
        decode_json(self.send(request).await?).await
    }

    /// No `Authorization`, no refresh. A 401 here is `AUTH_UNAUTHORIZED`.
    pub async fn send_public(&self, request: PendingRequest) -> AppResult<reqwest::Response> {
        let response = self.dispatch(&request, None).await?;
        ensure_success(response).await
    }

    pub async fn send_public_json<T: DeserializeOwned>(
        &self,
        request: PendingRequest,
    ) -> AppResult<T> {
        decode_json(self.send_public(request).await?).await
    }

    async fn run_authenticated<T, F, Fut>(&self, label: &str, mut attempt: F) -> AppResult<T>
    where
        F: FnMut(Option<TokenSet>) -> Fut,
        Fut: Future<Output = AppResult<Attempt<T>>>,
    {
        let dispatched_epoch = self.gate.epoch();
        let tokens = self.store.load()?;
        let anonymous = tokens.is_none();
        let rejected = match attempt(tokens).await? {
            Attempt::Completed(value) => return Ok(value),
            Attempt::Unauthorized(err) => err,
        };

        // Nothing to refresh or clear: the caller was never logged in.
        if anonymous && self.gate.epoch() == dispatched_epoch {
            return Err(AppError::from_code(
                ErrorCode::AuthReloginRequired,
                format!("login required ({})", rejected.message()),
            )
            .with_status(401));
        }
        tracing::info!(
            request = label,
            "request unauthorized; refreshing session: {}",
            rejected.message()
        );

        self.recover_from_unauthorized(dispatched_epoch, label).await?;

        match attempt(self.store.load()?).await? {
            Attempt::Completed(value) => Ok(value),
            Attempt::Unauthorized(err) => {
                tracing::warn!(request = label, "request still unauthorized after refresh");
                Err(AppError::from_code(
                    ErrorCode::AuthRejectedAfterRefresh,
                    err.message().to_string(),
                )
                .with_status(401))
            }
        }
    }

    /// Ok means the stored tokens are worth one redispatch.
    async fn recover_from_unauthorized(&self, dispatched_epoch: u64, label: &str) -> AppResult<()> {
        let mut ledger = self.gate.lock().await;

        if ledger.epoch() != dispatched_epoch {
            if self.store.access_token()?.is_some() {
                tracing::debug!(
                    request = label,
                    "tokens changed while request was in flight; reusing them"
                );
                return Ok(());
            }
            return Err(AppError::from_code(
                ErrorCode::AuthReloginRequired,
                "session ended while the request was in flight",
            )
            .with_status(401));
        }

        let refresh_err = match self.refresh_locked(&mut ledger).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        if let Err(clear_err) = self.store.clear() {
            tracing::error!("failed to clear token storage after refresh failure: {}", clear_err);
        }
        ledger.bump();
        drop(ledger);

        let err = AppError::from_code(
            ErrorCode::AuthReloginRequired,
            format!("session expired, please log in again ({})", refresh_err.message()),
        )
        .with_status(401)
        .with_source(refresh_err);
        tracing::warn!(request = label, "session cleared: {}", err);
        self.notify_unrecoverable(&err);
        Err(err)
    }

    async fn refresh_locked(&self, ledger: &mut LedgerGuard<'_>) -> AppResult<()> {
        let Some(refresh_token) = self.store.refresh_token()? else {
            ledger.record_refresh(false);
            return Err(AppError::from_code(
                ErrorCode::AuthReloginRequired,
                "no refresh token stored",
            ));
        };

        let result = {
            let _refreshing = ledger.begin_refresh();
            self.identity.refresh(&refresh_token).await
        };
        ledger.record_refresh(result.is_ok());

        let tokens = result.inspect_err(|err| {
            tracing::warn!(
                identity = self.identity.name(),
                refresh_token = %mask_token(&refresh_token),
                "token refresh failed: {}",
                err
            );
        })?;
        self.store.replace(&tokens)?;
        let epoch = ledger.bump();
        tracing::info!(
            identity = self.identity.name(),
            access_token = %mask_token(&tokens.access_token),
            rotated_refresh_token = tokens.refresh_token.is_some(),
            epoch = epoch,
            "session tokens refreshed"
        );
        Ok(())
    }

    /// Explicit refresh through the same single-flight gate. A failure leaves the stored
    /// tokens untouched.
    pub async fn refresh(&self) -> AppResult<()> {
        let mut ledger = self.gate.lock().await;
        self.refresh_locked(&mut ledger).await
    }

    fn notify_unrecoverable(&self, err: &AppError) {
        if let Some(callback) = self.on_unrecoverable.as_ref() {
            callback(err);
        }
    }

    /// Anonymous -> Authenticated. Returns the profile, fetching it when the provider did
    /// not return one with the tokens.
    pub async fn login(&self, credentials: &Credentials) -> AppResult<UserProfile> {
        let outcome = self.identity.login(credentials).await?;
        self.establish(outcome, "login").await
    }

    pub async fn register(&self, registration: &RegisterRequest) -> AppResult<UserProfile> {
        let outcome = self.identity.register(registration).await?;
        self.establish(outcome, "register").await
    }

    async fn establish(&self, outcome: LoginOutcome, action: &'static str) -> AppResult<UserProfile> {
        let mut ledger = self.gate.lock().await;
        let written = self
            .store
            .clear()
            .and_then(|()| self.store.replace(&outcome.tokens))
            .and_then(|()| match outcome.user.as_ref() {
                Some(user) => self.store.store_user(user),
                None => Ok(()),
            });
        let epoch = ledger.bump();
        drop(ledger);
        written?;

        tracing::info!(
            identity = self.identity.name(),
            action = action,
            access_token = %mask_token(&outcome.tokens.access_token),
            epoch = epoch,
            "session established"
        );

        match outcome.user {
            Some(user) => Ok(user),
            None => self.current_user().await,
        }
    }

    /// Authenticated -> Anonymous. Local keys are cleared before the provider sign-out,
    /// whose failure is only logged.
    pub async fn logout(&self) -> AppResult<()> {
        let mut ledger = self.gate.lock().await;
        let tokens = self.store.load();
        let cleared = self.store.clear();
        ledger.bump();
        drop(ledger);

        match tokens {
            Ok(Some(tokens)) => {
                if let Err(err) = self.identity.sign_out(&tokens).await {
                    tracing::warn!(
                        identity = self.identity.name(),
                        "provider sign-out failed; local session already cleared: {}",
                        err
                    );
                }
            }
            Ok(None) => {}
            Err(err) => tracing::warn!("could not read tokens for sign-out: {}", err),
        }

        tracing::info!(identity = self.identity.name(), "logged out");
        cleared
    }

    /// Profile of the logged-in user, through the refresh-on-401 path. Cached on success.
    pub async fn current_user(&self) -> AppResult<UserProfile> {
        if self.store.load()?.is_none() {
            return Err(
                AppError::from_code(ErrorCode::AuthUnauthorized, "not logged in").with_status(401),
            );
        }

        let identity = self.identity.as_ref();
        let user = self
            .run_authenticated("fetch_user", move |tokens| async move {
                let Some(tokens) = tokens else {
                    return Ok(Attempt::Unauthorized(
                        AppError::from_code(ErrorCode::AuthUnauthorized, "not logged in")
                            .with_status(401),
                    ));
                };
                match identity.fetch_user(&tokens).await {
                    Ok(user) => Ok(Attempt::Completed(user)),
                    Err(err) if err.status() == Some(401) => Ok(Attempt::Unauthorized(err)),
                    Err(err) => Err(err),
                }
            })
            .await?;

        if let Err(err) = self.store.store_user(&user) {
            tracing::warn!("failed to cache user profile: {}", err);
        }
        Ok(user)
    }

    /// Startup check of a persisted session. Any failure to confirm it logs out.
    pub async fn restore(&self) -> AppResult<Option<UserProfile>> {
        if self.store.load()?.is_none() {
            return Ok(None);
        }
        if self.store.keys().user.is_some() {
            match self.store.cached_user() {
                Ok(Some(_)) => {}
                Ok(None) => return Ok(None),
                Err(err) => {
                    tracing::warn!("cached user unreadable; logging out: {}", err);
                    self.logout().await?;
                    return Ok(None);
                }
            }
        }

        match self.current_user().await {
            Ok(user) => Ok(Some(user)),
            Err(err) => {
                tracing::warn!("stored session could not be restored; logging out: {}", err);
                self.logout().await?;
                Ok(None)
            }
        }
    }

    pub fn snapshot(&self) -> AppResult<SessionSnapshot> {
        let tokens = self.store.load()?;
        let user = self.store.cached_user().unwrap_or_else(|err| {
            tracing::warn!("cached user unreadable: {}", err);
            None
        });
        let expires_at = tokens.as_ref().and_then(|t| t.expires_at);
        let email = tokens
            .as_ref()
            .and_then(|t| t.id_token.as_deref())
            .and_then(|id| crate::shared::jwt::claim_str(id, "email"))
            .or_else(|| user.as_ref().map(|u| u.email.clone()));
        let last_refresh = self.gate.try_last_refresh();

        Ok(SessionSnapshot {
            state: self.state(),
            identity: self.identity.name(),
            base_url: self.base_url.clone(),
            access_token: tokens.as_ref().map(|t| mask_token(&t.access_token)),
            has_id_token: tokens.as_ref().is_some_and(|t| t.id_token.is_some()),
            has_refresh_token: tokens.as_ref().is_some_and(|t| t.refresh_token.is_some()),
            expires_at,
            expires_in_seconds: expires_at.map(|exp| exp - now_unix_seconds()),
            email,
            user,
            last_refresh_ok: last_refresh.map(|r| r.ok),
            last_refresh_at: last_refresh.map(|r| r.at_unix),
        })
    }
}
