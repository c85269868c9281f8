//! Usage: Public test helpers for integration tests (in-process mock backend).
//!
//! `MockBackend` serves the game backend's `/api` routes plus an OAuth2 token endpoint
//! (`/oauth/token`, `/oauth/userinfo`) and a Cognito-style JSON endpoint (`/cognito/`) on
//! an ephemeral localhost port. One user, one live token set; tests rotate or revoke
//! tokens to provoke 401s and count how often refresh was called.

use crate::api::models::{LeaderboardEntry, UserProfile};
use crate::shared::mutex_ext::MutexExt;
use axum::body::Bytes;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Form, Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const MOCK_USER_ID: &str = "user:ada";
pub const MOCK_EMAIL: &str = "ada@example.com";
pub const MOCK_USERNAME: &str = "ada";
pub const MOCK_PASSWORD: &str = "correct-horse";
pub const MOCK_GAME_ID: &str = "game:1";

#[derive(Debug, Default, Clone)]
struct IssuedTokens {
    access: Option<String>,
    id: Option<String>,
    refresh: Option<String>,
}

struct MockState {
    tokens: Mutex<IssuedTokens>,
    user: Mutex<UserProfile>,
    counter: AtomicU64,
    refresh_calls: AtomicU64,
    sign_out_calls: AtomicU64,
    refresh_delay_ms: AtomicU64,
    reject_all: AtomicBool,
    fail_sign_out: AtomicBool,
    seen_authorization: Mutex<Vec<Option<String>>>,
    hits: Mutex<Vec<String>>,
}

impl MockState {
    fn new() -> Self {
        Self {
            tokens: Mutex::new(IssuedTokens::default()),
            user: Mutex::new(UserProfile {
                id: MOCK_USER_ID.to_string(),
                email: MOCK_EMAIL.to_string(),
                username: MOCK_USERNAME.to_string(),
                profile_picture: None,
                elo: 1320,
                games_played: 12,
                games_won: 7,
                win_rate: 58.3,
                is_admin: true,
            }),
            counter: AtomicU64::new(0),
            refresh_calls: AtomicU64::new(0),
            sign_out_calls: AtomicU64::new(0),
            refresh_delay_ms: AtomicU64::new(0),
            reject_all: AtomicBool::new(false),
            fail_sign_out: AtomicBool::new(false),
            seen_authorization: Mutex::new(Vec::new()),
            hits: Mutex::new(Vec::new()),
        }
    }

    fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// New access + id token, optionally rotating the refresh token too.
    fn issue(&self, rotate_refresh: bool) -> IssuedTokens {
        let n = self.next_id();
        let mut tokens = self.tokens.lock_or_recover();
        tokens.access = Some(format!("access-{n}"));
        tokens.id = Some(format!("id-{n}"));
        if rotate_refresh || tokens.refresh.is_none() {
            tokens.refresh = Some(format!("refresh-{n}"));
        }
        tokens.clone()
    }

    fn user(&self) -> UserProfile {
        self.user.lock_or_recover().clone()
    }

    fn bearer_is_valid(&self, headers: &HeaderMap) -> bool {
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.seen_authorization
            .lock_or_recover()
            .push(presented.clone());

        if self.reject_all.load(Ordering::SeqCst) {
            return false;
        }
        let expected = self
            .tokens
            .lock_or_recover()
            .access
            .as_ref()
            .map(|t| format!("Bearer {t}"));
        expected.is_some() && presented == expected
    }

    fn access_token_is_valid(&self, token: &str) -> bool {
        !self.reject_all.load(Ordering::SeqCst)
            && self.tokens.lock_or_recover().access.as_deref() == Some(token)
    }

    fn refresh_token_is_valid(&self, token: &str) -> bool {
        self.tokens.lock_or_recover().refresh.as_deref() == Some(token)
    }

    async fn refresh_delay(&self) {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.refresh_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

type Shared = Arc<MockState>;

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn unauthorized() -> Response {
    error_body(StatusCode::UNAUTHORIZED, "Invalid or expired token")
}

pub struct MockBackend {
    addr: SocketAddr,
    state: Shared,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl MockBackend {
    pub async fn start() -> std::io::Result<Self> {
        let state: Shared = Arc::new(MockState::new());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = router(state.clone());

        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await;
            if let Err(err) = served {
                tracing::error!("mock backend stopped: {}", err);
            }
        });

        Ok(Self {
            addr,
            state,
            shutdown: Some(tx),
            task: Some(task),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn api_root(&self) -> String {
        format!("{}/api", self.base_url())
    }

    pub fn token_uri(&self) -> String {
        format!("{}/oauth/token", self.base_url())
    }

    pub fn userinfo_uri(&self) -> String {
        format!("{}/oauth/userinfo", self.base_url())
    }

    pub fn cognito_endpoint(&self) -> String {
        format!("{}/cognito/", self.base_url())
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.tokens.lock_or_recover().access.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.state.tokens.lock_or_recover().refresh.clone()
    }

    /// Rotates the server-side access token so the one the client holds gets a 401.
    pub fn expire_access_token(&self) {
        let n = self.state.next_id();
        self.state.tokens.lock_or_recover().access = Some(format!("expired-out-{n}"));
    }

    pub fn revoke_refresh_token(&self) {
        self.state.tokens.lock_or_recover().refresh = None;
    }

    /// Every bearer is rejected, including freshly refreshed ones.
    pub fn reject_all_tokens(&self, reject: bool) {
        self.state.reject_all.store(reject, Ordering::SeqCst);
    }

    pub fn fail_sign_out(&self, fail: bool) {
        self.state.fail_sign_out.store(fail, Ordering::SeqCst);
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.state
            .refresh_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn refresh_calls(&self) -> u64 {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> u64 {
        self.state.sign_out_calls.load(Ordering::SeqCst)
    }

    /// `Authorization` values seen by bearer-protected routes, in arrival order.
    pub fn seen_authorization(&self) -> Vec<Option<String>> {
        self.state.seen_authorization.lock_or_recover().clone()
    }

    /// `"METHOD /path"` for every request received, in arrival order.
    pub fn hits(&self) -> Vec<String> {
        self.state.hits.lock_or_recover().clone()
    }

    pub fn hit_count(&self, method_and_path: &str) -> usize {
        self.hits().iter().filter(|h| *h == method_and_path).count()
    }

    pub fn user(&self) -> UserProfile {
        self.state.user()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn record_hit(State(state): State<Shared>, request: Request, next: Next) -> Response {
    let line = format!("{} {}", request.method(), request.uri().path());
    state.hits.lock_or_recover().push(line);
    next.run(request).await
}

fn router(state: Shared) -> Router {
    let api = Router::new()
        .route("/auth/login", post(api_login))
        .route("/auth/register", post(api_register))
        .route("/auth/me", get(api_me))
        .route("/users/profile", put(api_update_profile))
        .route("/users/profile/picture", post(api_upload_picture))
        .route("/users/:id", get(api_get_user))
        .route("/leaderboard", get(api_leaderboard))
        .route("/leaderboard/top", get(api_top))
        .route("/leaderboard/rank/:id", get(api_rank))
        .route("/games/history", get(api_history))
        .route("/games/:id", get(api_game))
        .route("/admin/users", get(api_admin_list))
        .route(
            "/admin/users/:id",
            put(api_admin_update).delete(api_admin_delete),
        )
        .route("/admin/stats", get(api_admin_stats))
        .route("/boom", get(api_boom));

    Router::new()
        .nest("/api", api)
        .route("/oauth/token", post(oauth_token))
        .route("/oauth/userinfo", get(oauth_userinfo))
        .route("/cognito/", post(cognito))
        .layer(middleware::from_fn_with_state(state.clone(), record_hit))
        .with_state(state)
}

// -- /api --

async fn api_login(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    let password = body
        .get("password")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if email != MOCK_EMAIL || password != MOCK_PASSWORD {
        return error_body(StatusCode::UNAUTHORIZED, "Invalid credentials");
    }
    let tokens = state.issue(false);
    Json(json!({ "token": tokens.access, "user": state.user() })).into_response()
}

async fn api_register(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    let username = body
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if username.trim().is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "Username is required");
    }
    if email == MOCK_EMAIL {
        return error_body(StatusCode::CONFLICT, "Email already registered");
    }
    {
        let mut user = state.user.lock_or_recover();
        *user = UserProfile {
            id: format!("user:{username}"),
            email: email.to_string(),
            username: username.to_string(),
            elo: 1200,
            ..Default::default()
        };
    }
    let tokens = state.issue(false);
    Json(json!({ "token": tokens.access, "user": state.user() })).into_response()
}

async fn api_me(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !state.bearer_is_valid(&headers) {
        return unauthorized();
    }
    Json(state.user()).into_response()
}

async fn api_get_user(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    let user = state.user();
    if id != user.id {
        return error_body(StatusCode::NOT_FOUND, "User not found");
    }
    Json(user).into_response()
}

async fn api_update_profile(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !state.bearer_is_valid(&headers) {
        return unauthorized();
    }
    let mut user = state.user.lock_or_recover();
    if let Some(username) = body.get("username").and_then(Value::as_str) {
        user.username = username.to_string();
    }
    Json(user.clone()).into_response()
}

async fn api_upload_picture(
    State(state): State<Shared>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !state.bearer_is_valid(&headers) {
        return unauthorized();
    }
    let is_multipart = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));
    let has_image_field = String::from_utf8_lossy(&body).contains("name=\"image\"");
    if !is_multipart || !has_image_field {
        return error_body(StatusCode::BAD_REQUEST, "No image provided");
    }
    Json(json!({ "success": true, "message": "Profile picture updated successfully" }))
        .into_response()
}

fn leaderboard_entries(state: &MockState) -> Vec<LeaderboardEntry> {
    let user = state.user();
    vec![
        LeaderboardEntry {
            rank: 1,
            user_id: user.id.clone(),
            username: user.username.clone(),
            elo: user.elo,
            games_played: user.games_played,
            win_rate: user.win_rate,
            profile_picture: None,
        },
        LeaderboardEntry {
            rank: 2,
            user_id: "user:grace".to_string(),
            username: "grace".to_string(),
            elo: 1250,
            games_played: 9,
            win_rate: 44.4,
            profile_picture: None,
        },
    ]
}

async fn api_leaderboard(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let page: u32 = query.get("page").and_then(|v| v.parse().ok()).unwrap_or(1);
    let limit: u32 = query.get("limit").and_then(|v| v.parse().ok()).unwrap_or(50);
    let entries = leaderboard_entries(&state);
    Json(json!({
        "entries": entries,
        "total": entries.len(),
        "page": page,
        "limit": limit,
        "total_pages": 1,
    }))
    .into_response()
}

async fn api_top(State(state): State<Shared>) -> Response {
    Json(leaderboard_entries(&state)).into_response()
}

async fn api_rank(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    match leaderboard_entries(&state)
        .into_iter()
        .find(|entry| entry.user_id == id)
    {
        Some(entry) => Json(json!({ "rank": entry.rank })).into_response(),
        None => Json(json!({ "rank": null, "message": "Player not in top 1000" })).into_response(),
    }
}

async fn api_history(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !state.bearer_is_valid(&headers) {
        return unauthorized();
    }
    let page: u32 = query.get("page").and_then(|v| v.parse().ok()).unwrap_or(1);
    let limit: u32 = query.get("limit").and_then(|v| v.parse().ok()).unwrap_or(20);
    Json(json!({
        "matches": [{
            "id": MOCK_GAME_ID,
            "opponent_id": "user:grace",
            "opponent_name": "grace",
            "opponent_elo": 1250,
            "result": "win",
            "my_elo_before": 1304,
            "my_elo_after": 1320,
            "opponent_elo_before": 1266,
            "opponent_elo_after": 1250,
            "elo_change": 16,
            "created_at": "2025-01-01T10:00:00Z",
            "ended_at": "2025-01-01T10:12:00Z"
        }],
        "total": 1,
        "page": page,
        "limit": limit,
    }))
    .into_response()
}

async fn api_game(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !state.bearer_is_valid(&headers) {
        return unauthorized();
    }
    if id != MOCK_GAME_ID {
        return error_body(StatusCode::NOT_FOUND, "Game not found");
    }
    Json(json!({
        "id": MOCK_GAME_ID,
        "status": "completed",
        "board": [[1, null, 2], [null, 1, null]],
        "player1": { "id": MOCK_USER_ID, "username": MOCK_USERNAME, "elo_before": 1304, "elo_after": 1320 },
        "player2": { "id": "user:grace", "username": "grace", "elo_before": 1266, "elo_after": 1250 },
        "winner": MOCK_USER_ID,
        "started_at": "2025-01-01T10:00:00Z",
        "ended_at": "2025-01-01T10:12:00Z"
    }))
    .into_response()
}

async fn api_admin_list(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !state.bearer_is_valid(&headers) {
        return unauthorized();
    }
    let user = state.user();
    let matches = query
        .get("search")
        .map(|s| user.username.contains(s.as_str()) || user.email.contains(s.as_str()))
        .unwrap_or(true);
    let users: Vec<UserProfile> = if matches { vec![user] } else { Vec::new() };
    Json(users).into_response()
}

async fn api_admin_update(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if !state.bearer_is_valid(&headers) {
        return unauthorized();
    }
    let mut user = state.user.lock_or_recover();
    if id != user.id {
        return error_body(StatusCode::NOT_FOUND, "User not found");
    }
    if let Some(elo) = body.get("elo").and_then(Value::as_i64) {
        user.elo = elo as i32;
    }
    if let Some(is_admin) = body.get("is_admin").and_then(Value::as_bool) {
        user.is_admin = is_admin;
    }
    Json(user.clone()).into_response()
}

async fn api_admin_delete(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(_id): Path<String>,
) -> Response {
    if !state.bearer_is_valid(&headers) {
        return unauthorized();
    }
    Json(json!({ "success": true, "message": "User deleted successfully" })).into_response()
}

async fn api_admin_stats(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !state.bearer_is_valid(&headers) {
        return unauthorized();
    }
    Json(json!({ "total_users": 2, "total_games": 5, "average_elo": 1285 })).into_response()
}

async fn api_boom() -> Response {
    error_body(StatusCode::INTERNAL_SERVER_ERROR, "Database error: connection reset")
}

// -- /oauth --

async fn oauth_token(
    State(state): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let grant = form.get("grant_type").map(String::as_str).unwrap_or_default();
    match grant {
        "password" => {
            let username = form.get("username").map(String::as_str).unwrap_or_default();
            let password = form.get("password").map(String::as_str).unwrap_or_default();
            if username != MOCK_EMAIL || password != MOCK_PASSWORD {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "invalid_grant", "error_description": "Invalid user credentials" })),
                )
                    .into_response();
            }
            let tokens = state.issue(true);
            Json(json!({
                "access_token": tokens.access,
                "id_token": tokens.id,
                "refresh_token": tokens.refresh,
                "token_type": "Bearer",
                "expires_in": 3600,
            }))
            .into_response()
        }
        "refresh_token" => {
            state.refresh_delay().await;
            let presented = form
                .get("refresh_token")
                .map(String::as_str)
                .unwrap_or_default();
            if !state.refresh_token_is_valid(presented) {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "invalid_grant", "error_description": "Token is not active" })),
                )
                    .into_response();
            }
            let tokens = state.issue(true);
            Json(json!({
                "access_token": tokens.access,
                "refresh_token": tokens.refresh,
                "token_type": "Bearer",
                "expires_in": "3600",
            }))
            .into_response()
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "unsupported_grant_type" })),
        )
            .into_response(),
    }
}

async fn oauth_userinfo(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !state.bearer_is_valid(&headers) {
        return unauthorized();
    }
    let user = state.user();
    Json(json!({
        "sub": user.id,
        "email": user.email,
        "preferred_username": user.username,
    }))
    .into_response()
}

// -- /cognito --

fn cognito_error(kind: &str, message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "__type": kind, "message": message })),
    )
        .into_response()
}

async fn cognito(State(state): State<Shared>, headers: HeaderMap, body: Bytes) -> Response {
    let target = headers
        .get("x-amz-target")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let content_type_ok = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "application/x-amz-json-1.1");
    if !content_type_ok {
        return cognito_error("SerializationException", "unexpected content type");
    }
    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        return cognito_error("SerializationException", "body is not json");
    };
    let operation = target
        .strip_prefix("AWSCognitoIdentityProviderService.")
        .unwrap_or_default();

    match operation {
        "InitiateAuth" => cognito_initiate_auth(&state, &payload).await,
        "GetUser" => {
            let token = payload
                .get("AccessToken")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if !state.access_token_is_valid(token) {
                return cognito_error("NotAuthorizedException", "Access Token has expired");
            }
            let user = state.user();
            Json(json!({
                "Username": user.username,
                "UserAttributes": [
                    { "Name": "sub", "Value": user.id },
                    { "Name": "email", "Value": user.email },
                ]
            }))
            .into_response()
        }
        "GlobalSignOut" => {
            state.sign_out_calls.fetch_add(1, Ordering::SeqCst);
            if state.fail_sign_out.load(Ordering::SeqCst) {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "__type": "InternalErrorException", "message": "sign-out unavailable" })),
                )
                    .into_response();
            }
            Json(json!({})).into_response()
        }
        _ => cognito_error("UnknownOperationException", "unknown operation"),
    }
}

async fn cognito_initiate_auth(state: &MockState, payload: &Value) -> Response {
    let flow = payload
        .get("AuthFlow")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let params = payload.get("AuthParameters").cloned().unwrap_or(Value::Null);
    let param = |name: &str| {
        params
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    match flow {
        "USER_PASSWORD_AUTH" => {
            if param("USERNAME") != MOCK_EMAIL || param("PASSWORD") != MOCK_PASSWORD {
                return cognito_error("NotAuthorizedException", "Incorrect username or password.");
            }
            let tokens = state.issue(true);
            Json(json!({
                "AuthenticationResult": {
                    "AccessToken": tokens.access,
                    "IdToken": tokens.id,
                    "RefreshToken": tokens.refresh,
                    "ExpiresIn": 3600,
                    "TokenType": "Bearer"
                }
            }))
            .into_response()
        }
        "REFRESH_TOKEN_AUTH" => {
            state.refresh_delay().await;
            if !state.refresh_token_is_valid(&param("REFRESH_TOKEN")) {
                return cognito_error("NotAuthorizedException", "Invalid Refresh Token");
            }
            // Cognito does not rotate the refresh token.
            let tokens = state.issue(false);
            Json(json!({
                "AuthenticationResult": {
                    "AccessToken": tokens.access,
                    "IdToken": tokens.id,
                    "ExpiresIn": 3600,
                    "TokenType": "Bearer"
                }
            }))
            .into_response()
        }
        _ => cognito_error("InvalidParameterException", "unsupported auth flow"),
    }
}
