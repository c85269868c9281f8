mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use leaderboard_session::api;
use leaderboard_session::api::models::{AdminUpdateUser, MatchResult, RegisterRequest};
use leaderboard_session::identity::BackendIdentity;
use leaderboard_session::test_support::{
    MockBackend, MOCK_EMAIL, MOCK_GAME_ID, MOCK_PASSWORD, MOCK_USER_ID, MOCK_USERNAME,
};
use leaderboard_session::{
    AuthSession, Credentials, ErrorCode, FileStorage, SessionOptions, SessionState, TokenKeys,
};

struct RestApp {
    backend: MockBackend,
    session: AuthSession,
    token_file: std::path::PathBuf,
    unrecoverable: Arc<std::sync::atomic::AtomicUsize>,
    _dir: tempfile::TempDir,
}

async fn rest_app() -> RestApp {
    let backend = MockBackend::start().await.expect("mock backend");
    let dir = tempfile::tempdir().expect("tempdir");
    let token_file = dir.path().join("tokens.json");
    let (unrecoverable, callback) = support::counting_callback();

    let http = reqwest::Client::new();
    let mut options = SessionOptions::new(backend.api_root()).token_keys(TokenKeys::rest());
    options.on_unrecoverable_auth_failure = Some(callback);
    let session = AuthSession::new(
        options,
        Arc::new(FileStorage::new(token_file.clone())),
        Arc::new(BackendIdentity::new(http.clone(), backend.api_root())),
        http,
    )
    .expect("session");

    RestApp {
        backend,
        session,
        token_file,
        unrecoverable,
        _dir: dir,
    }
}

async fn logged_in() -> RestApp {
    let app = rest_app().await;
    app.session
        .login(&Credentials::new(MOCK_EMAIL, MOCK_PASSWORD))
        .await
        .expect("login");
    app
}

#[tokio::test]
async fn login_persists_token_and_user() {
    let app = logged_in().await;

    let stored = support::read_json(&app.token_file);
    assert_eq!(
        stored["auth_token"].as_str().map(str::to_string),
        app.backend.access_token()
    );
    let cached: serde_json::Value =
        serde_json::from_str(stored["user"].as_str().expect("user key")).unwrap();
    assert_eq!(cached["email"], MOCK_EMAIL);

    let me = api::auth::me(&app.session).await.unwrap();
    assert_eq!(me.id, MOCK_USER_ID);
    assert_eq!(app.session.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = rest_app().await;

    let err = app
        .session
        .login(&Credentials::new(MOCK_EMAIL, "nope"))
        .await
        .expect_err("rejected");
    assert_eq!(err.kind(), Some(ErrorCode::AuthUnauthorized));
    assert_eq!(err.message(), "Invalid credentials");
    assert!(!app.token_file.exists());
    assert_eq!(app.unrecoverable.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn expired_backend_token_requires_relogin() {
    let app = logged_in().await;
    app.backend.expire_access_token();

    let err = api::auth::me(&app.session).await.expect_err("expired");
    assert!(err.is_relogin_required(), "{err}");
    assert_eq!(err.status(), Some(401));

    // Backend sessions have no refresh token, so nothing reaches a token endpoint.
    assert_eq!(app.backend.refresh_calls(), 0);
    assert_eq!(app.backend.hit_count("GET /api/auth/me"), 1);
    assert_eq!(support::read_json(&app.token_file), serde_json::json!({}));
    assert_eq!(app.session.state(), SessionState::Anonymous);
    assert_eq!(app.unrecoverable.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn anonymous_request_needs_login_without_notifying() {
    let app = rest_app().await;

    let err = api::games::match_history(&app.session, 1, 10)
        .await
        .expect_err("anonymous");
    assert!(err.is_relogin_required(), "{err}");
    assert_eq!(
        app.backend.seen_authorization().last().cloned().flatten(),
        None
    );
    assert_eq!(app.unrecoverable.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn restore_confirms_a_persisted_session() {
    let app = logged_in().await;

    // A second session over the same file sees the persisted login.
    let http = reqwest::Client::new();
    let reopened = AuthSession::new(
        SessionOptions::new(app.backend.api_root()).token_keys(TokenKeys::rest()),
        Arc::new(FileStorage::new(app.token_file.clone())),
        Arc::new(BackendIdentity::new(http.clone(), app.backend.api_root())),
        http,
    )
    .unwrap();

    let user = reopened.restore().await.unwrap().expect("restored");
    assert_eq!(user.email, MOCK_EMAIL);
    assert_eq!(reopened.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn restore_logs_out_a_dead_session() {
    let app = logged_in().await;
    app.backend.expire_access_token();

    assert!(app.session.restore().await.unwrap().is_none());
    assert_eq!(app.session.state(), SessionState::Anonymous);
    assert_eq!(support::read_json(&app.token_file), serde_json::json!({}));
}

#[tokio::test]
async fn restore_without_cached_user_is_anonymous() {
    let app = rest_app().await;
    std::fs::write(&app.token_file, r#"{"auth_token":"stale"}"#).unwrap();

    assert!(app.session.restore().await.unwrap().is_none());
    assert_eq!(app.backend.hit_count("GET /api/auth/me"), 0);
}

#[tokio::test]
async fn register_conflict_surfaces_backend_message() {
    let app = rest_app().await;

    let err = app
        .session
        .register(&RegisterRequest {
            email: MOCK_EMAIL.to_string(),
            username: "ada2".to_string(),
            password: "pw".to_string(),
        })
        .await
        .expect_err("conflict");
    assert_eq!(err.kind(), Some(ErrorCode::Api4xx));
    assert_eq!(err.status(), Some(409));
    assert_eq!(err.message(), "Email already registered");
}

#[tokio::test]
async fn register_establishes_a_session() {
    let app = rest_app().await;

    let user = app
        .session
        .register(&RegisterRequest {
            email: "grace@example.com".to_string(),
            username: "grace".to_string(),
            password: "pw".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(user.username, "grace");
    assert_eq!(user.elo, 1200);

    let me = api::auth::me(&app.session).await.unwrap();
    assert_eq!(me.email, "grace@example.com");
}

#[tokio::test]
async fn leaderboard_routes() {
    let app = logged_in().await;

    let page = api::leaderboard::get_leaderboard(&app.session, 0, 500)
        .await
        .unwrap();
    assert_eq!(page.page, 1);
    assert_eq!(page.limit, 100);
    assert_eq!(page.entries.len(), 2);
    assert_eq!(page.entries[0].username, MOCK_USERNAME);

    let top = api::leaderboard::get_top_players(&app.session).await.unwrap();
    assert_eq!(top[1].username, "grace");

    let rank = api::leaderboard::get_player_rank(&app.session, MOCK_USER_ID)
        .await
        .unwrap();
    assert_eq!(rank.rank, Some(1));

    let outside = api::leaderboard::get_player_rank(&app.session, "user:nobody")
        .await
        .unwrap();
    assert_eq!(outside.rank, None);
    assert_eq!(outside.message.as_deref(), Some("Player not in top 1000"));
}

#[tokio::test]
async fn game_routes() {
    let app = logged_in().await;

    let history = api::games::match_history(&app.session, 2, 0).await.unwrap();
    assert_eq!(history.page, 2);
    assert_eq!(history.limit, 1);
    assert_eq!(history.matches[0].result, MatchResult::Win);
    assert_eq!(history.matches[0].elo_change, 16);

    let game = api::games::game_details(&app.session, MOCK_GAME_ID)
        .await
        .unwrap();
    assert_eq!(game.status, "completed");
    assert_eq!(game.player1.map(|p| p.username).as_deref(), Some(MOCK_USERNAME));

    let missing = api::games::game_details(&app.session, "game:404")
        .await
        .expect_err("missing");
    assert_eq!(missing.status(), Some(404));
    assert_eq!(missing.message(), "Game not found");

    let err = api::games::game_details(&app.session, "../admin")
        .await
        .expect_err("bad id");
    assert_eq!(err.kind(), Some(ErrorCode::InvalidInput));
}

#[tokio::test]
async fn user_routes() {
    let app = logged_in().await;

    let profile = api::users::get_profile(&app.session, MOCK_USER_ID)
        .await
        .unwrap();
    assert_eq!(profile.elo, 1320);

    let ack = api::users::upload_profile_picture(
        &app.session,
        Bytes::from_static(b"\x89PNG fake"),
        "avatar.png",
        "image/png",
    )
    .await
    .unwrap();
    assert!(ack.success);

    let err = api::users::upload_profile_picture(&app.session, Bytes::new(), "a.png", "image/png")
        .await
        .expect_err("empty upload");
    assert_eq!(err.kind(), Some(ErrorCode::InvalidInput));
}

#[tokio::test]
async fn expired_token_upload_is_not_replayed() {
    let app = logged_in().await;
    app.backend.expire_access_token();

    let err = api::users::upload_profile_picture(
        &app.session,
        Bytes::from_static(b"img"),
        "a.png",
        "image/png",
    )
    .await
    .expect_err("relogin");
    assert!(err.is_relogin_required());
    assert_eq!(app.backend.hit_count("POST /api/users/profile/picture"), 1);
}

#[tokio::test]
async fn admin_routes() {
    let app = logged_in().await;

    let users = api::admin::list_users(&app.session, 20, 0, Some("ada"))
        .await
        .unwrap();
    assert_eq!(users.len(), 1);
    let none = api::admin::list_users(&app.session, 20, 0, Some("zed"))
        .await
        .unwrap();
    assert!(none.is_empty());

    let updated = api::admin::update_user(
        &app.session,
        MOCK_USER_ID,
        &AdminUpdateUser {
            elo: Some(1500),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(updated.elo, 1500);

    let stats = api::admin::stats(&app.session).await.unwrap();
    assert_eq!(stats.total_users, 2);

    let ack = api::admin::delete_user(&app.session, "user:grace")
        .await
        .unwrap();
    assert!(ack.success);
    assert!(app.backend.hits().contains(&"DELETE /api/admin/users/user:grace".to_string()));
}

#[tokio::test]
async fn logout_empties_the_file() {
    let app = logged_in().await;

    app.session.logout().await.unwrap();
    assert_eq!(support::read_json(&app.token_file), serde_json::json!({}));
    assert!(app.session.snapshot().unwrap().access_token.is_none());
}

#[tokio::test]
async fn logout_recovers_from_a_corrupt_token_file() {
    let app = rest_app().await;
    std::fs::write(&app.token_file, "{ not json").unwrap();

    app.session.logout().await.unwrap();

    assert_eq!(support::read_json(&app.token_file), serde_json::json!({}));
    assert_eq!(app.session.state(), SessionState::Anonymous);
    app.session
        .login(&Credentials::new(MOCK_EMAIL, MOCK_PASSWORD))
        .await
        .unwrap();
    assert!(support::read_json(&app.token_file)["auth_token"].is_string());
}
