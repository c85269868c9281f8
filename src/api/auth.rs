//! Usage: `/auth` routes. Login and registration go out without a bearer and never refresh.

use super::models::{LoginRequest, LoginResponse, RegisterRequest, UserProfile};
use crate::session::{AuthSession, PendingRequest};
use crate::shared::error::AppResult;

pub async fn register(session: &AuthSession, data: &RegisterRequest) -> AppResult<LoginResponse> {
    session
        .send_public_json(PendingRequest::post("/auth/register").json(data)?)
        .await
}

pub async fn login(session: &AuthSession, data: &LoginRequest) -> AppResult<LoginResponse> {
    session
        .send_public_json(PendingRequest::post("/auth/login").json(data)?)
        .await
}

pub async fn me(session: &AuthSession) -> AppResult<UserProfile> {
    session.send_json(PendingRequest::get("/auth/me")).await
}
