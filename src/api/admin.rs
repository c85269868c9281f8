//! Usage: `/admin` routes. The backend rejects non-admin callers with 403.

use super::clamp_limit;
use super::models::{ActionAck, AdminStats, AdminUpdateUser, UserProfile};
use crate::session::{id_segment, AuthSession, PendingRequest};
use crate::shared::error::AppResult;

pub async fn list_users(
    session: &AuthSession,
    limit: u32,
    offset: u32,
    search: Option<&str>,
) -> AppResult<Vec<UserProfile>> {
    let mut request = PendingRequest::get("/admin/users")
        .query("limit", clamp_limit(limit))
        .query("offset", offset);
    if let Some(search) = search.map(str::trim).filter(|s| !s.is_empty()) {
        request = request.query("search", search);
    }
    session.send_json(request).await
}

pub async fn update_user(
    session: &AuthSession,
    user_id: &str,
    data: &AdminUpdateUser,
) -> AppResult<UserProfile> {
    let path = format!("/admin/users/{}", id_segment(user_id)?);
    session.send_json(PendingRequest::put(path).json(data)?).await
}

pub async fn delete_user(session: &AuthSession, user_id: &str) -> AppResult<ActionAck> {
    let path = format!("/admin/users/{}", id_segment(user_id)?);
    session.send_json(PendingRequest::delete(path)).await
}

pub async fn stats(session: &AuthSession) -> AppResult<AdminStats> {
    session.send_json(PendingRequest::get("/admin/stats")).await
}
