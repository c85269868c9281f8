//! Usage: `/games` routes (own match history, single game).

use super::models::{GameDetails, MatchHistoryPage};
use super::{clamp_limit, clamp_page};
use crate::session::{id_segment, AuthSession, PendingRequest};
use crate::shared::error::AppResult;

pub async fn match_history(
    session: &AuthSession,
    page: u32,
    limit: u32,
) -> AppResult<MatchHistoryPage> {
    let request = PendingRequest::get("/games/history")
        .query("page", clamp_page(page))
        .query("limit", clamp_limit(limit));
    session.send_json(request).await
}

pub async fn game_details(session: &AuthSession, game_id: &str) -> AppResult<GameDetails> {
    let path = format!("/games/{}", id_segment(game_id)?);
    session.send_json(PendingRequest::get(path)).await
}
