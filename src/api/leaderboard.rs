//! Usage: `/leaderboard` routes.

use super::models::{LeaderboardEntry, LeaderboardPage, PlayerRank};
use super::{clamp_limit, clamp_page};
use crate::session::{id_segment, AuthSession, PendingRequest};
use crate::shared::error::AppResult;

pub async fn get_leaderboard(
    session: &AuthSession,
    page: u32,
    limit: u32,
) -> AppResult<LeaderboardPage> {
    let request = PendingRequest::get("/leaderboard")
        .query("page", clamp_page(page))
        .query("limit", clamp_limit(limit));
    session.send_json(request).await
}

pub async fn get_top_players(session: &AuthSession) -> AppResult<Vec<LeaderboardEntry>> {
    session.send_json(PendingRequest::get("/leaderboard/top")).await
}

pub async fn get_player_rank(session: &AuthSession, user_id: &str) -> AppResult<PlayerRank> {
    let path = format!("/leaderboard/rank/{}", id_segment(user_id)?);
    session.send_json(PendingRequest::get(path)).await
}
