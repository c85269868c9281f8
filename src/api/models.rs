//! Usage: JSON shapes exchanged with the backend `/api` routes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub elo: i32,
    #[serde(default)]
    pub games_played: i32,
    #[serde(default)]
    pub games_won: i32,
    #[serde(default)]
    pub win_rate: f64,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: String,
    pub username: String,
    pub elo: i32,
    pub games_played: i32,
    pub win_rate: f64,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardPage {
    pub entries: Vec<LeaderboardEntry>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

/// `rank` is null when the player is outside the ranked window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRank {
    #[serde(default)]
    pub rank: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchResult {
    Win,
    Loss,
    Draw,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchHistoryItem {
    pub id: String,
    pub opponent_id: String,
    pub opponent_name: String,
    pub opponent_elo: i32,
    pub result: MatchResult,
    pub my_elo_before: i32,
    pub my_elo_after: i32,
    pub opponent_elo_before: i32,
    pub opponent_elo_after: i32,
    pub elo_change: i32,
    pub created_at: String,
    #[serde(default)]
    pub ended_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchHistoryPage {
    pub matches: Vec<MatchHistoryItem>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamePlayer {
    pub id: String,
    pub username: String,
    pub elo_before: i32,
    #[serde(default)]
    pub elo_after: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameDetails {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub board: Vec<Vec<Option<i32>>>,
    #[serde(default)]
    pub player1: Option<GamePlayer>,
    #[serde(default)]
    pub player2: Option<GamePlayer>,
    /// Backend record id of the winner; its encoding is not stable across backends.
    #[serde(default)]
    pub winner: Option<serde_json::Value>,
    pub started_at: String,
    #[serde(default)]
    pub ended_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminUpdateUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elo: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminStats {
    pub total_users: u64,
    pub total_games: u64,
    pub average_elo: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_profile_tolerates_identity_provider_shape() {
        let user: UserProfile = serde_json::from_value(serde_json::json!({
            "id": "u-1",
            "email": "ada@example.com",
            "username": "ada"
        }))
        .unwrap();
        assert_eq!(user.elo, 0);
        assert!(!user.is_admin);
        assert!(user.profile_picture.is_none());
    }

    #[test]
    fn match_result_accepts_unknown_values() {
        let parsed: Vec<MatchResult> =
            serde_json::from_str(r#"["win","loss","draw","abandoned"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                MatchResult::Win,
                MatchResult::Loss,
                MatchResult::Draw,
                MatchResult::Unknown
            ]
        );
    }

    #[test]
    fn admin_update_omits_unset_fields() {
        let body = serde_json::to_value(AdminUpdateUser {
            elo: Some(1500),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "elo": 1500 }));
    }

    #[test]
    fn player_rank_outside_window() {
        let rank: PlayerRank = serde_json::from_value(serde_json::json!({
            "rank": null,
            "message": "Player not in top 1000"
        }))
        .unwrap();
        assert!(rank.rank.is_none());
        assert_eq!(rank.message.as_deref(), Some("Player not in top 1000"));
    }
}
