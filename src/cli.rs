//! Usage: `leaderboard-cli` argument parsing and command dispatch.

use crate::api;
use crate::api::models::RegisterRequest;
use crate::identity::Credentials;
use crate::infra::logging;
use crate::infra::settings::{self, ClientSettings, StorageSettings};
use crate::session::{AuthSession, UnrecoverableAuthCallback};
use crate::shared::error::{AppError, AppResult};
use crate::shared::error_code::ErrorCode;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_STORAGE_FILE: &str = ".leaderboard-session.json";

/// Leaderboard API client
#[derive(Debug, Parser)]
#[command(name = "leaderboard-cli", version, about, long_about = None)]
pub struct Cli {
    /// Settings file (`.toml` or `.json`); defaults apply when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Token file used when the settings keep tokens in memory
    #[arg(long, default_value = DEFAULT_STORAGE_FILE)]
    pub storage_file: PathBuf,

    /// API URL override (wins over LEADERBOARD_API_URL and the settings file)
    #[arg(long)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Log in and persist the session
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Create an account and persist the session
    Register {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    /// Show the logged-in user
    Me,
    /// Show one leaderboard page
    Leaderboard {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Show the top players
    Top,
    /// Show your match history
    History {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// End the session and forget stored tokens
    Logout,
    /// Exchange the refresh token for new tokens
    Refresh,
    /// Show local session state without calling the API
    Status,
}

impl Cli {
    pub async fn execute(&self) -> AppResult<()> {
        let settings = self.settings()?;
        let _log_guard = logging::init(&settings.log);

        let on_unrecoverable: UnrecoverableAuthCallback = Arc::new(|err: &AppError| {
            tracing::warn!("session ended: {}", err);
        });
        let session = AuthSession::from_settings(&settings, Some(on_unrecoverable))?;
        self.dispatch(&session).await
    }

    fn settings(&self) -> AppResult<ClientSettings> {
        let mut loaded = match self.config.as_deref() {
            Some(path) => settings::load(path)?,
            None => ClientSettings::default(),
        };
        if let Some(url) = self.api_url.as_deref() {
            settings::set_api_url(url)?;
        }
        if loaded.storage == StorageSettings::Memory {
            loaded.storage = StorageSettings::File {
                path: self.storage_file.clone(),
            };
        }
        Ok(loaded)
    }

    async fn dispatch(&self, session: &AuthSession) -> AppResult<()> {
        match &self.command {
            Commands::Login { email, password } => {
                let user = session.login(&Credentials::new(email, password)).await?;
                print_json(&user)
            }
            Commands::Register {
                email,
                username,
                password,
            } => {
                let user = session
                    .register(&RegisterRequest {
                        email: email.clone(),
                        username: username.clone(),
                        password: password.clone(),
                    })
                    .await?;
                print_json(&user)
            }
            Commands::Me => print_json(&session.current_user().await?),
            Commands::Leaderboard { page, limit } => {
                print_json(&api::leaderboard::get_leaderboard(session, *page, *limit).await?)
            }
            Commands::Top => print_json(&api::leaderboard::get_top_players(session).await?),
            Commands::History { page, limit } => {
                print_json(&api::games::match_history(session, *page, *limit).await?)
            }
            Commands::Logout => {
                session.logout().await?;
                println!("logged out");
                Ok(())
            }
            Commands::Refresh => {
                session.refresh().await?;
                print_json(&session.snapshot()?)
            }
            Commands::Status => print_json(&session.snapshot()?),
        }
    }
}

/// Hint shown after a failure that only a new login can fix.
pub fn login_hint(err: &AppError) -> Option<&'static str> {
    match err.kind() {
        Some(ErrorCode::AuthReloginRequired) | Some(ErrorCode::AuthRejectedAfterRefresh) => {
            Some("Your session has ended; please log in again with `leaderboard-cli login`.")
        }
        Some(ErrorCode::AuthUnauthorized) if err.message() == "not logged in" => {
            Some("Please log in first with `leaderboard-cli login`.")
        }
        _ => None,
    }
}

fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| {
        AppError::from_code(ErrorCode::Internal, format!("failed to render output: {e}"))
    })?;
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_paging_defaults() {
        let cli = Cli::parse_from(["leaderboard-cli", "leaderboard"]);
        match cli.command {
            Commands::Leaderboard { page, limit } => assert_eq!((page, limit), (1, 10)),
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.storage_file, PathBuf::from(DEFAULT_STORAGE_FILE));
        assert!(cli.config.is_none());
    }

    #[test]
    fn memory_storage_is_swapped_for_the_token_file() {
        let cli = Cli::parse_from([
            "leaderboard-cli",
            "--storage-file",
            "/tmp/tokens.json",
            "status",
        ]);
        let settings = cli.settings().unwrap();
        assert_eq!(
            settings.storage,
            StorageSettings::File {
                path: PathBuf::from("/tmp/tokens.json")
            }
        );
    }

    #[test]
    fn hint_only_for_session_failures() {
        let relogin = AppError::from_code(ErrorCode::AuthReloginRequired, "refresh rejected");
        assert!(login_hint(&relogin).is_some());

        let anonymous = AppError::from_code(ErrorCode::AuthUnauthorized, "not logged in");
        assert!(login_hint(&anonymous).is_some());

        let bad_password = AppError::from_code(ErrorCode::AuthUnauthorized, "Invalid credentials");
        assert!(login_hint(&bad_password).is_none());

        let server = AppError::from_code(ErrorCode::Api5xx, "boom");
        assert!(login_hint(&server).is_none());
    }
}
