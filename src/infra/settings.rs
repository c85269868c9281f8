//! Usage: Client settings (schema + load/sanitize/validate helpers, API URL resolution).

use crate::session::AuthorizationToken;
use crate::shared::error::{AppError, AppResult};
use crate::shared::error_code::ErrorCode;
use crate::shared::mutex_ext::RwLockExt;
use crate::storage::{FileStorage, MemoryStorage, TokenKeys, TokenStorage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

pub const API_URL_ENV: &str = "LEADERBOARD_API_URL";
pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_API_BASE_PATH: &str = "/api";
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u32 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u32 = 10;
const MAX_TIMEOUT_SECONDS: u32 = 300;
const DEFAULT_LOG_LEVEL: &str = "info";
const USER_AGENT: &str = concat!("leaderboard-session/", env!("CARGO_PKG_VERSION"));

static API_URL_OVERRIDE: OnceLock<RwLock<Option<String>>> = OnceLock::new();

fn api_url_override() -> &'static RwLock<Option<String>> {
    API_URL_OVERRIDE.get_or_init(|| RwLock::new(None))
}

/// Runtime override that wins over the environment and the settings file.
pub fn set_api_url(url: &str) -> AppResult<()> {
    let url = normalize_url(url).ok_or_else(|| {
        AppError::from_code(ErrorCode::InvalidInput, "api_url override is empty")
    })?;
    validate_http_url("api_url", &url)?;
    *api_url_override().write_or_recover() = Some(url);
    Ok(())
}

pub fn clear_api_url_override() {
    *api_url_override().write_or_recover() = None;
}

/// Storage key layout preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKeyPreset {
    #[default]
    Rest,
    IdentityProvider,
}

impl TokenKeyPreset {
    pub fn keys(self) -> TokenKeys {
        match self {
            Self::Rest => TokenKeys::rest(),
            Self::IdentityProvider => TokenKeys::identity_provider(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentitySettings {
    #[default]
    Backend,
    Cognito {
        region: String,
        client_id: String,
        #[serde(default)]
        endpoint: Option<String>,
    },
    TokenEndpoint {
        token_uri: String,
        client_id: String,
        #[serde(default)]
        client_secret: Option<String>,
        #[serde(default)]
        userinfo_uri: Option<String>,
        #[serde(default)]
        scope: Option<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageSettings {
    #[default]
    Memory,
    File {
        path: PathBuf,
    },
}

impl StorageSettings {
    pub fn open(&self) -> Arc<dyn TokenStorage> {
        match self {
            Self::Memory => Arc::new(MemoryStorage::new()),
            Self::File { path } => Arc::new(FileStorage::new(path.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Daily-rolling log files go here when set.
    pub directory: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub api_url: Option<String>,
    pub api_base_path: String,
    pub token_keys: TokenKeyPreset,
    pub authorization_token: AuthorizationToken,
    pub identity: IdentitySettings,
    pub request_timeout_seconds: u32,
    pub connect_timeout_seconds: u32,
    pub storage: StorageSettings,
    pub log: LogSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_url: None,
            api_base_path: DEFAULT_API_BASE_PATH.to_string(),
            token_keys: TokenKeyPreset::default(),
            authorization_token: AuthorizationToken::default(),
            identity: IdentitySettings::default(),
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            connect_timeout_seconds: DEFAULT_CONNECT_TIMEOUT_SECONDS,
            storage: StorageSettings::default(),
            log: LogSettings::default(),
        }
    }
}

impl ClientSettings {
    /// Override, then `LEADERBOARD_API_URL`, then the file value, then the default.
    pub fn resolved_api_url(&self) -> String {
        if let Some(url) = api_url_override().read_or_recover().clone() {
            return url;
        }
        if let Some(url) = std::env::var(API_URL_ENV)
            .ok()
            .as_deref()
            .and_then(normalize_url)
        {
            return url;
        }
        self.api_url
            .as_deref()
            .and_then(normalize_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// Resolved API URL joined with the base path, e.g. `http://localhost:8080/api`.
    pub fn api_root(&self) -> String {
        format!("{}{}", self.resolved_api_url(), self.api_base_path)
    }

    pub fn http_client(&self) -> AppResult<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(u64::from(self.request_timeout_seconds)))
            .connect_timeout(Duration::from_secs(u64::from(self.connect_timeout_seconds)))
            .build()
            .map_err(|e| {
                AppError::from_code(
                    ErrorCode::System,
                    format!("failed to build http client: {e}"),
                )
                .with_source(e)
            })
    }
}

fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn validate_http_url(field: &str, raw: &str) -> AppResult<()> {
    let url = reqwest::Url::parse(raw).map_err(|e| {
        AppError::from_code(
            ErrorCode::InvalidInput,
            format!("{field} is not a valid url ({raw}): {e}"),
        )
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::from_code(
            ErrorCode::InvalidInput,
            format!("{field} must use http or https: {raw}"),
        ));
    }
    Ok(())
}

fn require_non_empty(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::from_code(
            ErrorCode::InvalidInput,
            format!("{field} is required"),
        ));
    }
    Ok(())
}

fn sanitize_timeout(value: &mut u32, default: u32) -> bool {
    if *value == 0 {
        *value = default;
        return true;
    }
    if *value > MAX_TIMEOUT_SECONDS {
        *value = MAX_TIMEOUT_SECONDS;
        return true;
    }
    false
}

fn sanitize_timeouts(settings: &mut ClientSettings) -> bool {
    let request = sanitize_timeout(
        &mut settings.request_timeout_seconds,
        DEFAULT_REQUEST_TIMEOUT_SECONDS,
    );
    let connect = sanitize_timeout(
        &mut settings.connect_timeout_seconds,
        DEFAULT_CONNECT_TIMEOUT_SECONDS,
    );
    request || connect
}

fn sanitize_urls(settings: &mut ClientSettings) -> bool {
    let mut changed = false;

    let api_url = settings.api_url.as_deref().and_then(normalize_url);
    if api_url != settings.api_url {
        settings.api_url = api_url;
        changed = true;
    }

    let trimmed = settings.api_base_path.trim().trim_matches('/');
    let base_path = if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    };
    if base_path != settings.api_base_path {
        settings.api_base_path = base_path;
        changed = true;
    }

    changed
}

fn sanitize_log_level(settings: &mut ClientSettings) -> bool {
    if settings.log.level.trim().is_empty() {
        settings.log.level = DEFAULT_LOG_LEVEL.to_string();
        return true;
    }
    false
}

/// Normalizes values in place; returns whether anything changed.
pub fn sanitize(settings: &mut ClientSettings) -> bool {
    let timeouts = sanitize_timeouts(settings);
    let urls = sanitize_urls(settings);
    let log = sanitize_log_level(settings);
    timeouts || urls || log
}

pub fn validate(settings: &ClientSettings) -> AppResult<()> {
    validate_http_url("api_url", &settings.resolved_api_url())?;

    match &settings.identity {
        IdentitySettings::Backend => {}
        IdentitySettings::Cognito {
            region,
            client_id,
            endpoint,
        } => {
            require_non_empty("identity.region", region)?;
            require_non_empty("identity.client_id", client_id)?;
            if let Some(endpoint) = endpoint.as_deref().filter(|v| !v.trim().is_empty()) {
                validate_http_url("identity.endpoint", endpoint.trim())?;
            }
        }
        IdentitySettings::TokenEndpoint {
            token_uri,
            client_id,
            userinfo_uri,
            ..
        } => {
            require_non_empty("identity.client_id", client_id)?;
            validate_http_url("identity.token_uri", token_uri.trim())?;
            if let Some(uri) = userinfo_uri.as_deref().filter(|v| !v.trim().is_empty()) {
                validate_http_url("identity.userinfo_uri", uri.trim())?;
            }
        }
    }

    if let StorageSettings::File { path } = &settings.storage {
        if path.as_os_str().is_empty() {
            return Err(AppError::from_code(
                ErrorCode::InvalidInput,
                "storage.path is required for file storage",
            ));
        }
    }

    Ok(())
}

fn parse_error(format: &str, e: impl std::fmt::Display) -> AppError {
    AppError::from_code(
        ErrorCode::InvalidInput,
        format!("failed to parse {format} settings: {e}"),
    )
}

pub fn parse_json(content: &str) -> AppResult<ClientSettings> {
    finish(serde_json::from_str(content).map_err(|e| parse_error("json", e))?)
}

pub fn parse_toml(content: &str) -> AppResult<ClientSettings> {
    finish(toml::from_str(content).map_err(|e| parse_error("toml", e))?)
}

fn finish(mut settings: ClientSettings) -> AppResult<ClientSettings> {
    if sanitize(&mut settings) {
        tracing::debug!("client settings normalized on load");
    }
    validate(&settings)?;
    Ok(settings)
}

/// Reads `.toml` or `.json` settings; a missing file yields the defaults.
pub fn load(path: &Path) -> AppResult<ClientSettings> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "settings file not found; using defaults");
        return finish(ClientSettings::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        AppError::from_code(
            ErrorCode::System,
            format!("failed to read settings {}: {e}", path.display()),
        )
    })?;

    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        parse_toml(&content)
    } else {
        parse_json(&content)
    }
}
