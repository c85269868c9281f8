//! Usage: Unified client error model (maps transport/auth/API failures to `CODE: message` strings).

use crate::shared::error_code::ErrorCode;
use std::sync::Arc;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct AppError {
    code: String,
    message: String,
    status: Option<u16>,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status: None,
            source: None,
        }
    }

    pub fn from_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code.as_str(), message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status of the response that produced this error, if any.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn kind(&self) -> Option<ErrorCode> {
        ErrorCode::from_str(&self.code)
    }

    /// The session is gone; the caller should send the user back to the login entry point.
    pub fn is_relogin_required(&self) -> bool {
        self.kind() == Some(ErrorCode::AuthReloginRequired)
    }

    /// The backend still answered 401 after a successful refresh and redispatch.
    pub fn is_rejected_after_refresh(&self) -> bool {
        self.kind() == Some(ErrorCode::AuthRejectedAfterRefresh)
    }

    pub fn is_transport(&self) -> bool {
        matches!(
            self.kind(),
            Some(ErrorCode::HttpTransport) | Some(ErrorCode::HttpTimeout)
        )
    }
}

fn split_code_message(raw: &str) -> Option<(&str, &str)> {
    let msg = raw.trim();
    let msg = msg.strip_prefix("Error:").unwrap_or(msg).trim();
    if msg.is_empty() {
        return None;
    }

    let (maybe_code, rest) = msg.split_once(':')?;
    let code = maybe_code.trim();
    if code.is_empty() {
        return None;
    }
    let mut chars = code.chars();
    let first = chars.next()?;
    if !first.is_ascii_uppercase() {
        return None;
    }
    if !chars.all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_') {
        return None;
    }
    Some((code, rest.trim()))
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        if let Some((code, rest)) = split_code_message(&value) {
            let message = if rest.is_empty() { value.trim() } else { rest };
            return AppError::new(code.to_string(), message.to_string());
        }
        AppError::from_code(ErrorCode::Internal, value)
    }
}

impl From<&'static str> for AppError {
    fn from(value: &'static str) -> Self {
        AppError::from(value.to_string())
    }
}

impl From<AppError> for String {
    fn from(value: AppError) -> Self {
        value.to_string()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(value: reqwest::Error) -> Self {
        let code = if value.is_timeout() {
            ErrorCode::HttpTimeout
        } else {
            ErrorCode::HttpTransport
        };
        let status = value.status().map(|s| s.as_u16());
        let mut err = AppError::from_code(code, format!("request failed: {value}"));
        err.status = status;
        err.with_source(value)
    }
}
