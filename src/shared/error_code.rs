//! Usage: Centralized client error-code enum for stable classification/mapping.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    HttpTransport,
    HttpTimeout,
    AuthUnauthorized,
    AuthReloginRequired,
    AuthRejectedAfterRefresh,
    AuthUnsupported,
    Api4xx,
    Api5xx,
    ApiUnexpectedStatus,
    ApiDecodeError,
    InvalidInput,
    Storage,
    System,
    Internal,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HttpTransport => "HTTP_TRANSPORT",
            Self::HttpTimeout => "HTTP_TIMEOUT",
            Self::AuthUnauthorized => "AUTH_UNAUTHORIZED",
            Self::AuthReloginRequired => "AUTH_RELOGIN_REQUIRED",
            Self::AuthRejectedAfterRefresh => "AUTH_REJECTED_AFTER_REFRESH",
            Self::AuthUnsupported => "AUTH_UNSUPPORTED",
            Self::Api4xx => "API_4XX",
            Self::Api5xx => "API_5XX",
            Self::ApiUnexpectedStatus => "API_UNEXPECTED_STATUS",
            Self::ApiDecodeError => "API_DECODE_ERROR",
            Self::InvalidInput => "SEC_INVALID_INPUT",
            Self::Storage => "STORAGE_ERROR",
            Self::System => "SYSTEM_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(value: &str) -> Option<Self> {
        Some(match value {
            "HTTP_TRANSPORT" => Self::HttpTransport,
            "HTTP_TIMEOUT" => Self::HttpTimeout,
            "AUTH_UNAUTHORIZED" => Self::AuthUnauthorized,
            "AUTH_RELOGIN_REQUIRED" => Self::AuthReloginRequired,
            "AUTH_REJECTED_AFTER_REFRESH" => Self::AuthRejectedAfterRefresh,
            "AUTH_UNSUPPORTED" => Self::AuthUnsupported,
            "API_4XX" => Self::Api4xx,
            "API_5XX" => Self::Api5xx,
            "API_UNEXPECTED_STATUS" => Self::ApiUnexpectedStatus,
            "API_DECODE_ERROR" => Self::ApiDecodeError,
            "SEC_INVALID_INPUT" => Self::InvalidInput,
            "STORAGE_ERROR" => Self::Storage,
            "SYSTEM_ERROR" => Self::System,
            "INTERNAL_ERROR" => Self::Internal,
            _ => return None,
        })
    }

    /// Classify a non-success HTTP status that is not handled by the refresh path.
    pub const fn for_status(status: u16) -> Self {
        match status {
            401 => Self::AuthUnauthorized,
            400..=499 => Self::Api4xx,
            500..=599 => Self::Api5xx,
            _ => Self::ApiUnexpectedStatus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;

    const ALL: &[ErrorCode] = &[
        ErrorCode::HttpTransport,
        ErrorCode::HttpTimeout,
        ErrorCode::AuthUnauthorized,
        ErrorCode::AuthReloginRequired,
        ErrorCode::AuthRejectedAfterRefresh,
        ErrorCode::AuthUnsupported,
        ErrorCode::Api4xx,
        ErrorCode::Api5xx,
        ErrorCode::ApiUnexpectedStatus,
        ErrorCode::ApiDecodeError,
        ErrorCode::InvalidInput,
        ErrorCode::Storage,
        ErrorCode::System,
        ErrorCode::Internal,
    ];

    #[test]
    fn codes_round_trip_through_strings() {
        for code in ALL {
            assert_eq!(ErrorCode::from_str(code.as_str()), Some(*code));
        }
        assert_eq!(ErrorCode::from_str("GW_UNKNOWN"), None);
    }

    #[test]
    fn status_classification() {
        assert_eq!(ErrorCode::for_status(401), ErrorCode::AuthUnauthorized);
        assert_eq!(ErrorCode::for_status(404), ErrorCode::Api4xx);
        assert_eq!(ErrorCode::for_status(503), ErrorCode::Api5xx);
        assert_eq!(ErrorCode::for_status(302), ErrorCode::ApiUnexpectedStatus);
    }
}
