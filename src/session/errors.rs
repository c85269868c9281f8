//! Usage: Map non-2xx backend responses to `AppError` (status-classified, body message extracted).

use crate::shared::error::{AppError, AppResult};
use crate::shared::error_code::ErrorCode;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

const MAX_ERROR_MESSAGE_CHARS: usize = 240;

fn truncate_message(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= MAX_ERROR_MESSAGE_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_ERROR_MESSAGE_CHARS).collect();
    out.push_str("...");
    out
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Message carried by an application error body, when there is one.
///
/// Looks at `error` (a string, or an object with `message`), then `message`, then
/// `error_description`.
pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body.trim()).ok()?;
    let obj = value.as_object()?;

    let from_error = match obj.get("error") {
        Some(Value::String(text)) => Some(text.trim()).filter(|v| !v.is_empty()),
        Some(Value::Object(nested)) => non_empty_str(nested.get("message")),
        _ => None,
    };

    from_error
        .or_else(|| non_empty_str(obj.get("message")))
        .or_else(|| non_empty_str(obj.get("error_description")))
        .map(truncate_message)
}

pub(crate) fn error_from_body(status: StatusCode, body: &str) -> AppError {
    let code = status.as_u16();
    let message = extract_error_message(body)
        .unwrap_or_else(|| format!("request failed with status {code}"));
    AppError::from_code(ErrorCode::for_status(code), message).with_status(code)
}

/// Passes 2xx responses through; any other status becomes an `AppError`.
pub(crate) async fn ensure_success(response: reqwest::Response) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = read_error_body(response).await;
    Err(error_from_body(status, &body))
}

/// Body of an error response; a failed read yields an empty body.
pub(crate) async fn read_error_body(response: reqwest::Response) -> String {
    let status = response.status().as_u16();
    match response.text().await {
        Ok(body) => body,
        Err(err) => {
            tracing::debug!(status = status, "failed to read error response body: {}", err);
            String::new()
        }
    }
}

pub(crate) async fn decode_json<T: DeserializeOwned>(response: reqwest::Response) -> AppResult<T> {
    let status = response.status().as_u16();
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| {
        AppError::from_code(
            ErrorCode::ApiDecodeError,
            format!("failed to decode response body: {e}"),
        )
        .with_status(status)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_backend_error_string() {
        assert_eq!(
            extract_error_message(r#"{"error":"Invalid credentials"}"#).as_deref(),
            Some("Invalid credentials")
        );
    }

    #[test]
    fn extracts_nested_error_message() {
        assert_eq!(
            extract_error_message(r#"{"error":{"code":"x","message":"nested"}}"#).as_deref(),
            Some("nested")
        );
    }

    #[test]
    fn falls_back_to_message_then_description() {
        assert_eq!(
            extract_error_message(r#"{"message":"top level"}"#).as_deref(),
            Some("top level")
        );
        assert_eq!(
            extract_error_message(r#"{"error":"","error_description":"described"}"#).as_deref(),
            Some("described")
        );
    }

    #[test]
    fn non_json_body_uses_generic_message() {
        let err = error_from_body(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        assert_eq!(err.kind(), Some(ErrorCode::Api5xx));
        assert_eq!(err.status(), Some(502));
        assert_eq!(err.message(), "request failed with status 502");
    }

    #[test]
    fn status_is_classified() {
        let err = error_from_body(StatusCode::NOT_FOUND, r#"{"error":"User not found"}"#);
        assert_eq!(err.kind(), Some(ErrorCode::Api4xx));
        assert_eq!(err.to_string(), "API_4XX: User not found");

        let err = error_from_body(StatusCode::UNAUTHORIZED, "");
        assert_eq!(err.kind(), Some(ErrorCode::AuthUnauthorized));
    }

    #[tokio::test]
    async fn unreadable_error_body_falls_back_to_generic_message() {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 512];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            // Promise more body than is sent, then hang up.
            stream
                .write_all(
                    b"HTTP/1.1 500 Internal Server Error\r\n\
                      content-type: application/json\r\n\
                      content-length: 64\r\n\r\n\
                      {\"error\":\"cut",
                )
                .unwrap();
        });

        let response = reqwest::get(format!("http://{addr}/")).await.unwrap();
        server.join().unwrap();

        let err = ensure_success(response).await.expect_err("500");
        assert_eq!(err.kind(), Some(ErrorCode::Api5xx));
        assert_eq!(err.message(), "request failed with status 500");
    }

    #[test]
    fn long_messages_are_truncated() {
        let body = serde_json::json!({ "error": "x".repeat(1000) }).to_string();
        let message = extract_error_message(&body).unwrap();
        assert!(message.ends_with("..."));
        assert_eq!(message.chars().count(), MAX_ERROR_MESSAGE_CHARS + 3);
    }
}
