//! Usage: AWS Cognito user-pool identity over the `x-amz-json-1.1` JSON protocol.
//!
//! Covers `InitiateAuth` (USER_PASSWORD_AUTH / REFRESH_TOKEN_AUTH), `GetUser` and
//! `GlobalSignOut`. No request signing is needed for these public-client operations.

use super::provider_trait::{Credentials, IdentityProvider, LoginOutcome, ProviderFuture};
use crate::api::models::UserProfile;
use crate::shared::error::{AppError, AppResult};
use crate::shared::error_code::ErrorCode;
use crate::shared::security::sanitize_body_snippet;
use crate::storage::TokenSet;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

const TARGET_PREFIX: &str = "AWSCognitoIdentityProviderService";
const AMZ_JSON: &str = "application/x-amz-json-1.1";
const NOT_AUTHORIZED: &str = "NotAuthorizedException";

pub fn default_endpoint(region: &str) -> String {
    format!("https://cognito-idp.{}.amazonaws.com/", region.trim())
}

#[derive(Debug, Clone)]
pub struct CognitoIdentity {
    http: reqwest::Client,
    endpoint: String,
    client_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthResponse {
    #[serde(default)]
    authentication_result: Option<AuthenticationResult>,
    #[serde(default)]
    challenge_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResult {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetUserResponse {
    username: String,
    #[serde(default)]
    user_attributes: Vec<UserAttribute>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserAttribute {
    name: String,
    #[serde(default)]
    value: Option<String>,
}

/// Which operation failed, for mapping `NotAuthorizedException`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Login,
    Refresh,
    GetUser,
    SignOut,
}

impl CognitoIdentity {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            client_id: client_id.into(),
        }
    }

    async fn call(&self, operation: &str, kind: Call, payload: Value) -> AppResult<Value> {
        let target = format!("{TARGET_PREFIX}.{operation}");
        let target = HeaderValue::from_str(&target).map_err(|e| {
            AppError::from_code(ErrorCode::Internal, format!("invalid amz target header: {e}"))
        })?;

        let response = self
            .http
            .post(self.endpoint.trim())
            .header("X-Amz-Target", target)
            .header(CONTENT_TYPE, AMZ_JSON)
            .body(payload.to_string())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(service_error(status.as_u16(), &body, operation, kind));
        }
        if body.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&body).map_err(|e| {
            AppError::from_code(
                ErrorCode::ApiDecodeError,
                format!("{operation} response json invalid: {e}"),
            )
        })
    }

    async fn initiate_auth(
        &self,
        flow: &str,
        kind: Call,
        parameters: HashMap<&str, &str>,
    ) -> AppResult<AuthenticationResult> {
        let payload = json!({
            "AuthFlow": flow,
            "ClientId": self.client_id.trim(),
            "AuthParameters": parameters,
        });
        let raw = self.call("InitiateAuth", kind, payload).await?;
        let parsed: InitiateAuthResponse = serde_json::from_value(raw).map_err(|e| {
            AppError::from_code(
                ErrorCode::ApiDecodeError,
                format!("InitiateAuth response has unexpected shape: {e}"),
            )
        })?;

        if let Some(challenge) = parsed.challenge_name {
            return Err(AppError::from_code(
                ErrorCode::AuthUnsupported,
                format!("sign-in challenge {challenge} is not supported"),
            ));
        }
        parsed.authentication_result.ok_or_else(|| {
            AppError::from_code(
                ErrorCode::ApiDecodeError,
                "InitiateAuth returned no authentication result",
            )
        })
    }
}

fn token_set(result: AuthenticationResult) -> TokenSet {
    let now = crate::shared::time::now_unix_seconds();
    let expires_at = result
        .expires_in
        .filter(|v| *v > 0)
        .map(|v| now.saturating_add(v))
        .or_else(|| crate::shared::jwt::expires_at(&result.access_token));
    TokenSet {
        access_token: result.access_token,
        id_token: result.id_token.filter(|v| !v.trim().is_empty()),
        refresh_token: result.refresh_token.filter(|v| !v.trim().is_empty()),
        expires_at,
    }
}

/// `__type` may be namespaced: `com.amazonaws...#NotAuthorizedException`.
fn error_type(value: &Value) -> Option<&str> {
    value
        .get("__type")
        .and_then(Value::as_str)
        .map(|raw| raw.rsplit('#').next().unwrap_or(raw).trim())
        .filter(|v| !v.is_empty())
}

fn service_error(status: u16, body: &str, operation: &str, kind: Call) -> AppError {
    let value: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let error_type = error_type(&value).unwrap_or("UnknownError");
    let message = value
        .get("message")
        .or_else(|| value.get("Message"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{operation} failed: {}", sanitize_body_snippet(body)));

    match (error_type, kind) {
        (NOT_AUTHORIZED, Call::Refresh) => {
            AppError::from_code(ErrorCode::AuthReloginRequired, message).with_status(401)
        }
        // Expired/revoked access tokens surface as NotAuthorizedException with a 400.
        (NOT_AUTHORIZED, _) | ("UserNotFoundException", Call::Login) => {
            AppError::from_code(ErrorCode::AuthUnauthorized, message).with_status(401)
        }
        ("UserNotConfirmedException" | "PasswordResetRequiredException", _) => {
            AppError::from_code(ErrorCode::AuthUnsupported, format!("{error_type}: {message}"))
                .with_status(status)
        }
        _ => AppError::from_code(
            ErrorCode::for_status(status),
            format!("{error_type}: {message}"),
        )
        .with_status(status),
    }
}

fn profile_from_attributes(user: GetUserResponse) -> AppResult<UserProfile> {
    let attributes: HashMap<String, String> = user
        .user_attributes
        .into_iter()
        .filter_map(|attr| attr.value.map(|value| (attr.name, value)))
        .filter(|(_, value)| !value.trim().is_empty())
        .collect();

    let email = attributes
        .get("email")
        .cloned()
        .unwrap_or_else(|| user.username.clone());
    if email.trim().is_empty() {
        return Err(AppError::from_code(
            ErrorCode::ApiDecodeError,
            "GetUser returned a user without email or username",
        ));
    }

    let profile_picture = attributes
        .get("avatar")
        .or_else(|| attributes.get("picture"))
        .cloned()
        .unwrap_or_else(|| format!("https://picsum.photos/seed/{email}/200"));

    Ok(UserProfile {
        id: attributes
            .get("sub")
            .cloned()
            .unwrap_or_else(|| user.username.clone()),
        username: attributes
            .get("preferred_username")
            .cloned()
            .unwrap_or_else(|| user.username.clone()),
        email,
        profile_picture: Some(profile_picture),
        ..Default::default()
    })
}

impl IdentityProvider for CognitoIdentity {
    fn name(&self) -> &'static str {
        "cognito"
    }

    fn login<'a>(&'a self, credentials: &'a Credentials) -> ProviderFuture<'a, LoginOutcome> {
        Box::pin(async move {
            let parameters = HashMap::from([
                ("USERNAME", credentials.username.trim()),
                ("PASSWORD", credentials.password.as_str()),
            ]);
            let result = self
                .initiate_auth("USER_PASSWORD_AUTH", Call::Login, parameters)
                .await?;
            if result.id_token.is_none() || result.refresh_token.is_none() {
                return Err(AppError::from_code(
                    ErrorCode::ApiDecodeError,
                    "sign-in did not return the full token set",
                ));
            }
            Ok(LoginOutcome {
                tokens: token_set(result),
                user: None,
            })
        })
    }

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> ProviderFuture<'a, TokenSet> {
        Box::pin(async move {
            let parameters = HashMap::from([("REFRESH_TOKEN", refresh_token.trim())]);
            let result = self
                .initiate_auth("REFRESH_TOKEN_AUTH", Call::Refresh, parameters)
                .await?;
            Ok(token_set(result))
        })
    }

    fn fetch_user<'a>(&'a self, tokens: &'a TokenSet) -> ProviderFuture<'a, UserProfile> {
        Box::pin(async move {
            let raw = self
                .call(
                    "GetUser",
                    Call::GetUser,
                    json!({ "AccessToken": tokens.access_token }),
                )
                .await?;
            let user: GetUserResponse = serde_json::from_value(raw).map_err(|e| {
                AppError::from_code(
                    ErrorCode::ApiDecodeError,
                    format!("GetUser response has unexpected shape: {e}"),
                )
            })?;
            profile_from_attributes(user)
        })
    }

    fn sign_out<'a>(&'a self, tokens: &'a TokenSet) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.call(
                "GlobalSignOut",
                Call::SignOut,
                json!({ "AccessToken": tokens.access_token }),
            )
            .await?;
            Ok(())
        })
    }
}
