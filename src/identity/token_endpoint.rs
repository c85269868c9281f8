//! Usage: OAuth2 token endpoint identity (password + refresh_token grants, optional userinfo).

use super::provider_trait::{Credentials, IdentityProvider, LoginOutcome, ProviderFuture};
use crate::api::models::UserProfile;
use crate::session::{decode_json, ensure_success};
use crate::shared::error::{AppError, AppResult};
use crate::shared::error_code::ErrorCode;
use crate::shared::jwt;
use crate::shared::security::sanitize_body_snippet;
use crate::storage::TokenSet;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct TokenEndpointConfig {
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub userinfo_uri: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TokenEndpointIdentity {
    http: reqwest::Client,
    config: TokenEndpointConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    Password,
    RefreshToken,
}

impl TokenEndpointIdentity {
    pub fn new(http: reqwest::Client, config: TokenEndpointConfig) -> Self {
        Self { http, config }
    }

    fn base_form(&self, grant_type: &str) -> HashMap<&'static str, String> {
        let mut form: HashMap<&'static str, String> = HashMap::new();
        form.insert("grant_type", grant_type.to_string());
        form.insert("client_id", self.config.client_id.trim().to_string());
        if let Some(secret) = self.config.client_secret.as_deref().map(str::trim) {
            if !secret.is_empty() {
                form.insert("client_secret", secret.to_string());
            }
        }
        form
    }

    async fn post_form(
        &self,
        grant: Grant,
        form: &HashMap<&'static str, String>,
    ) -> AppResult<TokenSet> {
        let response = self
            .http
            .post(self.config.token_uri.trim())
            .form(form)
            .send()
            .await?;
        parse_token_response(response, grant).await
    }
}

impl IdentityProvider for TokenEndpointIdentity {
    fn name(&self) -> &'static str {
        "token_endpoint"
    }

    fn login<'a>(&'a self, credentials: &'a Credentials) -> ProviderFuture<'a, LoginOutcome> {
        Box::pin(async move {
            let mut form = self.base_form("password");
            form.insert("username", credentials.username.trim().to_string());
            form.insert("password", credentials.password.clone());
            if let Some(scope) = self.config.scope.as_deref().map(str::trim) {
                if !scope.is_empty() {
                    form.insert("scope", scope.to_string());
                }
            }
            let tokens = self.post_form(Grant::Password, &form).await?;
            Ok(LoginOutcome { tokens, user: None })
        })
    }

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> ProviderFuture<'a, TokenSet> {
        Box::pin(async move {
            let mut form = self.base_form("refresh_token");
            form.insert("refresh_token", refresh_token.trim().to_string());
            self.post_form(Grant::RefreshToken, &form).await
        })
    }

    fn fetch_user<'a>(&'a self, tokens: &'a TokenSet) -> ProviderFuture<'a, UserProfile> {
        Box::pin(async move {
            match self.config.userinfo_uri.as_deref().map(str::trim) {
                Some(uri) if !uri.is_empty() => {
                    let response = self
                        .http
                        .get(uri)
                        .bearer_auth(&tokens.access_token)
                        .send()
                        .await?;
                    let claims: Value = decode_json(ensure_success(response).await?).await?;
                    profile_from_claims(|name| {
                        claims.get(name).and_then(Value::as_str).map(str::to_string)
                    })
                }
                _ => {
                    let id_token = tokens.id_token.as_deref().ok_or_else(|| {
                        AppError::from_code(
                            ErrorCode::AuthUnsupported,
                            "token endpoint has no userinfo_uri and no id_token was issued",
                        )
                    })?;
                    profile_from_claims(|name| jwt::claim_str(id_token, name))
                }
            }
        })
    }
}

fn profile_from_claims(claim: impl Fn(&str) -> Option<String>) -> AppResult<UserProfile> {
    let subject = claim("sub").filter(|v| !v.trim().is_empty());
    let email = claim("email").filter(|v| !v.trim().is_empty());
    let Some(id) = subject.clone().or_else(|| email.clone()) else {
        return Err(AppError::from_code(
            ErrorCode::ApiDecodeError,
            "identity claims carry neither sub nor email",
        ));
    };
    let email = email.unwrap_or_else(|| id.clone());
    let username = claim("preferred_username")
        .or_else(|| claim("name"))
        .unwrap_or_else(|| email.clone());
    Ok(UserProfile {
        id,
        email,
        username,
        profile_picture: claim("picture"),
        ..Default::default()
    })
}

async fn parse_token_response(response: reqwest::Response, grant: Grant) -> AppResult<TokenSet> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(token_error(status.as_u16(), &body, grant));
    }

    let value: Value = serde_json::from_str(&body).map_err(|e| {
        AppError::from_code(
            ErrorCode::ApiDecodeError,
            format!("token response json invalid: {e}"),
        )
    })?;

    let access_token = non_empty_str(&value, "access_token").ok_or_else(|| {
        AppError::from_code(
            ErrorCode::ApiDecodeError,
            "token response missing access_token",
        )
    })?;

    let now = crate::shared::time::now_unix_seconds();
    let expires_at = value
        .get("expires_in")
        .and_then(parse_i64_lossy)
        .filter(|v| *v > 0)
        .map(|v| now.saturating_add(v))
        .or_else(|| jwt::expires_at(&access_token));

    Ok(TokenSet {
        access_token,
        id_token: non_empty_str(&value, "id_token"),
        refresh_token: non_empty_str(&value, "refresh_token"),
        expires_at,
    })
}

fn token_error(status: u16, body: &str, grant: Grant) -> AppError {
    let (error_code, error_message) = parse_oauth_error_details(body);

    if grant == Grant::RefreshToken
        && (is_refresh_token_reused_error(error_code.as_deref(), error_message.as_deref())
            || error_code.as_deref() == Some("invalid_grant"))
    {
        return AppError::from_code(
            ErrorCode::AuthReloginRequired,
            error_message.unwrap_or_else(|| "refresh token is no longer valid".to_string()),
        )
        .with_status(status);
    }
    if grant == Grant::Password && error_code.as_deref() == Some("invalid_grant") {
        return AppError::from_code(
            ErrorCode::AuthUnauthorized,
            error_message.unwrap_or_else(|| "invalid credentials".to_string()),
        )
        .with_status(status);
    }

    let mut msg = format!("token endpoint returned status={status}");
    if let Some(code) = error_code {
        msg.push_str(" code=");
        msg.push_str(code.as_str());
    }
    if let Some(detail) = error_message {
        msg.push_str(" message=");
        msg.push_str(detail.chars().take(240).collect::<String>().as_str());
    }
    msg.push_str(" body=");
    msg.push_str(sanitize_body_snippet(body).as_str());
    AppError::from_code(ErrorCode::for_status(status), msg).with_status(status)
}

fn non_empty_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_i64_lossy(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn parse_oauth_error_details(body: &str) -> (Option<String>, Option<String>) {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return (None, None),
    };

    let mut code = non_empty_str(&value, "code");
    let mut message = non_empty_str(&value, "error_description");

    if let Some(error_value) = value.get("error") {
        if let Some(err_str) = error_value.as_str() {
            if code.is_none() {
                code = Some(err_str.trim().to_string());
            }
        } else if let Some(err_obj) = error_value.as_object() {
            if code.is_none() {
                code = err_obj
                    .get("code")
                    .and_then(Value::as_str)
                    .or_else(|| err_obj.get("type").and_then(Value::as_str))
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string);
            }
            if message.is_none() {
                message = err_obj
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string);
            }
        }
    }

    (code, message)
}

fn is_refresh_token_reused_error(code: Option<&str>, message: Option<&str>) -> bool {
    let code_hit = code
        .map(str::trim)
        .is_some_and(|v| v.eq_ignore_ascii_case("refresh_token_reused"));
    if code_hit {
        return true;
    }
    message
        .map(str::to_ascii_lowercase)
        .is_some_and(|v| v.contains("refresh token has already been used"))
}
