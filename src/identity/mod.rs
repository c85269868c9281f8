//! Usage: Identity providers (who issues and refreshes session tokens).

mod backend;
mod cognito;
mod provider_trait;
mod token_endpoint;

pub use backend::BackendIdentity;
pub use cognito::{default_endpoint as cognito_default_endpoint, CognitoIdentity};
pub use provider_trait::{Credentials, IdentityProvider, LoginOutcome, ProviderFuture};
pub use token_endpoint::{TokenEndpointConfig, TokenEndpointIdentity};

use crate::infra::settings::{ClientSettings, IdentitySettings};
use crate::shared::error::AppResult;
use std::sync::Arc;

pub fn build_identity(
    settings: &ClientSettings,
    http: reqwest::Client,
) -> AppResult<Arc<dyn IdentityProvider>> {
    let provider: Arc<dyn IdentityProvider> = match &settings.identity {
        IdentitySettings::Backend => Arc::new(BackendIdentity::new(http, settings.api_root())),
        IdentitySettings::Cognito {
            region,
            client_id,
            endpoint,
        } => {
            let endpoint = endpoint
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| cognito::default_endpoint(region));
            Arc::new(CognitoIdentity::new(http, endpoint, client_id.trim()))
        }
        IdentitySettings::TokenEndpoint {
            token_uri,
            client_id,
            client_secret,
            userinfo_uri,
            scope,
        } => Arc::new(TokenEndpointIdentity::new(
            http,
            TokenEndpointConfig {
                token_uri: token_uri.trim().to_string(),
                client_id: client_id.trim().to_string(),
                client_secret: client_secret.clone(),
                userinfo_uri: userinfo_uri.clone(),
                scope: scope.clone(),
            },
        )),
    };
    tracing::debug!(identity = provider.name(), "identity provider selected");
    Ok(provider)
}
