use super::TokenStorage;
use crate::api::models::UserProfile;
use crate::shared::error::{AppError, AppResult};
use crate::shared::error_code::ErrorCode;
use crate::shared::security::{mask_optional, mask_token};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Storage key names for one session layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenKeys {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<String>,
}

impl TokenKeys {
    /// Backend-issued bearer token plus the cached profile (`auth_token` / `user`).
    pub fn rest() -> Self {
        Self {
            access_token: "auth_token".to_string(),
            id_token: None,
            refresh_token: None,
            user: Some("user".to_string()),
        }
    }

    /// Identity-provider token triple (`id_token` / `access_token` / `refresh_token`).
    pub fn identity_provider() -> Self {
        Self {
            access_token: "access_token".to_string(),
            id_token: Some("id_token".to_string()),
            refresh_token: Some("refresh_token".to_string()),
            user: None,
        }
    }

    fn all(&self) -> Vec<&str> {
        let mut keys = vec![self.access_token.as_str()];
        keys.extend(self.id_token.as_deref());
        keys.extend(self.refresh_token.as_deref());
        keys.extend(self.user.as_deref());
        keys
    }
}

impl Default for TokenKeys {
    fn default() -> Self {
        Self::rest()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
}

impl TokenSet {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        let access_token = access_token.into();
        let expires_at = crate::shared::jwt::expires_at(&access_token);
        Self {
            access_token,
            id_token: None,
            refresh_token: None,
            expires_at,
        }
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &mask_token(&self.access_token))
            .field("id_token", &mask_optional(self.id_token.as_deref()))
            .field("refresh_token", &mask_optional(self.refresh_token.as_deref()))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Session-shaped view over a `TokenStorage`.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn TokenStorage>,
    keys: TokenKeys,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn TokenStorage>, keys: TokenKeys) -> Self {
        Self { storage, keys }
    }

    pub fn keys(&self) -> &TokenKeys {
        &self.keys
    }

    pub fn access_token(&self) -> AppResult<Option<String>> {
        Ok(non_empty(self.storage.get_item(&self.keys.access_token)?))
    }

    pub fn id_token(&self) -> AppResult<Option<String>> {
        match self.keys.id_token.as_deref() {
            Some(key) => Ok(non_empty(self.storage.get_item(key)?)),
            None => Ok(None),
        }
    }

    pub fn refresh_token(&self) -> AppResult<Option<String>> {
        match self.keys.refresh_token.as_deref() {
            Some(key) => Ok(non_empty(self.storage.get_item(key)?)),
            None => Ok(None),
        }
    }

    /// Current token set, or `None` when no access token is stored.
    pub fn load(&self) -> AppResult<Option<TokenSet>> {
        let Some(access_token) = self.access_token()? else {
            return Ok(None);
        };
        let expires_at = crate::shared::jwt::expires_at(&access_token);
        Ok(Some(TokenSet {
            access_token,
            id_token: self.id_token()?,
            refresh_token: self.refresh_token()?,
            expires_at,
        }))
    }

    /// Writes the new set in one storage call. A refresh token the provider did not return
    /// is left as stored (it was not rotated); a missing id token is removed.
    pub fn replace(&self, tokens: &TokenSet) -> AppResult<()> {
        let access_token = tokens.access_token.trim();
        if access_token.is_empty() {
            return Err(AppError::from_code(
                ErrorCode::InvalidInput,
                "refusing to store an empty access token",
            ));
        }

        let mut items: Vec<(&str, &str)> = vec![(self.keys.access_token.as_str(), access_token)];
        let mut removed: Vec<&str> = Vec::new();
        if let Some(key) = self.keys.id_token.as_deref() {
            match non_blank(tokens.id_token.as_deref()) {
                Some(value) => items.push((key, value)),
                None => removed.push(key),
            }
        }
        if let (Some(key), Some(value)) = (
            self.keys.refresh_token.as_deref(),
            non_blank(tokens.refresh_token.as_deref()),
        ) {
            items.push((key, value));
        }
        self.storage.update_items(&items, &removed)
    }

    /// Removes every key of the layout, cached user included.
    pub fn clear(&self) -> AppResult<()> {
        self.storage.remove_items(&self.keys.all())
    }

    pub fn cached_user(&self) -> AppResult<Option<UserProfile>> {
        let Some(key) = self.keys.user.as_deref() else {
            return Ok(None);
        };
        let Some(raw) = self.storage.get_item(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw).map(Some).map_err(|e| {
            AppError::from_code(ErrorCode::Storage, format!("cached user is invalid json: {e}"))
        })
    }

    pub fn store_user(&self, user: &UserProfile) -> AppResult<()> {
        let Some(key) = self.keys.user.as_deref() else {
            return Ok(());
        };
        let encoded = serde_json::to_string(user).map_err(|e| {
            AppError::from_code(ErrorCode::Storage, format!("failed to encode user: {e}"))
        })?;
        self.storage.set_item(key, &encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn store(keys: TokenKeys) -> (Arc<MemoryStorage>, TokenStore) {
        let storage = Arc::new(MemoryStorage::new());
        (storage.clone(), TokenStore::new(storage, keys))
    }

    fn full_set(access: &str, refresh: Option<&str>) -> TokenSet {
        TokenSet {
            access_token: access.to_string(),
            id_token: Some(format!("id-{access}")),
            refresh_token: refresh.map(str::to_string),
            expires_at: None,
        }
    }

    #[test]
    fn replace_keeps_refresh_token_when_not_rotated() {
        let (_raw, store) = store(TokenKeys::identity_provider());
        store.replace(&full_set("a1", Some("r1"))).unwrap();
        store.replace(&full_set("a2", None)).unwrap();

        let loaded = store.load().unwrap().expect("tokens");
        assert_eq!(loaded.access_token, "a2");
        assert_eq!(loaded.id_token.as_deref(), Some("id-a2"));
        assert_eq!(loaded.refresh_token.as_deref(), Some("r1"));
    }

    #[test]
    fn replace_drops_an_id_token_the_provider_did_not_return() {
        let (raw, store) = store(TokenKeys::identity_provider());
        store.replace(&full_set("a1", Some("r1"))).unwrap();

        store
            .replace(&TokenSet {
                access_token: "a2".to_string(),
                id_token: None,
                refresh_token: Some("r2".to_string()),
                expires_at: None,
            })
            .unwrap();

        assert_eq!(raw.get_item("id_token").unwrap(), None);
        let loaded = store.load().unwrap().expect("tokens");
        assert_eq!(loaded.access_token, "a2");
        assert_eq!(loaded.id_token, None);
        assert_eq!(loaded.refresh_token.as_deref(), Some("r2"));
    }

    #[test]
    fn rest_layout_ignores_id_and_refresh_tokens() {
        let (raw, store) = store(TokenKeys::rest());
        store.replace(&full_set("t1", Some("r1"))).unwrap();

        assert_eq!(raw.get_item("auth_token").unwrap().as_deref(), Some("t1"));
        assert_eq!(raw.len(), 1);
        assert_eq!(store.refresh_token().unwrap(), None);
    }

    #[test]
    fn clear_removes_tokens_and_cached_user() {
        let (raw, store) = store(TokenKeys::rest());
        store.replace(&TokenSet::bearer("t1")).unwrap();
        store
            .store_user(&UserProfile {
                id: "user:1".to_string(),
                email: "ada@example.com".to_string(),
                username: "ada".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert!(store.cached_user().unwrap().is_some());

        store.clear().unwrap();
        assert!(raw.is_empty());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn blank_access_token_reads_as_absent() {
        let (raw, store) = store(TokenKeys::identity_provider());
        raw.set_item("access_token", "  ").unwrap();
        assert!(store.load().unwrap().is_none());
        assert!(store.replace(&TokenSet::bearer(" ")).is_err());
    }

    #[test]
    fn debug_output_masks_tokens() {
        let set = full_set("abcdef1234567890", Some("refresh-secret-value"));
        let printed = format!("{set:?}");
        assert!(!printed.contains("abcdef1234567890"));
        assert!(!printed.contains("refresh-secret-value"));
        assert!(printed.contains("abcdef...7890"));
    }
}
