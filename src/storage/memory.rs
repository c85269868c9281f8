use super::TokenStorage;
use crate::shared::error::AppResult;
use crate::shared::mutex_ext::RwLockExt;
use std::collections::HashMap;
use std::sync::RwLock;

/// Process-local storage; tokens vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.read_or_recover().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.items.read_or_recover().get(key).cloned())
    }

    fn set_items(&self, items: &[(&str, &str)]) -> AppResult<()> {
        let mut guard = self.items.write_or_recover();
        for (key, value) in items {
            guard.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove_items(&self, keys: &[&str]) -> AppResult<()> {
        let mut guard = self.items.write_or_recover();
        for key in keys {
            guard.remove(*key);
        }
        Ok(())
    }

    fn update_items(&self, set: &[(&str, &str)], remove: &[&str]) -> AppResult<()> {
        let mut guard = self.items.write_or_recover();
        for key in remove {
            guard.remove(*key);
        }
        for (key, value) in set {
            guard.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }
}
