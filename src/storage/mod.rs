//! Usage: Client-side key/value token storage (the browser `localStorage` analog).
//!
//! `TokenStorage` is the raw string store; `TokenStore` layers the session key layout
//! (`TokenKeys`) on top and owns the "replace the whole set in one write" rule.

mod file;
mod memory;
mod token_store;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use token_store::{TokenKeys, TokenSet, TokenStore};

use crate::shared::error::AppResult;

pub trait TokenStorage: Send + Sync {
    fn get_item(&self, key: &str) -> AppResult<Option<String>>;

    /// Writes all pairs as one unit: readers observe either none or all of them.
    fn set_items(&self, items: &[(&str, &str)]) -> AppResult<()>;

    /// Removes all keys as one unit. Unknown keys are ignored.
    fn remove_items(&self, keys: &[&str]) -> AppResult<()>;

    /// Writes `set` and removes `remove` as one unit.
    fn update_items(&self, set: &[(&str, &str)], remove: &[&str]) -> AppResult<()>;

    fn set_item(&self, key: &str, value: &str) -> AppResult<()> {
        self.set_items(&[(key, value)])
    }

    fn remove_item(&self, key: &str) -> AppResult<()> {
        self.remove_items(&[key])
    }
}
