use super::TokenStorage;
use crate::shared::error::{AppError, AppResult};
use crate::shared::error_code::ErrorCode;
use crate::shared::mutex_ext::MutexExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// JSON-object file storage that survives restarts.
///
/// The file is re-read on every access so edits made by another process (or another
/// `FileStorage` on the same path) are observed, the way two browser tabs share
/// `localStorage`. Writes go through a temp file and a rename.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

fn storage_error(message: String) -> AppError {
    AppError::from_code(ErrorCode::Storage, message)
}

fn parse_map(content: &str) -> Result<BTreeMap<String, String>, serde_json::Error> {
    let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(content)?;
    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
        .collect())
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_content(&self) -> AppResult<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| storage_error(format!("failed to read token storage: {e}")))?;
        Ok(Some(content).filter(|c| !c.trim().is_empty()))
    }

    fn read_map(&self) -> AppResult<BTreeMap<String, String>> {
        match self.read_content()? {
            Some(content) => parse_map(&content)
                .map_err(|e| storage_error(format!("token storage is not a json object: {e}"))),
            None => Ok(BTreeMap::new()),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> AppResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| storage_error(format!("failed to create storage dir: {e}")))?;
        }

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "session.json".to_string());
        let tmp_path = self.path.with_file_name(format!("{file_name}.tmp"));
        let backup_path = self.path.with_file_name(format!("{file_name}.bak"));

        let content = serde_json::to_vec_pretty(map)
            .map_err(|e| storage_error(format!("failed to serialize token storage: {e}")))?;
        std::fs::write(&tmp_path, content)
            .map_err(|e| storage_error(format!("failed to write temp storage file: {e}")))?;

        if backup_path.exists() {
            let _ = std::fs::remove_file(&backup_path);
        }
        if self.path.exists() {
            std::fs::rename(&self.path, &backup_path)
                .map_err(|e| storage_error(format!("failed to create storage backup: {e}")))?;
        }
        if let Err(e) = std::fs::rename(&tmp_path, &self.path) {
            let _ = std::fs::rename(&backup_path, &self.path);
            return Err(storage_error(format!("failed to finalize token storage: {e}")));
        }
        if backup_path.exists() {
            let _ = std::fs::remove_file(&backup_path);
        }
        Ok(())
    }
}

impl TokenStorage for FileStorage {
    fn get_item(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.read_map()?.remove(key))
    }

    fn set_items(&self, items: &[(&str, &str)]) -> AppResult<()> {
        let _guard = self.write_lock.lock_or_recover();
        let mut map = self.read_map()?;
        for (key, value) in items {
            map.insert((*key).to_string(), (*value).to_string());
        }
        self.write_map(&map)
    }

    fn remove_items(&self, keys: &[&str]) -> AppResult<()> {
        let _guard = self.write_lock.lock_or_recover();
        let Some(content) = self.read_content()? else {
            return Ok(());
        };
        let mut map = match parse_map(&content) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "token storage unreadable; resetting it: {}",
                    e
                );
                return self.write_map(&BTreeMap::new());
            }
        };
        let before = map.len();
        for key in keys {
            map.remove(*key);
        }
        if map.len() == before {
            return Ok(());
        }
        self.write_map(&map)
    }

    fn update_items(&self, set: &[(&str, &str)], remove: &[&str]) -> AppResult<()> {
        let _guard = self.write_lock.lock_or_recover();
        let mut map = self.read_map()?;
        for key in remove {
            map.remove(*key);
        }
        for (key, value) in set {
            map.insert((*key).to_string(), (*value).to_string());
        }
        self.write_map(&map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reads_empty_and_writes_create_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("session.json");
        let storage = FileStorage::new(&path);

        assert_eq!(storage.get_item("auth_token").unwrap(), None);
        storage.set_item("auth_token", "t1").unwrap();
        assert!(path.exists());
        assert!(!path.with_file_name("session.json.tmp").exists());
        assert!(!path.with_file_name("session.json.bak").exists());

        let reopened = FileStorage::new(&path);
        assert_eq!(reopened.get_item("auth_token").unwrap().as_deref(), Some("t1"));
    }

    #[test]
    fn batch_write_and_remove() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::new(dir.path().join("session.json"));

        storage
            .set_items(&[("id_token", "i"), ("access_token", "a"), ("refresh_token", "r")])
            .unwrap();
        storage.remove_items(&["id_token", "access_token"]).unwrap();

        assert_eq!(storage.get_item("id_token").unwrap(), None);
        assert_eq!(storage.get_item("access_token").unwrap(), None);
        assert_eq!(storage.get_item("refresh_token").unwrap().as_deref(), Some("r"));
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        std::fs::write(&path, "[1,2,3]").unwrap();

        let err = FileStorage::new(&path).get_item("x").expect_err("not an object");
        assert_eq!(err.kind(), Some(ErrorCode::Storage));
    }

    #[test]
    fn removing_from_a_corrupt_file_resets_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{ not json").unwrap();
        let storage = FileStorage::new(&path);

        storage.remove_items(&["auth_token", "user"]).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "{}");
        assert_eq!(storage.get_item("auth_token").unwrap(), None);
        storage.set_item("auth_token", "t2").unwrap();
        assert_eq!(storage.get_item("auth_token").unwrap().as_deref(), Some("t2"));
    }

    #[test]
    fn update_sets_and_removes_in_one_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::new(dir.path().join("session.json"));
        storage
            .set_items(&[("access_token", "a1"), ("id_token", "i1")])
            .unwrap();

        storage
            .update_items(&[("access_token", "a2")], &["id_token"])
            .unwrap();

        assert_eq!(storage.get_item("access_token").unwrap().as_deref(), Some("a2"));
        assert_eq!(storage.get_item("id_token").unwrap(), None);
    }
}
