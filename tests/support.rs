#![allow(dead_code)]

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use leaderboard_session::infra::settings::{clear_api_url_override, API_URL_ENV};
use leaderboard_session::session::UnrecoverableAuthCallback;
use leaderboard_session::AppError;
use tempfile::TempDir;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct EnvRestore {
    saved: Vec<(&'static str, Option<OsString>)>,
}

impl EnvRestore {
    fn save_once(&mut self, key: &'static str) {
        if self.saved.iter().any(|(k, _)| *k == key) {
            return;
        }
        self.saved.push((key, std::env::var_os(key)));
    }

    fn set_var(&mut self, key: &'static str, value: impl Into<OsString>) {
        self.save_once(key);
        std::env::set_var(key, value.into());
    }

    fn remove_var(&mut self, key: &'static str) {
        self.save_once(key);
        std::env::remove_var(key);
    }
}

impl Drop for EnvRestore {
    fn drop(&mut self) {
        for (key, value) in self.saved.drain(..).rev() {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

/// Serializes tests that touch process env or the API URL override, and gives each one
/// a scratch directory.
pub struct TestEnv {
    env: EnvRestore,
    dir: TempDir,
    // Dropped last so env is restored before the next test runs.
    _lock: MutexGuard<'static, ()>,
}

impl TestEnv {
    pub fn new() -> Self {
        let lock = env_lock();
        let dir = tempfile::tempdir().expect("tempdir");

        let mut env = EnvRestore::default();
        env.remove_var(API_URL_ENV);
        clear_api_url_override();

        Self {
            env,
            dir,
            _lock: lock,
        }
    }

        pub fn set_var(&mut self, key: &'static str, value: impl Into<OsString>) {
        self.env.set_var(key, value);
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

        pub fn token_file(&self) -> PathBuf {
        self.dir().join("session.json")
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        clear_api_url_override();
    }
}

/// Callback that counts unrecoverable auth failures.
pub fn counting_callback() -> (Arc<AtomicUsize>, UnrecoverableAuthCallback) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let callback: UnrecoverableAuthCallback = Arc::new(move |_: &AppError| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (count, callback)
}

pub fn read_json(path: &Path) -> serde_json::Value {
    let content = std::fs::read_to_string(path).expect("read token file");
    serde_json::from_str(&content).expect("token file is json")
}
