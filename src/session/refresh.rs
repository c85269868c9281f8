//! Usage: Single-flight refresh gate (one in-flight token refresh per session).
//!
//! Every token mutation (login, refresh, clear) happens while holding the ledger lock and
//! bumps the epoch. A request remembers the epoch it was dispatched under; when it gets a
//! 401 it takes the lock and compares. A moved epoch means somebody else already acted
//! on the tokens, so the request reuses that outcome instead of refreshing again.

use crate::shared::time::now_unix_seconds;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RefreshRecord {
    pub ok: bool,
    pub at_unix: i64,
}

#[derive(Debug, Default)]
pub(crate) struct RefreshLedger {
    epoch: u64,
    last_refresh: Option<RefreshRecord>,
}

#[derive(Debug, Default)]
pub(crate) struct RefreshGate {
    ledger: Mutex<RefreshLedger>,
    // Mirror of `ledger.epoch` readable without the lock; only written under it.
    published_epoch: AtomicU64,
    refreshing: AtomicBool,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.published_epoch.load(Ordering::Acquire)
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    /// Outcome of the most recent refresh; `None` while the ledger is held.
    pub fn try_last_refresh(&self) -> Option<RefreshRecord> {
        self.ledger.try_lock().ok().and_then(|ledger| ledger.last_refresh)
    }

    pub async fn lock(&self) -> LedgerGuard<'_> {
        LedgerGuard {
            guard: self.ledger.lock().await,
            gate: self,
        }
    }
}

pub(crate) struct LedgerGuard<'a> {
    guard: MutexGuard<'a, RefreshLedger>,
    gate: &'a RefreshGate,
}

impl<'a> LedgerGuard<'a> {
    pub fn epoch(&self) -> u64 {
        self.guard.epoch
    }

    pub fn last_refresh(&self) -> Option<RefreshRecord> {
        self.guard.last_refresh
    }

    /// Record a token mutation.
    pub fn bump(&mut self) -> u64 {
        self.guard.epoch = self.guard.epoch.wrapping_add(1);
        self.gate
            .published_epoch
            .store(self.guard.epoch, Ordering::Release);
        self.guard.epoch
    }

    pub fn begin_refresh(&self) -> RefreshingFlag<'a> {
        self.gate.refreshing.store(true, Ordering::Release);
        RefreshingFlag { gate: self.gate }
    }

    pub fn record_refresh(&mut self, ok: bool) {
        self.guard.last_refresh = Some(RefreshRecord {
            ok,
            at_unix: now_unix_seconds(),
        });
    }
}

/// Clears the `Refreshing` flag on drop, including when the refresh future is cancelled.
pub(crate) struct RefreshingFlag<'a> {
    gate: &'a RefreshGate,
}

impl Drop for RefreshingFlag<'_> {
    fn drop(&mut self) {
        self.gate.refreshing.store(false, Ordering::Release);
    }
}
