//! Keyed, time-windowed suppression store.
//!
//! The command dispatcher uses this to reject repeated invocations inside a
//! per-(command, user) window. Entries self-expire: arming a key schedules a
//! removal task for the expiry instant, and reads also drop entries that are
//! already past due, so the map never accumulates stale state.
//!
//! Built on [`tokio::time`], which lets tests drive the window with a paused
//! clock instead of sleeping.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::trace;

struct Entry {
    expires_at: Instant,
    sweeper: AbortHandle,
}

#[derive(Default)]
struct Inner {
    entries: Mutex<HashMap<String, Entry>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for entry in self.entries.lock().values() {
            entry.sweeper.abort();
        }
    }
}

/// A string-keyed store of expiring suppression windows.
///
/// Cloning is cheap and shares the underlying map.
#[derive(Clone, Default)]
pub struct CooldownStore {
    inner: Arc<Inner>,
}

impl CooldownStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining window for `key`, or `None` when the key is absent or its
    /// window has elapsed. An elapsed entry is removed on the spot.
    pub fn check(&self, key: &str) -> Option<Duration> {
        let mut entries = self.inner.entries.lock();
        match entries.get(key) {
            Some(entry) => {
                let now = Instant::now();
                if entry.expires_at <= now {
                    let entry = entries.remove(key).expect("entry present under lock");
                    entry.sweeper.abort();
                    None
                } else {
                    Some(entry.expires_at - now)
                }
            }
            None => None,
        }
    }

    /// Opens a window of `window` for `key`, replacing any existing entry
    /// and its scheduled removal.
    ///
    /// Must be called from within a tokio runtime: the removal task is
    /// spawned on the current runtime.
    pub fn arm(&self, key: impl Into<String>, window: Duration) {
        let key = key.into();
        let expires_at = Instant::now() + window;

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let sweep_key = key.clone();
        let sweeper = tokio::spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            if let Some(inner) = weak.upgrade() {
                let mut entries = inner.entries.lock();
                // Only remove the generation this sweeper was armed for.
                if entries.get(&sweep_key).is_some_and(|e| e.expires_at == expires_at) {
                    entries.remove(&sweep_key);
                    trace!(key = %sweep_key, "Cooldown entry expired");
                }
            }
        })
        .abort_handle();

        let mut entries = self.inner.entries.lock();
        if let Some(previous) = entries.insert(key, Entry { expires_at, sweeper }) {
            previous.sweeper.abort();
        }
    }

    /// Removes `key` immediately, cancelling its scheduled removal.
    pub fn remove(&self, key: &str) {
        if let Some(entry) = self.inner.entries.lock().remove(key) {
            entry.sweeper.abort();
        }
    }

    /// Removes every entry whose key starts with `prefix`.
    ///
    /// Used when a command is torn down (plugin unload / unregistration);
    /// re-registering a command deliberately does *not* go through here.
    pub fn clear_prefix(&self, prefix: &str) {
        let mut entries = self.inner.entries.lock();
        entries.retain(|key, entry| {
            if key.starts_with(prefix) {
                entry.sweeper.abort();
                false
            } else {
                true
            }
        });
    }

    /// Number of live entries (expired-but-unswept entries included).
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn window_rejects_until_expiry() {
        let store = CooldownStore::new();
        store.arm("daily:u1", Duration::from_secs(86_400));

        tokio::time::advance(Duration::from_secs(100)).await;
        let remaining = store.check("daily:u1").expect("still cooling down");
        assert_eq!(remaining, Duration::from_secs(86_300));

        tokio::time::advance(Duration::from_secs(86_300)).await;
        assert!(store.check("daily:u1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_removes_entry_at_expiry() {
        let store = CooldownStore::new();
        store.arm("ping:u1", Duration::from_secs(5));
        assert_eq!(store.len(), 1);

        // Advance past expiry and yield so the sweeper task runs.
        tokio::time::advance(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;
        assert_eq!(store.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_replaces_previous_sweeper() {
        let store = CooldownStore::new();
        store.arm("cmd:u1", Duration::from_secs(5));
        store.arm("cmd:u1", Duration::from_secs(60));

        // The first sweeper would have fired at t=5; the re-arm must have
        // cancelled it.
        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert!(store.check("cmd:u1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_prefix_only_touches_matching_keys() {
        let store = CooldownStore::new();
        store.arm("daily:u1", Duration::from_secs(60));
        store.arm("daily:u2", Duration::from_secs(60));
        store.arm("ping:u1", Duration::from_secs(60));

        store.clear_prefix("daily:");
        assert!(store.check("daily:u1").is_none());
        assert!(store.check("daily:u2").is_none());
        assert!(store.check("ping:u1").is_some());
    }
}
