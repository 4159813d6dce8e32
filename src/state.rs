//! Short-lived per-call context for the deferred-connect path.
//!
//! When an outbound call is originated without an up-front session, the
//! composed prompt inputs are parked here under an opaque call key. The
//! connect webhook consumes the entry exactly once; a miss is terminal for
//! that call attempt because the prompt cannot be reconstructed.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::BridgeError;

/// Default lifetime for unconsumed entries (abandoned calls).
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(10 * 60);

/// Context parked between origination and connection.
#[derive(Debug, Clone)]
pub struct PendingCallContext {
    pub system_prompt: String,
    pub persona: Option<String>,
    created_at: DateTime<Utc>,
}

impl PendingCallContext {
    pub fn new(system_prompt: impl Into<String>, persona: Option<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            persona,
            created_at: Utc::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        match (Utc::now() - self.created_at).to_std() {
            Ok(age) => age > ttl,
            // Negative age means clock skew; keep the entry.
            Err(_) => false,
        }
    }
}

/// Thread-safe keyed store with take-once semantics.
///
/// The only mutable structure shared across concurrent call-handling units.
/// Per-key access is atomic: one writer at origination, one consumer at
/// connection. Entries never taken are swept by [`Self::purge_expired`].
#[derive(Debug, Clone)]
pub struct PendingCallStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    entries: RwLock<HashMap<String, PendingCallContext>>,
    ttl: Duration,
}

impl Default for PendingCallStore {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_TTL)
    }
}

impl PendingCallStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                entries: RwLock::new(HashMap::new()),
                ttl,
            }),
        }
    }

    /// Park context under `key`. A repeated put for the same key replaces
    /// the earlier entry (callers generate fresh keys per origination).
    pub fn put(&self, key: impl Into<String>, context: PendingCallContext) {
        let mut guard = self.inner.entries.write().unwrap();
        guard.insert(key.into(), context);
    }

    /// Consume the context for `key`, removing it. Fails when the key was
    /// never written, already consumed, or swept.
    pub fn take_once(&self, key: &str) -> Result<PendingCallContext, BridgeError> {
        let mut guard = self.inner.entries.write().unwrap();
        guard
            .remove(key)
            .ok_or_else(|| BridgeError::PendingContextNotFound(key.to_string()))
    }

    /// Evict entries older than the store's TTL. Returns how many were
    /// removed.
    pub fn purge_expired(&self) -> usize {
        let mut guard = self.inner.entries.write().unwrap();
        let before = guard.len();
        let ttl = self.inner.ttl;
        guard.retain(|_, ctx| !ctx.is_expired(ttl));
        before - guard.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.read().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
