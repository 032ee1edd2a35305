//! Storage for the master reclaim token.
//!
//! The token lives for as long as one client instance does. It is presented
//! on every handshake so a master that briefly drops can reclaim its role.

use std::sync::{Arc, Mutex, PoisonError};

use crate::protocol::MasterToken;

/// Scoped store for a single opaque [`MasterToken`].
pub trait CredentialStore: Send + 'static {
    /// The stored token, if any.
    fn get(&self) -> Option<MasterToken>;

    /// Replace the stored token.
    fn set(&mut self, token: MasterToken);

    /// Forget the stored token.
    fn clear(&mut self);
}

/// In-memory [`CredentialStore`].
///
/// Clones share the same slot, so a caller can keep a clone to observe what
/// the session stored.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    slot: Arc<Mutex<Option<MasterToken>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-seeded with `token`.
    pub fn with_token(token: impl Into<MasterToken>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(token.into()))),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Option<MasterToken> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&mut self, token: MasterToken) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    fn clear(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn set_get_clear() {
        let mut store = MemoryCredentialStore::new();
        assert!(store.get().is_none());
        store.set("T1".into());
        assert_eq!(store.get().as_deref(), Some("T1"));
        store.clear();
        assert!(store.get().is_none());
    }

    #[test]
    fn clones_share_the_slot() {
        let mut store = MemoryCredentialStore::with_token("T1");
        let observer = store.clone();
        store.set("T2".into());
        assert_eq!(observer.get().as_deref(), Some("T2"));
    }
}
