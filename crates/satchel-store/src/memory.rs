//! In-process session store backed by a read/write-locked hash map.
//!
//! Reads take the shared lock, writes take the exclusive lock. Locks are
//! never held across an `.await`, so a `parking_lot` lock is enough even
//! though the [`Store`] methods are async.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{SessionData, SessionId, Store, StoreError};

/// A [`Store`] that keeps every session in process memory.
///
/// Nothing survives a restart. `Clone` is cheap and clones share the same
/// map, so a test can keep a handle for inspection while the session
/// layer owns another.
///
/// This store never returns [`StoreError::Backend`]: there is no I/O.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<RwLock<HashMap<SessionId, SessionData>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Returns `true` if a record exists for `id`.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().contains_key(id)
    }
}

impl Store for MemoryStore {
    async fn get(&self, id: &SessionId) -> Result<SessionData, StoreError> {
        self.sessions
            .read()
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn save(
        &self,
        id: &SessionId,
        data: &SessionData,
    ) -> Result<(), StoreError> {
        self.sessions.write().insert(id.clone(), data.clone());
        tracing::trace!(session_id = %id, "memory store saved session");
        Ok(())
    }

    async fn destroy(&self, id: &SessionId) -> Result<(), StoreError> {
        self.sessions.write().remove(id);
        tracing::trace!(session_id = %id, "memory store destroyed session");
        Ok(())
    }
}
