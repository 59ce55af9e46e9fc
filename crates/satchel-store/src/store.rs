//! The storage contract shared by every backend.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{SessionData, StoreError};

/// Opaque, URL-safe identifier for one session.
///
/// Ids are minted by the session layer; stores treat them as plain keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Durable storage for session data, keyed by [`SessionId`].
///
/// # Contract
///
/// - `get` returns exactly what the last completed `save` wrote, or
///   [`StoreError::NotFound`] when there is no record.
/// - `save` is an upsert with full replacement. Overwriting an existing
///   id is expected and silent. Callers merge before saving.
/// - `destroy` removes the record. Destroying an absent id is not an
///   error.
///
/// All three may be called concurrently, from any number of tasks, for
/// the same or different ids. A `get` never observes a half-written
/// record.
///
/// # Trait bounds
///
/// `Send + Sync + 'static` because one store is shared by every request
/// task for the lifetime of the server. The returned futures are `Send`
/// so request handlers can be spawned on a multi-threaded runtime.
pub trait Store: Send + Sync + 'static {
    /// Loads the session stored under `id`.
    fn get(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<SessionData, StoreError>> + Send;

    /// Writes `data` under `id`, replacing any previous record.
    fn save(
        &self,
        id: &SessionId,
        data: &SessionData,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Permanently removes the record for `id`, if any.
    fn destroy(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl<S: Store> Store for Arc<S> {
    fn get(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<SessionData, StoreError>> + Send {
        (**self).get(id)
    }

    fn save(
        &self,
        id: &SessionId,
        data: &SessionData,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).save(id, data)
    }

    fn destroy(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).destroy(id)
    }
}
