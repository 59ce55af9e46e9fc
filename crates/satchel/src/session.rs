//! The per-request session handle.
//!
//! A [`Session`] is what request handlers see. It is created by
//! [`SessionLayer::load`](crate::SessionLayer::load), handed to the
//! handler, and flushed by [`SessionLayer::finish`](crate::SessionLayer::finish).
//!
//! The handle is cheap to clone and every clone points at the same data,
//! so a handler can fan work out to several tasks that all read and write
//! the same session. Reads take a shared lock, writes an exclusive one.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use satchel_cookie::{CookieConfig, SetCookie};
use satchel_store::{SessionData, SessionId, Store, Value};

use crate::SessionError;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where a session is in its per-request lifecycle.
///
/// ```text
///   no / bad cookie ─────────────┐
///   cookie ok, store: not found ─┴─→ Fresh ──┐
///   cookie ok, store: found ──────→ Loaded ──┼──(finish)──→ Flushed
///                                            └──(destroy)─→ Destroyed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Started empty in this request; the client is being sent a cookie.
    Fresh,

    /// Loaded from the store.
    Loaded,

    /// Written back to the store at the end of the request.
    Flushed,

    /// Removed from the store. Will not be flushed.
    Destroyed,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

struct Inner<S: Store> {
    id: SessionId,
    data: RwLock<SessionData>,
    state: Mutex<SessionState>,
    pending_cookie: Mutex<Option<SetCookie>>,
    store: Arc<S>,
    cookie: Arc<CookieConfig>,
}

/// One client's session for the duration of one request.
///
/// Values written here reach the store once, when the request finishes.
pub struct Session<S: Store> {
    inner: Arc<Inner<S>>,
}

impl<S: Store> Clone for Session<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Store> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<S: Store> Session<S> {
    pub(crate) fn new(
        id: SessionId,
        data: SessionData,
        state: SessionState,
        store: Arc<S>,
        cookie: Arc<CookieConfig>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                data: RwLock::new(data),
                state: Mutex::new(state),
                pending_cookie: Mutex::new(None),
                store,
                cookie,
            }),
        }
    }

    /// The session id. Fixed for the life of the request.
    pub fn id(&self) -> &SessionId {
        &self.inner.id
    }

    /// Returns a copy of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.data.read().get(key).cloned()
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.data.write().insert(key.into(), value.into());
    }

    /// Removes `key`, returning its previous value.
    pub fn delete(&self, key: &str) -> Option<Value> {
        self.inner.data.write().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.data.read().contains_key(key)
    }

    /// A copy of all session values.
    pub fn snapshot(&self) -> SessionData {
        self.inner.data.read().clone()
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// `true` if this session started empty in the current request.
    pub fn is_fresh(&self) -> bool {
        self.state() == SessionState::Fresh
    }

    pub fn is_destroyed(&self) -> bool {
        self.state() == SessionState::Destroyed
    }

    /// Permanently removes this session from the store and queues a
    /// cookie telling the client to discard its session cookie.
    ///
    /// Values already in this handle stay readable for the rest of the
    /// request; only the stored copy is gone. The session will not be
    /// flushed when the request finishes.
    ///
    /// # Errors
    /// Returns the store's error if the record could not be removed. The
    /// session is left as it was in that case.
    pub async fn destroy(&self) -> Result<(), SessionError> {
        self.inner.store.destroy(&self.inner.id).await?;

        *self.inner.state.lock() = SessionState::Destroyed;
        *self.inner.pending_cookie.lock() = Some(SetCookie::removal(&self.inner.cookie));

        tracing::info!(session_id = %self.inner.id, "session destroyed");
        Ok(())
    }

    pub(crate) fn queue_cookie(&self, cookie: SetCookie) {
        *self.inner.pending_cookie.lock() = Some(cookie);
    }

    pub(crate) fn take_cookie(&self) -> Option<SetCookie> {
        self.inner.pending_cookie.lock().take()
    }

    pub(crate) fn mark_flushed(&self) {
        *self.inner.state.lock() = SessionState::Flushed;
    }
}
