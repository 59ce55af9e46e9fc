//! `SessionLayer`: the per-request session coordinator.
//!
//! For each request the layer runs the same three steps:
//!
//!   1. **Load**: open the session cookie, fetch the record, or start a
//!      fresh session ([`load`](SessionLayer::load))
//!   2. **Serve**: the handler reads and writes the [`Session`]
//!   3. **Finish**: attach any pending `Set-Cookie` header and flush the
//!      session to the store ([`finish`](SessionLayer::finish))
//!
//! [`handle`](SessionLayer::handle) wraps all three around a handler
//! continuation for hosts that speak `http::Request`/`http::Response`.
//!
//! # Failure policy
//!
//! Only a missing record is absorbed (it becomes a fresh session). A
//! backend or decode failure while loading fails the request; the layer
//! never invents an empty session to paper over an outage.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use http::header::SET_COOKIE;
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
use satchel_cookie::{
    CookieConfig, RefreshPolicy, Sealer, SecureCookie, SetCookie, cookie_values,
};
use satchel_store::{ConfigError, SessionData, SessionId, Store, StoreError};

use crate::SessionError;
use crate::id::{IdGenerator, TimeOrderedIds};
use crate::session::{Session, SessionState};

/// The key under which the session id travels inside the sealed cookie.
const ID_FIELD: &str = "id";

// ---------------------------------------------------------------------------
// SessionLayerBuilder
// ---------------------------------------------------------------------------

/// Builder for [`SessionLayer`].
///
/// # Example
///
/// ```rust
/// use satchel::prelude::*;
///
/// let layer = SessionLayer::builder()
///     .secret("LymWKG0UvJFCiXLHdeYJTR1xaAcRvrf7")
///     .block_secret("NxyECgzxiYdMhMbsBrUcAAbyBuqKDrpp")
///     .store(MemoryStore::new())
///     .http_only(true)
///     .build()
///     .expect("valid configuration");
/// # let _ = layer;
/// ```
pub struct SessionLayerBuilder<S: Store> {
    secret: Vec<u8>,
    block_secret: Vec<u8>,
    store: Option<S>,
    ids: Option<Arc<dyn IdGenerator>>,
    cookie: CookieConfig,
}

impl<S: Store> SessionLayerBuilder<S> {
    /// Creates a builder with default cookie settings and no secrets.
    pub fn new() -> Self {
        Self {
            secret: Vec::new(),
            block_secret: Vec::new(),
            store: None,
            ids: None,
            cookie: CookieConfig::default(),
        }
    }

    /// Signing secret for the session cookie. Required.
    pub fn secret(mut self, secret: impl AsRef<[u8]>) -> Self {
        self.secret = secret.as_ref().to_vec();
        self
    }

    /// Encryption secret for the session cookie. Required.
    pub fn block_secret(mut self, secret: impl AsRef<[u8]>) -> Self {
        self.block_secret = secret.as_ref().to_vec();
        self
    }

    /// The backing store. Required.
    pub fn store(mut self, store: S) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the default [`TimeOrderedIds`] generator.
    pub fn id_generator(mut self, ids: impl IdGenerator) -> Self {
        self.ids = Some(Arc::new(ids));
        self
    }

    /// Replaces every cookie attribute at once.
    pub fn cookie(mut self, cookie: CookieConfig) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.cookie.name = name.into();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.cookie.path = Some(path.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie.domain = Some(domain.into());
        self
    }

    pub fn expires(mut self, expires: DateTime<Utc>) -> Self {
        self.cookie.expires = Some(expires);
        self
    }

    /// Cookie `Max-Age`. Also the oldest sealed token the default sealer
    /// will accept.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.cookie.max_age = Some(max_age);
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.cookie.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.cookie.http_only = http_only;
        self
    }

    pub fn refresh(mut self, refresh: RefreshPolicy) -> Self {
        self.cookie.refresh = refresh;
        self
    }

    /// Builds a layer that seals cookies with [`SecureCookie`].
    ///
    /// # Errors
    /// - [`ConfigError::MissingSecret`] / [`ConfigError::MissingBlockSecret`]
    ///   if a secret is empty
    /// - [`ConfigError::MissingStore`] if no store was given
    pub fn build(self) -> Result<SessionLayer<S>, SessionError> {
        if self.secret.is_empty() {
            return Err(ConfigError::MissingSecret.into());
        }
        if self.block_secret.is_empty() {
            return Err(ConfigError::MissingBlockSecret.into());
        }

        let mut sealer = SecureCookie::new(&self.secret, &self.block_secret)?;
        if let Some(secs) = self.cookie.max_age_secs() {
            sealer = sealer.with_max_age(Duration::from_secs(secs));
        }

        self.build_with_sealer(sealer)
    }

    /// Builds a layer around an externally supplied [`Sealer`].
    ///
    /// The sealer owns its keys, so `secret` and `block_secret` are not
    /// consulted.
    ///
    /// # Errors
    /// [`ConfigError::MissingStore`] if no store was given.
    pub fn build_with_sealer<K: Sealer>(
        self,
        sealer: K,
    ) -> Result<SessionLayer<S, K>, SessionError> {
        let store = self.store.ok_or(ConfigError::MissingStore)?;
        let ids = self.ids.unwrap_or_else(|| Arc::new(TimeOrderedIds));

        tracing::debug!(
            cookie = %self.cookie.name,
            refresh = ?self.cookie.refresh,
            "session layer configured"
        );

        Ok(SessionLayer {
            inner: Arc::new(LayerInner {
                store: Arc::new(store),
                sealer,
                ids,
                cookie: Arc::new(self.cookie),
            }),
        })
    }
}

impl<S: Store> Default for SessionLayerBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// SessionLayer
// ---------------------------------------------------------------------------

struct LayerInner<S: Store, K: Sealer> {
    store: Arc<S>,
    sealer: K,
    ids: Arc<dyn IdGenerator>,
    cookie: Arc<CookieConfig>,
}

/// Resolves, exposes and persists one session per request.
///
/// Build once at startup and share: `Clone` is an `Arc` bump, and every
/// method takes `&self`.
pub struct SessionLayer<S: Store, K: Sealer = SecureCookie> {
    inner: Arc<LayerInner<S, K>>,
}

impl<S: Store, K: Sealer> Clone for SessionLayer<S, K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Store> SessionLayer<S> {
    /// Creates a new builder.
    pub fn builder() -> SessionLayerBuilder<S> {
        SessionLayerBuilder::new()
    }
}

impl<S: Store, K: Sealer> SessionLayer<S, K> {
    /// The backing store.
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// The cookie attributes in effect.
    pub fn cookie_config(&self) -> &CookieConfig {
        &self.inner.cookie
    }

    /// Resolves the session for a request from its headers.
    ///
    /// | cookie                          | store       | result                     |
    /// |---------------------------------|-------------|----------------------------|
    /// | absent, tampered, undecodable   | not asked   | `Fresh`, new id, cookie    |
    /// | valid                           | found       | `Loaded`                   |
    /// | valid                           | not found   | `Fresh`, same id, cookie   |
    /// | valid                           | error       | `Err`                      |
    ///
    /// # Errors
    /// - [`SessionError::Store`] for backend or decode failures
    /// - [`SessionError::Seal`] if a new cookie could not be sealed
    pub async fn load(&self, headers: &HeaderMap) -> Result<Session<S>, SessionError> {
        let Some(id) = self.presented_id(headers) else {
            let id = SessionId::from(self.inner.ids.generate());
            tracing::debug!(session_id = %id, "no valid session cookie, starting fresh");
            return self.start_fresh(id);
        };

        match self.inner.store.get(&id).await {
            Ok(data) => {
                tracing::debug!(session_id = %id, keys = data.len(), "session loaded");
                let session = self.session(id, data, SessionState::Loaded);
                if self.inner.cookie.refresh == RefreshPolicy::Always {
                    self.issue_cookie(&session)?;
                }
                Ok(session)
            }
            Err(StoreError::NotFound) => {
                tracing::debug!(session_id = %id, "session not in store, starting fresh");
                self.start_fresh(id)
            }
            Err(e) => {
                tracing::error!(session_id = %id, error = %e, "failed to load session");
                Err(e.into())
            }
        }
    }

    /// Ends the request: attaches any pending `Set-Cookie` header to
    /// `headers`, then writes the session back to the store.
    ///
    /// A destroyed session is not written. The flush is unconditional
    /// otherwise, whether or not the handler changed anything.
    ///
    /// # Errors
    /// - [`SessionError::InvalidHeader`] if a cookie attribute isn't a
    ///   valid header value
    /// - [`SessionError::Store`] if the flush fails
    pub async fn finish(
        &self,
        session: &Session<S>,
        headers: &mut HeaderMap,
    ) -> Result<(), SessionError> {
        if let Some(cookie) = session.take_cookie() {
            let value = HeaderValue::from_str(&cookie.to_string())?;
            headers.append(SET_COOKIE, value);
        }

        if session.is_destroyed() {
            tracing::debug!(session_id = %session.id(), "destroyed session, skipping flush");
            return Ok(());
        }

        let data: SessionData = session.snapshot();
        self.inner.store.save(session.id(), &data).await?;
        session.mark_flushed();

        tracing::debug!(session_id = %session.id(), keys = data.len(), "session saved");
        Ok(())
    }

    /// Runs `next` inside a session.
    ///
    /// If the session can't be loaded, or can't be flushed afterwards,
    /// the response is replaced by an empty `500 Internal Server Error`.
    /// If the returned future is dropped before `next` completes, nothing
    /// is flushed.
    pub async fn handle<B, R, F, Fut>(&self, request: Request<B>, next: F) -> Response<R>
    where
        F: FnOnce(Request<B>, Session<S>) -> Fut,
        Fut: Future<Output = Response<R>>,
        R: Default,
    {
        let session = match self.load(request.headers()).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(error = %e, "session unavailable, failing request");
                return internal_error();
            }
        };

        let mut response = next(request, session.clone()).await;

        if let Err(e) = self.finish(&session, response.headers_mut()).await {
            tracing::error!(
                session_id = %session.id(),
                error = %e,
                "failed to finish session"
            );
            return internal_error();
        }
        response
    }

    /// Opens the request's session cookies and returns the id from the
    /// first one that opens. A client may send several cookies with our
    /// name (different paths); the ones that fail to open are skipped.
    fn presented_id(&self, headers: &HeaderMap) -> Option<SessionId> {
        let name = &self.inner.cookie.name;

        cookie_values(headers, name).find_map(|token| {
            match self.inner.sealer.open(name, &token) {
                Ok(mut values) => values
                    .remove(ID_FIELD)
                    .filter(|id| !id.is_empty())
                    .map(SessionId::from),
                Err(e) => {
                    tracing::warn!(cookie = %name, error = %e, "ignoring session cookie that failed to open");
                    None
                }
            }
        })
    }

    fn start_fresh(&self, id: SessionId) -> Result<Session<S>, SessionError> {
        let session = self.session(id, SessionData::new(), SessionState::Fresh);
        self.issue_cookie(&session)?;
        Ok(session)
    }

    fn session(&self, id: SessionId, data: SessionData, state: SessionState) -> Session<S> {
        Session::new(
            id,
            data,
            state,
            Arc::clone(&self.inner.store),
            Arc::clone(&self.inner.cookie),
        )
    }

    fn issue_cookie(&self, session: &Session<S>) -> Result<(), SessionError> {
        let values = BTreeMap::from([(ID_FIELD.to_string(), session.id().to_string())]);
        let token = self.inner.sealer.seal(&self.inner.cookie.name, &values)?;
        session.queue_cookie(SetCookie::issue(&self.inner.cookie, token));
        tracing::debug!(session_id = %session.id(), "session cookie issued");
        Ok(())
    }
}

fn internal_error<R: Default>() -> Response<R> {
    let mut response = Response::new(R::default());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
