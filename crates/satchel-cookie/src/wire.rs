//! Cookie attributes, `Set-Cookie` rendering and request-cookie lookup.
//!
//! Both directions go through the `cookie` crate: [`SetCookie`] builds a
//! [`Cookie`] and renders it encoded, and [`cookie_values`] splits and
//! decodes `Cookie` request headers with it.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cookie::Cookie;
use cookie::time::{self, OffsetDateTime};
use http::HeaderMap;
use http::header::COOKIE;
use serde::{Deserialize, Serialize};

/// Cookie name used when none is configured.
pub const DEFAULT_COOKIE_NAME: &str = "SESSID";

/// Value written into the cookie when a session is destroyed.
pub const REMOVAL_SENTINEL: &str = "-";

// ---------------------------------------------------------------------------
// RefreshPolicy
// ---------------------------------------------------------------------------

/// When the session cookie is (re)sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RefreshPolicy {
    /// Only when a new session id is minted.
    #[default]
    OnIssue,

    /// On every response, which slides the cookie's expiry forward.
    Always,
}

// ---------------------------------------------------------------------------
// CookieConfig
// ---------------------------------------------------------------------------

/// Attributes of the session cookie.
///
/// Apart from `name`, `max_age` and `refresh`, these are passed straight
/// through to the `Set-Cookie` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    pub name: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub expires: Option<DateTime<Utc>>,

    /// Also bounds how old a sealed token may be when it's opened.
    pub max_age: Option<Duration>,

    pub secure: bool,
    pub http_only: bool,
    pub refresh: RefreshPolicy,
}

impl CookieConfig {
    /// The configured `max_age` in whole seconds, rounded up.
    ///
    /// `None` when unset or zero: a zero `Max-Age` would delete the cookie
    /// on arrival, so it is treated as "no max age".
    pub fn max_age_secs(&self) -> Option<u64> {
        self.max_age
            .filter(|age| !age.is_zero())
            .map(|age| age.as_secs() + u64::from(age.subsec_nanos() > 0))
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.to_string(),
            path: None,
            domain: None,
            expires: None,
            max_age: None,
            secure: false,
            http_only: false,
            refresh: RefreshPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// SetCookie
// ---------------------------------------------------------------------------

/// One `Set-Cookie` header, ready to render with [`Display`](fmt::Display).
#[derive(Debug, Clone, PartialEq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub expires: Option<DateTime<Utc>>,

    /// Seconds. Zero or negative renders as `Max-Age=0` (delete now).
    pub max_age: Option<i64>,

    pub secure: bool,
    pub http_only: bool,
}

impl SetCookie {
    /// A session cookie carrying `value`, with every attribute from `config`.
    pub fn issue(config: &CookieConfig, value: impl Into<String>) -> Self {
        Self {
            name: config.name.clone(),
            value: value.into(),
            path: config.path.clone(),
            domain: config.domain.clone(),
            expires: config.expires,
            max_age: config
                .max_age_secs()
                .map(|secs| i64::try_from(secs).unwrap_or(i64::MAX)),
            secure: config.secure,
            http_only: config.http_only,
        }
    }

    /// A cookie that tells the client to discard the session cookie
    /// immediately.
    ///
    /// Path and domain are kept so the browser matches it against the
    /// cookie it already holds.
    pub fn removal(config: &CookieConfig) -> Self {
        Self {
            name: config.name.clone(),
            value: REMOVAL_SENTINEL.to_string(),
            path: config.path.clone(),
            domain: config.domain.clone(),
            expires: Some(Utc::now()),
            max_age: Some(0),
            secure: config.secure,
            http_only: config.http_only,
        }
    }

    /// Returns `true` if this is a removal cookie.
    pub fn is_removal(&self) -> bool {
        self.value == REMOVAL_SENTINEL && self.max_age.is_some_and(|age| age <= 0)
    }

    /// Builds the [`Cookie`] this header describes.
    pub fn to_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::build((self.name.clone(), self.value.clone()))
            .secure(self.secure)
            .http_only(self.http_only)
            .build();

        if let Some(path) = &self.path {
            cookie.set_path(path.clone());
        }
        if let Some(domain) = &self.domain {
            cookie.set_domain(domain.clone());
        }
        if let Some(expires) = self
            .expires
            .and_then(|at| OffsetDateTime::from_unix_timestamp(at.timestamp()).ok())
        {
            cookie.set_expires(expires);
        }
        if let Some(age) = self.max_age {
            cookie.set_max_age(time::Duration::seconds(age.max(0)));
        }
        cookie
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_cookie().encoded())
    }
}

// ---------------------------------------------------------------------------
// Request side
// ---------------------------------------------------------------------------

/// Every value sent for cookie `name`, across all `Cookie` request
/// headers, in the order the client sent them.
///
/// A browser sends one pair per cookie whose path and domain match, so the
/// same name can show up more than once. Values are percent-decoded with
/// surrounding double quotes removed. Pairs that don't parse are skipped.
pub fn cookie_values<'a>(
    headers: &'a HeaderMap,
    name: &'a str,
) -> impl Iterator<Item = String> + 'a {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(Cookie::split_parse_encoded)
        .filter_map(Result::ok)
        .filter(move |cookie| cookie.name() == name)
        .map(|cookie| cookie.value_trimmed().to_string())
}
