//! Route table, auth guard, and the in-process router.
//!
//! DESIGN
//! ======
//! Services never touch the current location directly; they call
//! `Navigator::push`. `Router` is the production navigator: it waits for the
//! initial auth state, runs the guard, follows guard redirects, and
//! publishes the final location on a `watch` channel.

#[cfg(test)]
#[path = "routes_test.rs"]
mod routes_test;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::db::auth::{AuthSession, User};

pub const HOME_PATH: &str = "/";
pub const USER_PATH: &str = "/user";
pub const NOT_FOUND_PATH: &str = "/404";

/// Upper bound on chained guard redirects for one navigation.
const MAX_REDIRECTS: usize = 4;

// =============================================================================
// NAVIGATOR
// =============================================================================

#[async_trait]
pub trait Navigator: Send + Sync {
    /// Navigate to `to` (a path with optional query string).
    async fn push(&self, to: &str);
}

// =============================================================================
// ROUTES
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Home,
    UserBoards,
    Board(String),
    NotFound,
}

impl Route {
    /// Match a path against the route table. `None` when nothing matches.
    #[must_use]
    pub fn resolve(path: &str) -> Option<Self> {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            return Some(Self::Home);
        }
        let segment = trimmed.strip_prefix('/')?;
        match segment {
            "user" => Some(Self::UserBoards),
            "404" => Some(Self::NotFound),
            id if !id.contains('/') => {
                let id = urlencoding::decode(id).map_or_else(|_| id.to_string(), Cow::into_owned);
                Some(Self::Board(id))
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn requires_auth(&self) -> bool {
        matches!(self, Self::UserBoards | Self::Board(_))
    }

    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Home => HOME_PATH.to_string(),
            Self::UserBoards => USER_PATH.to_string(),
            Self::Board(id) => format!("/{}", urlencoding::encode(id)),
            Self::NotFound => NOT_FOUND_PATH.to_string(),
        }
    }
}

// =============================================================================
// LOCATION
// =============================================================================

/// A path plus decoded query parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub query: BTreeMap<String, String>,
}

impl Location {
    #[must_use]
    pub fn parse(full: &str) -> Self {
        let (path, raw_query) = full.split_once('?').unwrap_or((full, ""));
        let query = raw_query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                (decode(k), decode(v))
            })
            .collect();
        let path = if path.is_empty() { HOME_PATH.to_string() } else { path.to_string() };
        Self { path, query }
    }

    #[must_use]
    pub fn with_query(path: &str, key: &str, value: &str) -> Self {
        let mut query = BTreeMap::new();
        query.insert(key.to_string(), value.to_string());
        Self { path: path.to_string(), query }
    }

    #[must_use]
    pub fn route(&self) -> Option<Route> {
        Route::resolve(&self.path)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        for (i, (k, v)) in self.query.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{}={}", urlencoding::encode(k), urlencoding::encode(v))?;
        }
        Ok(())
    }
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).map_or_else(|_| spaced.clone(), Cow::into_owned)
}

// =============================================================================
// GUARD
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Guard {
    Proceed,
    Redirect(Location),
}

/// Decide whether navigation to `to` may proceed for `user`.
///
/// - Auth-required routes send anonymous visitors to `/?redirect={to}`.
///   Unmatched paths count as auth-required.
/// - Unmatched paths send signed-in visitors to `/404`.
/// - Signed-in visitors to `/` continue to `redirect` or `/user`.
#[must_use]
pub fn guard(to: &Location, user: Option<&User>) -> Guard {
    let Some(route) = to.route() else {
        if user.is_none() {
            return sign_in_redirect(to);
        }
        return Guard::Redirect(Location::parse(NOT_FOUND_PATH));
    };

    if !route.requires_auth() {
        if user.is_some() && route == Route::Home {
            let target = to.query.get("redirect").map_or(USER_PATH, String::as_str);
            return Guard::Redirect(Location::parse(target));
        }
        return Guard::Proceed;
    }

    if user.is_some() {
        return Guard::Proceed;
    }

    sign_in_redirect(to)
}

fn sign_in_redirect(to: &Location) -> Guard {
    Guard::Redirect(Location::with_query(HOME_PATH, "redirect", &to.to_string()))
}

// =============================================================================
// ROUTER
// =============================================================================

/// In-process router holding the current location.
pub struct Router {
    auth: AuthSession,
    location: watch::Sender<Location>,
}

impl Router {
    #[must_use]
    pub fn new(auth: AuthSession) -> Self {
        let (location, _rx) = watch::channel(Location::parse(HOME_PATH));
        Self { auth, location }
    }

    #[must_use]
    pub fn current(&self) -> Location {
        self.location.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Location> {
        self.location.subscribe()
    }

    /// Run the guard chain from `to` and return the final location.
    fn resolve(to: Location, user: Option<&User>) -> Location {
        let mut target = to;
        for _ in 0..MAX_REDIRECTS {
            match guard(&target, user) {
                Guard::Proceed => return target,
                Guard::Redirect(next) => {
                    debug!(from = %target, to = %next, "route guard redirect");
                    target = next;
                }
            }
        }
        target
    }
}

#[async_trait]
impl Navigator for Router {
    async fn push(&self, to: &str) {
        let user = self.auth.auth_ready().await;
        let target = Self::resolve(Location::parse(to), user.as_ref());
        info!(requested = to, location = %target, "navigate");
        self.location.send_replace(target);
    }
}
