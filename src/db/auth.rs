//! Authentication: the observable signed-in identity and password sign-in.
//!
//! DESIGN
//! ======
//! `AuthSession` is the single source of the current user. Everything that
//! depends on identity (the board subscription, route guards, request auth
//! tokens) reads it through a `watch` channel, so a sign-out is seen by all
//! of them without extra wiring.
//!
//! ERROR HANDLING
//! ==============
//! A failed sign-in still resolves the initial auth state (as signed out) so
//! navigation waiting on `auth_ready` is not left hanging.

#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::FirebaseConfig;
use crate::routes::{HOME_PATH, Navigator};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("sign-in request failed: {0}")]
    Request(String),

    /// The identity endpoint answered with an error envelope.
    #[error("sign-in rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("sign-in response parse failed: {0}")]
    Parse(String),

    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

/// A signed-in user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub uid: String,
    pub email: Option<String>,
    /// Bearer token attached to database requests.
    pub id_token: String,
}

/// Current authentication state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthState {
    pub user: Option<User>,
    /// True until the initial auth state has been resolved.
    pub loading: bool,
}

// =============================================================================
// SESSION
// =============================================================================

/// Shared handle to the signed-in identity. Clones observe the same state.
#[derive(Clone, Debug)]
pub struct AuthSession {
    state: Arc<watch::Sender<AuthState>>,
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthSession {
    /// A session whose initial state is still unresolved.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthState { user: None, loading: true });
        Self { state: Arc::new(tx) }
    }

    /// A session already resolved to `user`.
    #[must_use]
    pub fn resolved(user: Option<User>) -> Self {
        let session = Self::new();
        session.set_user(user);
        session
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    #[must_use]
    pub fn id_token(&self) -> Option<String> {
        self.state.borrow().user.as_ref().map(|u| u.id_token.clone())
    }

    /// Replace the identity and mark auth as resolved.
    pub fn set_user(&self, user: Option<User>) {
        self.state.send_modify(|state| {
            state.user = user;
            state.loading = false;
        });
    }

    /// Wait for the initial auth state, then return the current user.
    pub async fn auth_ready(&self) -> Option<User> {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|state| !state.loading).await {
            Ok(state) => state.user.clone(),
            Err(_) => None,
        }
    }

    /// Sign in with email and password and publish the resulting identity.
    ///
    /// # Errors
    ///
    /// Returns the client error when the request or credentials fail.
    pub async fn sign_in(&self, client: &AuthClient, email: &str, password: &str) -> Result<User, AuthError> {
        match client.sign_in_with_password(email, password).await {
            Ok(user) => {
                info!(uid = %user.uid, "signed in");
                self.set_user(Some(user.clone()));
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, "sign-in failed");
                let unresolved = self.state.borrow().loading;
                if unresolved {
                    self.set_user(None);
                }
                Err(e)
            }
        }
    }

    /// Drop the identity and navigate to the landing route.
    pub async fn sign_out(&self, nav: &dyn Navigator) {
        if let Some(user) = self.current_user() {
            info!(uid = %user.uid, "signed out");
        }
        self.set_user(None);
        nav.push(HOME_PATH).await;
    }
}

// =============================================================================
// IDENTITY CLIENT
// =============================================================================

/// Password sign-in against the identity REST endpoint.
pub struct AuthClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AuthClient {
    /// # Errors
    ///
    /// Returns [`AuthError::HttpClientBuild`] if the HTTP client cannot be built.
    pub fn new(config: &FirebaseConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| AuthError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, api_key: config.api_key.clone(), base_url: config.auth_url.clone() })
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or the credentials are rejected.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let url = format!("{}/accounts:signInWithPassword", self.base_url);
        let body = SignInRequest { email, password, return_secure_token: true };

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        parse_sign_in_response(status, &text)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    id_token: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn parse_sign_in_response(status: u16, body: &str) -> Result<User, AuthError> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<ErrorEnvelope>(body)
            .map(|env| env.error.message)
            .unwrap_or_else(|_| body.to_string());
        return Err(AuthError::Rejected { status, message });
    }

    let parsed: SignInResponse = serde_json::from_str(body).map_err(|e| AuthError::Parse(e.to_string()))?;
    Ok(User { uid: parsed.local_id, email: parsed.email, id_token: parsed.id_token })
}
