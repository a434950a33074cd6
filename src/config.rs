//! Backend connection parameters parsed from environment variables.
//!
//! Values are passed through to the database and identity clients as-is;
//! only presence of the two required keys is checked.

pub const DEFAULT_AUTH_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub database_url: String,
    pub auth_url: String,
    pub auth_domain: Option<String>,
    pub project_id: Option<String>,
    pub storage_bucket: Option<String>,
    pub messaging_sender_id: Option<String>,
    pub app_id: Option<String>,
    pub timeouts: Timeouts,
}

impl FirebaseConfig {
    /// Build typed config from the process environment.
    ///
    /// Required:
    /// - `FIREBASE_API_KEY`
    /// - `FIREBASE_DB_URL`
    ///
    /// Optional:
    /// - `FIREBASE_AUTH_URL`: identity endpoint base, default Google's
    /// - `FIREBASE_AUTH_DOMAIN`, `FIREBASE_PROJECT_ID`, `FIREBASE_STORAGE_BUCKET`,
    ///   `FIREBASE_MESSAGING_SENDER_ID`, `FIREBASE_APP_ID`
    /// - `FIREBASE_REQUEST_TIMEOUT_SECS`: default 30
    /// - `FIREBASE_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when a required variable is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an explicit variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when a required variable is unset.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_empty("FIREBASE_API_KEY").ok_or(ConfigError::Missing("FIREBASE_API_KEY"))?;
        let database_url = non_empty("FIREBASE_DB_URL")
            .ok_or(ConfigError::Missing("FIREBASE_DB_URL"))?
            .trim_end_matches('/')
            .to_string();
        let auth_url = non_empty("FIREBASE_AUTH_URL")
            .unwrap_or_else(|| DEFAULT_AUTH_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let timeouts = Timeouts {
            request_secs: parse_u64(non_empty("FIREBASE_REQUEST_TIMEOUT_SECS"), DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_u64(non_empty("FIREBASE_CONNECT_TIMEOUT_SECS"), DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self {
            api_key,
            database_url,
            auth_url,
            auth_domain: non_empty("FIREBASE_AUTH_DOMAIN"),
            project_id: non_empty("FIREBASE_PROJECT_ID"),
            storage_bucket: non_empty("FIREBASE_STORAGE_BUCKET"),
            messaging_sender_id: non_empty("FIREBASE_MESSAGING_SENDER_ID"),
            app_id: non_empty("FIREBASE_APP_ID"),
            timeouts,
        })
    }
}

fn parse_u64(raw: Option<String>, default: u64) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok()).unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
