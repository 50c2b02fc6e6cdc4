//! Configuration for the session manager.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use tether::config::{RenewalOptions, TetherConfig};
//!
//! let config = TetherConfig {
//!     renewal: RenewalOptions {
//!         interval: Duration::from_secs(600),
//!         ..Default::default()
//!     },
//!     ..TetherConfig::new("https://hr.example.com/api/")
//! };
//!
//! assert_eq!(config.api_base_url, "https://hr.example.com/api");
//! ```

use std::env;
use std::time::Duration;

use reqwest::Url;

use crate::SessionError;
pub use crate::session::CookieConfig;

/// Storage key the session is persisted under.
pub const DEFAULT_STORAGE_KEY: &str = "userData";

/// Default renewal period.
pub const DEFAULT_RENEWAL_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct TetherConfig {
    /// Base API URL without trailing slashes.
    pub api_base_url: String,

    /// Key of the persisted session in both storages.
    ///
    /// Default: `userData`
    pub storage_key: String,

    /// Transport timeout for every HTTP call.
    ///
    /// Default: 30 seconds
    pub request_timeout: Duration,

    /// Options used when the manager starts renewal on its own (after login
    /// or restore).
    pub renewal: RenewalOptions,

    /// Secondary cookie channel settings.
    pub cookies: CookieConfig,
}

impl TetherConfig {
    /// Creates a configuration for the given base URL with default settings.
    pub fn new(api_base_url: impl AsRef<str>) -> Self {
        Self {
            api_base_url: normalize_base_url(api_base_url.as_ref()),
            storage_key: DEFAULT_STORAGE_KEY.to_owned(),
            request_timeout: Duration::from_secs(30),
            renewal: RenewalOptions::default(),
            cookies: CookieConfig::default(),
        }
    }

    /// Local development against a backend on `localhost:8000`.
    ///
    /// Renews every ten minutes, also while hidden, and sets cookies
    /// without `Secure`.
    pub fn development() -> Self {
        Self {
            renewal: RenewalOptions {
                interval: Duration::from_secs(10 * 60),
                run_immediately: true,
                skip_when_hidden: false,
            },
            cookies: CookieConfig {
                force_secure: false,
                ..CookieConfig::default()
            },
            ..Self::new("http://localhost:8000")
        }
    }

    /// Shorter timeouts and an immediate renewal on start.
    pub fn strict(api_base_url: impl AsRef<str>) -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            renewal: RenewalOptions {
                interval: DEFAULT_RENEWAL_INTERVAL,
                run_immediately: true,
                skip_when_hidden: true,
            },
            cookies: CookieConfig {
                access_token_ttl: chrono::Duration::minutes(5),
                refresh_token_ttl: chrono::Duration::days(1),
                force_secure: true,
                ..CookieConfig::default()
            },
            ..Self::new(api_base_url)
        }
    }

    /// Reads the configuration from the environment.
    ///
    /// | Variable | Meaning |
    /// |----------|---------|
    /// | `TETHER_API_BASE_URL` | base API URL (required) |
    /// | `TETHER_RENEWAL_INTERVAL_SECS` | renewal period in seconds |
    /// | `TETHER_CROSS_SITE_COOKIES` | `true` for `SameSite=None; Secure` cookies |
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] when the base URL is missing or
    /// a value cannot be parsed.
    pub fn from_env() -> Result<Self, SessionError> {
        let base = env::var("TETHER_API_BASE_URL").map_err(|_| {
            SessionError::InvalidConfig("TETHER_API_BASE_URL is not set".to_owned())
        })?;
        let mut config = Self::new(base);

        if let Ok(raw) = env::var("TETHER_RENEWAL_INTERVAL_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                SessionError::InvalidConfig(format!(
                    "TETHER_RENEWAL_INTERVAL_SECS must be an integer, got {raw:?}"
                ))
            })?;
            config.renewal.interval = Duration::from_secs(secs);
        }

        if let Ok(raw) = env::var("TETHER_CROSS_SITE_COOKIES") {
            config.cookies.cross_site = matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            );
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the manager cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.api_base_url.is_empty() {
            return Err(SessionError::InvalidConfig(
                "api_base_url must not be empty".to_owned(),
            ));
        }
        Url::parse(&self.api_base_url).map_err(|e| {
            SessionError::InvalidConfig(format!("api_base_url is not a valid URL: {e}"))
        })?;
        if self.renewal.interval.is_zero() {
            return Err(SessionError::InvalidConfig(
                "renewal interval must be greater than zero".to_owned(),
            ));
        }
        if self.storage_key.is_empty()
            || !self
                .storage_key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(SessionError::InvalidConfig(format!(
                "storage_key {:?} must be non-empty and alphanumeric",
                self.storage_key
            )));
        }
        Ok(())
    }

    /// Whether the API is served over HTTPS.
    pub fn is_https(&self) -> bool {
        self.api_base_url.starts_with("https://")
    }

    /// Joins a request path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        join_url(&self.api_base_url, path)
    }
}

impl Default for TetherConfig {
    fn default() -> Self {
        Self::development()
    }
}

/// Per-caller renewal settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalOptions {
    /// Period between renewal ticks.
    ///
    /// Default: 5 minutes
    pub interval: Duration,

    /// Fire one renewal right away instead of waiting a full interval.
    pub run_immediately: bool,

    /// Skip ticks while the page is hidden.
    pub skip_when_hidden: bool,
}

impl Default for RenewalOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RENEWAL_INTERVAL,
            run_immediately: false,
            skip_when_hidden: true,
        }
    }
}

impl RenewalOptions {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn immediately(mut self) -> Self {
        self.run_immediately = true;
        self
    }

    #[must_use]
    pub fn while_hidden(mut self) -> Self {
        self.skip_when_hidden = false;
        self
    }
}

/// Strips trailing slashes (and surrounding whitespace) from a base URL.
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_owned()
}

/// Joins `path` onto an already normalized base URL.
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_owned();
    }
    format!("{}/{}", base, path.trim_start_matches('/'))
}
