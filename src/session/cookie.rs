//! Secondary cookie channel for backends that read credentials from cookies.
//!
//! Cookies are written into a [`reqwest::cookie::Jar`] shared with the HTTP
//! client. They are never read back: the persisted session is the single
//! source of truth for tokens.

use std::sync::Arc;

use reqwest::Url;
use reqwest::cookie::Jar;

use super::config::CookieConfig;
use crate::{SecretString, SessionError};

#[derive(Clone)]
pub struct CookieChannel {
    jar: Arc<Jar>,
    url: Url,
    config: CookieConfig,
}

impl CookieChannel {
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] if `api_base_url` does not parse.
    pub fn new(
        jar: Arc<Jar>,
        api_base_url: &str,
        config: CookieConfig,
    ) -> Result<Self, SessionError> {
        let url = Url::parse(api_base_url)
            .map_err(|e| SessionError::InvalidConfig(format!("invalid cookie url: {e}")))?;
        Ok(Self { jar, url, config })
    }

    pub fn jar(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }

    pub fn set_access_token(&self, token: &SecretString) {
        let max_age = self.config.access_token_ttl.num_seconds();
        self.write(&self.config.access_cookie_name, token.expose_secret(), max_age);
    }

    pub fn set_refresh_token(&self, token: &SecretString) {
        let max_age = self.config.refresh_token_ttl.num_seconds();
        self.write(&self.config.refresh_cookie_name, token.expose_secret(), max_age);
    }

    pub fn expire_access_token(&self) {
        self.write(&self.config.access_cookie_name, "", 0);
    }

    pub fn expire_all(&self) {
        self.write(&self.config.access_cookie_name, "", 0);
        self.write(&self.config.refresh_cookie_name, "", 0);
    }

    fn write(&self, name: &str, value: &str, max_age: i64) {
        if !self.config.enabled {
            return;
        }
        let cookie = self.cookie_string(name, value, max_age);
        self.jar.add_cookie_str(&cookie, &self.url);
        log::debug!(
            target: "tether::cookie",
            "msg=\"cookie written\" name=\"{}\" max_age={}",
            name,
            max_age
        );
    }

    /// Renders a `Set-Cookie` value with the configured attributes.
    pub fn cookie_string(&self, name: &str, value: &str, max_age: i64) -> String {
        let mut cookie = format!(
            "{}={}; Path={}; Max-Age={}; SameSite={}",
            name,
            value,
            self.config.cookie_path,
            max_age.max(0),
            self.config.same_site().as_str()
        );
        if let Some(domain) = &self.config.cookie_domain {
            cookie.push_str("; Domain=");
            cookie.push_str(domain);
        }
        if self.config.secure(self.url.scheme() == "https") {
            cookie.push_str("; Secure");
        }
        cookie
    }
}
