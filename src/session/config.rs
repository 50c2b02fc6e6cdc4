use chrono::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    None,
    #[default]
    Lax,
}

impl SameSite {
    pub fn as_str(self) -> &'static str {
        match self {
            SameSite::None => "None",
            SameSite::Lax => "Lax",
        }
    }
}

/// Settings for the `access_token` / `refresh_token` cookies.
#[derive(Debug, Clone)]
pub struct CookieConfig {
    /// Write the cookies at all.
    pub enabled: bool,
    pub access_cookie_name: String,
    pub refresh_cookie_name: String,
    pub cookie_path: String,
    pub cookie_domain: Option<String>,
    /// Backend lives on another site: `SameSite=None; Secure`.
    pub cross_site: bool,
    /// Set `Secure` even when the API is not served over HTTPS.
    pub force_secure: bool,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            access_cookie_name: "access_token".to_owned(),
            refresh_cookie_name: "refresh_token".to_owned(),
            cookie_path: "/".to_owned(),
            cookie_domain: None,
            cross_site: false,
            force_secure: false,
            access_token_ttl: Duration::minutes(10),
            refresh_token_ttl: Duration::days(7),
        }
    }
}

impl CookieConfig {
    pub fn same_site(&self) -> SameSite {
        if self.cross_site {
            SameSite::None
        } else {
            SameSite::Lax
        }
    }

    /// `SameSite=None` is only accepted by browsers together with `Secure`.
    pub fn secure(&self, https: bool) -> bool {
        https || self.force_secure || self.cross_site
    }
}
