mod config;
mod cookie;
mod file_store;
mod memory_store;
mod storage;
mod store;

pub use config::{CookieConfig, SameSite};
pub use cookie::CookieChannel;
pub use file_store::FileStorage;
pub use memory_store::MemoryStorage;
pub use storage::SessionStorage;
pub use store::SessionStore;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::SecretString;
use crate::normalize::UserProfile;

/// The authenticated identity and its credential pair.
///
/// Serializes to the persisted `userData` layout: snake_case profile fields,
/// both tokens, and any other profile fields the backend sent, passed through
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<SecretString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<SecretString>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Session {
    /// Builds a session from a normalized profile and a fresh token pair.
    pub fn from_login(
        profile: UserProfile,
        access_token: SecretString,
        refresh_token: Option<SecretString>,
    ) -> Self {
        Self {
            user_id: profile.user_id,
            role: profile.role,
            email: profile.email,
            full_name: profile.full_name,
            access_token: Some(access_token),
            refresh_token,
            extra: profile.extra,
        }
    }

    /// The usable access token, if any. Empty strings count as absent.
    pub fn access_token(&self) -> Option<&SecretString> {
        self.access_token.as_ref().filter(|t| !t.is_empty())
    }

    /// The usable refresh token, if any. Empty strings count as absent.
    pub fn refresh_token(&self) -> Option<&SecretString> {
        self.refresh_token.as_ref().filter(|t| !t.is_empty())
    }

    pub fn has_user(&self) -> bool {
        self.user_id.is_some_and(|id| id != 0)
    }

    /// The authentication predicate: a user identity and an access token
    /// must both be present.
    pub fn is_authenticated(&self) -> bool {
        self.has_user() && self.access_token().is_some()
    }

    /// Case-insensitive role membership.
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        let Some(role) = self.role.as_deref().map(str::trim) else {
            return false;
        };
        roles.iter().any(|r| r.trim().eq_ignore_ascii_case(role))
    }
}
