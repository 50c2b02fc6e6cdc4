//! Client-side session management for REST backends.
//!
//! `tether` keeps an authenticated identity alive on the client: it persists
//! the session across restarts, renews the access token in the background
//! with a refresh token, and attaches the current token to every API call.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tether::{ReqwestTransport, SessionManager, TetherConfig};
//!
//! let config = TetherConfig::from_env()?;
//! let transport = ReqwestTransport::new(&config)?;
//! let manager = SessionManager::new(config, transport)?;
//!
//! manager.login("ada@example.com", "hunter2").await?;
//!
//! let client = manager.client();
//! let projects = client.get("/projects").await?;
//! ```

pub mod client;
pub mod config;
pub mod events;
pub mod manager;
pub mod normalize;
pub mod renewal;
pub mod secret;
pub mod session;
pub mod sync;
pub mod transport;

use std::fmt;

pub use client::AuthorizedClient;
pub use config::{CookieConfig, RenewalOptions, TetherConfig};
pub use manager::{SessionManager, SessionManagerBuilder};
pub use normalize::UserProfile;
pub use renewal::{RenewalOutcome, RenewalState, SkipReason};
pub use secret::SecretString;
pub use session::{
    CookieChannel, FileStorage, MemoryStorage, SameSite, Session, SessionStorage, SessionStore,
};
pub use sync::{AuthWatcher, PageVisibility, SyncTrigger};
pub use transport::{
    ApiRequest, ApiResponse, AuthTransport, LoginResponse, RefreshResponse, ReqwestTransport,
    TransportError,
};

#[cfg(any(test, feature = "mocks"))]
pub use transport::MockTransport;

/// Errors surfaced by the session manager.
///
/// Renewal failures are not errors; they are reported through
/// [`RenewalOutcome`] and events.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Login was rejected; carries the server's message when it sent one.
    InvalidCredentials(String),
    /// A request was still unauthorized after one refresh-and-retry.
    Unauthorized,
    Transport(TransportError),
    Storage(String),
    Serialization(String),
    InvalidConfig(String),
}

impl std::error::Error for SessionError {}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::InvalidCredentials(msg) => write!(f, "Login failed: {}", msg),
            SessionError::Unauthorized => write!(f, "Request unauthorized"),
            SessionError::Transport(err) => write!(f, "Transport error: {}", err),
            SessionError::Storage(msg) => write!(f, "Storage error: {}", msg),
            SessionError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            SessionError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        SessionError::Transport(err)
    }
}
