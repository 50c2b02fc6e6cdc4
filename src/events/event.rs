use chrono::{DateTime, Utc};

/// Session lifecycle events emitted by the manager.
///
/// Events carry no tokens. If no listeners are registered they are dropped.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    // authentication
    LoginSuccess {
        user_id: Option<i64>,
        email: String,
        at: DateTime<Utc>,
    },
    LoginFailed {
        email: String,
        reason: String,
        at: DateTime<Utc>,
    },
    LoggedOut {
        user_id: Option<i64>,
        at: DateTime<Utc>,
    },

    // renewal
    TokenRenewed {
        user_id: Option<i64>,
        rotated: bool,
        at: DateTime<Utc>,
    },
    RenewalFailed {
        user_id: Option<i64>,
        reason: String,
        at: DateTime<Utc>,
    },

    // state
    SessionCleared {
        at: DateTime<Utc>,
    },
    AuthStateChanged {
        authenticated: bool,
        at: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Returns a dot-separated event name for logging/tracing.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoginSuccess { .. } => "session.login.success",
            Self::LoginFailed { .. } => "session.login.failed",
            Self::LoggedOut { .. } => "session.logout",
            Self::TokenRenewed { .. } => "session.token.renewed",
            Self::RenewalFailed { .. } => "session.token.renewal_failed",
            Self::SessionCleared { .. } => "session.cleared",
            Self::AuthStateChanged { .. } => "session.auth_state.changed",
        }
    }

    /// Returns the timestamp when this event occurred.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::LoginSuccess { at, .. }
            | Self::LoginFailed { at, .. }
            | Self::LoggedOut { at, .. }
            | Self::TokenRenewed { at, .. }
            | Self::RenewalFailed { at, .. }
            | Self::SessionCleared { at }
            | Self::AuthStateChanged { at, .. } => *at,
        }
    }
}
