//! Wire protocol between the session manager and the backend.
//!
//! | Call | Request | Response |
//! |------|---------|----------|
//! | login | `POST /auth/login` `{email, password}` | `{user, access_token, refresh_token}` or `{detail\|message}` |
//! | refresh | `POST /auth/refresh` `{refresh_token}` | `{access_token, refresh_token?}` |
//! | anything else | `Authorization: Bearer <access_token>` | any |
//!
//! [`AuthTransport`] is the seam; [`ReqwestTransport`] talks HTTP and
//! [`MockTransport`] (tests or the `mocks` feature) scripts responses.

mod http;
#[cfg(any(test, feature = "mocks"))]
mod mock;

pub use http::ReqwestTransport;
#[cfg(any(test, feature = "mocks"))]
pub use mock::{MockTransport, RefreshBehavior};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{SecretString, SessionError};

#[async_trait]
pub trait AuthTransport: Send + Sync + 'static {
    /// Exchanges credentials for a session.
    async fn login(&self, email: &str, password: &SecretString)
    -> Result<LoginResponse, TransportError>;

    /// Exchanges a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &SecretString)
    -> Result<RefreshResponse, TransportError>;

    /// Sends an API request. Every HTTP status is a successful `Ok`; only
    /// failures to get a response at all are errors.
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&SecretString>,
    ) -> Result<ApiResponse, TransportError>;

    /// Cookie jar shared with the HTTP client, if the transport has one.
    fn cookie_jar(&self) -> Option<Arc<Jar>> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// No response: connection, DNS, TLS or timeout failure.
    Network(String),
    /// The server answered with a non-success status.
    Status { status: u16, message: Option<String> },
    /// The response body did not have the expected shape.
    Decode(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl std::error::Error for TransportError {}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Network(msg) => write!(f, "network error: {}", msg),
            TransportError::Status {
                status,
                message: Some(msg),
            } => write!(f, "HTTP {}: {}", status, msg),
            TransportError::Status {
                status,
                message: None,
            } => write!(f, "HTTP {}", status),
            TransportError::Decode(msg) => write!(f, "invalid response: {}", msg),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    /// The raw user record, normalized later by the manager.
    pub user: Value,
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
}

impl LoginResponse {
    /// Parses a login body. Backends that put the user fields at the top
    /// level instead of under `user` are accepted too.
    pub fn from_body(body: Value) -> Result<Self, TransportError> {
        let access_token = token_field(&body, "access_token")
            .ok_or_else(|| TransportError::Decode("login response has no access_token".to_owned()))?;
        let refresh_token = token_field(&body, "refresh_token");
        let user = match body.get("user") {
            Some(user) if user.is_object() => user.clone(),
            _ => body,
        };
        Ok(Self {
            user,
            access_token,
            refresh_token,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshResponse {
    pub access_token: SecretString,
    /// Present only when the server rotates refresh tokens.
    pub refresh_token: Option<SecretString>,
}

impl RefreshResponse {
    pub fn from_body(body: &Value) -> Result<Self, TransportError> {
        let access_token = token_field(body, "access_token").ok_or_else(|| {
            TransportError::Decode("refresh response has no access_token".to_owned())
        })?;
        Ok(Self {
            access_token,
            refresh_token: token_field(body, "refresh_token"),
        })
    }
}

fn token_field(body: &Value, key: &str) -> Option<SecretString> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(SecretString::from)
}

/// Extracts a human-readable error from `{detail}` or `{message}` bodies.
///
/// `detail` may also be a list of validation errors carrying `msg` fields.
pub fn error_message(body: &Value) -> Option<String> {
    match body.get("detail") {
        Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
        Some(Value::Array(items)) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            if !msgs.is_empty() {
                return Some(msgs.join("; "));
            }
        }
        _ => {}
    }
    ["message", "error"]
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// An API call relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).json(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).json(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PATCH, path).json(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    /// Parsed JSON body; `Null` when empty, a JSON string when not JSON.
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    /// Turns a non-success status into an error carrying the server message.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] with [`TransportError::Status`].
    pub fn error_for_status(self) -> Result<Self, SessionError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(SessionError::Transport(TransportError::Status {
            status: self.status.as_u16(),
            message: error_message(&self.body),
        }))
    }

    /// Decodes the body of a successful response.
    ///
    /// # Errors
    ///
    /// Fails on a non-success status or a body of the wrong shape.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, SessionError> {
        let response = self.error_for_status()?;
        serde_json::from_value(response.body)
            .map_err(|e| SessionError::Serialization(e.to_string()))
    }
}
