//! Authorized API calls.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::manager::SessionManager;
use crate::transport::{ApiRequest, ApiResponse, AuthTransport};
use crate::SessionError;

/// Attaches the session's access token to every request.
///
/// A `401` triggers one token refresh and one retry of the same request. A
/// second `401`, or a refresh that yields no new token, is returned as
/// [`SessionError::Unauthorized`]; the session is left as it is.
///
/// Concurrent `401`s share a single refresh: callers whose token was already
/// replaced by another caller retry straight away.
pub struct AuthorizedClient<T: AuthTransport> {
    manager: SessionManager<T>,
}

impl<T: AuthTransport> Clone for AuthorizedClient<T> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
        }
    }
}

impl<T: AuthTransport> AuthorizedClient<T> {
    pub fn new(manager: SessionManager<T>) -> Self {
        Self { manager }
    }

    /// Sends `request`, refreshing and retrying once on `401`.
    ///
    /// Other non-success statuses are returned as responses; use
    /// [`ApiResponse::error_for_status`] to turn them into errors.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Unauthorized`] when the request is still rejected
    ///   after a refresh, or no refresh was possible
    /// - [`SessionError::Transport`] when the request could not be sent
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "api_request", skip_all, fields(method = %request.method, path = %request.path))
    )]
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        let transport = self.manager.transport();

        let token = self.manager.access_token();
        let response = transport.execute(&request, token.as_ref()).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        log::debug!(
            target: "tether::client",
            "msg=\"request rejected, refreshing\" method={} path=\"{}\"",
            request.method,
            request.path
        );
        let outcome = self.manager.refresh_after_unauthorized(token.as_ref()).await;
        if !outcome.has_fresh_token() {
            log::debug!(
                target: "tether::client",
                "msg=\"no fresh token, giving up\" outcome={:?}",
                outcome
            );
            return Err(SessionError::Unauthorized);
        }

        let token = self.manager.access_token();
        let retried = transport.execute(&request, token.as_ref()).await?;
        if retried.is_unauthorized() {
            log::warn!(
                target: "tether::client",
                "msg=\"request rejected after refresh\" method={} path=\"{}\"",
                request.method,
                request.path
            );
            return Err(SessionError::Unauthorized);
        }
        Ok(retried)
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, SessionError> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<ApiResponse, SessionError> {
        self.send(ApiRequest::post(path, body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<ApiResponse, SessionError> {
        self.send(ApiRequest::put(path, body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<ApiResponse, SessionError> {
        self.send(ApiRequest::patch(path, body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, SessionError> {
        self.send(ApiRequest::delete(path)).await
    }

    /// `GET` and decode a successful JSON body.
    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, SessionError> {
        self.get(path).await?.json()
    }
}
