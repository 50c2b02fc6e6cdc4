use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Response};
use serde_json::{Value, json};

use super::{
    ApiRequest, ApiResponse, AuthTransport, LoginResponse, RefreshResponse, TransportError,
    error_message,
};
use crate::config::{TetherConfig, join_url};
use crate::{SecretString, SessionError};

/// HTTP transport over `reqwest`.
///
/// The client shares its cookie jar with the session's cookie channel, so
/// backends that read `access_token` / `refresh_token` cookies see them on
/// every request.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
    jar: Arc<Jar>,
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] if the client cannot be built.
    pub fn new(config: &TetherConfig) -> Result<Self, SessionError> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SessionError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
            jar,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<(u16, Value), TransportError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(network_error)?;
        let status = response.status().as_u16();
        Ok((status, read_body(response).await?))
    }
}

#[async_trait]
impl AuthTransport for ReqwestTransport {
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "login", skip_all, err)
    )]
    async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<LoginResponse, TransportError> {
        let body = json!({ "email": email, "password": password.expose_secret() });
        let (status, body) = self.post_json("/auth/login", &body).await?;
        if !(200..300).contains(&status) {
            return Err(TransportError::Status {
                status,
                message: error_message(&body),
            });
        }
        LoginResponse::from_body(body)
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "refresh", skip_all, err)
    )]
    async fn refresh(
        &self,
        refresh_token: &SecretString,
    ) -> Result<RefreshResponse, TransportError> {
        let body = json!({ "refresh_token": refresh_token.expose_secret() });
        let (status, body) = self.post_json("/auth/refresh", &body).await?;
        if !(200..300).contains(&status) {
            return Err(TransportError::Status {
                status,
                message: error_message(&body),
            });
        }
        RefreshResponse::from_body(&body)
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "api_request", skip_all, fields(method = %request.method, path = %request.path), err)
    )]
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&SecretString>,
    ) -> Result<ApiResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), self.url(&request.path));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = bearer {
            builder = builder.header(AUTHORIZATION, token.bearer());
        }

        let response = builder.send().await.map_err(network_error)?;
        let status = response.status();
        Ok(ApiResponse::new(status, read_body(response).await?))
    }

    fn cookie_jar(&self) -> Option<Arc<Jar>> {
        Some(Arc::clone(&self.jar))
    }
}

fn network_error(e: reqwest::Error) -> TransportError {
    TransportError::Network(e.to_string())
}

async fn read_body(response: Response) -> Result<Value, TransportError> {
    let text = response.text().await.map_err(network_error)?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}
