#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};

use super::{
    ApiRequest, ApiResponse, AuthTransport, LoginResponse, RefreshResponse, TransportError,
};
use crate::SecretString;

/// What the mock does when asked to refresh.
#[derive(Debug, Clone)]
pub enum RefreshBehavior {
    /// Issue `a{n}` / `r{n}` with an increasing `n`, starting at 2.
    Rotate,
    /// Always answer with this pair.
    Respond(RefreshResponse),
    /// Always fail.
    Fail(TransportError),
}

struct MockState {
    users: HashMap<String, (String, Value)>,
    refresh: RefreshBehavior,
    refresh_delay: Option<Duration>,
    reject_requests: bool,
    next_token: u32,
    valid_access: HashSet<String>,
    login_calls: usize,
    refresh_calls: usize,
    execute_calls: usize,
    seen_refresh_tokens: Vec<String>,
    seen_bearers: Vec<Option<String>>,
}

/// In-memory backend for tests.
///
/// Protected requests answer `200` when the bearer token is one the mock
/// issued (or was told about via [`grant_access`](Self::grant_access)) and
/// `401` otherwise. Clones share state.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                users: HashMap::new(),
                refresh: RefreshBehavior::Rotate,
                refresh_delay: None,
                reject_requests: false,
                next_token: 2,
                valid_access: HashSet::new(),
                login_calls: 0,
                refresh_calls: 0,
                execute_calls: 0,
                seen_refresh_tokens: Vec::new(),
                seen_bearers: Vec::new(),
            })),
        }
    }

    /// Registers an account; login returns `user` with tokens `a1` / `r1`.
    #[must_use]
    pub fn with_user(self, email: &str, password: &str, user: Value) -> Self {
        self.state
            .lock()
            .unwrap()
            .users
            .insert(email.to_owned(), (password.to_owned(), user));
        self
    }

    pub fn set_refresh_behavior(&self, behavior: RefreshBehavior) {
        self.state.lock().unwrap().refresh = behavior;
    }

    pub fn respond_to_refresh(&self, access: &str, refresh: Option<&str>) {
        self.set_refresh_behavior(RefreshBehavior::Respond(RefreshResponse {
            access_token: access.into(),
            refresh_token: refresh.map(SecretString::from),
        }));
    }

    pub fn fail_refresh(&self, error: TransportError) {
        self.set_refresh_behavior(RefreshBehavior::Fail(error));
    }

    /// Makes every refresh take `delay` before answering.
    pub fn set_refresh_delay(&self, delay: Duration) {
        self.state.lock().unwrap().refresh_delay = Some(delay);
    }

    /// Answers every protected request with `401`, whatever the token.
    pub fn reject_requests(&self, reject: bool) {
        self.state.lock().unwrap().reject_requests = reject;
    }

    pub fn grant_access(&self, token: &str) {
        self.state.lock().unwrap().valid_access.insert(token.to_owned());
    }

    pub fn revoke_access(&self, token: &str) {
        self.state.lock().unwrap().valid_access.remove(token);
    }

    pub fn login_calls(&self) -> usize {
        self.state.lock().unwrap().login_calls
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.lock().unwrap().refresh_calls
    }

    pub fn execute_calls(&self) -> usize {
        self.state.lock().unwrap().execute_calls
    }

    pub fn seen_refresh_tokens(&self) -> Vec<String> {
        self.state.lock().unwrap().seen_refresh_tokens.clone()
    }

    /// Bearer tokens of every executed request, in order.
    pub fn seen_bearers(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().seen_bearers.clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthTransport for MockTransport {
    async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<LoginResponse, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.login_calls += 1;

        let user = state
            .users
            .get(email)
            .filter(|(expected, _)| expected == password.expose_secret())
            .map(|(_, user)| user.clone());

        match user {
            Some(user) => {
                state.valid_access.insert("a1".to_owned());
                drop(state);
                Ok(LoginResponse {
                    user,
                    access_token: "a1".into(),
                    refresh_token: Some("r1".into()),
                })
            }
            None => Err(TransportError::Status {
                status: 401,
                message: Some("Incorrect email or password".to_owned()),
            }),
        }
    }

    async fn refresh(
        &self,
        refresh_token: &SecretString,
    ) -> Result<RefreshResponse, TransportError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.refresh_calls += 1;
            state
                .seen_refresh_tokens
                .push(refresh_token.expose_secret().to_owned());
            state.refresh_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        let response = match state.refresh.clone() {
            RefreshBehavior::Rotate => {
                let n = state.next_token;
                state.next_token += 1;
                RefreshResponse {
                    access_token: format!("a{n}").into(),
                    refresh_token: Some(format!("r{n}").into()),
                }
            }
            RefreshBehavior::Respond(response) => response,
            RefreshBehavior::Fail(error) => return Err(error),
        };
        state
            .valid_access
            .insert(response.access_token.expose_secret().to_owned());
        Ok(response)
    }

    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&SecretString>,
    ) -> Result<ApiResponse, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.execute_calls += 1;
        let bearer = bearer.map(|t| t.expose_secret().to_owned());
        state.seen_bearers.push(bearer.clone());

        let authorized =
            !state.reject_requests && bearer.is_some_and(|t| state.valid_access.contains(&t));
        drop(state);

        if authorized {
            Ok(ApiResponse::new(
                StatusCode::OK,
                json!({ "path": request.path, "method": request.method.as_str() }),
            ))
        } else {
            Ok(ApiResponse::new(
                StatusCode::UNAUTHORIZED,
                json!({ "detail": "Not authenticated" }),
            ))
        }
    }
}
