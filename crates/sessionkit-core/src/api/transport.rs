//! Authenticated HTTP transport.
//!
//! `TokenTransport` attaches the current bearer token to outbound calls,
//! and on a 401 performs one coordinated refresh before replaying the call.
//! It never owns the session: it reads the token through a
//! [`CurrentTokenProvider`] and asks a [`RefreshCallback`] for a new one.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{header, Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::ApiError;

/// Maximum number of retries for rate-limited (429) requests
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Source of the access token attached to outbound calls
pub trait CurrentTokenProvider: Send + Sync {
    fn current_token(&self) -> Option<String>;
}

/// Mints a new access token when the current one is rejected
#[async_trait]
pub trait RefreshCallback: Send + Sync {
    async fn refresh(&self) -> Result<String, RefreshFailure>;
}

/// Why a refresh produced no token. Cloned to every caller waiting on
/// the shared refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshFailure {
    #[error("Refresh token rejected: {0}")]
    Rejected(String),

    #[error("Session ended while the refresh was in flight")]
    Superseded,

    /// The auth service could not be reached. The session is kept.
    #[error("Auth service unreachable: {0}")]
    Unreachable(String),

    /// The auth service failed without rejecting the refresh token. The session is kept.
    #[error("Refresh failed: {0}")]
    Unavailable(String),

    #[error("No active session")]
    NoSession,
}

/// Outgoing-header token state shared between the session owner (writer)
/// and the transport (reader). Writes are visible to the next attach.
#[derive(Debug, Clone, Default)]
pub struct TokenSlot {
    token: Arc<RwLock<Option<String>>>,
}

impl TokenSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    pub fn clear(&self) {
        self.set(None);
    }

    pub fn get(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CurrentTokenProvider for TokenSlot {
    fn current_token(&self) -> Option<String> {
        self.get()
    }
}

/// A single outbound call
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    attach_auth: bool,
    intercept_unauthorized: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            attach_auth: true,
            intercept_unauthorized: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Send without an `Authorization` header (login and other public calls)
    pub fn without_auth(mut self) -> Self {
        self.attach_auth = false;
        self
    }

    /// Surface 401s directly instead of refreshing and replaying
    pub fn without_refresh(mut self) -> Self {
        self.intercept_unauthorized = false;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

type PendingRefresh = Shared<BoxFuture<'static, Result<String, RefreshFailure>>>;

/// Bearer-token transport with single-flight refresh.
/// Clone is cheap and clones share the pending refresh.
#[derive(Clone)]
pub struct TokenTransport {
    client: Client,
    base_url: String,
    tokens: Arc<dyn CurrentTokenProvider>,
    refresher: Arc<dyn RefreshCallback>,
    pending: Arc<Mutex<Option<PendingRefresh>>>,
}

impl TokenTransport {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        tokens: Arc<dyn CurrentTokenProvider>,
        refresher: Arc<dyn RefreshCallback>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            refresher,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Token the next authenticated call will carry
    pub fn current_token(&self) -> Option<String> {
        self.tokens.current_token()
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(ApiRequest::post(path).json(body)?).await
    }

    /// Execute a request and decode its JSON body
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let response = self.execute(&request).await?;
        response.json().await.map_err(|e| {
            ApiError::InvalidResponse(format!(
                "Failed to parse JSON response from {}: {}",
                request.path, e
            ))
        })
    }

    /// Execute a request, returning the successful response.
    ///
    /// A 401 on the first attempt triggers (or joins) the shared refresh and
    /// the call is replayed once. A 401 on the replay, or a failed refresh,
    /// is returned as `ApiError::Unauthorized`.
    pub async fn execute(&self, request: &ApiRequest) -> Result<Response, ApiError> {
        let mut token = if request.attach_auth {
            self.tokens.current_token()
        } else {
            None
        };
        let mut retried = false;

        loop {
            let response = self.send_with_backoff(request, token.as_deref()).await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::UNAUTHORIZED
                && request.attach_auth
                && request.intercept_unauthorized
                && !retried
            {
                retried = true;

                // Someone else already swapped the token while this call was in flight
                let current = self.tokens.current_token();
                if current.is_some() && current != token {
                    debug!(path = %request.path, "Token changed since request was sent, replaying");
                    token = current;
                    continue;
                }

                match self.refresh_access_token().await {
                    Ok(fresh) => {
                        debug!(path = %request.path, "Replaying request with refreshed token");
                        token = Some(fresh);
                        continue;
                    }
                    Err(failure) => {
                        warn!(path = %request.path, reason = %failure, "Refresh failed, giving up on request");
                        return Err(ApiError::Unauthorized);
                    }
                }
            }

            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }
    }

    /// Await the in-flight refresh, starting one if none is running.
    /// Every concurrent caller shares the same outcome.
    pub async fn refresh_access_token(&self) -> Result<String, RefreshFailure> {
        let refresh = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match pending.as_ref() {
                Some(in_flight) => {
                    debug!("Joining in-flight token refresh");
                    in_flight.clone()
                }
                None => {
                    debug!("Starting token refresh");
                    let refresher = Arc::clone(&self.refresher);
                    let slot = Arc::clone(&self.pending);
                    let refresh = async move {
                        let result = refresher.refresh().await;
                        *slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
                        result
                    }
                    .boxed()
                    .shared();
                    *pending = Some(refresh.clone());
                    refresh
                }
            }
        };
        refresh.await
    }

    /// Whether a refresh is currently in flight
    pub fn is_refreshing(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn send_with_backoff(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<Response, ApiError> {
        let url = self.url(&request.path);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let mut builder = self
                .client
                .request(request.method.clone(), &url)
                .header(header::ACCEPT, "application/json");
            if let Some(token) = token {
                builder = builder.bearer_auth(token);
            }
            if let Some(ref body) = request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await?;
            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Err(ApiError::RateLimited);
            }
            warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms *= 2; // Exponential backoff
        }
    }
}
