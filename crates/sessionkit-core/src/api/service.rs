//! HTTP client for the auth service endpoints.
//!
//! These calls are made outside the token transport: login, register and
//! forgot-password are public, and refresh/logout must never be caught by
//! the 401 interception that would otherwise recurse into another refresh.

use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use super::ApiError;
use crate::auth::User;

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub user: User,
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken", default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken", default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize)]
struct RefreshTokenBody<'a> {
    #[serde(rename = "refreshToken", skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
}

/// Remote auth service. The refresh token travels in JSON bodies:
/// issued by `login`, sent back on `refresh` and `logout`.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError>;

    async fn register(&self, name: &str, email: &str, password: &str) -> Result<User, ApiError>;

    async fn logout(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<(), ApiError>;

    async fn refresh(&self, refresh_token: Option<&str>) -> Result<RefreshResponse, ApiError>;

    async fn forgot_password(&self, email: &str) -> Result<String, ApiError>;
}

/// `AuthService` over reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpAuthService {
    client: Client,
    base_url: String,
}

impl HttpAuthService {
    /// Share an existing connection pool
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        bearer: Option<&str>,
    ) -> Result<Response, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "POST");

        let mut request = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        check_response(response).await
    }

    async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, ApiError> {
        response.json().await.map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", path, e))
        })
    }
}

/// Check if response is successful, returning an error with body if not.
async fn check_response(response: Response) -> Result<Response, ApiError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }
}

#[async_trait]
impl AuthService for HttpAuthService {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let response = self.post_json("/auth/login", &body, None).await?;
        Self::decode("/auth/login", response).await
    }

    async fn register(&self, name: &str, email: &str, password: &str) -> Result<User, ApiError> {
        let body = serde_json::json!({ "name": name, "email": email, "password": password });
        let response = self.post_json("/auth/register", &body, None).await?;
        let parsed: UserResponse = Self::decode("/auth/register", response).await?;
        Ok(parsed.user)
    }

    async fn logout(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<(), ApiError> {
        let body = RefreshTokenBody { refresh_token };
        self.post_json("/auth/logout", &body, access_token).await?;
        Ok(())
    }

    async fn refresh(&self, refresh_token: Option<&str>) -> Result<RefreshResponse, ApiError> {
        let body = RefreshTokenBody { refresh_token };
        let response = self.post_json("/auth/refresh", &body, None).await?;
        Self::decode("/auth/refresh", response).await
    }

    async fn forgot_password(&self, email: &str) -> Result<String, ApiError> {
        let body = serde_json::json!({ "email": email });
        let response = self.post_json("/auth/forgot-password", &body, None).await?;
        let parsed: MessageResponse = Self::decode("/auth/forgot-password", response).await?;
        Ok(parsed.message)
    }
}
