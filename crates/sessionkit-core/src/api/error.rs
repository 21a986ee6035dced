use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Request rejected ({status}): {message}")]
    BadRequest { status: u16, message: String },

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// `{message, error?}` error payload
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull the human-readable message out of an error body, falling back
    /// to the (truncated) raw body.
    fn extract_message(body: &str) -> String {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody {
                message: Some(message),
                ..
            }) => message,
            Ok(ErrorBody {
                error: Some(error), ..
            }) => error,
            _ => Self::truncate_body(body),
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::extract_message(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            409 => ApiError::Conflict(message),
            429 => ApiError::RateLimited,
            code @ 400..=499 => ApiError::BadRequest {
                status: code,
                message,
            },
            500..=599 => ApiError::ServerError(message),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    /// HTTP status this error was built from, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::AccessDenied(_) => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::Conflict(_) => Some(409),
            ApiError::BadRequest { status, .. } => Some(*status),
            ApiError::RateLimited => Some(429),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            ApiError::ServerError(_) | ApiError::InvalidResponse(_) | ApiError::Encode(_) => None,
        }
    }

    /// The server rejected the request itself. Rate limiting is transient
    /// and does not count.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ApiError::RateLimited) && matches!(self.status(), Some(400..=499))
    }

    /// No response was received (connection refused, DNS, timeout)
    pub fn is_connectivity(&self) -> bool {
        match self {
            ApiError::Network(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }

    /// Server-provided message, when the error carries one
    pub fn message(&self) -> Option<&str> {
        match self {
            ApiError::AccessDenied(m)
            | ApiError::NotFound(m)
            | ApiError::Conflict(m)
            | ApiError::ServerError(m)
            | ApiError::BadRequest { message: m, .. } => Some(m),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_extracts_message() {
        let err = ApiError::from_status(
            StatusCode::CONFLICT,
            r#"{"success":false,"message":"User already exists with this email"}"#,
        );
        assert!(matches!(err, ApiError::Conflict(ref m) if m == "User already exists with this email"));
        assert_eq!(err.message(), Some("User already exists with this email"));
    }

    #[test]
    fn test_from_status_falls_back_to_error_field_then_body() {
        let err = ApiError::from_status(StatusCode::FORBIDDEN, r#"{"error":"nope"}"#);
        assert_eq!(err.message(), Some("nope"));

        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(err.message(), Some("upstream down"));
    }

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, "{}"),
            ApiError::BadRequest { status: 422, .. }
        ));
        assert!(ApiError::from_status(StatusCode::BAD_REQUEST, "").is_client_error());
        assert!(!ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "").is_client_error());
        assert!(!ApiError::RateLimited.is_client_error());
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.contains("truncated, 510 total bytes"));

        let multibyte = "é".repeat(MAX_ERROR_BODY_LENGTH);
        // Must not panic on a char boundary
        let _ = ApiError::truncate_body(&multibyte);
    }
}
