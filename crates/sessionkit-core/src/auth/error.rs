use thiserror::Error;

use crate::api::{ApiError, RefreshFailure};

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const USER_EXISTS: &str = "User already exists with this email";
const GENERIC_FAILURE: &str = "Something went wrong, please try again later";

/// Which controller operation produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOperation {
    Login,
    Register,
    Refresh,
    ForgotPassword,
    ReloadUser,
}

/// Errors surfaced to the UI. Transport details never leak past here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    InvalidCredentials(String),

    #[error("{0}")]
    UserAlreadyExists(String),

    #[error("Session expired, please log in again")]
    RefreshFailed,

    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Network connection failed: {0}")]
    NetworkError(String),

    #[error("{0}")]
    Unknown(String),
}

impl SessionError {
    /// Normalize a transport error for the given operation
    pub fn from_api(operation: AuthOperation, err: ApiError) -> Self {
        if err.is_connectivity() {
            return SessionError::NetworkError(err.to_string());
        }

        let message = |fallback: &str| err.message().unwrap_or(fallback).to_string();

        match operation {
            AuthOperation::Login if err.is_client_error() => {
                SessionError::InvalidCredentials(message(INVALID_CREDENTIALS))
            }
            AuthOperation::Register if err.is_client_error() => {
                SessionError::UserAlreadyExists(message(USER_EXISTS))
            }
            AuthOperation::Refresh if err.is_client_error() => SessionError::RefreshFailed,
            AuthOperation::ReloadUser if matches!(err, ApiError::Unauthorized) => {
                SessionError::NotAuthenticated
            }
            _ => SessionError::Unknown(message(GENERIC_FAILURE)),
        }
    }

    /// Message suitable for inline display
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Unknown(m) if m.is_empty() => GENERIC_FAILURE.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<RefreshFailure> for SessionError {
    fn from(failure: RefreshFailure) -> Self {
        match failure {
            RefreshFailure::NoSession => SessionError::NotAuthenticated,
            RefreshFailure::Rejected(_) | RefreshFailure::Superseded => SessionError::RefreshFailed,
            RefreshFailure::Unreachable(message) => SessionError::NetworkError(message),
            RefreshFailure::Unavailable(message) => SessionError::Unknown(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn api(status: StatusCode, body: &str) -> ApiError {
        ApiError::from_status(status, body)
    }

    #[test]
    fn test_login_client_errors_become_invalid_credentials() {
        let err = SessionError::from_api(AuthOperation::Login, api(StatusCode::UNAUTHORIZED, ""));
        assert_eq!(err, SessionError::InvalidCredentials(INVALID_CREDENTIALS.to_string()));

        let err = SessionError::from_api(
            AuthOperation::Login,
            api(StatusCode::BAD_REQUEST, r#"{"message":"Wrong password"}"#),
        );
        assert_eq!(err, SessionError::InvalidCredentials("Wrong password".to_string()));
    }

    #[test]
    fn test_register_conflict_becomes_user_exists() {
        let err = SessionError::from_api(
            AuthOperation::Register,
            api(StatusCode::CONFLICT, r#"{"message":"Email taken"}"#),
        );
        assert_eq!(err, SessionError::UserAlreadyExists("Email taken".to_string()));
    }

    #[test]
    fn test_server_errors_become_unknown() {
        let err = SessionError::from_api(
            AuthOperation::Login,
            api(StatusCode::INTERNAL_SERVER_ERROR, r#"{"message":"Login failed"}"#),
        );
        assert_eq!(err, SessionError::Unknown("Login failed".to_string()));

        let err = SessionError::from_api(AuthOperation::Register, ApiError::RateLimited);
        assert_eq!(err, SessionError::Unknown(GENERIC_FAILURE.to_string()));
    }

    #[test]
    fn test_refresh_and_reload_mapping() {
        let err = SessionError::from_api(AuthOperation::Refresh, api(StatusCode::FORBIDDEN, ""));
        assert_eq!(err, SessionError::RefreshFailed);

        // Only a rejected refresh token ends the session
        let err = SessionError::from_api(
            AuthOperation::Refresh,
            api(StatusCode::SERVICE_UNAVAILABLE, r#"{"message":"maintenance"}"#),
        );
        assert_eq!(err, SessionError::Unknown("maintenance".to_string()));
        let err = SessionError::from_api(AuthOperation::Refresh, ApiError::RateLimited);
        assert_eq!(err, SessionError::Unknown(GENERIC_FAILURE.to_string()));

        let err = SessionError::from_api(AuthOperation::ReloadUser, ApiError::Unauthorized);
        assert_eq!(err, SessionError::NotAuthenticated);
    }

    #[test]
    fn test_from_refresh_failure() {
        assert_eq!(
            SessionError::from(RefreshFailure::Rejected("expired".into())),
            SessionError::RefreshFailed
        );
        assert_eq!(
            SessionError::from(RefreshFailure::NoSession),
            SessionError::NotAuthenticated
        );
        assert_eq!(
            SessionError::from(RefreshFailure::Unreachable("refused".into())),
            SessionError::NetworkError("refused".into())
        );
        assert_eq!(
            SessionError::from(RefreshFailure::Unavailable("down".into())),
            SessionError::Unknown("down".into())
        );
    }

    #[test]
    fn test_user_message() {
        assert_eq!(SessionError::Unknown(String::new()).user_message(), GENERIC_FAILURE);
        assert_eq!(
            SessionError::InvalidCredentials("Bad".into()).user_message(),
            "Bad"
        );
    }
}
