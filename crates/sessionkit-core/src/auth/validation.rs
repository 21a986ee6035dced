//! Client-side checks run before any credentials leave the process.

use once_cell::sync::Lazy;
use regex::Regex;

use super::SessionError;

/// Minimum password length accepted by the auth service
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Maximum length for any single credential field
const MAX_FIELD_LENGTH: usize = 128;

pub const MIN_NAME_LENGTH: usize = 2;
const MAX_NAME_LENGTH: usize = 100;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

pub fn validate_email(email: &str) -> Result<(), SessionError> {
    if email.trim().is_empty() {
        return Err(SessionError::InvalidInput(
            "Email address is required".to_string(),
        ));
    }
    if email.len() > MAX_FIELD_LENGTH || !EMAIL_RE.is_match(email) {
        return Err(SessionError::InvalidInput(
            "Please enter a valid email address".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), SessionError> {
    if password.is_empty() {
        return Err(SessionError::InvalidInput("Password is required".to_string()));
    }
    let len = password.chars().count();
    if len < MIN_PASSWORD_LENGTH {
        return Err(SessionError::InvalidInput(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if len > MAX_FIELD_LENGTH || password.chars().any(char::is_control) {
        return Err(SessionError::InvalidInput("Password is invalid".to_string()));
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), SessionError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SessionError::InvalidInput("Name is required".to_string()));
    }
    let len = trimmed.chars().count();
    if len < MIN_NAME_LENGTH {
        return Err(SessionError::InvalidInput(format!(
            "Name must be at least {} characters",
            MIN_NAME_LENGTH
        )));
    }
    if len >= MAX_NAME_LENGTH {
        return Err(SessionError::InvalidInput(format!(
            "Name must be less than {} characters",
            MAX_NAME_LENGTH
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(SessionError::InvalidInput("Name is invalid".to_string()));
    }
    Ok(())
}

pub fn validate_login(email: &str, password: &str) -> Result<(), SessionError> {
    validate_email(email)?;
    validate_password(password)
}

pub fn validate_registration(name: &str, email: &str, password: &str) -> Result<(), SessionError> {
    validate_name(name)?;
    validate_email(email)?;
    validate_password(password)
}
