use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// User identifier as issued by the auth service.
/// Some deployments use numeric ids, others opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Number(n) => write!(f, "{}", n),
            UserId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for UserId {
    fn from(n: i64) -> Self {
        UserId::Number(n)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        UserId::Text(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct User {
    pub id: UserId,
    #[serde(default, alias = "fullName", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
}

impl User {
    pub fn new(id: impl Into<UserId>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            email: email.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name for display, falling back to the email address
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.email)
    }
}

/// An authenticated identity together with its tokens.
///
/// Holding the access token and the user in one struct means neither can
/// exist without the other; "no session" is `Option::<SessionData>::None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub user: User,
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken", default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(rename = "createdAt", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(user: User, access_token: String, refresh_token: Option<String>) -> Self {
        Self {
            user,
            access_token,
            refresh_token,
            created_at: Utc::now(),
        }
    }

    /// Swap in a freshly minted access token. A rotated refresh token
    /// replaces the old one; `None` keeps the current refresh token.
    pub fn apply_refresh(&mut self, access_token: String, refresh_token: Option<String>) {
        self.access_token = access_token;
        if refresh_token.is_some() {
            self.refresh_token = refresh_token;
        }
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.created_at
    }

    /// Get minutes since login (for display)
    pub fn age_minutes(&self) -> i64 {
        self.age().num_minutes().max(0)
    }
}

/// What the UI binds to: the current user and whether a session
/// operation is in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SessionSnapshot {
    pub user: Option<User>,
    pub loading: bool,
}
