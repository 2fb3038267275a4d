use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type UserId = i64;

/// A credential for the remote, supplied per call by the session layer.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens never appear in logs.
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub github_id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn token(&self) -> AccessToken {
        AccessToken::new(self.access_token.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub github_id: String,
    pub username: String,
    pub access_token: String,
    pub avatar_url: Option<String>,
}

/// The authenticated account as reported by the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
    pub github_id: String,
    pub login: String,
    pub avatar_url: Option<String>,
}

impl RemoteUser {
    pub fn into_new_user(self, access_token: &AccessToken) -> NewUser {
        NewUser {
            github_id: self.github_id,
            username: self.login,
            access_token: access_token.as_str().to_string(),
            avatar_url: self.avatar_url,
        }
    }
}
