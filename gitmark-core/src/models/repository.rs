use serde::{Deserialize, Serialize};

use super::UserId;

pub type RepositoryId = i64;

/// A remote repository as tracked locally for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRecord {
    pub id: RepositoryId,
    pub github_id: String,
    pub name: String,
    pub full_name: String,
    pub owner: String,
    pub is_private: bool,
    pub user_id: UserId,
}

/// Fields needed to create a [`RepositoryRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRepository {
    pub github_id: String,
    pub name: String,
    pub full_name: String,
    pub owner: String,
    pub is_private: bool,
    pub user_id: UserId,
}

/// A repository as reported by the remote listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRepository {
    pub github_id: String,
    pub name: String,
    pub full_name: String,
    pub owner: String,
    pub is_private: bool,
}

impl RemoteRepository {
    /// Builds a remote entry from a full `owner/name` string.
    pub fn new(github_id: impl Into<String>, full_name: impl Into<String>) -> Self {
        let full_name = full_name.into();
        let (owner, name) = match full_name.split_once('/') {
            Some((owner, name)) => (owner.to_string(), name.to_string()),
            None => (String::new(), full_name.clone()),
        };
        Self {
            github_id: github_id.into(),
            name,
            full_name,
            owner,
            is_private: false,
        }
    }

    pub fn with_private(mut self, is_private: bool) -> Self {
        self.is_private = is_private;
        self
    }

    pub fn for_user(&self, user_id: UserId) -> NewRepository {
        NewRepository {
            github_id: self.github_id.clone(),
            name: self.name.clone(),
            full_name: self.full_name.clone(),
            owner: self.owner.clone(),
            is_private: self.is_private,
            user_id,
        }
    }
}
