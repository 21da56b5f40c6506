//! Static user directory loaded from `users.json`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub user_phone: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Failed to read user directory {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid user directory {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct UserDirectory {
    users: Vec<User>,
    group: String,
}

impl UserDirectory {
    pub fn from_users(users: Vec<User>, group: impl Into<String>) -> Self {
        Self {
            users,
            group: group.into(),
        }
    }

    pub fn load(path: &Path, group: impl Into<String>) -> Result<Self, DirectoryError> {
        let text = std::fs::read_to_string(path).map_err(|source| DirectoryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let users = serde_json::from_str(&text).map_err(|source| DirectoryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_users(users, group))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.users
            .iter()
            .any(|u| u.username == username && u.password == password)
    }

    pub fn phone(&self, username: &str) -> Option<&str> {
        self.users
            .iter()
            .find(|u| u.username == username)
            .and_then(|u| u.user_phone.as_deref())
    }

    /// Contacts shown to `viewer`: the group channel first, then every other user.
    pub fn chat_users(&self, viewer: &str) -> Vec<String> {
        std::iter::once(self.group.clone())
            .chain(self.users.iter().map(|u| u.username.clone()))
            .filter(|name| name != viewer)
            .collect()
    }
}
