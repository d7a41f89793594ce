use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Per-user moderation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Banned,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Banned => "banned",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "banned" => Ok(Self::Banned),
            other => Err(format!("unknown user status '{other}'")),
        }
    }
}

/// A user record as stored in the identity store, keyed by username.
///
/// `password` holds an Argon2 PHC string, or is empty for users who only
/// ever signed in through the external identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_provider: Option<String>,
    pub status: UserStatus,
    pub created_at: String,
    pub last_login: String,
}

impl UserRecord {
    pub fn is_banned(&self) -> bool {
        self.status == UserStatus::Banned
    }
}

/// A chat message. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: String,
    /// Author username.
    pub user_id: String,
    /// Author display name at submission time.
    pub user_name: String,
    pub role: String,
    pub content: String,
    /// Local time of day, `HH:MM:SS`.
    pub timestamp: String,
    /// RFC 3339 UTC, second precision. Primary ordering key.
    pub created_at: String,
}

/// Global settings document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub auto_refresh_interval: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_refresh_interval: 2,
        }
    }
}
