//! Database row types. These map directly to SQLite rows.
//! Distinct from huddle-types API models to keep the DB layer independent.

use huddle_types::models::{ChatMessage, UserRecord, UserStatus};
use tracing::warn;

pub struct UserRow {
    pub username: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub auth_provider: Option<String>,
    pub status: String,
    pub created_at: String,
    pub last_login: String,
}

impl UserRow {
    pub fn from_record(username: &str, record: &UserRecord) -> Self {
        Self {
            username: username.to_string(),
            name: record.name.clone(),
            email: record.email.clone(),
            password: record.password.clone(),
            auth_provider: record.auth_provider.clone(),
            status: record.status.as_str().to_string(),
            created_at: record.created_at.clone(),
            last_login: record.last_login.clone(),
        }
    }

    /// Split into the username key and the record document.
    pub fn into_record(self) -> (String, UserRecord) {
        let status = self.status.parse::<UserStatus>().unwrap_or_else(|e| {
            warn!("Corrupt status on user '{}': {}", self.username, e);
            UserStatus::Active
        });

        (
            self.username,
            UserRecord {
                name: self.name,
                email: self.email,
                password: self.password,
                auth_provider: self.auth_provider,
                status,
                created_at: self.created_at,
                last_login: self.last_login,
            },
        )
    }
}

/// Partial update of a user record. `None` fields are left untouched.
#[derive(Debug, Default, Clone)]
pub struct UserUpdate {
    pub last_login: Option<String>,
    /// Only written when the record has no provider tag yet.
    pub auth_provider: Option<String>,
    pub status: Option<UserStatus>,
}

pub struct MessageRow {
    pub seq: i64,
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub role: String,
    pub content: String,
    pub timestamp: String,
    pub created_at: String,
}

impl MessageRow {
    pub fn into_message(self) -> ChatMessage {
        ChatMessage {
            message_id: self.id,
            user_id: self.user_id,
            user_name: self.user_name,
            role: self.role,
            content: self.content,
            timestamp: self.timestamp,
            created_at: self.created_at,
        }
    }
}
