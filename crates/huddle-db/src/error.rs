use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username already taken")]
    UsernameTaken,

    #[error("email already registered")]
    EmailTaken,

    #[error("record not found")]
    NotFound,

    #[error("store unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        // Unique-key collisions are reported by column so callers can tell
        // a taken username from a taken email.
        if let rusqlite::Error::SqliteFailure(code, Some(msg)) = &err {
            if code.code == ErrorCode::ConstraintViolation {
                if msg.contains("users.email") {
                    return Self::EmailTaken;
                }
                if msg.contains("users.username") {
                    return Self::UsernameTaken;
                }
            }
        }
        Self::Unavailable(err.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Unavailable(err.into())
    }
}
