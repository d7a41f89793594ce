use huddle_types::models::{UserRecord, UserStatus};

use crate::error::ApiError;

/// Whether an identity may post. The fixed administrator always may; for
/// everyone else only a banned record blocks.
pub fn can_submit(is_admin: bool, record: Option<&UserRecord>) -> bool {
    is_admin || record.is_none_or(|r| !r.is_banned())
}

/// Applied on every login path before a token is issued.
pub fn enforce_login_eligibility(status: UserStatus) -> Result<(), ApiError> {
    match status {
        UserStatus::Banned => Err(ApiError::Forbidden("Account has been banned".into())),
        UserStatus::Active => Ok(()),
    }
}
