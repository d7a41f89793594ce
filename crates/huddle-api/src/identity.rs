use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::warn;

use huddle_db::models::{UserRow, UserUpdate};
use huddle_db::{Database, StoreError};
use huddle_types::models::UserRecord;

use crate::store::blocking;

/// Identity store adapter.
///
/// Lookups collapse "absent" and "store failed" into `None` (failures are
/// logged). Writes come in two kinds: [`create`](Self::create),
/// [`update`](Self::update) and [`delete`](Self::delete) report their outcome,
/// while [`update_in_background`](Self::update_in_background) is a
/// best-effort side effect the caller does not wait on.
#[derive(Clone)]
pub struct IdentityStore {
    db: Arc<Database>,
}

impl IdentityStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn get_by_username(&self, username: &str) -> Option<UserRecord> {
        let key = username.to_string();
        match blocking(&self.db, move |db| db.get_user(&key)).await {
            Ok(row) => row.map(|r| r.into_record().1),
            Err(e) => {
                warn!("User lookup '{}' failed: {}", username, e);
                None
            }
        }
    }

    pub async fn get_by_email(&self, email: &str) -> Option<(String, UserRecord)> {
        let key = email.to_string();
        match blocking(&self.db, move |db| db.get_user_by_email(&key)).await {
            Ok(row) => row.map(UserRow::into_record),
            Err(e) => {
                warn!("User lookup by email failed: {}", e);
                None
            }
        }
    }

    /// Create iff neither the username nor the email exist yet.
    pub async fn create(&self, username: &str, record: &UserRecord) -> Result<(), StoreError> {
        let row = UserRow::from_record(username, record);
        blocking(&self.db, move |db| db.insert_user(&row)).await
    }

    pub async fn update(&self, username: &str, update: UserUpdate) -> Result<(), StoreError> {
        let key = username.to_string();
        blocking(&self.db, move |db| db.update_user(&key, &update)).await
    }

    /// Fire-and-forget update. Failures are logged and otherwise ignored.
    pub fn update_in_background(&self, username: &str, update: UserUpdate) -> JoinHandle<()> {
        let store = self.clone();
        let username = username.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.update(&username, update).await {
                warn!("Background update of '{}' failed: {}", username, e);
            }
        })
    }

    pub async fn delete(&self, username: &str) -> Result<(), StoreError> {
        let key = username.to_string();
        blocking(&self.db, move |db| db.delete_user(&key)).await
    }

    /// All users keyed by username. Empty on store failure.
    pub async fn list(&self) -> BTreeMap<String, UserRecord> {
        match blocking(&self.db, |db| db.list_users()).await {
            Ok(rows) => rows.into_iter().map(UserRow::into_record).collect(),
            Err(e) => {
                warn!("Listing users failed: {}", e);
                BTreeMap::new()
            }
        }
    }
}
