use crate::models::{MessageRow, UserRow, UserUpdate};
use crate::{Database, StoreError};
use huddle_types::models::{ChatMessage, Settings};
use rusqlite::{Connection, OptionalExtension, Row};

const USER_COLUMNS: &str =
    "username, name, email, password, auth_provider, status, created_at, last_login";

const SETTINGS_KEY: &str = "general";

impl Database {
    // -- Users --

    /// Insert a new user. Fails with `UsernameTaken` / `EmailTaken` instead of
    /// overwriting, so concurrent creators of the same key cannot both win.
    pub fn insert_user(&self, row: &UserRow) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (username, name, email, password, auth_provider, status, created_at, last_login)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    row.username,
                    row.name,
                    row.email,
                    row.password,
                    row.auth_provider,
                    row.status,
                    row.created_at,
                    row.last_login,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, username: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users ORDER BY username"
            ))?;
            let rows = stmt
                .query_map([], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Apply a partial update. Fails with `NotFound` if no such user exists.
    pub fn update_user(&self, username: &str, update: &UserUpdate) -> Result<(), StoreError> {
        let changed = self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET
                    last_login    = COALESCE(?2, last_login),
                    auth_provider = COALESCE(auth_provider, ?3),
                    status        = COALESCE(?4, status)
                 WHERE username = ?1",
                rusqlite::params![
                    username,
                    update.last_login,
                    update.auth_provider,
                    update.status.map(|s| s.as_str()),
                ],
            )?;
            Ok(changed)
        })?;

        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn delete_user(&self, username: &str) -> Result<(), StoreError> {
        let changed = self.with_conn_mut(|conn| {
            Ok(conn.execute("DELETE FROM users WHERE username = ?1", [username])?)
        })?;

        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn count_users(&self) -> Result<u64, StoreError> {
        self.with_conn(|conn| count(conn, "users"))
    }

    // -- Messages --

    pub fn insert_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, user_id, user_name, role, content, timestamp, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    message.message_id,
                    message.user_id,
                    message.user_name,
                    message.role,
                    message.content,
                    message.timestamp,
                    message.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// The newest `limit` messages, returned oldest-first.
    pub fn recent_messages(&self, limit: u32) -> Result<Vec<MessageRow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT seq, id, user_id, user_name, role, content, timestamp, created_at
                 FROM messages
                 ORDER BY created_at DESC, seq DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt
                .query_map([limit], |row| {
                    Ok(MessageRow {
                        seq: row.get(0)?,
                        id: row.get(1)?,
                        user_id: row.get(2)?,
                        user_name: row.get(3)?,
                        role: row.get(4)?,
                        content: row.get(5)?,
                        timestamp: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.reverse();
            Ok(rows)
        })
    }

    /// Delete at most `limit` messages, oldest first. Returns how many went.
    pub fn delete_messages(&self, limit: u32) -> Result<usize, StoreError> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM messages WHERE seq IN (
                    SELECT seq FROM messages ORDER BY created_at, seq LIMIT ?1
                 )",
                [limit],
            )?;
            Ok(deleted)
        })
    }

    pub fn count_messages(&self) -> Result<u64, StoreError> {
        self.with_conn(|conn| count(conn, "messages"))
    }

    // -- Settings --

    /// Read the settings document, creating it with defaults on first access.
    pub fn get_or_init_settings(&self) -> Result<Settings, StoreError> {
        self.with_conn_mut(|conn| {
            let default_doc = serde_json::to_string(&Settings::default())?;
            conn.execute(
                "INSERT OR IGNORE INTO settings (key, document) VALUES (?1, ?2)",
                [SETTINGS_KEY, default_doc.as_str()],
            )?;

            let doc: String = conn.query_row(
                "SELECT document FROM settings WHERE key = ?1",
                [SETTINGS_KEY],
                |row| row.get(0),
            )?;
            Ok(serde_json::from_str(&doc)?)
        })
    }

    pub fn put_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        let doc = serde_json::to_string(settings)?;
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO settings (key, document) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET document = excluded.document",
                [SETTINGS_KEY, doc.as_str()],
            )?;
            Ok(())
        })
    }
}

fn query_user(conn: &Connection, field: &str, value: &str) -> Result<Option<UserRow>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE {field} = ?1 LIMIT 1"
    ))?;

    Ok(stmt.query_row([value], map_user).optional()?)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        username: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        auth_provider: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
        last_login: row.get(7)?,
    })
}

fn count(conn: &Connection, table: &str) -> Result<u64, StoreError> {
    let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
    Ok(n as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_types::models::UserStatus;

    fn user(username: &str, email: &str) -> UserRow {
        UserRow {
            username: username.to_string(),
            name: username.to_uppercase(),
            email: email.to_string(),
            password: String::new(),
            auth_provider: None,
            status: "active".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            last_login: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn message(id: &str, created_at: &str) -> ChatMessage {
        ChatMessage {
            message_id: id.to_string(),
            user_id: "alice".to_string(),
            user_name: "Alice".to_string(),
            role: "user".to_string(),
            content: format!("content {id}"),
            timestamp: "12:00:00".to_string(),
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn insert_user_reports_which_key_collided() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&user("alice", "alice@example.com")).unwrap();

        assert!(matches!(
            db.insert_user(&user("alice", "other@example.com")),
            Err(StoreError::UsernameTaken)
        ));
        assert!(matches!(
            db.insert_user(&user("alice2", "alice@example.com")),
            Err(StoreError::EmailTaken)
        ));
        assert_eq!(db.count_users().unwrap(), 1);
    }

    #[test]
    fn email_uniqueness_and_lookup_ignore_case() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&user("bob", "Bob@Example.com")).unwrap();

        assert!(matches!(
            db.insert_user(&user("bobby", "bob@example.com")),
            Err(StoreError::EmailTaken)
        ));
        let row = db.get_user_by_email("BOB@EXAMPLE.COM").unwrap().unwrap();
        assert_eq!(row.username, "bob");
        assert_eq!(row.email, "Bob@Example.com");
    }

    #[test]
    fn lookup_by_username_and_email() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&user("bob", "bob@example.com")).unwrap();

        assert!(db.get_user("bob").unwrap().is_some());
        assert!(db.get_user("nobody").unwrap().is_none());

        let row = db.get_user_by_email("bob@example.com").unwrap().unwrap();
        assert_eq!(row.username, "bob");
    }

    #[test]
    fn partial_update_only_touches_given_fields() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&user("carol", "carol@example.com")).unwrap();

        db.update_user(
            "carol",
            &UserUpdate {
                status: Some(UserStatus::Banned),
                ..Default::default()
            },
        )
        .unwrap();
        db.update_user(
            "carol",
            &UserUpdate {
                auth_provider: Some("google".into()),
                ..Default::default()
            },
        )
        .unwrap();
        // Provider tag is a backfill: an existing tag is kept.
        db.update_user(
            "carol",
            &UserUpdate {
                auth_provider: Some("other".into()),
                last_login: Some("2024-02-02T00:00:00Z".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let (_, record) = db.get_user("carol").unwrap().unwrap().into_record();
        assert_eq!(record.status, UserStatus::Banned);
        assert_eq!(record.auth_provider.as_deref(), Some("google"));
        assert_eq!(record.last_login, "2024-02-02T00:00:00Z");
        assert_eq!(record.created_at, "2024-01-01T00:00:00Z");
    }

    #[test]
    fn update_and_delete_unknown_user_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.update_user("ghost", &UserUpdate::default()),
            Err(StoreError::NotFound)
        ));
        assert!(matches!(db.delete_user("ghost"), Err(StoreError::NotFound)));
    }

    #[test]
    fn recent_messages_are_newest_window_oldest_first() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message(&message("a", "2024-01-01T00:00:01Z")).unwrap();
        db.insert_message(&message("b", "2024-01-01T00:00:02Z")).unwrap();
        // Same second as "b": arrival order decides.
        db.insert_message(&message("c", "2024-01-01T00:00:02Z")).unwrap();
        db.insert_message(&message("d", "2024-01-01T00:00:03Z")).unwrap();

        let ids: Vec<String> = db
            .recent_messages(3)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["b", "c", "d"]);
    }

    #[test]
    fn bounded_delete_leaves_remainder() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..600 {
            db.insert_message(&message(&format!("m{i}"), "2024-01-01T00:00:00Z"))
                .unwrap();
        }

        assert_eq!(db.delete_messages(500).unwrap(), 500);
        assert_eq!(db.count_messages().unwrap(), 100);

        // The survivors are the newest ones.
        let first = db.recent_messages(1000).unwrap().remove(0);
        assert_eq!(first.id, "m500");

        assert_eq!(db.delete_messages(500).unwrap(), 100);
        assert_eq!(db.count_messages().unwrap(), 0);
    }

    #[test]
    fn settings_created_lazily_with_default() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_or_init_settings().unwrap(), Settings::default());

        db.put_settings(&Settings {
            auto_refresh_interval: 9,
        })
        .unwrap();
        assert_eq!(db.get_or_init_settings().unwrap().auto_refresh_interval, 9);
    }
}
