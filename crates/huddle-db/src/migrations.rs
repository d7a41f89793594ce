use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Emails compare case-insensitively for both uniqueness and lookup.
        CREATE TABLE IF NOT EXISTS users (
            username        TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            email           TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password        TEXT NOT NULL DEFAULT '',
            auth_provider   TEXT,
            status          TEXT NOT NULL DEFAULT 'active',
            created_at      TEXT NOT NULL,
            last_login      TEXT NOT NULL
        );

        -- seq records arrival order and breaks created_at ties.
        -- No foreign key on user_id: messages outlive deleted users.
        CREATE TABLE IF NOT EXISTS messages (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            user_id         TEXT NOT NULL,
            user_name       TEXT NOT NULL,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL,
            timestamp       TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_created
            ON messages(created_at, seq);

        CREATE TABLE IF NOT EXISTS settings (
            key             TEXT PRIMARY KEY,
            document        TEXT NOT NULL
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
