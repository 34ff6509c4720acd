use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (accounts, connections, payloads)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE accounts (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                key_hash      TEXT NOT NULL UNIQUE,
                connect_code  TEXT NOT NULL UNIQUE,
                push_token    TEXT,
                created_at    TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE connections (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                initiator_id  INTEGER NOT NULL REFERENCES accounts(id),
                invitee_id    INTEGER NOT NULL REFERENCES accounts(id),
                status        TEXT NOT NULL CHECK (status IN ('pending', 'live')),
                created_at    TEXT NOT NULL DEFAULT (datetime('now')),
                CHECK (initiator_id != invitee_id)
            );

            CREATE INDEX idx_connections_initiator ON connections(initiator_id);
            CREATE INDEX idx_connections_invitee ON connections(invitee_id);

            -- One slot per sender per connection. Rows die with their connection.
            CREATE TABLE payloads (
                connection_id INTEGER NOT NULL REFERENCES connections(id) ON DELETE CASCADE,
                sender_id     INTEGER NOT NULL REFERENCES accounts(id),
                created_at    TEXT NOT NULL DEFAULT (datetime('now')),
                fetched       INTEGER NOT NULL DEFAULT 0,
                fetched_at    TEXT,
                content       BLOB,
                PRIMARY KEY (connection_id, sender_id)
            );

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
