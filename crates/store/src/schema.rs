//! Schema migrations, applied idempotently at open.

use rusqlite::Connection;

use crate::Result;

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id            TEXT PRIMARY KEY,
            did           TEXT NOT NULL,
            collection    TEXT NOT NULL,
            rkey          TEXT NOT NULL,
            ciphertext    BLOB NOT NULL,
            encrypted_dek BLOB,
            nonce         BLOB NOT NULL,
            public        INTEGER NOT NULL DEFAULT 0,
            created_at    INTEGER NOT NULL,
            updated_at    INTEGER,
            deleted_at    INTEGER,
            UNIQUE (did, collection, rkey)
        );
        CREATE INDEX IF NOT EXISTS idx_records_did            ON records (did);
        CREATE INDEX IF NOT EXISTS idx_records_collection     ON records (collection);
        CREATE INDEX IF NOT EXISTS idx_records_did_collection ON records (did, collection);
        CREATE INDEX IF NOT EXISTS idx_records_created_at     ON records (created_at);

        CREATE TABLE IF NOT EXISTS shared_records (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            record_id     TEXT NOT NULL REFERENCES records (id),
            recipient_did TEXT NOT NULL,
            encrypted_dek BLOB NOT NULL,
            shared_at     INTEGER NOT NULL,
            UNIQUE (record_id, recipient_did)
        );
        CREATE INDEX IF NOT EXISTS idx_shared_recipient ON shared_records (recipient_did);

        CREATE TABLE IF NOT EXISTS agent_registry (
            name       TEXT PRIMARY KEY,
            did        TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS agent_state (
            did        TEXT NOT NULL,
            key        TEXT NOT NULL,
            value      TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE (did, key)
        );

        CREATE TABLE IF NOT EXISTS key_directory (
            did        TEXT PRIMARY KEY,
            keys       TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}
