//! Per-agent durable state bucket: a small KV space keyed `(did, key)`
//! holding the identity blob, config, session, and loop state as JSON.
//!
//! Writes go through before the corresponding HTTP response returns; there
//! is no deferred flush.

use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{now_ms, Result, Store, StoreError};

/// Well-known state keys.
pub const STATE_IDENTITY: &str = "identity";
pub const STATE_CONFIG: &str = "config";
pub const STATE_SESSION: &str = "session";
pub const STATE_LOOP: &str = "loop";

impl Store {
    /// Upsert one state entry.
    pub fn state_put<T: Serialize>(&self, did: &str, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO agent_state (did, key, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (did, key)
                 DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![did, key, json, now_ms()],
            )?;
            Ok(())
        })
    }

    /// Fetch and decode one state entry.
    pub fn state_get<T: DeserializeOwned>(&self, did: &str, key: &str) -> Result<Option<T>> {
        let raw: Option<String> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM agent_state WHERE did = ?1 AND key = ?2",
                params![did, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::Sqlite)
        })?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Drop every state entry for an agent (admin deletion).
    pub fn state_delete_all(&self, did: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM agent_state WHERE did = ?1", params![did])?;
            Ok(())
        })
    }
}
