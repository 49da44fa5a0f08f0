//! Durable backing for the public-key directory: `did → publicKeys`.

use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use crate::{now_ms, Result, Store, StoreError};

impl Store {
    /// Upsert a directory entry.  `keys` is the opaque publicKeys JSON.
    pub fn directory_put(&self, did: &str, keys: &Value) -> Result<()> {
        let json = serde_json::to_string(keys)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO key_directory (did, keys, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (did)
                 DO UPDATE SET keys = excluded.keys, updated_at = excluded.updated_at",
                params![did, json, now_ms()],
            )?;
            Ok(())
        })
    }

    pub fn directory_get(&self, did: &str) -> Result<Option<Value>> {
        let raw: Option<String> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT keys FROM key_directory WHERE did = ?1",
                params![did],
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_get_and_replace() {
        let store = Store::open_in_memory().unwrap();
        let keys = json!({ "encryption": "zAAA", "signing": "zBBB" });
        store.directory_put("did:mesh:aa", &keys).unwrap();
        assert_eq!(store.directory_get("did:mesh:aa").unwrap().unwrap(), keys);

        let rotated = json!({ "encryption": "zCCC", "signing": "zBBB" });
        store.directory_put("did:mesh:aa", &rotated).unwrap();
        assert_eq!(
            store.directory_get("did:mesh:aa").unwrap().unwrap()["encryption"],
            "zCCC"
        );
        assert!(store.directory_get("did:mesh:zz").unwrap().is_none());
    }
}
