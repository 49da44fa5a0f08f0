//! Encrypted record rows: append / update / soft-delete / get / list.

use rusqlite::{params, OptionalExtension, Row};

use crate::{map_constraint, now_ms, Result, Store, StoreError};

/// One row of the `records` table.
#[derive(Debug, Clone)]
pub struct RecordRow {
    /// Canonical id `"<did>/<collection>/<rkey>"`.
    pub id: String,
    pub did: String,
    pub collection: String,
    pub rkey: String,
    pub ciphertext: Vec<u8>,
    /// `None` iff `public`; public rows keep plaintext in `ciphertext`.
    pub encrypted_dek: Option<Vec<u8>>,
    pub nonce: Vec<u8>,
    pub public: bool,
    pub created_at: i64,
    pub updated_at: Option<i64>,
    pub deleted_at: Option<i64>,
}

/// Partial update applied by [`Store::update_record`].
#[derive(Debug, Default)]
pub struct RecordUpdate {
    pub ciphertext: Option<Vec<u8>>,
    pub nonce: Option<Vec<u8>>,
    pub encrypted_dek: Option<Option<Vec<u8>>>,
    pub public: Option<bool>,
    pub updated_at: Option<i64>,
}

/// Listing parameters for [`Store::list_records`].
#[derive(Debug, Default, Clone)]
pub struct ListQuery {
    pub collection: Option<String>,
    pub limit: Option<u32>,
    /// Opaque keyset cursor from a previous page.
    pub cursor: Option<String>,
}

/// A page of records plus the cursor for the next one.
#[derive(Debug)]
pub struct RecordPage {
    pub rows: Vec<RecordRow>,
    pub cursor: Option<String>,
}

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        id: row.get("id")?,
        did: row.get("did")?,
        collection: row.get("collection")?,
        rkey: row.get("rkey")?,
        ciphertext: row.get("ciphertext")?,
        encrypted_dek: row.get("encrypted_dek")?,
        nonce: row.get("nonce")?,
        public: row.get::<_, i64>("public")? != 0,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}

impl Store {
    /// Insert a new record row.  Rejects with `Conflict` on a duplicate
    /// `(did, collection, rkey)` or id.
    pub fn insert_record(&self, row: &RecordRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO records
                   (id, did, collection, rkey, ciphertext, encrypted_dek, nonce,
                    public, created_at, updated_at, deleted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    row.id,
                    row.did,
                    row.collection,
                    row.rkey,
                    row.ciphertext,
                    row.encrypted_dek,
                    row.nonce,
                    row.public as i64,
                    row.created_at,
                    row.updated_at,
                    row.deleted_at,
                ],
            )
            .map_err(|e| map_constraint(e, &format!("record {}", row.id)))?;
            Ok(())
        })
    }

    /// Apply a partial update to an undeleted row.
    pub fn update_record(&self, id: &str, update: RecordUpdate) -> Result<()> {
        self.with_conn(|conn| {
            // Build the SET clause from the present fields only.
            let mut sets: Vec<&str> = Vec::new();
            let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(ciphertext) = update.ciphertext {
                sets.push("ciphertext = ?");
                values.push(Box::new(ciphertext));
            }
            if let Some(nonce) = update.nonce {
                sets.push("nonce = ?");
                values.push(Box::new(nonce));
            }
            if let Some(dek) = update.encrypted_dek {
                sets.push("encrypted_dek = ?");
                values.push(Box::new(dek));
            }
            if let Some(public) = update.public {
                sets.push("public = ?");
                values.push(Box::new(public as i64));
            }
            if let Some(updated_at) = update.updated_at {
                sets.push("updated_at = ?");
                values.push(Box::new(updated_at));
            }
            if sets.is_empty() {
                return Ok(());
            }

            let sql = format!(
                "UPDATE records SET {} WHERE id = ? AND deleted_at IS NULL",
                sets.join(", ")
            );
            values.push(Box::new(id.to_string()));

            let changed = conn.execute(
                &sql,
                rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("record {id}")));
            }
            Ok(())
        })
    }

    /// Soft-delete: sets `deleted_at`, leaving the row in place.
    pub fn soft_delete_record(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE records SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                params![now_ms(), id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("record {id}")));
            }
            Ok(())
        })
    }

    /// Fetch an undeleted row by canonical id.
    pub fn get_record(&self, id: &str) -> Result<Option<RecordRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT * FROM records WHERE id = ?1 AND deleted_at IS NULL",
                params![id],
                row_to_record,
            )
            .optional()
            .map_err(StoreError::Sqlite)
        })
    }

    /// List undeleted records for `did`, newest first, keyset-paginated.
    pub fn list_records(&self, did: &str, query: &ListQuery) -> Result<RecordPage> {
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let cursor = query.cursor.as_deref().map(parse_cursor).transpose()?;

        self.with_conn(|conn| {
            let mut sql = String::from(
                "SELECT * FROM records WHERE did = ? AND deleted_at IS NULL",
            );
            let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(did.to_string())];

            if let Some(collection) = &query.collection {
                sql.push_str(" AND collection = ?");
                values.push(Box::new(collection.clone()));
            }
            if let Some((created_at, id)) = &cursor {
                sql.push_str(" AND (created_at < ? OR (created_at = ? AND id < ?))");
                values.push(Box::new(*created_at));
                values.push(Box::new(*created_at));
                values.push(Box::new(id.clone()));
            }
            sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");
            values.push(Box::new(limit as i64 + 1));

            let mut stmt = conn.prepare(&sql)?;
            let mut rows: Vec<RecordRow> = stmt
                .query_map(
                    rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
                    row_to_record,
                )?
                .collect::<rusqlite::Result<_>>()?;

            let cursor = if rows.len() > limit as usize {
                rows.truncate(limit as usize);
                rows.last()
                    .map(|last| format!("{}|{}", last.created_at, last.id))
            } else {
                None
            };

            Ok(RecordPage { rows, cursor })
        })
    }
}

fn parse_cursor(cursor: &str) -> Result<(i64, String)> {
    let (created_at, id) = cursor
        .split_once('|')
        .ok_or_else(|| StoreError::InvalidCursor(cursor.to_string()))?;
    let created_at = created_at
        .parse::<i64>()
        .map_err(|_| StoreError::InvalidCursor(cursor.to_string()))?;
    Ok((created_at, id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(did: &str, collection: &str, rkey: &str, created_at: i64) -> RecordRow {
        RecordRow {
            id: format!("{did}/{collection}/{rkey}"),
            did: did.into(),
            collection: collection.into(),
            rkey: rkey.into(),
            ciphertext: vec![1, 2, 3],
            encrypted_dek: Some(vec![9, 9]),
            nonce: vec![0; 12],
            public: false,
            created_at,
            updated_at: None,
            deleted_at: None,
        }
    }

    #[test]
    fn insert_then_get() {
        let store = Store::open_in_memory().unwrap();
        let row = record("did:mesh:aa", "agent.memory.note", "k1", 100);
        store.insert_record(&row).unwrap();

        let got = store.get_record(&row.id).unwrap().unwrap();
        assert_eq!(got.ciphertext, vec![1, 2, 3]);
        assert!(!got.public);
    }

    #[test]
    fn duplicate_rkey_conflicts() {
        let store = Store::open_in_memory().unwrap();
        let row = record("did:mesh:aa", "agent.memory.note", "k1", 100);
        store.insert_record(&row).unwrap();
        assert!(matches!(
            store.insert_record(&row),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn soft_delete_hides_row() {
        let store = Store::open_in_memory().unwrap();
        let row = record("did:mesh:aa", "agent.memory.note", "k1", 100);
        store.insert_record(&row).unwrap();
        store.soft_delete_record(&row.id).unwrap();

        assert!(store.get_record(&row.id).unwrap().is_none());
        assert!(matches!(
            store.soft_delete_record(&row.id),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn update_rejects_deleted_and_missing() {
        let store = Store::open_in_memory().unwrap();
        let row = record("did:mesh:aa", "agent.memory.note", "k1", 100);
        store.insert_record(&row).unwrap();
        store.soft_delete_record(&row.id).unwrap();

        let update = RecordUpdate {
            ciphertext: Some(vec![7]),
            updated_at: Some(200),
            ..Default::default()
        };
        assert!(matches!(
            store.update_record(&row.id, update),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn list_newest_first_with_cursor() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..5 {
            store
                .insert_record(&record(
                    "did:mesh:aa",
                    "agent.memory.note",
                    &format!("k{i}"),
                    100 + i,
                ))
                .unwrap();
        }
        // Other agents' records are not visible.
        store
            .insert_record(&record("did:mesh:bb", "agent.memory.note", "kx", 999))
            .unwrap();

        let page1 = store
            .list_records(
                "did:mesh:aa",
                &ListQuery {
                    limit: Some(3),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(page1.rows.len(), 3);
        assert_eq!(page1.rows[0].rkey, "k4");
        let cursor = page1.cursor.expect("more rows remain");

        let page2 = store
            .list_records(
                "did:mesh:aa",
                &ListQuery {
                    limit: Some(3),
                    cursor: Some(cursor),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(page2.rows.len(), 2);
        assert_eq!(page2.rows[1].rkey, "k0");
        assert!(page2.cursor.is_none());
    }

    #[test]
    fn list_filters_by_collection() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_record(&record("did:mesh:aa", "agent.memory.note", "k1", 100))
            .unwrap();
        store
            .insert_record(&record("did:mesh:aa", "agent.comms.message", "k2", 101))
            .unwrap();

        let page = store
            .list_records(
                "did:mesh:aa",
                &ListQuery {
                    collection: Some("agent.comms.message".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0].rkey, "k2");
    }
}
