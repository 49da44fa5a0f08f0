//! Shared-record grants: a sealed DEK per `(record, recipient)` pair.

use rusqlite::{params, OptionalExtension, Row};

use crate::records::RecordRow;
use crate::{Result, Store, StoreError};

/// One row of the `shared_records` table.
#[derive(Debug, Clone)]
pub struct SharedRecordRow {
    pub id: i64,
    pub record_id: String,
    pub recipient_did: String,
    pub encrypted_dek: Vec<u8>,
    pub shared_at: i64,
}

fn row_to_share(row: &Row<'_>) -> rusqlite::Result<SharedRecordRow> {
    Ok(SharedRecordRow {
        id: row.get("id")?,
        record_id: row.get("record_id")?,
        recipient_did: row.get("recipient_did")?,
        encrypted_dek: row.get("encrypted_dek")?,
        shared_at: row.get("shared_at")?,
    })
}

impl Store {
    /// Upsert a share grant.  Re-sharing to the same recipient replaces the
    /// sealed DEK, making the operation idempotent.
    pub fn insert_share(
        &self,
        record_id: &str,
        recipient_did: &str,
        encrypted_dek: &[u8],
        shared_at: i64,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO shared_records (record_id, recipient_did, encrypted_dek, shared_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (record_id, recipient_did)
                 DO UPDATE SET encrypted_dek = excluded.encrypted_dek,
                               shared_at     = excluded.shared_at",
                params![record_id, recipient_did, encrypted_dek, shared_at],
            )?;
            Ok(())
        })
    }

    /// The grant for `(record_id, recipient_did)`, if any.
    pub fn get_share(
        &self,
        record_id: &str,
        recipient_did: &str,
    ) -> Result<Option<SharedRecordRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT * FROM shared_records
                 WHERE record_id = ?1 AND recipient_did = ?2",
                params![record_id, recipient_did],
                row_to_share,
            )
            .optional()
            .map_err(StoreError::Sqlite)
        })
    }

    /// All records shared *to* a recipient, joined with their owning rows.
    /// Grants whose owning record has been deleted are excluded.
    pub fn list_shared_to(
        &self,
        recipient_did: &str,
    ) -> Result<Vec<(SharedRecordRow, RecordRow)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id AS share_id, s.record_id, s.recipient_did,
                        s.encrypted_dek AS share_dek, s.shared_at, r.*
                 FROM shared_records s
                 JOIN records r ON r.id = s.record_id
                 WHERE s.recipient_did = ?1 AND r.deleted_at IS NULL
                 ORDER BY s.shared_at DESC",
            )?;
            let pairs = stmt
                .query_map(params![recipient_did], |row| {
                    let share = SharedRecordRow {
                        id: row.get("share_id")?,
                        record_id: row.get("record_id")?,
                        recipient_did: row.get("recipient_did")?,
                        encrypted_dek: row.get("share_dek")?,
                        shared_at: row.get("shared_at")?,
                    };
                    let record = RecordRow {
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
                    };
                    Ok((share, record))
                })?
                .collect::<rusqlite::Result<_>>()?;
            Ok(pairs)
        })
    }
}
