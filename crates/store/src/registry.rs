//! Agent name registry.  Names are globally unique and stored lowercased;
//! the PRIMARY KEY is the cross-actor mutual exclusion for create races.

use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use crate::{map_constraint, Result, Store, StoreError};

#[derive(Debug, Clone, Serialize)]
pub struct RegistryRow {
    pub name: String,
    pub did: String,
    pub created_at: i64,
}

fn row_to_registry(row: &Row<'_>) -> rusqlite::Result<RegistryRow> {
    Ok(RegistryRow {
        name: row.get("name")?,
        did: row.get("did")?,
        created_at: row.get("created_at")?,
    })
}

impl Store {
    /// Claim a name.  Fails with `Conflict` when the name is taken; under
    /// concurrent creates exactly one caller wins.
    pub fn registry_insert(&self, name: &str, did: &str, created_at: i64) -> Result<()> {
        let name = name.to_ascii_lowercase();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO agent_registry (name, did, created_at) VALUES (?1, ?2, ?3)",
                params![name, did, created_at],
            )
            .map_err(|e| map_constraint(e, &format!("agent name {name:?}")))?;
            Ok(())
        })
    }

    pub fn registry_get(&self, name: &str) -> Result<Option<RegistryRow>> {
        let name = name.to_ascii_lowercase();
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT * FROM agent_registry WHERE name = ?1",
                params![name],
                row_to_registry,
            )
            .optional()
            .map_err(StoreError::Sqlite)
        })
    }

    pub fn registry_list(&self) -> Result<Vec<RegistryRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM agent_registry ORDER BY created_at ASC")?;
            let rows = stmt
                .query_map([], row_to_registry)?
                .collect::<rusqlite::Result<_>>()?;
            Ok(rows)
        })
    }

    pub fn registry_delete(&self, name: &str) -> Result<()> {
        let name = name.to_ascii_lowercase();
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM agent_registry WHERE name = ?1",
                params![name],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("agent {name:?}")));
            }
            Ok(())
        })
    }
}
