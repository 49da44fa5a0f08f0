//! Shared relational store: encrypted records, shared-record grants, the
//! agent name registry, the per-agent state bucket, and the key directory.
//!
//! Every operation is atomic per statement; uniqueness and foreign-key
//! invariants are enforced in SQL and act as the cross-actor mutual
//! exclusion (e.g. duplicate agent names).  Per-`did` write serialization
//! is the actor layer's job, not the store's.

pub mod directory;
pub mod records;
pub mod registry;
pub mod schema;
pub mod shares;
pub mod state;

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;

pub use records::{ListQuery, RecordPage, RecordRow, RecordUpdate};
pub use registry::RegistryRow;
pub use shares::SharedRecordRow;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("state decode: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Handle to the shared SQLite database.  Cheap to clone; all access goes
/// through one serialized connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }
}

/// Current unix time in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Map a SQLite uniqueness violation onto [`StoreError::Conflict`].
pub(crate) fn map_constraint(err: rusqlite::Error, what: &str) -> StoreError {
    if let rusqlite::Error::SqliteFailure(e, _) = &err {
        if e.code == rusqlite::ErrorCode::ConstraintViolation {
            return StoreError::Conflict(what.to_string());
        }
    }
    StoreError::Sqlite(err)
}
