//! SQLite persistent store
//!
//! Repository modules expose free functions over `&Connection` so they can
//! run either directly or inside a caller-owned transaction
//! (`Transaction` derefs to `Connection`).
//!
//! ## Tables
//!
//! - `relationships` / `relationship_attrs` - typed object graph edges
//! - `access_control_roles` - role definitions per object type
//! - `access_control_list` - one row per (person, role, object) grant
//! - `people`, `contexts`, `roles`, `user_roles` - people and legacy roles
//! - `audits`, `assessments`, `documents`, ... - audit-scope objects
//! - `schema_revisions` - applied ACL revisions

pub mod acl;
pub mod objects;
pub mod relationships;
pub mod roles;
pub mod schema;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::GrcError;

/// Store timestamp format; lexical order is chronological.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current UTC time in store format.
pub fn now() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// SQLite database holding relationships, roles and ACL entries
pub struct GrcDb {
    conn: Mutex<Connection>,
}

impl GrcDb {
    /// Open or create the database file at `path`
    pub fn open(path: &Path) -> Result<Self, GrcError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("Opening SQLite database at {:?}", path);

        let conn = Connection::open(path)
            .map_err(|e| GrcError::Database(format!("Failed to open SQLite: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| GrcError::Database(format!("Failed to set PRAGMA: {}", e)))?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, GrcError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory().map_err(|e| {
            GrcError::Database(format!("Failed to open in-memory SQLite: {}", e))
        })?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, GrcError> {
        // ACL parent links and relationship attrs cascade on delete
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| GrcError::Database(format!("Failed to set PRAGMA: {}", e)))?;

        schema::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run a read with the shared connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, GrcError>
    where
        F: FnOnce(&Connection) -> Result<T, GrcError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| GrcError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access (for transactions)
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, GrcError>
    where
        F: FnOnce(&mut Connection) -> Result<T, GrcError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| GrcError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Run `f` inside a transaction; commits on `Ok`, rolls back on `Err`.
    pub fn transaction<F, T>(&self, f: F) -> Result<T, GrcError>
    where
        F: FnOnce(&Connection) -> Result<T, GrcError>,
    {
        self.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| GrcError::Database(format!("Failed to start transaction: {}", e)))?;
            let value = f(&tx)?;
            tx.commit()
                .map_err(|e| GrcError::Database(format!("Failed to commit transaction: {}", e)))?;
            Ok(value)
        })
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, GrcError> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<u64, GrcError> {
                let n: i64 = conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                        row.get(0)
                    })
                    .map_err(|e| GrcError::Database(format!("Query failed: {}", e)))?;
                Ok(n as u64)
            };

            Ok(DbStats {
                people_count: count("people")?,
                relationship_count: count("relationships")?,
                role_count: count("access_control_roles")?,
                acl_count: count("access_control_list")?,
                applied_revisions: count("schema_revisions")?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub people_count: u64,
    pub relationship_count: u64,
    pub role_count: u64,
    pub acl_count: u64,
    pub applied_revisions: u64,
}

pub use acl::{AclEntryRow, CreateAclEntryInput};
pub use relationships::{CreateRelationshipInput, RelationshipRow};
pub use roles::{AccessControlRoleRow, CreateRoleInput};
