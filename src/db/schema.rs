//! Database schema definitions
//!
//! Creates the pre-ACL base schema. Columns and roles introduced by the ACL
//! revisions (`access_control_list.parent_id`, `access_control_roles.internal`)
//! are added by the migration engine, not here.

use rusqlite::{params, Connection};
use tracing::info;

use crate::error::GrcError;

/// Current base schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Notification type renamed by the assignees revision.
pub const LEGACY_ASSESSOR_REMINDER: &str = "assessment_assessor_reminder";

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), GrcError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, GrcError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| GrcError::Database(format!("Failed to create schema_version table: {}", e)))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), GrcError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| GrcError::Database(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?)",
        params![version],
    )
    .map_err(|e| GrcError::Database(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), GrcError> {
    conn.execute_batch(PEOPLE_SCHEMA)
        .map_err(|e| GrcError::Database(format!("Failed to create people tables: {}", e)))?;

    conn.execute_batch(OBJECTS_SCHEMA)
        .map_err(|e| GrcError::Database(format!("Failed to create object tables: {}", e)))?;

    conn.execute_batch(RELATIONSHIPS_SCHEMA)
        .map_err(|e| GrcError::Database(format!("Failed to create relationship tables: {}", e)))?;

    conn.execute_batch(ACCESS_CONTROL_SCHEMA)
        .map_err(|e| GrcError::Database(format!("Failed to create access control tables: {}", e)))?;

    conn.execute_batch(&acl_table_ddl("access_control_list"))
        .map_err(|e| GrcError::Database(format!("Failed to create access control list: {}", e)))?;

    conn.execute_batch(ACL_INDEXES)
        .map_err(|e| GrcError::Database(format!("Failed to create indexes: {}", e)))?;

    conn.execute_batch(BOOKKEEPING_SCHEMA)
        .map_err(|e| GrcError::Database(format!("Failed to create bookkeeping tables: {}", e)))?;

    conn.execute(
        "INSERT OR IGNORE INTO notification_types (name, description) VALUES (?, ?)",
        params![
            LEGACY_ASSESSOR_REMINDER,
            "Reminder sent to assessment assignees"
        ],
    )
    .map_err(|e| GrcError::Database(format!("Failed to seed notification types: {}", e)))?;

    Ok(())
}

/// Whether `table` currently has a column named `column`.
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, GrcError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
            params![table, column],
            |row| row.get(0),
        )
        .map_err(|e| GrcError::Database(format!("Failed to inspect table {}: {}", table, e)))?;
    Ok(count > 0)
}

/// Whether a TEMP table named `table` exists on this connection.
pub fn temp_table_exists(conn: &Connection, table: &str) -> Result<bool, GrcError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_temp_master WHERE type = 'table' AND name = ?",
            params![table],
            |row| row.get(0),
        )
        .map_err(|e| GrcError::Database(format!("Failed to inspect temp tables: {}", e)))?;
    Ok(count > 0)
}

/// Column names of `table`, in declaration order.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, GrcError> {
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info(?) ORDER BY cid")
        .map_err(|e| GrcError::Database(format!("Failed to prepare statement: {}", e)))?;
    let rows = stmt
        .query_map(params![table], |row| row.get::<_, String>(0))
        .map_err(|e| GrcError::Database(format!("Failed to inspect table {}: {}", table, e)))?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row.map_err(|e| GrcError::Database(format!("Failed to read row: {}", e)))?);
    }
    Ok(columns)
}

/// People, legacy contexts and legacy system roles
const PEOPLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS people (
    id INTEGER PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    name TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS contexts (
    id INTEGER PRIMARY KEY,
    name TEXT,
    related_object_id INTEGER,
    related_object_type TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS roles (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS user_roles (
    id INTEGER PRIMARY KEY,
    person_id INTEGER NOT NULL REFERENCES people(id) ON DELETE CASCADE,
    role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
    context_id INTEGER REFERENCES contexts(id),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_user_roles_context ON user_roles(context_id);
"#;

/// Audit-scope objects and the related kinds handled by actions
const OBJECTS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS audits (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    contact_id INTEGER,
    context_id INTEGER REFERENCES contexts(id),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS assessments (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    context_id INTEGER REFERENCES contexts(id),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS assessment_templates (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    context_id INTEGER REFERENCES contexts(id),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS issues (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    context_id INTEGER REFERENCES contexts(id),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS snapshots (
    id INTEGER PRIMARY KEY,
    parent_type TEXT NOT NULL,
    parent_id INTEGER NOT NULL,
    child_type TEXT NOT NULL,
    child_id INTEGER NOT NULL,
    context_id INTEGER REFERENCES contexts(id),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    link TEXT NOT NULL,
    document_type TEXT NOT NULL DEFAULT 'URL',
    context_id INTEGER REFERENCES contexts(id),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    assignee_type TEXT,
    custom_attribute_definition_id INTEGER,
    context_id INTEGER REFERENCES contexts(id),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_snapshots_context ON snapshots(context_id);
CREATE INDEX IF NOT EXISTS idx_assessments_context ON assessments(context_id);
CREATE INDEX IF NOT EXISTS idx_documents_context ON documents(context_id);
CREATE INDEX IF NOT EXISTS idx_issues_context ON issues(context_id);
"#;

/// Typed object graph edges and their free-form attribute bag
const RELATIONSHIPS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS relationships (
    id INTEGER PRIMARY KEY,
    source_type TEXT NOT NULL,
    source_id INTEGER NOT NULL,
    destination_type TEXT NOT NULL,
    destination_id INTEGER NOT NULL,
    context_id INTEGER REFERENCES contexts(id),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(source_type, source_id, destination_type, destination_id)
);

CREATE TABLE IF NOT EXISTS relationship_attrs (
    relationship_id INTEGER NOT NULL REFERENCES relationships(id) ON DELETE CASCADE,
    attr_name TEXT NOT NULL,
    attr_value TEXT NOT NULL,
    PRIMARY KEY (relationship_id, attr_name)
);

CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(source_type, source_id);
CREATE INDEX IF NOT EXISTS idx_relationships_destination ON relationships(destination_type, destination_id);
"#;

/// Access control roles, pre-ACL-revision shape
const ACCESS_CONTROL_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS access_control_roles (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    object_type TEXT NOT NULL,
    "read" INTEGER NOT NULL DEFAULT 1,
    "update" INTEGER NOT NULL DEFAULT 1,
    "delete" INTEGER NOT NULL DEFAULT 1,
    mandatory INTEGER NOT NULL DEFAULT 0,
    non_editable INTEGER NOT NULL DEFAULT 0,
    my_work INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(object_type, name)
);
"#;

/// Pre-revision `access_control_list` definition under `table` name
pub fn acl_table_ddl(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {} (
    id INTEGER PRIMARY KEY,
    person_id INTEGER NOT NULL REFERENCES people(id) ON DELETE CASCADE,
    ac_role_id INTEGER NOT NULL REFERENCES access_control_roles(id) ON DELETE CASCADE,
    object_id INTEGER NOT NULL,
    object_type TEXT NOT NULL,
    context_id INTEGER,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
        table
    )
}

/// Natural-key index of ACL entries; recreated when the table is rebuilt.
pub const ACL_INDEXES: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS uq_access_control_list
    ON access_control_list(person_id, ac_role_id, object_id, object_type);
CREATE INDEX IF NOT EXISTS idx_access_control_list_object
    ON access_control_list(object_type, object_id);
"#;

const BOOKKEEPING_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS notification_types (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS schema_revisions (
    revision TEXT PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;
