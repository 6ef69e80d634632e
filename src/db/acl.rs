//! Access control list storage
//!
//! Entries form a flat table; derived entries point at their origin through
//! `parent_id` and are removed by `ON DELETE CASCADE` when the origin goes.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Params, Row};
use serde::{Deserialize, Serialize};

use super::schema::column_exists;
use crate::error::GrcError;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntryRow {
    pub id: i64,
    pub person_id: i64,
    pub ac_role_id: i64,
    pub object_id: i64,
    pub object_type: String,
    pub context_id: Option<i64>,
    pub parent_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAclEntryInput {
    pub person_id: i64,
    pub ac_role_id: i64,
    pub object_id: i64,
    pub object_type: String,
    pub context_id: Option<i64>,
    pub parent_id: Option<i64>,
}

fn has_parent_column(conn: &Connection) -> Result<bool, GrcError> {
    column_exists(conn, "access_control_list", "parent_id")
}

fn select_sql(conn: &Connection) -> Result<String, GrcError> {
    let parent = if has_parent_column(conn)? {
        "parent_id"
    } else {
        "NULL"
    };
    Ok(format!(
        "SELECT id, person_id, ac_role_id, object_id, object_type, context_id,
                {} AS parent_id, created_at, updated_at
         FROM access_control_list",
        parent
    ))
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<AclEntryRow> {
    Ok(AclEntryRow {
        id: row.get(0)?,
        person_id: row.get(1)?,
        ac_role_id: row.get(2)?,
        object_id: row.get(3)?,
        object_type: row.get(4)?,
        context_id: row.get(5)?,
        parent_id: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn collect<P: Params>(conn: &Connection, sql: &str, values: P) -> Result<Vec<AclEntryRow>, GrcError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| GrcError::Database(format!("Failed to prepare statement: {}", e)))?;
    let rows = stmt
        .query_map(values, row_to_entry)
        .map_err(|e| GrcError::Database(format!("Failed to query ACL entries: {}", e)))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(|e| GrcError::Database(format!("Failed to read row: {}", e)))?);
    }
    Ok(results)
}

// =============================================================================
// CRUD Operations
// =============================================================================

pub fn get_entry(conn: &Connection, id: i64) -> Result<Option<AclEntryRow>, GrcError> {
    let sql = format!("{} WHERE id = ?", select_sql(conn)?);
    conn.query_row(&sql, params![id], row_to_entry)
        .optional()
        .map_err(|e| GrcError::Database(format!("Failed to get ACL entry: {}", e)))
}

/// Look up an entry by its natural key
pub fn find_entry(
    conn: &Connection,
    person_id: i64,
    ac_role_id: i64,
    object_type: &str,
    object_id: i64,
) -> Result<Option<AclEntryRow>, GrcError> {
    let sql = format!(
        "{} WHERE person_id = ? AND ac_role_id = ? AND object_type = ? AND object_id = ?",
        select_sql(conn)?
    );
    conn.query_row(
        &sql,
        params![person_id, ac_role_id, object_type, object_id],
        row_to_entry,
    )
    .optional()
    .map_err(|e| GrcError::Database(format!("Failed to find ACL entry: {}", e)))
}

/// Insert an entry; fails if the natural key already exists
pub fn create_entry(conn: &Connection, input: &CreateAclEntryInput) -> Result<AclEntryRow, GrcError> {
    let timestamp = super::now();
    let result = if has_parent_column(conn)? {
        conn.execute(
            "INSERT INTO access_control_list
               (person_id, ac_role_id, object_id, object_type, context_id, parent_id,
                created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                input.person_id,
                input.ac_role_id,
                input.object_id,
                input.object_type,
                input.context_id,
                input.parent_id,
                timestamp,
                timestamp,
            ],
        )
    } else if input.parent_id.is_some() {
        return Err(GrcError::Validation(
            "Derived ACL entries require the ACL migration to be applied".to_string(),
        ));
    } else {
        conn.execute(
            "INSERT INTO access_control_list
               (person_id, ac_role_id, object_id, object_type, context_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                input.person_id,
                input.ac_role_id,
                input.object_id,
                input.object_type,
                input.context_id,
                timestamp,
                timestamp,
            ],
        )
    };
    result.map_err(|e| GrcError::Database(format!("Failed to create ACL entry: {}", e)))?;

    get_entry(conn, conn.last_insert_rowid())?
        .ok_or_else(|| GrcError::Internal("Failed to retrieve created ACL entry".to_string()))
}

/// Return the existing entry for the natural key, or create it.
///
/// The flag is `true` when a new row was inserted.
pub fn ensure_entry(
    conn: &Connection,
    input: &CreateAclEntryInput,
) -> Result<(AclEntryRow, bool), GrcError> {
    if let Some(existing) = find_entry(
        conn,
        input.person_id,
        input.ac_role_id,
        &input.object_type,
        input.object_id,
    )? {
        return Ok((existing, false));
    }
    Ok((create_entry(conn, input)?, true))
}

/// All entries on one object
pub fn list_for_object(
    conn: &Connection,
    object_type: &str,
    object_id: i64,
) -> Result<Vec<AclEntryRow>, GrcError> {
    let sql = format!(
        "{} WHERE object_type = ? AND object_id = ? ORDER BY id",
        select_sql(conn)?
    );
    collect(conn, &sql, params![object_type, object_id])
}

/// Entries derived directly from `parent_id`
pub fn children(conn: &Connection, parent_id: i64) -> Result<Vec<AclEntryRow>, GrcError> {
    if !has_parent_column(conn)? {
        return Ok(Vec::new());
    }
    let sql = format!("{} WHERE parent_id = ? ORDER BY id", select_sql(conn)?);
    collect(conn, &sql, params![parent_id])
}

/// Delete an entry and everything derived from it; returns every removed id.
pub fn delete_entry(conn: &Connection, id: i64) -> Result<Vec<i64>, GrcError> {
    let mut removed = Vec::new();
    if has_parent_column(conn)? {
        let mut stmt = conn
            .prepare(
                "WITH RECURSIVE subtree(id) AS (
                     SELECT id FROM access_control_list WHERE id = ?
                     UNION
                     SELECT acl.id FROM access_control_list acl
                     JOIN subtree ON acl.parent_id = subtree.id
                 )
                 SELECT id FROM subtree",
            )
            .map_err(|e| GrcError::Database(format!("Failed to prepare statement: {}", e)))?;
        let rows = stmt
            .query_map(params![id], |row| row.get::<_, i64>(0))
            .map_err(|e| GrcError::Database(format!("Failed to query ACL subtree: {}", e)))?;
        for row in rows {
            removed.push(row.map_err(|e| GrcError::Database(format!("Failed to read row: {}", e)))?);
        }
    } else if get_entry(conn, id)?.is_some() {
        removed.push(id);
    }

    conn.execute("DELETE FROM access_control_list WHERE id = ?", params![id])
        .map_err(|e| GrcError::Database(format!("Failed to delete ACL entry: {}", e)))?;

    Ok(removed)
}

/// Delete entries whose role name is in `names`, optionally for one role object type
pub fn delete_entries_for_role_names(
    conn: &Connection,
    role_object_type: Option<&str>,
    names: &[&str],
) -> Result<usize, GrcError> {
    if names.is_empty() {
        return Ok(0);
    }
    let mut sql = format!(
        "DELETE FROM access_control_list WHERE ac_role_id IN (
             SELECT id FROM access_control_roles WHERE name IN ({})",
        vec!["?"; names.len()].join(", ")
    );
    let mut values: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    if let Some(object_type) = role_object_type {
        sql.push_str(" AND object_type = ?");
        values.push(object_type.to_string());
    }
    sql.push(')');

    conn.execute(&sql, params_from_iter(values.iter()))
        .map_err(|e| GrcError::Database(format!("Failed to delete ACL entries: {}", e)))
}

/// Names of roles that have at least one entry on the object
pub fn assigned_role_names(
    conn: &Connection,
    object_type: &str,
    object_id: i64,
) -> Result<Vec<String>, GrcError> {
    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT acr.name
             FROM access_control_list acl
             JOIN access_control_roles acr ON acr.id = acl.ac_role_id
             WHERE acl.object_type = ? AND acl.object_id = ?
             ORDER BY acr.name",
        )
        .map_err(|e| GrcError::Database(format!("Failed to prepare statement: {}", e)))?;
    let rows = stmt
        .query_map(params![object_type, object_id], |row| row.get::<_, String>(0))
        .map_err(|e| GrcError::Database(format!("Failed to query assigned roles: {}", e)))?;

    let mut names = Vec::new();
    for row in rows {
        names.push(row.map_err(|e| GrcError::Database(format!("Failed to read row: {}", e)))?);
    }
    Ok(names)
}
