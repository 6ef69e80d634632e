//! Access control role storage
//!
//! The `internal` column only exists once an ACL revision has been applied;
//! reads report `internal = false` before that.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::schema::column_exists;
use crate::access_control::RoleDefinition;
use crate::error::GrcError;

/// Access control role row from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlRoleRow {
    pub id: i64,
    pub name: String,
    pub object_type: String,
    pub read: bool,
    pub update: bool,
    pub delete: bool,
    pub mandatory: bool,
    pub non_editable: bool,
    pub internal: bool,
    pub my_work: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for creating a role
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoleInput {
    pub name: String,
    pub object_type: String,
    #[serde(default = "default_true")]
    pub read: bool,
    #[serde(default = "default_true")]
    pub update: bool,
    #[serde(default = "default_true")]
    pub delete: bool,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub non_editable: bool,
    #[serde(default)]
    pub internal: bool,
    #[serde(default = "default_true")]
    pub my_work: bool,
}

fn default_true() -> bool {
    true
}

impl CreateRoleInput {
    /// Plain user-defined role: full permissions, editable, not internal.
    pub fn custom(object_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            object_type: object_type.into(),
            read: true,
            update: true,
            delete: true,
            mandatory: false,
            non_editable: false,
            internal: false,
            my_work: true,
        }
    }

    pub fn from_definition(object_type: impl Into<String>, def: &RoleDefinition) -> Self {
        Self {
            name: def.name.to_string(),
            object_type: object_type.into(),
            read: def.permissions.read,
            update: def.permissions.update,
            delete: def.permissions.delete,
            mandatory: def.permissions.mandatory,
            non_editable: def.non_editable(),
            internal: def.internal(),
            my_work: def.permissions.my_work,
        }
    }
}

fn select_sql(conn: &Connection) -> Result<String, GrcError> {
    let internal = if column_exists(conn, "access_control_roles", "internal")? {
        "internal"
    } else {
        "0"
    };
    Ok(format!(
        r#"SELECT id, name, object_type, "read", "update", "delete", mandatory, non_editable,
                  {} AS internal, my_work, created_at, updated_at
           FROM access_control_roles"#,
        internal
    ))
}

fn row_to_role(row: &Row<'_>) -> rusqlite::Result<AccessControlRoleRow> {
    Ok(AccessControlRoleRow {
        id: row.get(0)?,
        name: row.get(1)?,
        object_type: row.get(2)?,
        read: row.get(3)?,
        update: row.get(4)?,
        delete: row.get(5)?,
        mandatory: row.get(6)?,
        non_editable: row.get(7)?,
        internal: row.get(8)?,
        my_work: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Get a role by ID
pub fn get_role(conn: &Connection, id: i64) -> Result<Option<AccessControlRoleRow>, GrcError> {
    let sql = format!("{} WHERE id = ?", select_sql(conn)?);
    conn.query_row(&sql, params![id], row_to_role)
        .optional()
        .map_err(|e| GrcError::Database(format!("Failed to get role: {}", e)))
}

/// Find a role by its unique (object_type, name) pair
pub fn find_role(
    conn: &Connection,
    object_type: &str,
    name: &str,
) -> Result<Option<AccessControlRoleRow>, GrcError> {
    let sql = format!("{} WHERE object_type = ? AND name = ?", select_sql(conn)?);
    conn.query_row(&sql, params![object_type, name], row_to_role)
        .optional()
        .map_err(|e| GrcError::Database(format!("Failed to find role: {}", e)))
}

/// List all roles of an object type
pub fn list_roles(conn: &Connection, object_type: &str) -> Result<Vec<AccessControlRoleRow>, GrcError> {
    let sql = format!("{} WHERE object_type = ? ORDER BY id", select_sql(conn)?);
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| GrcError::Database(format!("Failed to prepare statement: {}", e)))?;

    let rows = stmt
        .query_map(params![object_type], row_to_role)
        .map_err(|e| GrcError::Database(format!("Failed to query roles: {}", e)))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(|e| GrcError::Database(format!("Failed to read row: {}", e)))?);
    }

    Ok(results)
}

/// Create a role; the internal flag requires the ACL revision schema
pub fn create_role(conn: &Connection, input: &CreateRoleInput) -> Result<AccessControlRoleRow, GrcError> {
    let has_internal = column_exists(conn, "access_control_roles", "internal")?;
    if input.internal && !has_internal {
        return Err(GrcError::Validation(format!(
            "Role '{}' is internal but internal roles are not supported before ACL migration",
            input.name
        )));
    }

    let timestamp = super::now();
    let result = if has_internal {
        conn.execute(
            r#"INSERT INTO access_control_roles
                 (name, object_type, "read", "update", "delete", mandatory, non_editable,
                  internal, my_work, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                input.name,
                input.object_type,
                input.read,
                input.update,
                input.delete,
                input.mandatory,
                input.non_editable,
                input.internal,
                input.my_work,
                timestamp,
                timestamp,
            ],
        )
    } else {
        conn.execute(
            r#"INSERT INTO access_control_roles
                 (name, object_type, "read", "update", "delete", mandatory, non_editable,
                  my_work, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                input.name,
                input.object_type,
                input.read,
                input.update,
                input.delete,
                input.mandatory,
                input.non_editable,
                input.my_work,
                timestamp,
                timestamp,
            ],
        )
    };
    result.map_err(|e| {
        GrcError::Database(format!("Failed to create role '{}': {}", input.name, e))
    })?;

    get_role(conn, conn.last_insert_rowid())?
        .ok_or_else(|| GrcError::Internal("Failed to retrieve created role".to_string()))
}

/// Names from `names` that already exist, optionally restricted to one object type
pub fn existing_role_names(
    conn: &Connection,
    object_type: Option<&str>,
    names: &[&str],
) -> Result<Vec<String>, GrcError> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let mut sql = format!(
        "SELECT DISTINCT name FROM access_control_roles WHERE name IN ({})",
        placeholders(names.len())
    );
    let mut values: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    if let Some(object_type) = object_type {
        sql.push_str(" AND object_type = ?");
        values.push(object_type.to_string());
    }
    sql.push_str(" ORDER BY name");

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| GrcError::Database(format!("Failed to prepare statement: {}", e)))?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), |row| row.get::<_, String>(0))
        .map_err(|e| GrcError::Database(format!("Failed to query role names: {}", e)))?;

    let mut found = Vec::new();
    for row in rows {
        found.push(row.map_err(|e| GrcError::Database(format!("Failed to read row: {}", e)))?);
    }
    Ok(found)
}

/// Delete roles by name, optionally restricted to one object type
pub fn delete_roles_by_name(
    conn: &Connection,
    object_type: Option<&str>,
    names: &[&str],
) -> Result<usize, GrcError> {
    if names.is_empty() {
        return Ok(0);
    }

    let mut sql = format!(
        "DELETE FROM access_control_roles WHERE name IN ({})",
        placeholders(names.len())
    );
    let mut values: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    if let Some(object_type) = object_type {
        sql.push_str(" AND object_type = ?");
        values.push(object_type.to_string());
    }

    conn.execute(&sql, params_from_iter(values.iter()))
        .map_err(|e| GrcError::Database(format!("Failed to delete roles: {}", e)))
}

/// Names of mandatory roles for an object type
pub fn mandatory_role_names(conn: &Connection, object_type: &str) -> Result<Vec<String>, GrcError> {
    Ok(list_roles(conn, object_type)?
        .into_iter()
        .filter(|role| role.mandatory)
        .map(|role| role.name)
        .collect())
}
