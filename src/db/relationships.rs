//! Relationships CRUD operations
//!
//! Typed object graph edges plus their attribute bag. Direction is not
//! meaningful for lookups: `find_between` and `list_for_object` match either
//! endpoint order.

use std::collections::BTreeMap;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::GrcError;
use crate::rules::{ObjectType, RelationshipValidator};

/// Attribute holding a person's legacy roles on the related object
pub const ASSIGNEE_TYPE_ATTR: &str = "AssigneeType";

// =============================================================================
// Types
// =============================================================================

/// Relationship row from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRow {
    pub id: i64,
    pub source_type: String,
    pub source_id: i64,
    pub destination_type: String,
    pub destination_id: i64,
    pub context_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl RelationshipRow {
    /// The endpoint opposite to `(object_type, object_id)`, if this row touches it.
    pub fn counterpart(&self, object_type: &str, object_id: i64) -> Option<(&str, i64)> {
        if self.source_type == object_type && self.source_id == object_id {
            Some((&self.destination_type, self.destination_id))
        } else if self.destination_type == object_type && self.destination_id == object_id {
            Some((&self.source_type, self.source_id))
        } else {
            None
        }
    }
}

/// Input for creating a relationship
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRelationshipInput {
    pub source_type: String,
    pub source_id: i64,
    pub destination_type: String,
    pub destination_id: i64,
    pub context_id: Option<i64>,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    /// Explicit creation time; defaults to now.
    pub created_at: Option<String>,
}

impl CreateRelationshipInput {
    pub fn new(
        source_type: ObjectType,
        source_id: i64,
        destination_type: ObjectType,
        destination_id: i64,
    ) -> Self {
        Self {
            source_type: source_type.to_string(),
            source_id,
            destination_type: destination_type.to_string(),
            destination_id,
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn with_context(mut self, context_id: Option<i64>) -> Self {
        self.context_id = context_id;
        self
    }

    pub fn created_at(mut self, timestamp: impl Into<String>) -> Self {
        self.created_at = Some(timestamp.into());
        self
    }
}

const SELECT_COLUMNS: &str = "SELECT id, source_type, source_id, destination_type, destination_id,
     context_id, created_at, updated_at FROM relationships";

fn row_to_relationship(row: &Row<'_>) -> rusqlite::Result<RelationshipRow> {
    Ok(RelationshipRow {
        id: row.get(0)?,
        source_type: row.get(1)?,
        source_id: row.get(2)?,
        destination_type: row.get(3)?,
        destination_id: row.get(4)?,
        context_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

// =============================================================================
// CRUD Operations
// =============================================================================

/// Get a relationship by ID
pub fn get_relationship(conn: &Connection, id: i64) -> Result<Option<RelationshipRow>, GrcError> {
    conn.query_row(
        &format!("{} WHERE id = ?", SELECT_COLUMNS),
        params![id],
        row_to_relationship,
    )
    .optional()
    .map_err(|e| GrcError::Database(format!("Failed to get relationship: {}", e)))
}

/// Find the relationship joining two objects, in either direction
pub fn find_between(
    conn: &Connection,
    first: (&str, i64),
    second: (&str, i64),
) -> Result<Option<RelationshipRow>, GrcError> {
    let sql = format!(
        "{} WHERE (source_type = ?1 AND source_id = ?2 AND destination_type = ?3 AND destination_id = ?4)
            OR (source_type = ?3 AND source_id = ?4 AND destination_type = ?1 AND destination_id = ?2)
         ORDER BY id LIMIT 1",
        SELECT_COLUMNS
    );
    conn.query_row(
        &sql,
        params![first.0, first.1, second.0, second.1],
        row_to_relationship,
    )
    .optional()
    .map_err(|e| GrcError::Database(format!("Failed to find relationship: {}", e)))
}

/// List every relationship touching an object
pub fn list_for_object(
    conn: &Connection,
    object_type: &str,
    object_id: i64,
) -> Result<Vec<RelationshipRow>, GrcError> {
    let sql = format!(
        "{} WHERE (source_type = ?1 AND source_id = ?2)
            OR (destination_type = ?1 AND destination_id = ?2)
         ORDER BY id",
        SELECT_COLUMNS
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| GrcError::Database(format!("Failed to prepare statement: {}", e)))?;

    let rows = stmt
        .query_map(params![object_type, object_id], row_to_relationship)
        .map_err(|e| GrcError::Database(format!("Failed to query relationships: {}", e)))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(|e| GrcError::Database(format!("Failed to read row: {}", e)))?);
    }

    Ok(results)
}

/// Insert a relationship without rule validation (legacy seeding, tests)
pub fn insert_relationship(
    conn: &Connection,
    input: &CreateRelationshipInput,
) -> Result<RelationshipRow, GrcError> {
    let timestamp = input.created_at.clone().unwrap_or_else(super::now);

    conn.execute(
        "INSERT INTO relationships (source_type, source_id, destination_type, destination_id,
                                    context_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            input.source_type,
            input.source_id,
            input.destination_type,
            input.destination_id,
            input.context_id,
            timestamp,
            timestamp,
        ],
    )
    .map_err(|e| GrcError::Database(format!("Failed to create relationship: {}", e)))?;

    let id = conn.last_insert_rowid();
    for (name, value) in &input.attrs {
        set_attr(conn, id, name, value)?;
    }

    get_relationship(conn, id)?
        .ok_or_else(|| GrcError::Internal("Failed to retrieve created relationship".to_string()))
}

/// Create a relationship after checking the type pair against the rules
pub fn create_relationship(
    conn: &Connection,
    validator: &RelationshipValidator,
    input: &CreateRelationshipInput,
) -> Result<RelationshipRow, GrcError> {
    validator.validate_names(&input.source_type, &input.destination_type)?;
    insert_relationship(conn, input)
}

/// Delete a relationship by ID; attributes cascade
pub fn delete_relationship(conn: &Connection, id: i64) -> Result<bool, GrcError> {
    let rows = conn
        .execute("DELETE FROM relationships WHERE id = ?", params![id])
        .map_err(|e| GrcError::Database(format!("Failed to delete relationship: {}", e)))?;

    Ok(rows > 0)
}

// =============================================================================
// Attributes
// =============================================================================

pub fn set_attr(
    conn: &Connection,
    relationship_id: i64,
    name: &str,
    value: &str,
) -> Result<(), GrcError> {
    conn.execute(
        "INSERT INTO relationship_attrs (relationship_id, attr_name, attr_value)
         VALUES (?, ?, ?)
         ON CONFLICT(relationship_id, attr_name) DO UPDATE SET attr_value = excluded.attr_value",
        params![relationship_id, name, value],
    )
    .map_err(|e| GrcError::Database(format!("Failed to set relationship attr: {}", e)))?;
    Ok(())
}

pub fn get_attr(
    conn: &Connection,
    relationship_id: i64,
    name: &str,
) -> Result<Option<String>, GrcError> {
    conn.query_row(
        "SELECT attr_value FROM relationship_attrs WHERE relationship_id = ? AND attr_name = ?",
        params![relationship_id, name],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| GrcError::Database(format!("Failed to get relationship attr: {}", e)))
}

pub fn get_attrs(
    conn: &Connection,
    relationship_id: i64,
) -> Result<BTreeMap<String, String>, GrcError> {
    let mut stmt = conn
        .prepare(
            "SELECT attr_name, attr_value FROM relationship_attrs WHERE relationship_id = ?",
        )
        .map_err(|e| GrcError::Database(format!("Failed to prepare statement: {}", e)))?;

    let rows = stmt
        .query_map(params![relationship_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|e| GrcError::Database(format!("Failed to query relationship attrs: {}", e)))?;

    let mut attrs = BTreeMap::new();
    for row in rows {
        let (name, value) =
            row.map_err(|e| GrcError::Database(format!("Failed to read row: {}", e)))?;
        attrs.insert(name, value);
    }
    Ok(attrs)
}
