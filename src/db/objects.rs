//! Domain object storage
//!
//! Only the objects the ACL engine and the action processor touch are stored
//! locally: people, legacy contexts and roles, audit-scope objects, and the
//! related kinds (documents, comments, snapshots).

use std::fmt;
use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::GrcError;
use crate::rules::ObjectType;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentType {
    #[serde(rename = "URL")]
    Url,
    #[serde(rename = "EVIDENCE")]
    Evidence,
    #[serde(rename = "REFERENCE_URL")]
    ReferenceUrl,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Url => "URL",
            DocumentType::Evidence => "EVIDENCE",
            DocumentType::ReferenceUrl => "REFERENCE_URL",
        }
    }
}

impl FromStr for DocumentType {
    type Err = GrcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "URL" => Ok(DocumentType::Url),
            "EVIDENCE" => Ok(DocumentType::Evidence),
            "REFERENCE_URL" => Ok(DocumentType::ReferenceUrl),
            other => Err(GrcError::Validation(format!("Invalid document type: {}", other))),
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRow {
    pub id: i64,
    pub title: String,
    pub link: String,
    pub document_type: String,
    pub context_id: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub link: String,
    pub document_type: DocumentType,
    pub context_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentRow {
    pub id: i64,
    pub description: String,
    pub assignee_type: Option<String>,
    pub custom_attribute_definition_id: Option<i64>,
    pub context_id: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewComment {
    pub description: String,
    pub assignee_type: Option<String>,
    pub custom_attribute_definition_id: Option<i64>,
    pub context_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotRow {
    pub id: i64,
    pub parent_type: String,
    pub parent_id: i64,
    pub child_type: String,
    pub child_id: i64,
    pub context_id: Option<i64>,
}

/// Table holding objects of `object_type`, if they are stored locally.
pub fn table_for(object_type: ObjectType) -> Option<&'static str> {
    match object_type {
        ObjectType::Person => Some("people"),
        ObjectType::Audit => Some("audits"),
        ObjectType::Assessment => Some("assessments"),
        ObjectType::AssessmentTemplate => Some("assessment_templates"),
        ObjectType::Issue => Some("issues"),
        ObjectType::Snapshot => Some("snapshots"),
        ObjectType::Document => Some("documents"),
        ObjectType::Comment => Some("comments"),
        _ => None,
    }
}

fn map_insert(what: &str) -> impl Fn(rusqlite::Error) -> GrcError + '_ {
    move |e| GrcError::Database(format!("Failed to create {}: {}", what, e))
}

// =============================================================================
// Lookups
// =============================================================================

/// Whether a locally stored object exists; `None` for types stored elsewhere.
pub fn object_exists(
    conn: &Connection,
    object_type: ObjectType,
    id: i64,
) -> Result<Option<bool>, GrcError> {
    let Some(table) = table_for(object_type) else {
        return Ok(None);
    };
    let found: Option<i64> = conn
        .query_row(
            &format!("SELECT id FROM {} WHERE id = ?", table),
            params![id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| GrcError::Database(format!("Failed to look up {}: {}", object_type, e)))?;
    Ok(Some(found.is_some()))
}

/// Legacy permission context of a locally stored object (people have none).
pub fn context_of(
    conn: &Connection,
    object_type: ObjectType,
    id: i64,
) -> Result<Option<i64>, GrcError> {
    let table = match table_for(object_type) {
        Some(table) if object_type != ObjectType::Person => table,
        _ => return Ok(None),
    };
    let context: Option<Option<i64>> = conn
        .query_row(
            &format!("SELECT context_id FROM {} WHERE id = ?", table),
            params![id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| GrcError::Database(format!("Failed to read context of {}: {}", object_type, e)))?;
    Ok(context.flatten())
}

// =============================================================================
// People, contexts, legacy roles
// =============================================================================

pub fn create_person(conn: &Connection, email: &str, name: Option<&str>) -> Result<i64, GrcError> {
    conn.execute(
        "INSERT INTO people (email, name) VALUES (?, ?)",
        params![email, name],
    )
    .map_err(map_insert("person"))?;
    Ok(conn.last_insert_rowid())
}

pub fn create_context(
    conn: &Connection,
    related_object_type: Option<ObjectType>,
    related_object_id: Option<i64>,
) -> Result<i64, GrcError> {
    conn.execute(
        "INSERT INTO contexts (related_object_type, related_object_id) VALUES (?, ?)",
        params![related_object_type.map(|t| t.to_string()), related_object_id],
    )
    .map_err(map_insert("context"))?;
    Ok(conn.last_insert_rowid())
}

/// Grant a legacy system role (e.g. "Auditor") in a context
pub fn assign_legacy_role(
    conn: &Connection,
    person_id: i64,
    role_name: &str,
    context_id: i64,
) -> Result<i64, GrcError> {
    conn.execute("INSERT OR IGNORE INTO roles (name) VALUES (?)", params![role_name])
        .map_err(map_insert("legacy role"))?;
    let role_id: i64 = conn
        .query_row("SELECT id FROM roles WHERE name = ?", params![role_name], |row| {
            row.get(0)
        })
        .map_err(|e| GrcError::Database(format!("Failed to find legacy role: {}", e)))?;

    conn.execute(
        "INSERT INTO user_roles (person_id, role_id, context_id) VALUES (?, ?, ?)",
        params![person_id, role_id, context_id],
    )
    .map_err(map_insert("user role"))?;
    Ok(conn.last_insert_rowid())
}

// =============================================================================
// Audit-scope objects
// =============================================================================

/// Create an audit with its own context; returns `(audit_id, context_id)`.
pub fn create_audit(
    conn: &Connection,
    title: &str,
    contact_id: Option<i64>,
) -> Result<(i64, i64), GrcError> {
    conn.execute(
        "INSERT INTO audits (title, contact_id) VALUES (?, ?)",
        params![title, contact_id],
    )
    .map_err(map_insert("audit"))?;
    let audit_id = conn.last_insert_rowid();

    let context_id = create_context(conn, Some(ObjectType::Audit), Some(audit_id))?;
    conn.execute(
        "UPDATE audits SET context_id = ? WHERE id = ?",
        params![context_id, audit_id],
    )
    .map_err(|e| GrcError::Database(format!("Failed to attach audit context: {}", e)))?;

    Ok((audit_id, context_id))
}

/// Create an assessment, issue or assessment template inside a context
pub fn create_scoped_object(
    conn: &Connection,
    object_type: ObjectType,
    title: &str,
    context_id: Option<i64>,
) -> Result<i64, GrcError> {
    let table = match object_type {
        ObjectType::Assessment | ObjectType::Issue | ObjectType::AssessmentTemplate => {
            table_for(object_type)
        }
        _ => None,
    }
    .ok_or_else(|| {
        GrcError::Validation(format!("{} is not an audit-scope object with a title", object_type))
    })?;

    conn.execute(
        &format!("INSERT INTO {} (title, context_id) VALUES (?, ?)", table),
        params![title, context_id],
    )
    .map_err(map_insert(table))?;
    Ok(conn.last_insert_rowid())
}

pub fn create_snapshot(
    conn: &Connection,
    parent: (ObjectType, i64),
    child: (ObjectType, i64),
    context_id: Option<i64>,
) -> Result<i64, GrcError> {
    conn.execute(
        "INSERT INTO snapshots (parent_type, parent_id, child_type, child_id, context_id)
         VALUES (?, ?, ?, ?, ?)",
        params![
            parent.0.to_string(),
            parent.1,
            child.0.to_string(),
            child.1,
            context_id
        ],
    )
    .map_err(map_insert("snapshot"))?;
    Ok(conn.last_insert_rowid())
}

pub fn get_snapshot(conn: &Connection, id: i64) -> Result<Option<SnapshotRow>, GrcError> {
    conn.query_row(
        "SELECT id, parent_type, parent_id, child_type, child_id, context_id
         FROM snapshots WHERE id = ?",
        params![id],
        |row| {
            Ok(SnapshotRow {
                id: row.get(0)?,
                parent_type: row.get(1)?,
                parent_id: row.get(2)?,
                child_type: row.get(3)?,
                child_id: row.get(4)?,
                context_id: row.get(5)?,
            })
        },
    )
    .optional()
    .map_err(|e| GrcError::Database(format!("Failed to get snapshot: {}", e)))
}

// =============================================================================
// Documents and comments
// =============================================================================

pub fn create_document(conn: &Connection, input: &NewDocument) -> Result<DocumentRow, GrcError> {
    conn.execute(
        "INSERT INTO documents (title, link, document_type, context_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
            input.title,
            input.link,
            input.document_type.as_str(),
            input.context_id,
            super::now(),
            super::now(),
        ],
    )
    .map_err(map_insert("document"))?;

    get_document(conn, conn.last_insert_rowid())?
        .ok_or_else(|| GrcError::Internal("Failed to retrieve created document".to_string()))
}

pub fn get_document(conn: &Connection, id: i64) -> Result<Option<DocumentRow>, GrcError> {
    conn.query_row(
        "SELECT id, title, link, document_type, context_id, created_at FROM documents WHERE id = ?",
        params![id],
        |row| {
            Ok(DocumentRow {
                id: row.get(0)?,
                title: row.get(1)?,
                link: row.get(2)?,
                document_type: row.get(3)?,
                context_id: row.get(4)?,
                created_at: row.get(5)?,
            })
        },
    )
    .optional()
    .map_err(|e| GrcError::Database(format!("Failed to get document: {}", e)))
}

pub fn create_comment(conn: &Connection, input: &NewComment) -> Result<CommentRow, GrcError> {
    conn.execute(
        "INSERT INTO comments (description, assignee_type, custom_attribute_definition_id,
                               context_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
            input.description,
            input.assignee_type,
            input.custom_attribute_definition_id,
            input.context_id,
            super::now(),
            super::now(),
        ],
    )
    .map_err(map_insert("comment"))?;

    get_comment(conn, conn.last_insert_rowid())?
        .ok_or_else(|| GrcError::Internal("Failed to retrieve created comment".to_string()))
}

pub fn get_comment(conn: &Connection, id: i64) -> Result<Option<CommentRow>, GrcError> {
    conn.query_row(
        "SELECT id, description, assignee_type, custom_attribute_definition_id, context_id, created_at
         FROM comments WHERE id = ?",
        params![id],
        |row| {
            Ok(CommentRow {
                id: row.get(0)?,
                description: row.get(1)?,
                assignee_type: row.get(2)?,
                custom_attribute_definition_id: row.get(3)?,
                context_id: row.get(4)?,
                created_at: row.get(5)?,
            })
        },
    )
    .optional()
    .map_err(|e| GrcError::Database(format!("Failed to get comment: {}", e)))
}
