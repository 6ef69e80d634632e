//! Related-object actions
//!
//! A request body may carry an action batch:
//!
//! ```json
//! {
//!   "add_related":    [{"id": null, "type": "Document", "document_type": "URL",
//!                       "link": "https://...", "title": "Evidence"}],
//!   "remove_related": [{"id": 12, "type": "Comment"}]
//! }
//! ```
//!
//! The whole batch is parsed and shape-checked up front; execution then runs
//! `add_related` before `remove_related`. Execution does not open its own
//! transaction: the caller owns it and rolls back on any error.

pub mod handlers;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::db::objects::{CommentRow, DocumentRow, DocumentType};
use crate::db::RelationshipRow;
use crate::error::GrcError;
use crate::rules::{ObjectType, RelationshipValidator};

pub use handlers::{handler_for, RelatedHandler};

// =============================================================================
// Operations and kinds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    AddRelated,
    RemoveRelated,
}

impl Operation {
    /// Execution order
    pub const ORDER: [Operation; 2] = [Operation::AddRelated, Operation::RemoveRelated];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::AddRelated => "add_related",
            Operation::RemoveRelated => "remove_related",
        }
    }
}

impl FromStr for Operation {
    type Err = GrcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ORDER
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| GrcError::Validation(format!("Invalid action: {}", s)))
    }
}

/// Object kinds an action may relate to a parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RelatedKind {
    Document,
    Comment,
    Snapshot,
}

impl RelatedKind {
    pub fn object_type(&self) -> ObjectType {
        match self {
            RelatedKind::Document => ObjectType::Document,
            RelatedKind::Comment => ObjectType::Comment,
            RelatedKind::Snapshot => ObjectType::Snapshot,
        }
    }
}

impl FromStr for RelatedKind {
    type Err = GrcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Document" => Ok(RelatedKind::Document),
            "Comment" => Ok(RelatedKind::Comment),
            "Snapshot" => Ok(RelatedKind::Snapshot),
            other => Err(GrcError::InvalidType(other.to_string())),
        }
    }
}

impl fmt::Display for RelatedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.object_type(), f)
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// Fields for creating a new related object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateRequest {
    Document {
        title: String,
        link: String,
        document_type: DocumentType,
    },
    Comment {
        description: String,
        custom_attribute_definition_id: Option<i64>,
    },
    /// Kind without creation fields; its handler decides whether that is allowed.
    Bare,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddAction {
    /// Relate an existing object
    Map { id: i64 },
    /// Create an object, then relate it
    Create(CreateRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionDescriptor {
    Add { kind: RelatedKind, action: AddAction },
    Remove { kind: RelatedKind, id: i64 },
}

impl ActionDescriptor {
    pub fn kind(&self) -> RelatedKind {
        match self {
            ActionDescriptor::Add { kind, .. } | ActionDescriptor::Remove { kind, .. } => *kind,
        }
    }
}

/// `{id, type}` only
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ObjectRef {
    pub id: Option<i64>,
    #[serde(rename = "type")]
    pub _kind: String,
}

/// Deserialize a descriptor into an exact shape.
pub(crate) fn shape<T: serde::de::DeserializeOwned>(value: &Value) -> Result<T, GrcError> {
    T::deserialize(value).map_err(|e| GrcError::MissingParameters(e.to_string()))
}

/// Parsed, shape-checked batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionBatch {
    pub add_related: Vec<ActionDescriptor>,
    pub remove_related: Vec<ActionDescriptor>,
}

impl ActionBatch {
    pub fn is_empty(&self) -> bool {
        self.add_related.is_empty() && self.remove_related.is_empty()
    }

    pub fn len(&self) -> usize {
        self.add_related.len() + self.remove_related.len()
    }

    /// Parse a batch; any invalid descriptor rejects the whole batch.
    pub fn parse(payload: &Value) -> Result<Self, GrcError> {
        let operations = payload
            .as_object()
            .ok_or_else(|| GrcError::Validation("Actions must be an object".to_string()))?;

        // Unknown operations fail before anything else is looked at
        let mut lists = BTreeMap::new();
        for (name, list) in operations {
            let operation = name.parse::<Operation>()?;
            lists.insert(operation.name(), (operation, list));
        }

        let mut batch = ActionBatch::default();
        for operation in Operation::ORDER {
            let Some((_, list)) = lists.get(operation.name()) else {
                continue;
            };
            let descriptors = list.as_array().ok_or_else(|| {
                GrcError::Validation(format!("{} must be a list", operation.name()))
            })?;
            if descriptors.is_empty() {
                return Err(GrcError::Validation("Empty actions list".to_string()));
            }

            for value in descriptors {
                let descriptor = parse_descriptor(operation, value)?;
                match operation {
                    Operation::AddRelated => batch.add_related.push(descriptor),
                    Operation::RemoveRelated => batch.remove_related.push(descriptor),
                }
            }
        }
        Ok(batch)
    }
}

fn parse_descriptor(operation: Operation, value: &Value) -> Result<ActionDescriptor, GrcError> {
    let type_name = value
        .get("type")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GrcError::Validation("type is not defined".to_string()))?;
    let kind = type_name.parse::<RelatedKind>()?;
    let handler = handler_for(kind);

    let has_id = value.get("id").map(|id| !id.is_null()).unwrap_or(false);
    match operation {
        Operation::AddRelated if has_id => {
            let object: ObjectRef = shape(value)?;
            let id = object
                .id
                .ok_or_else(|| GrcError::Validation("id is not defined".to_string()))?;
            Ok(ActionDescriptor::Add {
                kind,
                action: AddAction::Map { id },
            })
        }
        Operation::AddRelated => Ok(ActionDescriptor::Add {
            kind,
            action: AddAction::Create(handler.parse_create(value)?),
        }),
        Operation::RemoveRelated => {
            let object: ObjectRef = shape(value)?;
            let id = object
                .id
                .ok_or_else(|| GrcError::Validation("id is not defined".to_string()))?;
            Ok(ActionDescriptor::Remove { kind, id })
        }
    }
}

// =============================================================================
// Execution
// =============================================================================

/// Object the actions are applied to
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub parent_type: ObjectType,
    pub parent_id: i64,
    pub parent_context_id: Option<i64>,
    /// Person performing the request
    pub actor_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum EntityKind {
    Document,
    Comment,
    Relationship,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum RelatedEntity {
    Document(DocumentRow),
    Comment(CommentRow),
    Relationship(RelationshipRow),
}

impl RelatedEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            RelatedEntity::Document(_) => EntityKind::Document,
            RelatedEntity::Comment(_) => EntityKind::Comment,
            RelatedEntity::Relationship(_) => EntityKind::Relationship,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            RelatedEntity::Document(row) => row.id,
            RelatedEntity::Comment(row) => row.id,
            RelatedEntity::Relationship(row) => row.id,
        }
    }
}

/// Entities created and relationships deleted by one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub added: BTreeMap<EntityKind, Vec<RelatedEntity>>,
    pub deleted: Vec<RelationshipRow>,
}

impl ActionOutcome {
    fn push_added(&mut self, entity: RelatedEntity) {
        self.added.entry(entity.kind()).or_default().push(entity);
    }

    pub fn added_of(&self, kind: EntityKind) -> &[RelatedEntity] {
        self.added.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Execute a parsed batch against `conn`
pub fn process_actions(
    conn: &Connection,
    validator: &RelationshipValidator,
    ctx: &ActionContext,
    batch: &ActionBatch,
) -> Result<ActionOutcome, GrcError> {
    let mut outcome = ActionOutcome::default();

    for descriptor in &batch.add_related {
        if let ActionDescriptor::Add { kind, action } = descriptor {
            debug!(kind = %kind, "Processing add_related");
            for entity in handler_for(*kind).add_related(conn, validator, ctx, action)? {
                outcome.push_added(entity);
            }
        }
    }

    for descriptor in &batch.remove_related {
        if let ActionDescriptor::Remove { kind, id } = descriptor {
            debug!(kind = %kind, id = id, "Processing remove_related");
            if let Some(deleted) = handler_for(*kind).remove_related(conn, ctx, *id)? {
                outcome.deleted.push(deleted);
            }
        }
    }

    Ok(outcome)
}
