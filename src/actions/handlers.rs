//! Per-kind action handlers
//!
//! Each related kind implements [`RelatedHandler`]; the default
//! `add_related` and `remove_related` cover mapping and unmapping, so a kind
//! only supplies its create shape and how to build a new object.

use rusqlite::Connection;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{shape, ActionContext, AddAction, CreateRequest, ObjectRef, RelatedEntity, RelatedKind};
use crate::db::objects::{self, DocumentType, NewComment, NewDocument};
use crate::db::relationships::{self, CreateRelationshipInput, RelationshipRow, ASSIGNEE_TYPE_ATTR};
use crate::error::GrcError;
use crate::rules::{ObjectType, RelationshipValidator};

pub trait RelatedHandler: Sync {
    fn kind(&self) -> RelatedKind;

    /// Shape-check a create descriptor (`id` absent or null).
    fn parse_create(&self, value: &Value) -> Result<CreateRequest, GrcError> {
        let _: ObjectRef = shape(value)?;
        Ok(CreateRequest::Bare)
    }

    fn create(
        &self,
        _conn: &Connection,
        _ctx: &ActionContext,
        _request: &CreateRequest,
    ) -> Result<RelatedEntity, GrcError> {
        Err(GrcError::Validation(format!("Can't create {} object", self.kind())))
    }

    fn ensure_exists(&self, conn: &Connection, id: i64) -> Result<(), GrcError> {
        let object_type = self.kind().object_type();
        match objects::object_exists(conn, object_type, id)? {
            Some(true) => Ok(()),
            _ => Err(GrcError::not_found(object_type.as_str(), id)),
        }
    }

    /// Relate an existing or newly created object to the parent.
    ///
    /// The parent is the relationship source and lends its context. An
    /// already related object is left alone and not reported.
    fn add_related(
        &self,
        conn: &Connection,
        validator: &RelationshipValidator,
        ctx: &ActionContext,
        action: &AddAction,
    ) -> Result<Vec<RelatedEntity>, GrcError> {
        let object_type = self.kind().object_type();
        let mut added = Vec::new();

        let object_id = match action {
            AddAction::Map { id } => {
                self.ensure_exists(conn, *id)?;
                *id
            }
            AddAction::Create(request) => {
                let entity = self.create(conn, ctx, request)?;
                let id = entity.id();
                added.push(entity);
                id
            }
        };

        if let Some(existing) = relationships::find_between(
            conn,
            (ctx.parent_type.as_str(), ctx.parent_id),
            (object_type.as_str(), object_id),
        )? {
            debug!(relationship_id = existing.id, "Objects already related");
            return Ok(added);
        }

        let input = CreateRelationshipInput::new(ctx.parent_type, ctx.parent_id, object_type, object_id)
            .with_context(ctx.parent_context_id);
        let relationship = relationships::create_relationship(conn, validator, &input)?;
        added.push(RelatedEntity::Relationship(relationship));
        Ok(added)
    }

    /// Unrelate an object from the parent; `None` when nothing joined them.
    fn remove_related(
        &self,
        conn: &Connection,
        ctx: &ActionContext,
        id: i64,
    ) -> Result<Option<RelationshipRow>, GrcError> {
        self.ensure_exists(conn, id)?;

        let Some(relationship) = relationships::find_between(
            conn,
            (ctx.parent_type.as_str(), ctx.parent_id),
            (self.kind().object_type().as_str(), id),
        )?
        else {
            return Ok(None);
        };

        relationships::delete_relationship(conn, relationship.id)?;
        Ok(Some(relationship))
    }
}

/// Handler registered for `kind`
pub fn handler_for(kind: RelatedKind) -> &'static dyn RelatedHandler {
    match kind {
        RelatedKind::Document => &DocumentHandler,
        RelatedKind::Comment => &CommentHandler,
        RelatedKind::Snapshot => &SnapshotHandler,
    }
}

fn mismatched(kind: RelatedKind) -> GrcError {
    GrcError::Internal(format!("Create request does not describe a {}", kind))
}

// =============================================================================
// Document
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DocumentFields {
    #[allow(dead_code)]
    id: Option<i64>,
    #[serde(rename = "type")]
    _kind: String,
    document_type: String,
    link: String,
    title: String,
}

pub struct DocumentHandler;

impl RelatedHandler for DocumentHandler {
    fn kind(&self) -> RelatedKind {
        RelatedKind::Document
    }

    fn parse_create(&self, value: &Value) -> Result<CreateRequest, GrcError> {
        let fields: DocumentFields = shape(value)?;
        Ok(CreateRequest::Document {
            document_type: fields.document_type.parse::<DocumentType>()?,
            link: fields.link,
            title: fields.title,
        })
    }

    fn create(
        &self,
        conn: &Connection,
        ctx: &ActionContext,
        request: &CreateRequest,
    ) -> Result<RelatedEntity, GrcError> {
        let CreateRequest::Document {
            title,
            link,
            document_type,
        } = request
        else {
            return Err(mismatched(self.kind()));
        };

        let document = objects::create_document(
            conn,
            &NewDocument {
                title: title.clone(),
                link: link.clone(),
                document_type: *document_type,
                context_id: ctx.parent_context_id,
            },
        )?;
        debug!(document_id = document.id, "Created document");
        Ok(RelatedEntity::Document(document))
    }
}

// =============================================================================
// Comment
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CommentFields {
    #[allow(dead_code)]
    id: Option<i64>,
    #[serde(rename = "type")]
    _kind: String,
    description: String,
    custom_attribute_definition_id: Option<i64>,
}

pub struct CommentHandler;

impl CommentHandler {
    /// Legacy roles the actor holds on the parent, as recorded on the
    /// relationship between them.
    fn assignee_type(conn: &Connection, ctx: &ActionContext) -> Result<Option<String>, GrcError> {
        let Some(actor_id) = ctx.actor_id else {
            return Ok(None);
        };
        match relationships::find_between(
            conn,
            (ctx.parent_type.as_str(), ctx.parent_id),
            (ObjectType::Person.as_str(), actor_id),
        )? {
            Some(relationship) => relationships::get_attr(conn, relationship.id, ASSIGNEE_TYPE_ATTR),
            None => Ok(None),
        }
    }
}

impl RelatedHandler for CommentHandler {
    fn kind(&self) -> RelatedKind {
        RelatedKind::Comment
    }

    fn parse_create(&self, value: &Value) -> Result<CreateRequest, GrcError> {
        let fields: CommentFields = shape(value)?;
        Ok(CreateRequest::Comment {
            description: fields.description,
            custom_attribute_definition_id: fields.custom_attribute_definition_id,
        })
    }

    fn create(
        &self,
        conn: &Connection,
        ctx: &ActionContext,
        request: &CreateRequest,
    ) -> Result<RelatedEntity, GrcError> {
        let CreateRequest::Comment {
            description,
            custom_attribute_definition_id,
        } = request
        else {
            return Err(mismatched(self.kind()));
        };

        let comment = objects::create_comment(
            conn,
            &NewComment {
                description: description.clone(),
                assignee_type: Self::assignee_type(conn, ctx)?,
                custom_attribute_definition_id: *custom_attribute_definition_id,
                context_id: ctx.parent_context_id,
            },
        )?;
        debug!(comment_id = comment.id, "Created comment");
        Ok(RelatedEntity::Comment(comment))
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Snapshots are produced by audit scoping and can only be mapped.
pub struct SnapshotHandler;

impl RelatedHandler for SnapshotHandler {
    fn kind(&self) -> RelatedKind {
        RelatedKind::Snapshot
    }
}
