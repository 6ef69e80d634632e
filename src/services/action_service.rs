//! Action service - applies related-object action batches
//!
//! A batch is parsed and shape-checked before the store is touched, then
//! executed in a single transaction. Events go out after commit.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::actions::{self, ActionBatch, ActionContext, ActionOutcome, EntityKind, RelatedEntity};
use crate::db::{objects, GrcDb};
use crate::error::GrcError;
use crate::rules::{ObjectType, RelationshipValidator};

use super::events::{EventBus, GrcEvent};

pub struct ActionService {
    db: Arc<GrcDb>,
    validator: Arc<RelationshipValidator>,
    events: Arc<EventBus>,
}

impl ActionService {
    pub fn new(db: Arc<GrcDb>, validator: Arc<RelationshipValidator>, events: Arc<EventBus>) -> Self {
        Self {
            db,
            validator,
            events,
        }
    }

    /// Apply `payload` to the parent object on behalf of `actor_id`.
    ///
    /// Any failure rolls back every action of the batch.
    pub fn process(
        &self,
        parent_type: ObjectType,
        parent_id: i64,
        actor_id: Option<i64>,
        payload: &Value,
    ) -> Result<ActionOutcome, GrcError> {
        let batch = ActionBatch::parse(payload)?;
        if batch.is_empty() {
            return Ok(ActionOutcome::default());
        }
        debug!(
            parent_type = %parent_type,
            parent_id = parent_id,
            actions = batch.len(),
            "Processing action batch"
        );

        let outcome = self.db.transaction(|conn| {
            if objects::object_exists(conn, parent_type, parent_id)? == Some(false) {
                return Err(GrcError::not_found(parent_type.as_str(), parent_id));
            }
            let ctx = ActionContext {
                parent_type,
                parent_id,
                parent_context_id: objects::context_of(conn, parent_type, parent_id)?,
                actor_id,
            };
            actions::process_actions(conn, &self.validator, &ctx, &batch)
        })?;

        self.emit_outcome(parent_type, parent_id, &outcome);
        info!(
            parent_type = %parent_type,
            parent_id = parent_id,
            added = outcome.added.values().map(Vec::len).sum::<usize>(),
            deleted = outcome.deleted.len(),
            "Applied action batch"
        );
        Ok(outcome)
    }

    fn emit_outcome(&self, parent_type: ObjectType, parent_id: i64, outcome: &ActionOutcome) {
        for (kind, name) in [(EntityKind::Document, "Document"), (EntityKind::Comment, "Comment")] {
            let ids: Vec<i64> = outcome.added_of(kind).iter().map(RelatedEntity::id).collect();
            if !ids.is_empty() {
                self.events.emit(GrcEvent::RelatedObjectsAdded {
                    parent_type: parent_type.to_string(),
                    parent_id,
                    kind: name.to_string(),
                    ids,
                });
            }
        }
        for entity in outcome.added_of(EntityKind::Relationship) {
            if let RelatedEntity::Relationship(row) = entity {
                self.events.emit(GrcEvent::relationship_created(row));
            }
        }
        for row in &outcome.deleted {
            self.events.emit(GrcEvent::relationship_deleted(row));
        }
    }
}
