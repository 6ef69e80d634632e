//! Relationship service - validated graph edges
//!
//! Wraps the relationship repository with rule validation, endpoint
//! existence checks and event emission.

use std::sync::Arc;

use crate::db::{objects, relationships, CreateRelationshipInput, GrcDb, RelationshipRow};
use crate::error::GrcError;
use crate::rules::{ObjectType, RelationshipValidator};

use super::events::{EventBus, GrcEvent};

pub struct RelationshipService {
    db: Arc<GrcDb>,
    validator: Arc<RelationshipValidator>,
    events: Arc<EventBus>,
}

impl RelationshipService {
    pub fn new(db: Arc<GrcDb>, validator: Arc<RelationshipValidator>, events: Arc<EventBus>) -> Self {
        Self {
            db,
            validator,
            events,
        }
    }

    pub fn validator(&self) -> &RelationshipValidator {
        &self.validator
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get(&self, id: i64) -> Result<Option<RelationshipRow>, GrcError> {
        self.db.with_conn(|conn| relationships::get_relationship(conn, id))
    }

    /// Relationships touching an object, either direction
    pub fn list_for(&self, object_type: ObjectType, object_id: i64) -> Result<Vec<RelationshipRow>, GrcError> {
        self.db
            .with_conn(|conn| relationships::list_for_object(conn, object_type.as_str(), object_id))
    }

    pub fn find_between(
        &self,
        first: (ObjectType, i64),
        second: (ObjectType, i64),
    ) -> Result<Option<RelationshipRow>, GrcError> {
        self.db.with_conn(|conn| {
            relationships::find_between(conn, (first.0.as_str(), first.1), (second.0.as_str(), second.1))
        })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Create a relationship if the rules allow the type pair.
    ///
    /// Endpoints stored locally must exist; other types are taken on trust.
    pub fn create(&self, input: CreateRelationshipInput) -> Result<RelationshipRow, GrcError> {
        let (source_type, destination_type) = self
            .validator
            .validate_names(&input.source_type, &input.destination_type)?;

        let row = self.db.transaction(|conn| {
            for (object_type, id) in [
                (source_type, input.source_id),
                (destination_type, input.destination_id),
            ] {
                if objects::object_exists(conn, object_type, id)? == Some(false) {
                    return Err(GrcError::not_found(object_type.as_str(), id));
                }
            }
            relationships::insert_relationship(conn, &input)
        })?;

        self.events.emit(GrcEvent::relationship_created(&row));
        Ok(row)
    }

    pub fn delete(&self, id: i64) -> Result<RelationshipRow, GrcError> {
        let row = self.db.transaction(|conn| {
            let row = relationships::get_relationship(conn, id)?
                .ok_or_else(|| GrcError::not_found("Relationship", id))?;
            relationships::delete_relationship(conn, id)?;
            Ok(row)
        })?;

        self.events.emit(GrcEvent::relationship_deleted(&row));
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::objects::{create_audit, create_scoped_object};

    fn service() -> RelationshipService {
        RelationshipService::new(
            Arc::new(GrcDb::open_in_memory().unwrap()),
            Arc::new(RelationshipValidator::global()),
            Arc::new(EventBus::new()),
        )
    }

    #[test]
    fn test_create_rejects_disallowed_pair() {
        let service = service();
        let err = service
            .create(CreateRelationshipInput::new(
                ObjectType::Audit,
                1,
                ObjectType::Audit,
                2,
            ))
            .unwrap_err();
        assert!(matches!(err, GrcError::DisallowedMapping { .. }));
    }

    #[test]
    fn test_create_requires_local_endpoints() {
        let service = service();
        let err = service
            .create(CreateRelationshipInput::new(
                ObjectType::Audit,
                404,
                ObjectType::Issue,
                1,
            ))
            .unwrap_err();
        assert!(matches!(err, GrcError::NotFound { id: 404, .. }));
    }

    #[test]
    fn test_create_and_delete_emit_events() {
        let service = service();
        let mut receiver = service.events.subscribe();

        let (audit, issue) = service
            .db
            .with_conn(|conn| {
                let (audit, context_id) = create_audit(conn, "Audit", None)?;
                let issue = create_scoped_object(conn, ObjectType::Issue, "Issue", Some(context_id))?;
                Ok((audit, issue))
            })
            .unwrap();
        let row = service
            .create(CreateRelationshipInput::new(ObjectType::Audit, audit, ObjectType::Issue, issue))
            .unwrap();
        assert_eq!(service.list_for(ObjectType::Issue, issue).unwrap().len(), 1);

        service.delete(row.id).unwrap();
        assert!(service.get(row.id).unwrap().is_none());

        assert!(matches!(
            receiver.try_recv().unwrap(),
            GrcEvent::RelationshipCreated { .. }
        ));
        assert!(matches!(
            receiver.try_recv().unwrap(),
            GrcEvent::RelationshipDeleted { .. }
        ));
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        assert!(matches!(
            service().delete(42).unwrap_err(),
            GrcError::NotFound { .. }
        ));
    }
}
