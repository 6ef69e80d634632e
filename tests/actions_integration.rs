//! Integration tests for related-object action batches
//!
//! Batches run through `Services` against an in-memory store, the way an
//! embedding application applies a request body.

use std::sync::Arc;

use grc_access::actions::{EntityKind, RelatedEntity};
use grc_access::db::objects::{
    create_audit, create_document, create_person, create_scoped_object, create_snapshot,
    DocumentType, NewDocument,
};
use grc_access::db::relationships::{find_between, insert_relationship, ASSIGNEE_TYPE_ATTR};
use grc_access::db::CreateRelationshipInput;
use grc_access::error::{ErrorKind, GrcError};
use grc_access::{GrcDb, GrcEvent, ObjectType, Services};
use rusqlite::Connection;
use serde_json::json;

struct Fixture {
    db: Arc<GrcDb>,
    services: Services,
    audit: i64,
    assessment: i64,
    context_id: i64,
}

fn fixture() -> Fixture {
    let db = Arc::new(GrcDb::open_in_memory().unwrap());
    let (audit, assessment, context_id) = db
        .with_conn(|conn| {
            let (audit, context_id) = create_audit(conn, "Audit", None)?;
            let assessment =
                create_scoped_object(conn, ObjectType::Assessment, "Assessment", Some(context_id))?;
            Ok((audit, assessment, context_id))
        })
        .unwrap();
    Fixture {
        services: Services::with_defaults(db.clone()),
        db,
        audit,
        assessment,
        context_id,
    }
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
        .unwrap()
}

fn document(conn: &Connection, context_id: Option<i64>) -> i64 {
    create_document(
        conn,
        &NewDocument {
            title: "Policy".into(),
            link: "https://example.org/policy".into(),
            document_type: DocumentType::ReferenceUrl,
            context_id,
        },
    )
    .unwrap()
    .id
}

/// Creating a document returns the document and its relationship, in the
/// parent's context
#[test]
fn test_create_document_and_relate() {
    let f = fixture();
    let outcome = f
        .services
        .actions
        .process(
            ObjectType::Assessment,
            f.assessment,
            None,
            &json!({"add_related": [{
                "id": null, "type": "Document", "document_type": "EVIDENCE",
                "link": "https://example.org/evidence.pdf", "title": "Evidence"
            }]}),
        )
        .unwrap();

    let documents = outcome.added_of(EntityKind::Document);
    let relationships = outcome.added_of(EntityKind::Relationship);
    assert_eq!(documents.len(), 1);
    assert_eq!(relationships.len(), 1);
    assert!(outcome.deleted.is_empty());

    let RelatedEntity::Document(doc) = &documents[0] else {
        panic!("expected a document");
    };
    assert_eq!(doc.document_type, "EVIDENCE");
    assert_eq!(doc.context_id, Some(f.context_id));

    let RelatedEntity::Relationship(rel) = &relationships[0] else {
        panic!("expected a relationship");
    };
    assert_eq!((rel.source_type.as_str(), rel.source_id), ("Assessment", f.assessment));
    assert_eq!((rel.destination_type.as_str(), rel.destination_id), ("Document", doc.id));
    assert_eq!(rel.context_id, Some(f.context_id));
}

/// Mapping an existing snapshot only creates the relationship
#[test]
fn test_map_existing_snapshot() {
    let f = fixture();
    let snapshot = f
        .db
        .with_conn(|conn| {
            create_snapshot(
                conn,
                (ObjectType::Audit, f.audit),
                (ObjectType::Control, 3),
                Some(f.context_id),
            )
        })
        .unwrap();

    let outcome = f
        .services
        .actions
        .process(
            ObjectType::Assessment,
            f.assessment,
            None,
            &json!({"add_related": [{"id": snapshot, "type": "Snapshot"}]}),
        )
        .unwrap();
    assert_eq!(outcome.added.len(), 1);
    assert_eq!(outcome.added_of(EntityKind::Relationship).len(), 1);

    // Mapping again is a no-op
    let again = f
        .services
        .actions
        .process(
            ObjectType::Assessment,
            f.assessment,
            None,
            &json!({"add_related": [{"id": snapshot, "type": "Snapshot"}]}),
        )
        .unwrap();
    assert!(again.added.is_empty());
}

#[test]
fn test_snapshot_cannot_be_created() {
    let f = fixture();
    let err = f
        .services
        .actions
        .process(
            ObjectType::Assessment,
            f.assessment,
            None,
            &json!({"add_related": [{"id": null, "type": "Snapshot"}]}),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("Can't create Snapshot object"));
}

/// Removing an object that is not related changes nothing
#[test]
fn test_remove_unrelated_is_noop() {
    let f = fixture();
    let doc = f.db.with_conn(|conn| Ok(document(conn, None))).unwrap();

    let outcome = f
        .services
        .actions
        .process(
            ObjectType::Assessment,
            f.assessment,
            None,
            &json!({"remove_related": [{"id": doc, "type": "Document"}]}),
        )
        .unwrap();
    assert!(outcome.deleted.is_empty());
    assert!(outcome.added.is_empty());
    f.db.with_conn(|conn| {
        assert_eq!(count(conn, "documents"), 1);
        Ok(())
    })
    .unwrap();
}

/// Removal finds the relationship whichever way it points
#[test]
fn test_remove_either_direction() {
    let f = fixture();
    let doc = f
        .db
        .with_conn(|conn| {
            let doc = document(conn, Some(f.context_id));
            insert_relationship(
                conn,
                &CreateRelationshipInput::new(ObjectType::Document, doc, ObjectType::Assessment, f.assessment),
            )?;
            Ok(doc)
        })
        .unwrap();

    let outcome = f
        .services
        .actions
        .process(
            ObjectType::Assessment,
            f.assessment,
            None,
            &json!({"remove_related": [{"id": doc, "type": "Document"}]}),
        )
        .unwrap();
    assert_eq!(outcome.deleted.len(), 1);
    assert_eq!(outcome.deleted[0].source_type, "Document");

    f.db.with_conn(|conn| {
        assert!(find_between(conn, ("Assessment", f.assessment), ("Document", doc))?.is_none());
        // The object itself stays
        assert_eq!(count(conn, "documents"), 1);
        Ok(())
    })
    .unwrap();
}

/// One failing action rolls back the ones before it
#[test]
fn test_failing_action_rolls_back_batch() {
    let f = fixture();
    let err = f
        .services
        .actions
        .process(
            ObjectType::Assessment,
            f.assessment,
            None,
            &json!({
                "add_related": [{
                    "id": null, "type": "Comment", "description": "first",
                    "custom_attribute_definition_id": null
                }],
                "remove_related": [{"id": 999, "type": "Document"}]
            }),
        )
        .unwrap_err();
    assert!(matches!(err, GrcError::NotFound { id: 999, .. }));

    f.db.with_conn(|conn| {
        assert_eq!(count(conn, "comments"), 0);
        assert_eq!(count(conn, "relationships"), 0);
        Ok(())
    })
    .unwrap();
}

/// A malformed descriptor anywhere rejects the batch before execution
#[test]
fn test_malformed_descriptor_rejects_whole_batch() {
    let f = fixture();
    let err = f
        .services
        .actions
        .process(
            ObjectType::Assessment,
            f.assessment,
            None,
            &json!({"add_related": [
                {"id": null, "type": "Document", "document_type": "URL",
                 "link": "https://example.org", "title": "ok"},
                {"id": null, "type": "Comment"}
            ]}),
        )
        .unwrap_err();
    assert!(matches!(err, GrcError::MissingParameters(_)));

    let err = f
        .services
        .actions
        .process(
            ObjectType::Assessment,
            f.assessment,
            None,
            &json!({"add_related": [{"id": null, "type": "Document", "document_type": "PDF",
                                     "link": "https://example.org", "title": "bad"}]}),
        )
        .unwrap_err();
    assert!(matches!(err, GrcError::Validation(_)));

    f.db.with_conn(|conn| {
        assert_eq!(count(conn, "documents"), 0);
        Ok(())
    })
    .unwrap();
}

/// Pairs outside the validation rules are refused and rolled back
#[test]
fn test_disallowed_parent_rolls_back_created_object() {
    let f = fixture();
    let issue = f
        .db
        .with_conn(|conn| create_scoped_object(conn, ObjectType::Issue, "Issue", Some(f.context_id)))
        .unwrap();

    let err = f
        .services
        .actions
        .process(
            ObjectType::Issue,
            issue,
            None,
            &json!({"add_related": [{
                "id": null, "type": "Document", "document_type": "URL",
                "link": "https://example.org", "title": "Not for issues"
            }]}),
        )
        .unwrap_err();
    assert!(matches!(err, GrcError::DisallowedMapping { .. }));
    f.db.with_conn(|conn| {
        assert_eq!(count(conn, "documents"), 0);
        Ok(())
    })
    .unwrap();
}

/// The comment records the actor's legacy roles on the parent
#[test]
fn test_comment_assignee_type_from_actor() {
    let f = fixture();
    let actor = f
        .db
        .with_conn(|conn| {
            let actor = create_person(conn, "assignee@example.org", None)?;
            insert_relationship(
                conn,
                &CreateRelationshipInput::new(ObjectType::Assessment, f.assessment, ObjectType::Person, actor)
                    .with_attr(ASSIGNEE_TYPE_ATTR, "Assessor,Creator"),
            )?;
            Ok(actor)
        })
        .unwrap();

    let payload = json!({"add_related": [{
        "id": null, "type": "Comment", "description": "Uploaded evidence",
        "custom_attribute_definition_id": 17
    }]});
    let outcome = f
        .services
        .actions
        .process(ObjectType::Assessment, f.assessment, Some(actor), &payload)
        .unwrap();

    let RelatedEntity::Comment(comment) = &outcome.added_of(EntityKind::Comment)[0] else {
        panic!("expected a comment");
    };
    assert_eq!(comment.assignee_type.as_deref(), Some("Assessor,Creator"));
    assert_eq!(comment.custom_attribute_definition_id, Some(17));

    // Someone with no relationship to the parent leaves it empty
    let outcome = f
        .services
        .actions
        .process(ObjectType::Assessment, f.assessment, None, &payload)
        .unwrap();
    let RelatedEntity::Comment(comment) = &outcome.added_of(EntityKind::Comment)[0] else {
        panic!("expected a comment");
    };
    assert_eq!(comment.assignee_type, None);
}

#[test]
fn test_add_runs_before_remove() {
    let f = fixture();
    let doc = f.db.with_conn(|conn| Ok(document(conn, None))).unwrap();

    // Listed remove-first; still maps then unmaps
    let outcome = f
        .services
        .actions
        .process(
            ObjectType::Assessment,
            f.assessment,
            None,
            &json!({
                "remove_related": [{"id": doc, "type": "Document"}],
                "add_related": [{"id": doc, "type": "Document"}]
            }),
        )
        .unwrap();
    assert_eq!(outcome.added_of(EntityKind::Relationship).len(), 1);
    assert_eq!(outcome.deleted.len(), 1);
    f.db.with_conn(|conn| {
        assert_eq!(count(conn, "relationships"), 0);
        Ok(())
    })
    .unwrap();
}

#[tokio::test]
async fn test_events_emitted_after_commit() {
    let f = fixture();
    let mut receiver = f.services.events.subscribe();

    // Rolled back batch emits nothing
    let _ = f.services.actions.process(
        ObjectType::Assessment,
        f.assessment,
        None,
        &json!({"remove_related": [{"id": 5, "type": "Comment"}]}),
    );
    assert!(receiver.try_recv().is_err());

    f.services
        .actions
        .process(
            ObjectType::Assessment,
            f.assessment,
            None,
            &json!({"add_related": [{
                "id": null, "type": "Document", "document_type": "URL",
                "link": "https://example.org", "title": "Link"
            }]}),
        )
        .unwrap();

    let first = receiver.recv().await.unwrap();
    assert!(matches!(
        first,
        GrcEvent::RelatedObjectsAdded { ref kind, ref ids, .. } if kind == "Document" && ids.len() == 1
    ));
    let second = receiver.recv().await.unwrap();
    assert!(matches!(second, GrcEvent::RelationshipCreated { .. }));
}
