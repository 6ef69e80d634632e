//! Integration tests for the ACL revisions
//!
//! Each test seeds a legacy store (people, relationships with role
//! attributes, legacy user roles), runs the revision runner and inspects the
//! resulting access-control list.

use std::sync::Arc;

use grc_access::db::objects::{
    assign_legacy_role, create_audit, create_document, create_person, create_scoped_object,
    create_snapshot, DocumentType, NewDocument,
};
use grc_access::db::relationships::{insert_relationship, ASSIGNEE_TYPE_ATTR};
use grc_access::db::roles::{create_role, list_roles, CreateRoleInput};
use grc_access::db::schema::{column_exists, temp_table_exists};
use grc_access::db::{acl, CreateAclEntryInput, CreateRelationshipInput};
use grc_access::error::GrcError;
use grc_access::migrations::MigrationRunner;
use grc_access::{GrcDb, ObjectType};
use rusqlite::Connection;
use tempfile::TempDir;

const ASSIGNEES_REVISION: &str = "33d043d8ba29";
const AUDIT_REVISION: &str = "1035f388d822";

/// ACL row joined with its role name
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    id: i64,
    person_id: i64,
    role: String,
    object_type: String,
    object_id: i64,
    context_id: Option<i64>,
    created_at: String,
    updated_at: String,
    parent_id: Option<i64>,
}

fn entries(conn: &Connection) -> Vec<Entry> {
    let with_parent = column_exists(conn, "access_control_list", "parent_id").unwrap();
    let sql = format!(
        "SELECT acl.id, acl.person_id, acr.name, acl.object_type, acl.object_id,
                acl.context_id, acl.created_at, acl.updated_at, {}
         FROM access_control_list acl
         JOIN access_control_roles acr ON acr.id = acl.ac_role_id
         ORDER BY acl.id",
        if with_parent { "acl.parent_id" } else { "NULL" }
    );
    let mut stmt = conn.prepare(&sql).unwrap();
    let rows = stmt
        .query_map([], |row| {
            Ok(Entry {
                id: row.get(0)?,
                person_id: row.get(1)?,
                role: row.get(2)?,
                object_type: row.get(3)?,
                object_id: row.get(4)?,
                context_id: row.get(5)?,
                created_at: row.get(6)?,
                updated_at: row.get(7)?,
                parent_id: row.get(8)?,
            })
        })
        .unwrap();
    let result = rows.map(|r| r.unwrap()).collect();
    result
}

fn entries_for_role(conn: &Connection, role: &str) -> Vec<Entry> {
    entries(conn).into_iter().filter(|e| e.role == role).collect()
}

fn notification_names(conn: &Connection) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT name FROM notification_types ORDER BY id")
        .unwrap();
    let names = stmt
        .query_map([], |row| row.get(0))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    names
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
        .unwrap()
}

/// Legacy Person <-> Assessment relationship carrying role tokens
fn legacy_assignment(
    conn: &Connection,
    person_first: bool,
    person: i64,
    assessment: i64,
    tokens: &str,
    created_at: &str,
) -> Result<(), GrcError> {
    let input = if person_first {
        CreateRelationshipInput::new(ObjectType::Person, person, ObjectType::Assessment, assessment)
    } else {
        CreateRelationshipInput::new(ObjectType::Assessment, assessment, ObjectType::Person, person)
    };
    insert_relationship(
        conn,
        &input.with_attr(ASSIGNEE_TYPE_ATTR, tokens).created_at(created_at),
    )?;
    Ok(())
}

struct Seeded {
    person: i64,
    assessment: i64,
    context_id: i64,
}

fn seed_assessment(db: &GrcDb, tokens: &str) -> Seeded {
    db.with_conn(|conn| {
        let person = create_person(conn, "assessor@example.org", Some("Assessor"))?;
        let (_, context_id) = create_audit(conn, "Q3 audit", None)?;
        let assessment =
            create_scoped_object(conn, ObjectType::Assessment, "Access review", Some(context_id))?;
        legacy_assignment(conn, true, person, assessment, tokens, "2017-03-01 10:00:00")?;
        Ok(Seeded {
            person,
            assessment,
            context_id,
        })
    })
    .unwrap()
}

fn store() -> Arc<GrcDb> {
    Arc::new(GrcDb::open_in_memory().unwrap())
}

// =============================================================================
// Assignees revision
// =============================================================================

/// "Assessor,Creator" yields one entry per matched token
#[test]
fn test_combined_tokens_yield_one_entry_per_role() {
    let db = store();
    let seeded = seed_assessment(&db, "Assessor,Creator");

    MigrationRunner::new(db.clone())
        .upgrade_to(ASSIGNEES_REVISION)
        .unwrap();

    db.with_conn(|conn| {
        let direct: Vec<(String, i64)> = entries(conn)
            .into_iter()
            .filter(|e| e.parent_id.is_none())
            .map(|e| (e.role, e.object_id))
            .collect();
        assert_eq!(direct.len(), 2);
        assert!(direct.contains(&("Assignees".to_string(), seeded.assessment)));
        assert!(direct.contains(&("Creators".to_string(), seeded.assessment)));
        assert!(entries_for_role(conn, "Verifiers").is_empty());
        Ok(())
    })
    .unwrap();
}

/// Person may be the destination of the legacy relationship
#[test]
fn test_reverse_direction_relationship_migrated() {
    let db = store();
    let (person, assessment) = db
        .with_conn(|conn| {
            let person = create_person(conn, "verifier@example.org", None)?;
            let assessment = create_scoped_object(conn, ObjectType::Assessment, "A", None)?;
            legacy_assignment(conn, false, person, assessment, "Verifier", "2018-01-01 00:00:00")?;
            Ok((person, assessment))
        })
        .unwrap();

    MigrationRunner::new(db.clone()).upgrade().unwrap();

    db.with_conn(|conn| {
        let verifiers = entries_for_role(conn, "Verifiers");
        assert_eq!(verifiers.len(), 1);
        assert_eq!(verifiers[0].person_id, person);
        assert_eq!(verifiers[0].object_type, "Assessment");
        assert_eq!(verifiers[0].object_id, assessment);
        Ok(())
    })
    .unwrap();
}

/// Tokens match by containment inside free text
#[test]
fn test_token_matched_inside_free_text() {
    let db = store();
    seed_assessment(&db, "Lead Assessor (temporary)");

    MigrationRunner::new(db.clone()).upgrade().unwrap();

    db.with_conn(|conn| {
        assert_eq!(entries_for_role(conn, "Assignees").len(), 1);
        Ok(())
    })
    .unwrap();
}

/// Two legacy relationships for the same assignment collapse into one entry
/// carrying the latest timestamps
#[test]
fn test_duplicate_assignments_keep_latest_timestamps() {
    let db = store();
    let seeded = seed_assessment(&db, "Assessor");
    db.with_conn(|conn| {
        legacy_assignment(
            conn,
            false,
            seeded.person,
            seeded.assessment,
            "Assessor",
            "2019-06-30 08:15:00",
        )
    })
    .unwrap();

    MigrationRunner::new(db.clone()).upgrade().unwrap();

    db.with_conn(|conn| {
        let assignees = entries_for_role(conn, "Assignees");
        assert_eq!(assignees.len(), 1);
        assert_eq!(assignees[0].created_at, "2019-06-30 08:15:00");
        assert_eq!(assignees[0].updated_at, "2019-06-30 08:15:00");
        Ok(())
    })
    .unwrap();
}

/// Related objects get mapped entries; Documents get their own variant
#[test]
fn test_mapped_entries_follow_relationships() {
    let db = store();
    let seeded = seed_assessment(&db, "Assessor");
    let (snapshot, document) = db
        .with_conn(|conn| {
            let snapshot = create_snapshot(
                conn,
                (ObjectType::Audit, 1),
                (ObjectType::Control, 12),
                Some(seeded.context_id),
            )?;
            let document = create_document(
                conn,
                &NewDocument {
                    title: "Evidence".into(),
                    link: "https://example.org/evidence".into(),
                    document_type: DocumentType::Evidence,
                    context_id: Some(seeded.context_id),
                },
            )?
            .id;
            insert_relationship(
                conn,
                &CreateRelationshipInput::new(
                    ObjectType::Assessment,
                    seeded.assessment,
                    ObjectType::Snapshot,
                    snapshot,
                )
                .with_context(Some(seeded.context_id)),
            )?;
            insert_relationship(
                conn,
                &CreateRelationshipInput::new(
                    ObjectType::Document,
                    document,
                    ObjectType::Assessment,
                    seeded.assessment,
                )
                .with_context(Some(seeded.context_id)),
            )?;
            Ok((snapshot, document))
        })
        .unwrap();

    let reports = MigrationRunner::new(db.clone())
        .upgrade_to(ASSIGNEES_REVISION)
        .unwrap();
    assert_eq!(reports[0].direct_entries, 1);
    assert_eq!(reports[0].mapped_entries, 2);

    db.with_conn(|conn| {
        let direct = entries_for_role(conn, "Assignees");
        assert_eq!(direct.len(), 1);

        let mapped = entries_for_role(conn, "Assignees Mapped");
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].object_type, "Snapshot");
        assert_eq!(mapped[0].object_id, snapshot);
        assert_eq!(mapped[0].parent_id, Some(direct[0].id));
        assert_eq!(mapped[0].context_id, Some(seeded.context_id));

        let document_mapped = entries_for_role(conn, "Assignees Document Mapped");
        assert_eq!(document_mapped.len(), 1);
        assert_eq!(document_mapped[0].object_id, document);
        assert_eq!(document_mapped[0].parent_id, Some(direct[0].id));

        // The person relationship itself is never mapped
        assert!(entries(conn).iter().all(|e| e.object_type != "Person"));
        Ok(())
    })
    .unwrap();
}

/// An object related to the assessment both ways yields one mapped entry
/// with the latest relationship timestamps
#[test]
fn test_duplicate_mapped_objects_keep_latest_timestamps() {
    let db = store();
    let seeded = seed_assessment(&db, "Assessor");
    let snapshot = db
        .with_conn(|conn| {
            let snapshot = create_snapshot(
                conn,
                (ObjectType::Audit, 1),
                (ObjectType::Control, 4),
                Some(seeded.context_id),
            )?;
            insert_relationship(
                conn,
                &CreateRelationshipInput::new(
                    ObjectType::Assessment,
                    seeded.assessment,
                    ObjectType::Snapshot,
                    snapshot,
                )
                .created_at("2017-02-02 00:00:00"),
            )?;
            insert_relationship(
                conn,
                &CreateRelationshipInput::new(
                    ObjectType::Snapshot,
                    snapshot,
                    ObjectType::Assessment,
                    seeded.assessment,
                )
                .created_at("2019-09-09 00:00:00"),
            )?;
            Ok(snapshot)
        })
        .unwrap();

    MigrationRunner::new(db.clone())
        .upgrade_to(ASSIGNEES_REVISION)
        .unwrap();

    db.with_conn(|conn| {
        let direct = entries_for_role(conn, "Assignees");
        assert_eq!(direct.len(), 1);

        let mapped = entries_for_role(conn, "Assignees Mapped");
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].object_id, snapshot);
        assert_eq!(mapped[0].created_at, "2019-09-09 00:00:00");
        assert_eq!(mapped[0].updated_at, "2019-09-09 00:00:00");
        assert_eq!(mapped[0].parent_id, Some(direct[0].id));
        Ok(())
    })
    .unwrap();
}

/// Deleting a direct entry removes what was derived from it
#[test]
fn test_deleting_direct_entry_cascades() {
    let db = store();
    let seeded = seed_assessment(&db, "Assessor");
    db.with_conn(|conn| {
        let snapshot = create_snapshot(
            conn,
            (ObjectType::Audit, 1),
            (ObjectType::Control, 3),
            Some(seeded.context_id),
        )?;
        insert_relationship(
            conn,
            &CreateRelationshipInput::new(
                ObjectType::Assessment,
                seeded.assessment,
                ObjectType::Snapshot,
                snapshot,
            ),
        )?;
        Ok(())
    })
    .unwrap();
    MigrationRunner::new(db.clone())
        .upgrade_to(ASSIGNEES_REVISION)
        .unwrap();

    db.with_conn(|conn| {
        let direct = entries_for_role(conn, "Assignees").remove(0);
        let removed = acl::delete_entry(conn, direct.id)?;
        assert_eq!(removed.len(), 2);
        assert!(entries(conn).is_empty());
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_scratch_tables_dropped_after_upgrade() {
    let db = store();
    seed_assessment(&db, "Creator");
    MigrationRunner::new(db.clone()).upgrade().unwrap();

    db.with_conn(|conn| {
        for table in ["ac_roles_translation", "temp_assigned_objects", "temp_mapped_objects"] {
            assert!(!temp_table_exists(conn, table)?, "{} left behind", table);
        }
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_notification_renamed_and_restored() {
    let db = store();
    let runner = MigrationRunner::new(db.clone());

    runner.upgrade_to(ASSIGNEES_REVISION).unwrap();
    db.with_conn(|conn| {
        assert_eq!(notification_names(conn), vec!["assessment_assignees_reminder"]);
        Ok(())
    })
    .unwrap();

    runner.downgrade_to("base").unwrap();
    db.with_conn(|conn| {
        assert_eq!(notification_names(conn), vec!["assessment_assessor_reminder"]);
        Ok(())
    })
    .unwrap();
}

/// The stored Assessment roles are exactly the taxonomy, with only the
/// direct tier user-assignable
#[test]
fn test_seeded_assessment_roles() {
    let db = store();
    MigrationRunner::new(db.clone())
        .upgrade_to(ASSIGNEES_REVISION)
        .unwrap();

    db.with_conn(|conn| {
        let mut stored: Vec<(String, bool)> = list_roles(conn, "Assessment")?
            .into_iter()
            .map(|role| (role.name, role.internal))
            .collect();
        stored.sort();

        let mut expected: Vec<(String, bool)> = [
            ("Creators", false),
            ("Assignees", false),
            ("Verifiers", false),
            ("Creators Mapped", true),
            ("Assignees Mapped", true),
            ("Verifiers Mapped", true),
            ("Creators Document Mapped", true),
            ("Assignees Document Mapped", true),
            ("Verifiers Document Mapped", true),
        ]
        .into_iter()
        .map(|(name, internal)| (name.to_string(), internal))
        .collect();
        expected.sort();

        assert_eq!(stored, expected);
        Ok(())
    })
    .unwrap();
}

// =============================================================================
// Guards
// =============================================================================

/// A pre-existing Assessment role with a taxonomy name stops the upgrade
/// before anything changes
#[test]
fn test_guard_conflict_leaves_store_unchanged() {
    let db = store();
    seed_assessment(&db, "Assessor");
    db.with_conn(|conn| create_role(conn, &CreateRoleInput::custom("Assessment", "Assignees")))
        .unwrap();

    let runner = MigrationRunner::new(db.clone());
    let err = runner.upgrade().unwrap_err();
    match err {
        GrcError::MigrationConflict { revision, role } => {
            assert_eq!(revision, ASSIGNEES_REVISION);
            assert_eq!(role, "Assignees");
        }
        other => panic!("expected conflict, got {:?}", other),
    }

    assert!(runner.status().unwrap().iter().all(|s| !s.applied));
    db.with_conn(|conn| {
        assert!(!column_exists(conn, "access_control_list", "parent_id")?);
        assert!(!column_exists(conn, "access_control_roles", "internal")?);
        assert_eq!(count(conn, "access_control_roles"), 1);
        assert_eq!(count(conn, "access_control_list"), 0);
        assert_eq!(notification_names(conn), vec!["assessment_assessor_reminder"]);
        Ok(())
    })
    .unwrap();
}

/// The assignees guard only looks at Assessment roles
#[test]
fn test_same_name_on_other_type_does_not_block_assignees() {
    let db = store();
    db.with_conn(|conn| create_role(conn, &CreateRoleInput::custom("Control", "Assignees")))
        .unwrap();

    let reports = MigrationRunner::new(db).upgrade().unwrap();
    assert_eq!(reports.len(), 2);
}

/// The audit guard looks at every object type, and is checked before the
/// first pending revision runs
#[test]
fn test_audit_guard_is_global_and_checked_up_front() {
    let db = store();
    db.with_conn(|conn| create_role(conn, &CreateRoleInput::custom("Control", "Auditors")))
        .unwrap();

    let runner = MigrationRunner::new(db.clone());
    assert!(matches!(
        runner.upgrade(),
        Err(GrcError::MigrationConflict { ref revision, .. }) if revision == AUDIT_REVISION
    ));
    assert!(runner.status().unwrap().iter().all(|s| !s.applied));
    db.with_conn(|conn| {
        assert!(!column_exists(conn, "access_control_list", "parent_id")?);
        assert!(!column_exists(conn, "access_control_roles", "internal")?);
        assert_eq!(count(conn, "access_control_roles"), 1);
        Ok(())
    })
    .unwrap();
}

/// An existing Audit "Auditors" role blocks the audit revision and leaves
/// roles, entries and columns as they were
#[test]
fn test_existing_audit_role_blocks_upgrade() {
    let db = store();
    let seeded = seed_assessment(&db, "Assessor");
    db.with_conn(|conn| {
        let role = create_role(conn, &CreateRoleInput::custom("Audit", "Auditors"))?;
        acl::create_entry(
            conn,
            &CreateAclEntryInput {
                person_id: seeded.person,
                ac_role_id: role.id,
                object_id: 1,
                object_type: "Audit".into(),
                context_id: Some(seeded.context_id),
                parent_id: None,
            },
        )?;
        Ok(())
    })
    .unwrap();

    let runner = MigrationRunner::new(db.clone());
    match runner.upgrade().unwrap_err() {
        GrcError::MigrationConflict { revision, role } => {
            assert_eq!(revision, AUDIT_REVISION);
            assert_eq!(role, "Auditors");
        }
        other => panic!("expected conflict, got {:?}", other),
    }

    assert!(runner.status().unwrap().iter().all(|s| !s.applied));
    db.with_conn(|conn| {
        assert_eq!(count(conn, "access_control_roles"), 1);
        assert_eq!(count(conn, "access_control_list"), 1);
        assert!(!column_exists(conn, "access_control_roles", "internal")?);
        assert!(!column_exists(conn, "access_control_list", "parent_id")?);
        assert_eq!(entries_for_role(conn, "Auditors").len(), 1);
        Ok(())
    })
    .unwrap();
}

// =============================================================================
// Downgrade
// =============================================================================

/// Custom roles and their entries survive a full downgrade
#[test]
fn test_downgrade_keeps_custom_roles() {
    let db = store();
    let seeded = seed_assessment(&db, "Assessor");
    let custom = db
        .with_conn(|conn| {
            let role = create_role(conn, &CreateRoleInput::custom("Assessment", "Reviewers"))?;
            acl::create_entry(
                conn,
                &CreateAclEntryInput {
                    person_id: seeded.person,
                    ac_role_id: role.id,
                    object_id: seeded.assessment,
                    object_type: "Assessment".into(),
                    context_id: None,
                    parent_id: None,
                },
            )?;
            Ok(role)
        })
        .unwrap();

    let runner = MigrationRunner::new(db.clone());
    runner.upgrade().unwrap();
    let reverted = runner.downgrade_to("base").unwrap();
    assert_eq!(reverted.len(), 2);
    assert_eq!(reverted[0].revision, AUDIT_REVISION);
    assert_eq!(reverted[1].revision, ASSIGNEES_REVISION);
    assert_eq!(reverted[1].roles_removed, 9);

    db.with_conn(|conn| {
        let remaining = entries(conn);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].role, custom.name);
        assert_eq!(count(conn, "access_control_roles"), 1);
        Ok(())
    })
    .unwrap();

    // And the revision can be applied again
    assert_eq!(runner.upgrade().unwrap().len(), 2);
}

// =============================================================================
// Audit revision
// =============================================================================

#[test]
fn test_audit_roles_migrated_with_context_objects() {
    let db = store();
    let ids = db
        .with_conn(|conn| {
            let captain = create_person(conn, "captain@example.org", None)?;
            let auditor = create_person(conn, "auditor@example.org", None)?;
            let (audit, context_id) = create_audit(conn, "FY audit", Some(captain))?;
            assign_legacy_role(conn, auditor, "Auditor", context_id)?;
            // Duplicate legacy grant collapses into one entry
            assign_legacy_role(conn, auditor, "Auditor", context_id)?;

            let assessment =
                create_scoped_object(conn, ObjectType::Assessment, "A", Some(context_id))?;
            let issue = create_scoped_object(conn, ObjectType::Issue, "I", Some(context_id))?;
            let template = create_scoped_object(
                conn,
                ObjectType::AssessmentTemplate,
                "T",
                Some(context_id),
            )?;
            let snapshot = create_snapshot(
                conn,
                (ObjectType::Audit, audit),
                (ObjectType::Control, 9),
                Some(context_id),
            )?;
            let document = create_document(
                conn,
                &NewDocument {
                    title: "Workpaper".into(),
                    link: "https://example.org/wp".into(),
                    document_type: DocumentType::Url,
                    context_id: Some(context_id),
                },
            )?
            .id;
            Ok((captain, auditor, audit, assessment, issue, template, snapshot, document))
        })
        .unwrap();
    let (captain, auditor, audit, assessment, issue, template, snapshot, document) = ids;

    let reports = MigrationRunner::new(db.clone()).upgrade().unwrap();
    assert_eq!(reports[1].direct_entries, 2);
    assert_eq!(reports[1].mapped_entries, 10);

    db.with_conn(|conn| {
        let auditors = entries_for_role(conn, "Auditors");
        assert_eq!(auditors.len(), 1);
        assert_eq!(auditors[0].person_id, auditor);
        assert_eq!(auditors[0].object_type, "Audit");
        assert_eq!(auditors[0].object_id, audit);

        let captains = entries_for_role(conn, "Audit Captains");
        assert_eq!(captains.len(), 1);
        assert_eq!(captains[0].person_id, captain);

        for (role, object_type, object_id) in [
            ("Auditors Assessment Mapped", "Assessment", assessment),
            ("Auditors Issue Mapped", "Issue", issue),
            ("Auditors Snapshot Mapped", "Snapshot", snapshot),
            ("Auditors Document Mapped", "Document", document),
            ("Auditors Mapped", "AssessmentTemplate", template),
        ] {
            let mapped = entries_for_role(conn, role);
            assert_eq!(mapped.len(), 1, "{}", role);
            assert_eq!(mapped[0].object_type, object_type);
            assert_eq!(mapped[0].object_id, object_id);
            assert_eq!(mapped[0].person_id, auditor);
            assert_eq!(mapped[0].parent_id, Some(auditors[0].id));
        }

        let captain_mapped = entries_for_role(conn, "Audit Captains Mapped");
        assert_eq!(captain_mapped.len(), 5);
        assert!(captain_mapped
            .iter()
            .all(|e| e.person_id == captain && e.parent_id == Some(captains[0].id)));
        Ok(())
    })
    .unwrap();
}

/// Audit contacts that no longer exist are skipped
#[test]
fn test_missing_audit_contact_skipped() {
    let db = store();
    db.with_conn(|conn| create_audit(conn, "Orphan", Some(404)).map(|_| ()))
        .unwrap();

    let reports = MigrationRunner::new(db.clone()).upgrade().unwrap();
    assert_eq!(reports[1].direct_entries, 0);
}

/// File-backed store keeps applied revisions across reopen
#[test]
fn test_revisions_persist_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("grc.db");

    {
        let db = Arc::new(GrcDb::open(&path).unwrap());
        seed_assessment(&db, "Assessor");
        MigrationRunner::new(db).upgrade_to(ASSIGNEES_REVISION).unwrap();
    }

    let db = Arc::new(GrcDb::open(&path).unwrap());
    let runner = MigrationRunner::new(db.clone());
    let status = runner.status().unwrap();
    assert!(status[0].applied);
    assert!(!status[1].applied);
    db.with_conn(|conn| {
        assert!(column_exists(conn, "access_control_list", "parent_id")?);
        assert_eq!(entries_for_role(conn, "Assignees").len(), 1);
        Ok(())
    })
    .unwrap();
}
