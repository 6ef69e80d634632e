//! Assessment assignees to ACL
//!
//! Legacy assessments recorded their people as `Person <-> Assessment`
//! relationships whose attribute bag holds free text such as
//! `"Assessor,Creator"`. This revision turns those into ACL entries:
//!
//! 1. add `access_control_list.parent_id` and `access_control_roles.internal`
//! 2. seed the Assessment role taxonomy
//! 3. one direct entry per (person, role, assessment)
//! 4. one mapped entry per (person, mapped role, related object), linked to
//!    the direct entry it derives from
//! 5. drop the scratch tables
//! 6. rename the assessor reminder notification type

use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use super::{exec, exec_batch, seed_roles, Direction, Migration, MigrationReport};
use crate::access_control::{RoleTaxonomy, ASSESSMENT_ROLES, ASSIGNEES, CREATORS, VERIFIERS};
use crate::db::roles;
use crate::db::{acl, schema};
use crate::error::GrcError;
use crate::rules::ObjectType;

pub const REVISION: &str = "33d043d8ba29";

/// SQL name of the legacy role-token matcher.
pub const LEGACY_MATCH_FN: &str = "legacy_role_matches";

pub const ASSIGNEES_REMINDER: &str = "assessment_assignees_reminder";

/// Legacy attribute token -> direct role
pub const ROLE_TRANSLATION: [(&str, &str); 3] = [
    ("Creator", CREATORS),
    ("Assessor", ASSIGNEES),
    ("Verifier", VERIFIERS),
];

const SCRATCH_TABLES: [&str; 3] = [
    "ac_roles_translation",
    "temp_assigned_objects",
    "temp_mapped_objects",
];

/// Whether a legacy attribute value grants the role behind `token`.
///
/// Matches by substring containment, not equality: the legacy attribute
/// embeds several role names in one string (`"Assessor,Creator"`). A token
/// that is a substring of another role name would also match.
pub fn legacy_role_token_matches(attr_value: &str, token: &str) -> bool {
    attr_value.contains(token)
}

/// Expose [`legacy_role_token_matches`] to SQL on this connection.
pub fn register_legacy_matcher(conn: &Connection) -> Result<(), GrcError> {
    conn.create_scalar_function(
        LEGACY_MATCH_FN,
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let attr_value: Option<String> = ctx.get(0)?;
            let token: Option<String> = ctx.get(1)?;
            Ok(match (attr_value, token) {
                (Some(value), Some(token)) => legacy_role_token_matches(&value, &token),
                _ => false,
            })
        },
    )
    .map_err(|e| GrcError::Database(format!("Failed to register {}: {}", LEGACY_MATCH_FN, e)))
}

/// `CASE` expression appending `" <Type>"` for destination types with their
/// own mapped variant.
fn specialization_case(taxonomy: &RoleTaxonomy, type_column: &str) -> String {
    let mut types: Vec<ObjectType> = taxonomy
        .direct_roles()
        .flat_map(|role| taxonomy.specialized_types(role.name))
        .collect();
    types.sort();
    types.dedup();

    if types.is_empty() {
        return "''".to_string();
    }
    let list = types
        .iter()
        .map(|t| format!("'{}'", t))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CASE WHEN {col} IN ({list}) THEN ' ' || {col} ELSE '' END",
        col = type_column,
        list = list
    )
}

pub struct AssigneesToAcl;

impl AssigneesToAcl {
    fn extend_schema(&self, conn: &Connection) -> Result<(), GrcError> {
        exec_batch(
            conn,
            "extend ACL schema",
            "ALTER TABLE access_control_list ADD COLUMN parent_id INTEGER
                 REFERENCES access_control_list(id) ON DELETE CASCADE;
             CREATE INDEX IF NOT EXISTS idx_access_control_list_parent
                 ON access_control_list(parent_id);
             ALTER TABLE access_control_roles ADD COLUMN internal INTEGER NOT NULL DEFAULT 0;",
        )
    }

    fn migrate_direct_assignments(&self, conn: &Connection) -> Result<usize, GrcError> {
        register_legacy_matcher(conn)?;

        exec_batch(
            conn,
            "create scratch tables",
            "CREATE TEMP TABLE ac_roles_translation (
                 old_name TEXT NOT NULL,
                 new_name TEXT NOT NULL
             );
             CREATE TEMP TABLE temp_assigned_objects (
                 assignable_id INTEGER,
                 assignable_type TEXT,
                 person_id INTEGER,
                 role_id INTEGER,
                 role_name TEXT,
                 context_id INTEGER,
                 created_at TEXT,
                 updated_at TEXT
             );",
        )?;
        for (old_name, new_name) in ROLE_TRANSLATION {
            conn.execute(
                "INSERT INTO ac_roles_translation (old_name, new_name) VALUES (?, ?)",
                params![old_name, new_name],
            )
            .map_err(|e| GrcError::Database(format!("Failed to fill role translation: {}", e)))?;
        }

        // Person may sit on either end of the legacy relationship
        let staged = exec(
            conn,
            "stage direct assignments",
            &format!(
                "INSERT INTO temp_assigned_objects (
                     assignable_id, assignable_type, person_id,
                     role_id, role_name, context_id, created_at, updated_at
                 )
                 SELECT r.destination_id, r.destination_type, r.source_id,
                        acr.id, acr.name, r.context_id, r.created_at, r.updated_at
                 FROM relationships r
                 JOIN relationship_attrs ra ON ra.relationship_id = r.id
                 JOIN people p ON p.id = r.source_id
                 JOIN access_control_roles acr ON acr.object_type = r.destination_type
                     AND acr.object_type = '{object_type}'
                 JOIN ac_roles_translation art ON art.new_name = acr.name
                 WHERE r.source_type = 'Person'
                   AND {matcher}(ra.attr_value, art.old_name)

                 UNION

                 SELECT r.source_id, r.source_type, r.destination_id,
                        acr.id, acr.name, r.context_id, r.created_at, r.updated_at
                 FROM relationships r
                 JOIN relationship_attrs ra ON ra.relationship_id = r.id
                 JOIN people p ON p.id = r.destination_id
                 JOIN access_control_roles acr ON acr.object_type = r.source_type
                     AND acr.object_type = '{object_type}'
                 JOIN ac_roles_translation art ON art.new_name = acr.name
                 WHERE r.destination_type = 'Person'
                   AND {matcher}(ra.attr_value, art.old_name)",
                object_type = ObjectType::Assessment,
                matcher = LEGACY_MATCH_FN,
            ),
        )?;
        debug!(rows = staged, "Staged direct assignments");

        exec(
            conn,
            "migrate direct assignments",
            "INSERT INTO access_control_list (
                 person_id, ac_role_id, object_id, object_type,
                 created_at, updated_at, context_id
             )
             SELECT person_id, role_id, assignable_id, assignable_type,
                    MAX(created_at), MAX(updated_at), MAX(context_id)
             FROM temp_assigned_objects
             GROUP BY person_id, role_id, assignable_id, assignable_type",
        )
    }

    fn migrate_mapped_objects(&self, conn: &Connection) -> Result<usize, GrcError> {
        exec_batch(
            conn,
            "create mapped scratch table",
            "CREATE TEMP TABLE temp_mapped_objects (
                 mapped_id INTEGER,
                 mapped_type TEXT,
                 person_id INTEGER,
                 role TEXT,
                 context_id INTEGER,
                 parent_id INTEGER,
                 created_at TEXT,
                 updated_at TEXT
             );",
        )?;

        // (counterpart end, assigned end) of each relationship
        for (mapped, assigned) in [("source", "destination"), ("destination", "source")] {
            let mapped_type = format!("r.{}_type", mapped);
            let staged = exec(
                conn,
                "stage mapped objects",
                &format!(
                    "INSERT INTO temp_mapped_objects (
                         mapped_id, mapped_type, person_id,
                         role, context_id, parent_id, created_at, updated_at
                     )
                     SELECT r.{mapped}_id,
                            r.{mapped}_type,
                            tao.person_id,
                            tao.role_name || {suffix} || ' Mapped',
                            r.context_id,
                            acl.id,
                            r.created_at,
                            r.updated_at
                     FROM relationships r
                     JOIN temp_assigned_objects tao
                         ON tao.assignable_id = r.{assigned}_id
                        AND tao.assignable_type = r.{assigned}_type
                        AND r.{mapped}_type != 'Person'
                     JOIN access_control_list acl
                         ON acl.object_type = tao.assignable_type
                        AND acl.object_id = tao.assignable_id
                        AND acl.person_id = tao.person_id
                        AND acl.ac_role_id = tao.role_id",
                    mapped = mapped,
                    assigned = assigned,
                    suffix = specialization_case(&ASSESSMENT_ROLES, &mapped_type),
                ),
            )?;
            debug!(rows = staged, side = mapped, "Staged mapped objects");
        }

        // Overlapping relationships can derive the same entry; keep one with
        // the latest timestamps
        exec(
            conn,
            "migrate mapped objects",
            &format!(
                "INSERT INTO access_control_list (
                     person_id, ac_role_id, object_id, object_type,
                     created_at, updated_at, context_id, parent_id
                 )
                 SELECT tmo.person_id, acr.id, tmo.mapped_id, tmo.mapped_type,
                        MAX(tmo.created_at), MAX(tmo.updated_at), MAX(tmo.context_id),
                        MAX(tmo.parent_id)
                 FROM temp_mapped_objects tmo
                 JOIN access_control_roles acr
                     ON acr.object_type = '{}'
                    AND acr.name = tmo.role
                 GROUP BY tmo.person_id, acr.id, tmo.mapped_id, tmo.mapped_type",
                ObjectType::Assessment
            ),
        )
    }

    fn drop_scratch_tables(&self, conn: &Connection) -> Result<(), GrcError> {
        for table in SCRATCH_TABLES {
            exec(
                conn,
                "drop scratch table",
                &format!("DROP TABLE IF EXISTS temp.{}", table),
            )?;
        }
        Ok(())
    }

    fn rename_notification(&self, conn: &Connection, from: &str, to: &str) -> Result<usize, GrcError> {
        conn.execute(
            "UPDATE notification_types SET name = ? WHERE name = ?",
            params![to, from],
        )
        .map_err(|e| GrcError::Database(format!("Failed to rename notification type: {}", e)))
    }

    /// Recreate `access_control_list` without `parent_id`, keeping rows.
    fn rebuild_acl_without_parent(&self, conn: &Connection) -> Result<(), GrcError> {
        let columns = schema::table_columns(conn, "access_control_list")?
            .into_iter()
            .filter(|c| c != "parent_id")
            .collect::<Vec<_>>()
            .join(", ");

        exec_batch(
            conn,
            "rebuild access control list",
            &format!(
                "{create}
                 INSERT INTO access_control_list_rebuild ({cols})
                     SELECT {cols} FROM access_control_list;
                 DROP TABLE access_control_list;
                 ALTER TABLE access_control_list_rebuild RENAME TO access_control_list;
                 {indexes}",
                create = schema::acl_table_ddl("access_control_list_rebuild"),
                cols = columns,
                indexes = schema::ACL_INDEXES,
            ),
        )
    }
}

impl Migration for AssigneesToAcl {
    fn revision(&self) -> &'static str {
        REVISION
    }

    fn down_revision(&self) -> Option<&'static str> {
        None
    }

    fn description(&self) -> &'static str {
        "Migrate assessment assignees to ACL"
    }

    fn taxonomy(&self) -> &'static RoleTaxonomy {
        &ASSESSMENT_ROLES
    }

    fn guard_scope(&self) -> Option<ObjectType> {
        Some(ObjectType::Assessment)
    }

    fn upgrade(&self, conn: &Connection) -> Result<MigrationReport, GrcError> {
        self.check_guard(conn)?;
        let mut report = MigrationReport::new(REVISION, Direction::Upgrade);

        self.extend_schema(conn)?;
        report.roles_created = seed_roles(conn, &ASSESSMENT_ROLES)?;
        report.direct_entries = self.migrate_direct_assignments(conn)?;
        info!(entries = report.direct_entries, "Migrated direct assignments");

        report.mapped_entries = self.migrate_mapped_objects(conn)?;
        info!(entries = report.mapped_entries, "Migrated mapped objects");

        self.drop_scratch_tables(conn)?;
        report.notifications_renamed =
            self.rename_notification(conn, schema::LEGACY_ASSESSOR_REMINDER, ASSIGNEES_REMINDER)?;

        Ok(report)
    }

    fn downgrade(&self, conn: &Connection) -> Result<MigrationReport, GrcError> {
        let mut report = MigrationReport::new(REVISION, Direction::Downgrade);
        let names = ASSESSMENT_ROLES.names();
        let scope = ObjectType::Assessment.to_string();

        report.entries_removed = acl::delete_entries_for_role_names(conn, Some(&scope), &names)?;
        report.roles_removed = roles::delete_roles_by_name(conn, Some(&scope), &names)?;

        self.rebuild_acl_without_parent(conn)?;
        exec(
            conn,
            "drop internal flag",
            "ALTER TABLE access_control_roles DROP COLUMN internal",
        )?;

        report.notifications_renamed =
            self.rename_notification(conn, ASSIGNEES_REMINDER, schema::LEGACY_ASSESSOR_REMINDER)?;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_token_matches_by_containment() {
        assert!(legacy_role_token_matches("Assessor", "Assessor"));
        assert!(legacy_role_token_matches("Assessor,Creator", "Creator"));
        assert!(legacy_role_token_matches("Lead Verifier", "Verifier"));
        assert!(!legacy_role_token_matches("assessor", "Assessor"));
        assert!(!legacy_role_token_matches("", "Creator"));
    }

    #[test]
    fn test_matcher_registered_in_sql() {
        let conn = Connection::open_in_memory().unwrap();
        register_legacy_matcher(&conn).unwrap();
        let matched: bool = conn
            .query_row(
                "SELECT legacy_role_matches('Assessor,Verifier', 'Verifier')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(matched);
        let null_value: bool = conn
            .query_row("SELECT legacy_role_matches(NULL, 'Verifier')", [], |row| row.get(0))
            .unwrap();
        assert!(!null_value);
    }

    #[test]
    fn test_specialization_case_for_assessment_roles() {
        let case = specialization_case(&ASSESSMENT_ROLES, "r.source_type");
        assert_eq!(
            case,
            "CASE WHEN r.source_type IN ('Document') THEN ' ' || r.source_type ELSE '' END"
        );
    }

    #[test]
    fn test_translation_targets_direct_roles() {
        for (_, new_name) in ROLE_TRANSLATION {
            let role = ASSESSMENT_ROLES.get(new_name).unwrap();
            assert!(!role.internal());
        }
    }
}
