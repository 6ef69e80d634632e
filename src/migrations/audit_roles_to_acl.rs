//! Audit roles to ACL
//!
//! Auditors were legacy system roles granted in the audit's context; the
//! audit captain was the audit's `contact_id`. Both become Audit ACL entries,
//! and every object sharing the audit context gets a mapped entry derived
//! from them.

use rusqlite::{params, Connection};
use tracing::{debug, info};

use super::{seed_roles, Direction, Migration, MigrationReport};
use crate::access_control::{RoleTaxonomy, AUDITORS, AUDIT_CAPTAINS, AUDIT_ROLES};
use crate::db::{acl, objects, roles};
use crate::error::GrcError;
use crate::rules::ObjectType;

pub const REVISION: &str = "1035f388d822";

/// Legacy system role migrated to `Auditors`
pub const LEGACY_AUDITOR_ROLE: &str = "Auditor";

/// Objects that live in an audit context and receive mapped entries
pub const AUDIT_CONTEXT_TYPES: [ObjectType; 5] = [
    ObjectType::Snapshot,
    ObjectType::Assessment,
    ObjectType::Document,
    ObjectType::Issue,
    ObjectType::AssessmentTemplate,
];

pub struct AuditRolesToAcl;

impl AuditRolesToAcl {
    fn migrate_auditors(&self, conn: &Connection) -> Result<usize, GrcError> {
        conn.execute(
            "INSERT INTO access_control_list (
                 person_id, ac_role_id, object_id, object_type,
                 created_at, updated_at, context_id
             )
             SELECT ur.person_id, acr.id, c.related_object_id, c.related_object_type,
                    MAX(ur.created_at), MAX(ur.updated_at), MAX(ur.context_id)
             FROM user_roles ur
             JOIN roles r ON r.id = ur.role_id
             JOIN contexts c ON c.id = ur.context_id
             JOIN access_control_roles acr ON acr.name = ?1 AND acr.object_type = ?2
             WHERE r.name = ?3
               AND c.related_object_id IS NOT NULL
               AND c.related_object_type IS NOT NULL
             GROUP BY ur.person_id, acr.id, c.related_object_id, c.related_object_type",
            params![AUDITORS, ObjectType::Audit.as_str(), LEGACY_AUDITOR_ROLE],
        )
        .map_err(|e| GrcError::Database(format!("Failed to migrate auditors: {}", e)))
    }

    fn migrate_captains(&self, conn: &Connection) -> Result<usize, GrcError> {
        conn.execute(
            "INSERT INTO access_control_list (
                 person_id, ac_role_id, object_id, object_type,
                 created_at, updated_at, context_id
             )
             SELECT a.contact_id, acr.id, a.id, ?2,
                    a.created_at, a.updated_at, a.context_id
             FROM audits a
             JOIN people p ON p.id = a.contact_id
             JOIN access_control_roles acr ON acr.name = ?1 AND acr.object_type = ?2",
            params![AUDIT_CAPTAINS, ObjectType::Audit.as_str()],
        )
        .map_err(|e| GrcError::Database(format!("Failed to migrate audit captains: {}", e)))
    }

    /// Derive entries for every object sharing the context of a `base` entry.
    fn migrate_context_objects(&self, conn: &Connection, base: &str) -> Result<usize, GrcError> {
        let mut total = 0;
        for object_type in AUDIT_CONTEXT_TYPES {
            let (Some(table), Some(role)) = (
                objects::table_for(object_type),
                AUDIT_ROLES.mapped_role_for(base, object_type),
            ) else {
                continue;
            };

            let inserted = conn
                .execute(
                    &format!(
                        "INSERT INTO access_control_list (
                             person_id, ac_role_id, object_id, object_type,
                             created_at, updated_at, context_id, parent_id
                         )
                         SELECT acl.person_id, nacr.id, s.id, ?1,
                                MAX(acl.created_at), MAX(acl.updated_at), MAX(acl.context_id),
                                MAX(acl.id)
                         FROM {table} s
                         JOIN access_control_list acl ON acl.context_id = s.context_id
                         JOIN access_control_roles acr ON acr.id = acl.ac_role_id
                         JOIN access_control_roles nacr ON nacr.name = ?2 AND nacr.object_type = ?4
                         WHERE acr.name = ?3 AND acr.object_type = ?4
                         GROUP BY acl.person_id, nacr.id, s.id",
                        table = table
                    ),
                    params![
                        object_type.as_str(),
                        role.name,
                        base,
                        ObjectType::Audit.as_str()
                    ],
                )
                .map_err(|e| {
                    GrcError::Database(format!("Failed to map {} entries: {}", object_type, e))
                })?;
            debug!(object_type = %object_type, role = role.name, rows = inserted, "Mapped context objects");
            total += inserted;
        }
        Ok(total)
    }
}

impl Migration for AuditRolesToAcl {
    fn revision(&self) -> &'static str {
        REVISION
    }

    fn down_revision(&self) -> Option<&'static str> {
        Some(super::assignees_to_acl::REVISION)
    }

    fn description(&self) -> &'static str {
        "Migrate audit roles to ACL"
    }

    fn taxonomy(&self) -> &'static RoleTaxonomy {
        &AUDIT_ROLES
    }

    fn guard_scope(&self) -> Option<ObjectType> {
        None
    }

    fn upgrade(&self, conn: &Connection) -> Result<MigrationReport, GrcError> {
        self.check_guard(conn)?;
        let mut report = MigrationReport::new(REVISION, Direction::Upgrade);

        report.roles_created = seed_roles(conn, &AUDIT_ROLES)?;

        report.direct_entries += self.migrate_auditors(conn)?;
        report.mapped_entries += self.migrate_context_objects(conn, AUDITORS)?;
        report.direct_entries += self.migrate_captains(conn)?;
        report.mapped_entries += self.migrate_context_objects(conn, AUDIT_CAPTAINS)?;

        info!(
            direct = report.direct_entries,
            mapped = report.mapped_entries,
            "Migrated audit roles"
        );
        Ok(report)
    }

    fn downgrade(&self, conn: &Connection) -> Result<MigrationReport, GrcError> {
        let mut report = MigrationReport::new(REVISION, Direction::Downgrade);
        let names = AUDIT_ROLES.names();
        let scope = ObjectType::Audit.as_str();

        report.entries_removed = acl::delete_entries_for_role_names(conn, Some(scope), &names)?;
        report.roles_removed = roles::delete_roles_by_name(conn, Some(scope), &names)?;

        info!(
            entries = report.entries_removed,
            roles = report.roles_removed,
            "Removed audit roles"
        );
        Ok(report)
    }
}
