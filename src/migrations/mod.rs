//! ACL migration engine
//!
//! Each revision rewrites legacy role data into access control roles and
//! entries. Revisions run in a fixed order, each inside its own SQLite
//! transaction, so a failing revision leaves the store exactly as it was
//! (DDL included).
//!
//! ```text
//! base ── 33d043d8ba29 (assignees) ── 1035f388d822 (audit roles) ── head
//! ```

pub mod assignees_to_acl;
pub mod audit_roles_to_acl;

use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::access_control::RoleTaxonomy;
use crate::db::roles::{self, CreateRoleInput};
use crate::db::GrcDb;
use crate::error::GrcError;
use crate::rules::ObjectType;
use crate::services::events::{EventBus, GrcEvent};

pub use assignees_to_acl::{legacy_role_token_matches, AssigneesToAcl};
pub use audit_roles_to_acl::AuditRolesToAcl;

/// Downgrade target that reverts every applied revision.
pub const BASE: &str = "base";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upgrade,
    Downgrade,
}

/// What a single revision did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub revision: &'static str,
    pub direction: Direction,
    pub roles_created: usize,
    pub direct_entries: usize,
    pub mapped_entries: usize,
    pub roles_removed: usize,
    pub entries_removed: usize,
    pub notifications_renamed: usize,
}

impl MigrationReport {
    pub fn new(revision: &'static str, direction: Direction) -> Self {
        Self {
            revision,
            direction,
            roles_created: 0,
            direct_entries: 0,
            mapped_entries: 0,
            roles_removed: 0,
            entries_removed: 0,
            notifications_renamed: 0,
        }
    }
}

/// One ACL revision
pub trait Migration: Send + Sync {
    fn revision(&self) -> &'static str;

    /// Revision that must be applied first; `None` for the first one.
    fn down_revision(&self) -> Option<&'static str>;

    fn description(&self) -> &'static str;

    /// Roles this revision introduces.
    fn taxonomy(&self) -> &'static RoleTaxonomy;

    /// Object type the name-collision guard is restricted to; `None` checks
    /// role names across every object type.
    fn guard_scope(&self) -> Option<ObjectType>;

    /// Abort before any mutation if a role this revision creates already exists.
    fn check_guard(&self, conn: &Connection) -> Result<(), GrcError> {
        let names = self.taxonomy().names();
        let scope = self.guard_scope().map(|t| t.to_string());
        let existing = roles::existing_role_names(conn, scope.as_deref(), &names)?;
        if let Some(role) = existing.into_iter().next() {
            warn!(revision = self.revision(), role = %role, "Role name collision, stopping migration");
            return Err(GrcError::MigrationConflict {
                revision: self.revision().to_string(),
                role,
            });
        }
        Ok(())
    }

    /// Apply the revision. Runs the guard first.
    fn upgrade(&self, conn: &Connection) -> Result<MigrationReport, GrcError>;

    /// Revert the revision. Only exact if nothing touched the new roles since.
    fn downgrade(&self, conn: &Connection) -> Result<MigrationReport, GrcError>;
}

/// Every known revision, oldest first
pub fn all_migrations() -> Vec<Box<dyn Migration>> {
    vec![Box::new(AssigneesToAcl), Box::new(AuditRolesToAcl)]
}

/// Insert every role of `taxonomy` for its object type.
pub(crate) fn seed_roles(conn: &Connection, taxonomy: &RoleTaxonomy) -> Result<usize, GrcError> {
    let object_type = taxonomy.object_type.to_string();
    for def in taxonomy.roles {
        roles::create_role(conn, &CreateRoleInput::from_definition(&object_type, def))?;
        debug!(role = def.name, object_type = %object_type, "Seeded role");
    }
    Ok(taxonomy.roles.len())
}

/// Run a statement, mapping failures with the phase name.
pub(crate) fn exec(conn: &Connection, phase: &str, sql: &str) -> Result<usize, GrcError> {
    conn.execute(sql, [])
        .map_err(|e| GrcError::Database(format!("Failed to {}: {}", phase, e)))
}

pub(crate) fn exec_batch(conn: &Connection, phase: &str, sql: &str) -> Result<(), GrcError> {
    conn.execute_batch(sql)
        .map_err(|e| GrcError::Database(format!("Failed to {}: {}", phase, e)))
}

// =============================================================================
// Runner
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RevisionStatus {
    pub revision: &'static str,
    pub description: &'static str,
    pub applied: bool,
    pub applied_at: Option<String>,
}

/// Applies and reverts revisions in order, one transaction per revision
pub struct MigrationRunner {
    db: Arc<GrcDb>,
    migrations: Vec<Box<dyn Migration>>,
    events: Option<Arc<EventBus>>,
}

impl MigrationRunner {
    pub fn new(db: Arc<GrcDb>) -> Self {
        Self::with_migrations(db, all_migrations())
    }

    pub fn with_migrations(db: Arc<GrcDb>, migrations: Vec<Box<dyn Migration>>) -> Self {
        Self {
            db,
            migrations,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn revisions(&self) -> Vec<&'static str> {
        self.migrations.iter().map(|m| m.revision()).collect()
    }

    pub fn head(&self) -> Option<&'static str> {
        self.migrations.last().map(|m| m.revision())
    }

    fn position(&self, revision: &str) -> Result<usize, GrcError> {
        self.migrations
            .iter()
            .position(|m| m.revision() == revision)
            .ok_or_else(|| GrcError::MigrationOrder(format!("Unknown revision: {}", revision)))
    }

    /// Number of applied revisions; they must form a prefix of the ordered list.
    fn applied_count(&self, conn: &Connection) -> Result<usize, GrcError> {
        let mut count = 0;
        let mut gap = None;
        for migration in &self.migrations {
            if applied_at(conn, migration.revision())?.is_some() {
                if let Some(missing) = gap {
                    return Err(GrcError::MigrationOrder(format!(
                        "Revision {} is applied but {} is not",
                        migration.revision(),
                        missing
                    )));
                }
                count += 1;
            } else if gap.is_none() {
                gap = Some(migration.revision());
            }
        }
        Ok(count)
    }

    pub fn status(&self) -> Result<Vec<RevisionStatus>, GrcError> {
        self.db.with_conn(|conn| {
            self.migrations
                .iter()
                .map(|m| {
                    let applied_at = applied_at(conn, m.revision())?;
                    Ok(RevisionStatus {
                        revision: m.revision(),
                        description: m.description(),
                        applied: applied_at.is_some(),
                        applied_at,
                    })
                })
                .collect()
        })
    }

    /// Apply every pending revision
    pub fn upgrade(&self) -> Result<Vec<MigrationReport>, GrcError> {
        match self.head() {
            Some(head) => self.upgrade_to(head),
            None => Ok(Vec::new()),
        }
    }

    /// Apply pending revisions up to and including `target`.
    ///
    /// Guards of every pending revision are checked before the first one is
    /// applied, so a collision anywhere leaves the store untouched.
    pub fn upgrade_to(&self, target: &str) -> Result<Vec<MigrationReport>, GrcError> {
        let target_pos = self.position(target)?;

        self.db.with_conn_mut(|conn| {
            let applied = self.applied_count(conn)?;
            if applied > target_pos {
                info!(target = target, "Already at or past target revision");
                return Ok(Vec::new());
            }

            let pending = &self.migrations[applied..=target_pos];
            for migration in pending {
                migration.check_guard(conn)?;
            }

            let mut reports = Vec::new();
            for migration in pending {
                let revision = migration.revision();
                info!(revision = revision, "Applying revision: {}", migration.description());

                let tx = conn
                    .transaction()
                    .map_err(|e| GrcError::Database(format!("Failed to start transaction: {}", e)))?;
                let report = migration
                    .upgrade(&tx)
                    .and_then(|report| {
                        tx.execute(
                            "INSERT INTO schema_revisions (revision, applied_at) VALUES (?, ?)",
                            params![revision, crate::db::now()],
                        )
                        .map_err(|e| GrcError::Database(format!("Failed to record revision: {}", e)))?;
                        Ok(report)
                    })
                    .map_err(|e| integrity_error(revision, e))?;
                tx.commit()
                    .map_err(|e| integrity_error(revision, GrcError::Database(e.to_string())))?;

                info!(
                    revision = revision,
                    roles = report.roles_created,
                    direct = report.direct_entries,
                    mapped = report.mapped_entries,
                    "Revision applied"
                );
                reports.push(report);
            }
            Ok(reports)
        })
        .map(|reports| {
            for report in &reports {
                self.emit(GrcEvent::MigrationApplied {
                    revision: report.revision.to_string(),
                    direct_entries: report.direct_entries,
                    mapped_entries: report.mapped_entries,
                });
            }
            reports
        })
    }

    /// Revert the `steps` most recently applied revisions
    pub fn downgrade(&self, steps: usize) -> Result<Vec<MigrationReport>, GrcError> {
        let applied = self.db.with_conn(|conn| self.applied_count(conn))?;
        let keep = applied.saturating_sub(steps);
        self.downgrade_keeping(keep)
    }

    /// Revert every revision applied after `target`; `base` reverts all.
    pub fn downgrade_to(&self, target: &str) -> Result<Vec<MigrationReport>, GrcError> {
        let keep = if target == BASE {
            0
        } else {
            self.position(target)? + 1
        };
        self.downgrade_keeping(keep)
    }

    fn downgrade_keeping(&self, keep: usize) -> Result<Vec<MigrationReport>, GrcError> {
        self.db.with_conn_mut(|conn| {
            let applied = self.applied_count(conn)?;
            let mut reports = Vec::new();

            for migration in self.migrations[keep.min(applied)..applied].iter().rev() {
                let revision = migration.revision();
                info!(revision = revision, "Reverting revision: {}", migration.description());

                let tx = conn
                    .transaction()
                    .map_err(|e| GrcError::Database(format!("Failed to start transaction: {}", e)))?;
                let report = migration
                    .downgrade(&tx)
                    .and_then(|report| {
                        tx.execute(
                            "DELETE FROM schema_revisions WHERE revision = ?",
                            params![revision],
                        )
                        .map_err(|e| GrcError::Database(format!("Failed to clear revision: {}", e)))?;
                        Ok(report)
                    })
                    .map_err(|e| integrity_error(revision, e))?;
                tx.commit()
                    .map_err(|e| integrity_error(revision, GrcError::Database(e.to_string())))?;

                info!(
                    revision = revision,
                    roles = report.roles_removed,
                    entries = report.entries_removed,
                    "Revision reverted"
                );
                reports.push(report);
            }
            Ok(reports)
        })
        .map(|reports| {
            for report in &reports {
                self.emit(GrcEvent::MigrationReverted {
                    revision: report.revision.to_string(),
                });
            }
            reports
        })
    }

    fn emit(&self, event: GrcEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }
}

fn applied_at(conn: &Connection, revision: &str) -> Result<Option<String>, GrcError> {
    conn.query_row(
        "SELECT applied_at FROM schema_revisions WHERE revision = ?",
        params![revision],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| GrcError::Database(format!("Failed to read schema revisions: {}", e)))
}

/// Failures after the guard are integrity failures; guard errors pass through.
fn integrity_error(revision: &str, err: GrcError) -> GrcError {
    match err {
        GrcError::MigrationConflict { .. }
        | GrcError::MigrationIntegrity { .. }
        | GrcError::MigrationOrder(_) => err,
        other => GrcError::MigrationIntegrity {
            revision: revision.to_string(),
            reason: other.to_string(),
        },
    }
}
