//! ACL service - role grants at runtime
//!
//! A grant creates the direct entry, then one level of derived entries on
//! every object related to the target, using the mapped role the taxonomy
//! picks for that object's type. Revoking an entry removes its derived
//! entries with it.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::access_control::taxonomy_for;
use crate::db::{
    acl, objects, relationships, roles, AccessControlRoleRow, AclEntryRow, CreateAclEntryInput, GrcDb,
};
use crate::error::GrcError;
use crate::rules::ObjectType;

use super::events::{EventBus, GrcEvent};

/// Direct entry plus the entries derived from it
#[derive(Debug, Clone, Serialize)]
pub struct GrantOutcome {
    pub entry: AclEntryRow,
    pub created: bool,
    pub derived: Vec<AclEntryRow>,
}

pub struct AclService {
    db: Arc<GrcDb>,
    events: Arc<EventBus>,
}

impl AclService {
    pub fn new(db: Arc<GrcDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn roles_for(&self, object_type: ObjectType) -> Result<Vec<AccessControlRoleRow>, GrcError> {
        self.db.with_conn(|conn| roles::list_roles(conn, object_type.as_str()))
    }

    pub fn entries_for(&self, object_type: ObjectType, object_id: i64) -> Result<Vec<AclEntryRow>, GrcError> {
        self.db
            .with_conn(|conn| acl::list_for_object(conn, object_type.as_str(), object_id))
    }

    /// Mandatory roles of the object's type with nobody assigned on it
    pub fn unassigned_mandatory_roles(
        &self,
        object_type: ObjectType,
        object_id: i64,
    ) -> Result<Vec<String>, GrcError> {
        self.db.with_conn(|conn| {
            let assigned = acl::assigned_role_names(conn, object_type.as_str(), object_id)?;
            Ok(roles::mandatory_role_names(conn, object_type.as_str())?
                .into_iter()
                .filter(|name| !assigned.contains(name))
                .collect())
        })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Grant `role_name` on an object to a person.
    ///
    /// Granting an existing assignment again is not an error; missing derived
    /// entries are filled in.
    pub fn grant(
        &self,
        person_id: i64,
        role_name: &str,
        object_type: ObjectType,
        object_id: i64,
    ) -> Result<GrantOutcome, GrcError> {
        let taxonomy = taxonomy_for(object_type);
        if let Some(def) = taxonomy.and_then(|t| t.get(role_name)) {
            if def.internal() {
                return Err(GrcError::Validation(format!(
                    "Role '{}' is derived and can not be granted directly",
                    role_name
                )));
            }
        }

        let outcome = self.db.transaction(|conn| {
            let role = roles::find_role(conn, object_type.as_str(), role_name)?.ok_or_else(|| {
                GrcError::Validation(format!("Unknown role '{}' for {}", role_name, object_type))
            })?;
            if objects::object_exists(conn, ObjectType::Person, person_id)? != Some(true) {
                return Err(GrcError::not_found(ObjectType::Person.as_str(), person_id));
            }
            if objects::object_exists(conn, object_type, object_id)? == Some(false) {
                return Err(GrcError::not_found(object_type.as_str(), object_id));
            }

            let (entry, created) = acl::ensure_entry(
                conn,
                &CreateAclEntryInput {
                    person_id,
                    ac_role_id: role.id,
                    object_id,
                    object_type: object_type.to_string(),
                    context_id: objects::context_of(conn, object_type, object_id)?,
                    parent_id: None,
                },
            )?;

            let mut derived = Vec::new();
            let Some(taxonomy) = taxonomy else {
                return Ok(GrantOutcome { entry, created, derived });
            };

            for relationship in relationships::list_for_object(conn, object_type.as_str(), object_id)? {
                let Some((related_type, related_id)) =
                    relationship.counterpart(object_type.as_str(), object_id)
                else {
                    continue;
                };
                let Ok(related_type) = related_type.parse::<ObjectType>() else {
                    continue;
                };
                if related_type == ObjectType::Person {
                    continue;
                }
                let Some(mapped) = taxonomy.mapped_role_for(role_name, related_type) else {
                    continue;
                };
                let Some(mapped_role) = roles::find_role(conn, object_type.as_str(), mapped.name)? else {
                    debug!(role = mapped.name, "Mapped role not seeded, skipping");
                    continue;
                };

                let (row, inserted) = acl::ensure_entry(
                    conn,
                    &CreateAclEntryInput {
                        person_id,
                        ac_role_id: mapped_role.id,
                        object_id: related_id,
                        object_type: related_type.to_string(),
                        context_id: objects::context_of(conn, related_type, related_id)?,
                        parent_id: Some(entry.id),
                    },
                )?;
                if inserted {
                    derived.push(row);
                }
            }

            Ok(GrantOutcome { entry, created, derived })
        })?;

        info!(
            person_id = person_id,
            role = role_name,
            object = %format!("{}:{}", object_type, object_id),
            derived = outcome.derived.len(),
            "Granted role"
        );
        self.events.emit(GrcEvent::AclGranted {
            entry_id: outcome.entry.id,
            person_id,
            role: role_name.to_string(),
            object_type: object_type.to_string(),
            object_id,
            derived: outcome.derived.len(),
        });
        Ok(outcome)
    }

    /// Delete an entry and its derived entries; returns every removed id.
    pub fn revoke(&self, entry_id: i64) -> Result<Vec<i64>, GrcError> {
        let removed = self.db.transaction(|conn| {
            if acl::get_entry(conn, entry_id)?.is_none() {
                return Err(GrcError::not_found("AccessControlList", entry_id));
            }
            acl::delete_entry(conn, entry_id)
        })?;

        debug!(entry_id = entry_id, removed = removed.len(), "Revoked ACL entry");
        self.events.emit(GrcEvent::AclRevoked {
            entry_ids: removed.clone(),
        });
        Ok(removed)
    }
}
