//! Access control role taxonomy
//!
//! Every base role has a direct tier and one or more mapped tiers:
//!
//! ```text
//! Auditors                      direct, granted to a person on the audit
//! ├── Auditors Mapped           derived on related objects
//! └── Auditors Document Mapped  derived on related documents only
//! ```
//!
//! Mapped roles are internal: the system maintains them, users never assign
//! them. The names are stored verbatim and must not change.

use serde::Serialize;

use crate::rules::ObjectType;

/// Permission quadruple plus the "my work" relevance flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Permissions {
    pub read: bool,
    pub update: bool,
    pub delete: bool,
    pub mandatory: bool,
    pub my_work: bool,
}

impl Permissions {
    pub const fn new(read: bool, update: bool, delete: bool, mandatory: bool, my_work: bool) -> Self {
        Self {
            read,
            update,
            delete,
            mandatory,
            my_work,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "tier", content = "object_type", rename_all = "snake_case")]
pub enum RoleTier {
    Direct,
    Mapped,
    TypeMapped(ObjectType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoleDefinition {
    pub name: &'static str,
    /// Direct role this one derives from; `None` for direct roles.
    pub base: Option<&'static str>,
    pub tier: RoleTier,
    pub permissions: Permissions,
}

impl RoleDefinition {
    const fn direct(name: &'static str, permissions: Permissions) -> Self {
        Self {
            name,
            base: None,
            tier: RoleTier::Direct,
            permissions,
        }
    }

    const fn mapped(name: &'static str, base: &'static str, permissions: Permissions) -> Self {
        Self {
            name,
            base: Some(base),
            tier: RoleTier::Mapped,
            permissions,
        }
    }

    const fn type_mapped(
        name: &'static str,
        base: &'static str,
        object_type: ObjectType,
        permissions: Permissions,
    ) -> Self {
        Self {
            name,
            base: Some(base),
            tier: RoleTier::TypeMapped(object_type),
            permissions,
        }
    }

    pub fn internal(&self) -> bool {
        !matches!(self.tier, RoleTier::Direct)
    }

    /// Every role in a seeded taxonomy is locked against admin edits.
    pub fn non_editable(&self) -> bool {
        true
    }
}

/// Role set of one object type
#[derive(Debug, Clone, Copy)]
pub struct RoleTaxonomy {
    pub object_type: ObjectType,
    pub roles: &'static [RoleDefinition],
}

impl RoleTaxonomy {
    pub fn names(&self) -> Vec<&'static str> {
        self.roles.iter().map(|r| r.name).collect()
    }

    pub fn direct_roles(&self) -> impl Iterator<Item = &'static RoleDefinition> {
        self.roles.iter().filter(|r| !r.internal())
    }

    pub fn mapped_roles(&self) -> impl Iterator<Item = &'static RoleDefinition> {
        self.roles.iter().filter(|r| r.internal())
    }

    pub fn get(&self, name: &str) -> Option<&'static RoleDefinition> {
        self.roles.iter().find(|r| r.name == name)
    }

    /// Mapped role derived from `base` on an object of `destination` type.
    ///
    /// A type-specialized variant wins over the generic one.
    pub fn mapped_role_for(
        &self,
        base: &str,
        destination: ObjectType,
    ) -> Option<&'static RoleDefinition> {
        let mut generic = None;
        for role in self.roles.iter().filter(|r| r.base == Some(base)) {
            match role.tier {
                RoleTier::TypeMapped(t) if t == destination => return Some(role),
                RoleTier::Mapped => generic = Some(role),
                _ => {}
            }
        }
        generic
    }

    /// Object types that have their own mapped variant for `base`.
    pub fn specialized_types(&self, base: &str) -> Vec<ObjectType> {
        self.roles
            .iter()
            .filter(|r| r.base == Some(base))
            .filter_map(|r| match r.tier {
                RoleTier::TypeMapped(t) => Some(t),
                _ => None,
            })
            .collect()
    }
}

/// `"{base} Mapped"` or `"{base} {Type} Mapped"`.
pub fn mapped_role_name(base: &str, specialization: Option<ObjectType>) -> String {
    match specialization {
        Some(object_type) => format!("{} {} Mapped", base, object_type),
        None => format!("{} Mapped", base),
    }
}

pub const CREATORS: &str = "Creators";
pub const ASSIGNEES: &str = "Assignees";
pub const VERIFIERS: &str = "Verifiers";
pub const AUDITORS: &str = "Auditors";
pub const AUDIT_CAPTAINS: &str = "Audit Captains";

const ASSIGNEE: Permissions = Permissions::new(true, true, false, true, true);
const VERIFIER: Permissions = Permissions::new(true, true, false, false, true);
const READ_ONLY_MAPPED: Permissions = Permissions::new(true, false, false, false, true);
const DOCUMENT_MAPPED: Permissions = Permissions::new(true, true, true, false, true);

static ASSESSMENT_ROLE_DEFS: [RoleDefinition; 9] = [
    RoleDefinition::direct(CREATORS, ASSIGNEE),
    RoleDefinition::direct(ASSIGNEES, ASSIGNEE),
    RoleDefinition::direct(VERIFIERS, VERIFIER),
    RoleDefinition::mapped("Creators Mapped", CREATORS, READ_ONLY_MAPPED),
    RoleDefinition::mapped("Assignees Mapped", ASSIGNEES, READ_ONLY_MAPPED),
    RoleDefinition::mapped("Verifiers Mapped", VERIFIERS, READ_ONLY_MAPPED),
    RoleDefinition::type_mapped(
        "Creators Document Mapped",
        CREATORS,
        ObjectType::Document,
        DOCUMENT_MAPPED,
    ),
    RoleDefinition::type_mapped(
        "Assignees Document Mapped",
        ASSIGNEES,
        ObjectType::Document,
        DOCUMENT_MAPPED,
    ),
    RoleDefinition::type_mapped(
        "Verifiers Document Mapped",
        VERIFIERS,
        ObjectType::Document,
        DOCUMENT_MAPPED,
    ),
];

const AUDITOR: Permissions = Permissions::new(true, false, false, false, true);
const CAPTAIN: Permissions = Permissions::new(true, true, true, true, true);
const CAPTAIN_MAPPED: Permissions = Permissions::new(true, true, true, false, false);
const AUDITOR_MAPPED: Permissions = Permissions::new(true, false, false, false, false);
const AUDITOR_EDIT_MAPPED: Permissions = Permissions::new(true, true, false, false, false);

static AUDIT_ROLE_DEFS: [RoleDefinition; 8] = [
    RoleDefinition::direct(AUDITORS, AUDITOR),
    RoleDefinition::direct(AUDIT_CAPTAINS, CAPTAIN),
    RoleDefinition::mapped("Audit Captains Mapped", AUDIT_CAPTAINS, CAPTAIN_MAPPED),
    RoleDefinition::mapped("Auditors Mapped", AUDITORS, AUDITOR_MAPPED),
    RoleDefinition::type_mapped(
        "Auditors Assessment Mapped",
        AUDITORS,
        ObjectType::Assessment,
        AUDITOR_EDIT_MAPPED,
    ),
    RoleDefinition::type_mapped(
        "Auditors Document Mapped",
        AUDITORS,
        ObjectType::Document,
        AUDITOR_EDIT_MAPPED,
    ),
    RoleDefinition::type_mapped(
        "Auditors Snapshot Mapped",
        AUDITORS,
        ObjectType::Snapshot,
        AUDITOR_EDIT_MAPPED,
    ),
    RoleDefinition::type_mapped(
        "Auditors Issue Mapped",
        AUDITORS,
        ObjectType::Issue,
        AUDITOR_EDIT_MAPPED,
    ),
];

pub static ASSESSMENT_ROLES: RoleTaxonomy = RoleTaxonomy {
    object_type: ObjectType::Assessment,
    roles: &ASSESSMENT_ROLE_DEFS,
};

pub static AUDIT_ROLES: RoleTaxonomy = RoleTaxonomy {
    object_type: ObjectType::Audit,
    roles: &AUDIT_ROLE_DEFS,
};

pub fn taxonomy_for(object_type: ObjectType) -> Option<&'static RoleTaxonomy> {
    match object_type {
        ObjectType::Assessment => Some(&ASSESSMENT_ROLES),
        ObjectType::Audit => Some(&AUDIT_ROLES),
        _ => None,
    }
}
