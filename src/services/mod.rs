//! Service layer for grc-access
//!
//! Services sit between callers (CLI, embedding applications) and the
//! repository functions in `db`. Each one owns:
//! - Transaction boundaries
//! - Existence and rule checks that span tables
//! - Event emission after commit
//!
//! ```text
//! CLI / embedding application
//!     ↓
//! Service Layer (services/*.rs)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod events;
pub mod action_service;
pub mod acl_service;
pub mod relationship_service;

pub use events::{spawn_logging_listener, EventBus, EventListener, GrcEvent};
pub use action_service::ActionService;
pub use acl_service::{AclService, GrantOutcome};
pub use relationship_service::RelationshipService;

use std::sync::Arc;

use crate::db::GrcDb;
use crate::migrations::MigrationRunner;
use crate::rules::{RelationshipValidator, RuleRegistry};

/// Service container sharing one database, rule registry and event bus
pub struct Services {
    pub relationships: Arc<RelationshipService>,
    pub actions: Arc<ActionService>,
    pub acl: Arc<AclService>,
    pub migrations: Arc<MigrationRunner>,
    pub events: Arc<EventBus>,
}

impl Services {
    pub fn new(db: Arc<GrcDb>, registry: Arc<RuleRegistry>, events: Arc<EventBus>) -> Self {
        let validator = Arc::new(RelationshipValidator::new(registry));

        Self {
            relationships: Arc::new(RelationshipService::new(
                db.clone(),
                validator.clone(),
                events.clone(),
            )),
            actions: Arc::new(ActionService::new(db.clone(), validator, events.clone())),
            acl: Arc::new(AclService::new(db.clone(), events.clone())),
            migrations: Arc::new(MigrationRunner::new(db).with_events(events.clone())),
            events,
        }
    }

    /// Services over the process-wide registry with a default event bus
    pub fn with_defaults(db: Arc<GrcDb>) -> Self {
        Self::new(db, RuleRegistry::shared(), Arc::new(EventBus::new()))
    }
}
