//! GRC access control
//!
//! Relationship rules, role taxonomies and the ACL migrations that move
//! legacy role assignments onto an access-control list.
//!
//! ## Architecture
//!
//! - **rules**: mapping, unmapping and validation tables over a closed set
//!   of object types
//! - **access_control**: direct and mapped role taxonomies
//! - **db**: SQLite store and repository functions
//! - **migrations**: ordered, reversible ACL revisions
//! - **actions**: add/remove related objects in one batch
//! - **services**: transaction boundaries and events
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/grc-access/
//! ├── grc.db          # SQLite store (WAL mode)
//! └── config.toml     # Optional configuration
//! ```

pub mod access_control;
pub mod actions;
pub mod config;
pub mod db;
pub mod error;
pub mod migrations;
pub mod rules;
pub mod services;

// Re-exports
pub use access_control::{taxonomy_for, Permissions, RoleDefinition, RoleTaxonomy, RoleTier};
pub use actions::{ActionBatch, ActionOutcome, RelatedKind};
pub use config::Config;
pub use db::GrcDb;
pub use error::{ErrorKind, GrcError};
pub use migrations::{MigrationReport, MigrationRunner};
pub use rules::{Extension, ObjectType, RelationshipValidator, RuleRegistry};
pub use services::{EventBus, GrcEvent, Services};
