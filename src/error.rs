//! Error types for grc-access

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GrcError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid relationship: {source_type} can not be mapped to {destination_type}")]
    DisallowedMapping {
        source_type: String,
        destination_type: String,
    },

    #[error("Unknown object type: {0}")]
    UnknownObjectType(String),

    #[error("Invalid action type: {0}")]
    InvalidType(String),

    #[error("Missed action parameters: {0}")]
    MissingParameters(String),

    #[error("Object not found: {object_type} {id}")]
    NotFound { object_type: String, id: i64 },

    #[error("Custom Role with name '{role}' already exists in db. Migration {revision} will be stopped")]
    MigrationConflict { revision: String, role: String },

    #[error("Migration {revision} failed: {reason}")]
    MigrationIntegrity { revision: String, reason: String },

    #[error("Migration order error: {0}")]
    MigrationOrder(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by callers to decide how a failure surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    MigrationConflict,
    MigrationIntegrity,
    Internal,
}

impl GrcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GrcError::Validation(_)
            | GrcError::DisallowedMapping { .. }
            | GrcError::UnknownObjectType(_)
            | GrcError::InvalidType(_)
            | GrcError::MissingParameters(_) => ErrorKind::Validation,
            GrcError::NotFound { .. } => ErrorKind::NotFound,
            GrcError::MigrationConflict { .. } => ErrorKind::MigrationConflict,
            GrcError::MigrationIntegrity { .. } | GrcError::MigrationOrder(_) => {
                ErrorKind::MigrationIntegrity
            }
            _ => ErrorKind::Internal,
        }
    }

    pub(crate) fn not_found(object_type: impl Into<String>, id: i64) -> Self {
        GrcError::NotFound {
            object_type: object_type.into(),
            id,
        }
    }
}
