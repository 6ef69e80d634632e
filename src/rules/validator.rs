//! Relationship validator
//!
//! Accepts a `(source, destination)` pair iff the destination is listed for
//! the source in the validation table. Only one direction is checked; the
//! table itself is symmetric.

use std::sync::Arc;

use tracing::debug;

use super::{ObjectType, RuleRegistry, RuleTable};
use crate::error::GrcError;

#[derive(Debug, Clone)]
pub struct RelationshipValidator {
    registry: Arc<RuleRegistry>,
}

impl RelationshipValidator {
    pub fn new(registry: Arc<RuleRegistry>) -> Self {
        Self { registry }
    }

    /// Validator over the process-wide registry.
    pub fn global() -> Self {
        Self::new(RuleRegistry::shared())
    }

    /// Validator over a standalone table (no core rules).
    pub fn with_rules(rules: RuleTable) -> Self {
        Self::new(Arc::new(
            RuleRegistry::builder()
                .without_core()
                .contribute_table(rules)
                .build(),
        ))
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn is_allowed(&self, source: ObjectType, destination: ObjectType) -> bool {
        self.registry
            .mapping_validation_rules()
            .get(&source)
            .map(|allowed| allowed.contains(&destination))
            .unwrap_or(false)
    }

    pub fn validate(&self, source: ObjectType, destination: ObjectType) -> Result<(), GrcError> {
        if self.is_allowed(source, destination) {
            Ok(())
        } else {
            debug!(source = %source, destination = %destination, "Relationship rejected");
            Err(GrcError::DisallowedMapping {
                source_type: source.to_string(),
                destination_type: destination.to_string(),
            })
        }
    }

    /// Validate a pair given as stored type names.
    pub fn validate_names(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<(ObjectType, ObjectType), GrcError> {
        let source_type = source.parse::<ObjectType>()?;
        let destination_type = destination.parse::<ObjectType>()?;
        self.validate(source_type, destination_type)?;
        Ok((source_type, destination_type))
    }
}

impl Default for RelationshipValidator {
    fn default() -> Self {
        Self::global()
    }
}
