//! Relationship rule registry
//!
//! Three independent tables keyed by [`ObjectType`]:
//!
//! - **mapping** - what the UI offers to map for a type
//! - **unmapping** - mapping rules narrowed for the audit-scope pair, so
//!   snapshot content can't be bulk-unmapped
//! - **validation** - the hard gate for `Relationship` creation; core table
//!   merged with contributed extension tables
//!
//! Mapping and validation evolved separately and must stay separate tables.
//! Tables are built once and never mutated afterwards.

pub mod builtin;
pub mod object_type;
pub mod risk;
pub mod validator;
pub mod workflow;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::error::GrcError;

pub use object_type::ObjectType;
pub use validator::RelationshipValidator;

/// Object type -> allowed counterpart types.
pub type RuleTable = BTreeMap<ObjectType, BTreeSet<ObjectType>>;

/// A module-provided table merged into the validation rules.
pub type RuleContribution = fn() -> RuleTable;

pub(crate) fn set_of(types: &[ObjectType]) -> BTreeSet<ObjectType> {
    types.iter().copied().collect()
}

/// Adds `target` to the entry of every type in `sources`.
pub(crate) fn mirror_into(rules: &mut RuleTable, target: ObjectType, sources: &[ObjectType]) {
    for source in sources {
        rules.entry(*source).or_default().insert(target);
    }
}

/// Rebuild a table with every edge reversed.
pub fn mirrored(rules: &RuleTable) -> RuleTable {
    let mut mirrored = RuleTable::new();
    for (source, destinations) in rules {
        for destination in destinations {
            mirrored.entry(*destination).or_default().insert(*source);
        }
    }
    mirrored
}

/// Pairs `(A, B)` where `A -> B` is allowed but `B -> A` is not.
pub fn asymmetric_pairs(rules: &RuleTable) -> Vec<(ObjectType, ObjectType)> {
    let mut pairs = Vec::new();
    for (source, destinations) in rules {
        for destination in destinations {
            let back = rules
                .get(destination)
                .map(|set| set.contains(source))
                .unwrap_or(false);
            if !back {
                pairs.push((*source, *destination));
            }
        }
    }
    pairs
}

/// Optional modules that contribute validation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extension {
    Risks,
    Workflows,
}

impl Extension {
    pub const ALL: [Extension; 2] = [Extension::Risks, Extension::Workflows];

    pub fn name(&self) -> &'static str {
        match self {
            Extension::Risks => "risks",
            Extension::Workflows => "workflows",
        }
    }

    pub fn contribution(&self) -> RuleContribution {
        match self {
            Extension::Risks => risk::validation_rules,
            Extension::Workflows => workflow::validation_rules,
        }
    }
}

impl FromStr for Extension {
    type Err = GrcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "risks" | "ggrc_risks" => Ok(Extension::Risks),
            "workflows" | "ggrc_workflows" => Ok(Extension::Workflows),
            other => Err(GrcError::Config(format!("Unknown rule extension: {}", other))),
        }
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable set of rule tables
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    mapping: RuleTable,
    unmapping: RuleTable,
    validation: RuleTable,
}

impl RuleRegistry {
    pub fn builder() -> RuleRegistryBuilder {
        RuleRegistryBuilder::default()
    }

    /// Core tables only, no contributed extensions.
    pub fn core_only() -> Self {
        Self::builder().build()
    }

    /// Core tables merged with the given extensions, in order.
    pub fn with_extensions(extensions: &[Extension]) -> Self {
        extensions
            .iter()
            .fold(Self::builder(), |builder, ext| builder.contribute(ext.contribution()))
            .build()
    }

    /// Resolve extension names (e.g. from config) and build the registry.
    pub fn from_extension_names<S: AsRef<str>>(names: &[S]) -> Result<Self, GrcError> {
        let extensions = names
            .iter()
            .map(|name| name.as_ref().parse::<Extension>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::with_extensions(&extensions))
    }

    /// Process-wide registry with every known extension, built on first use.
    pub fn global() -> &'static RuleRegistry {
        Self::global_arc().as_ref()
    }

    /// Shared handle to the process-wide registry.
    pub fn shared() -> Arc<RuleRegistry> {
        Arc::clone(Self::global_arc())
    }

    fn global_arc() -> &'static Arc<RuleRegistry> {
        static GLOBAL: OnceLock<Arc<RuleRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(RuleRegistry::with_extensions(&Extension::ALL)))
    }

    pub fn mapping_rules(&self) -> &RuleTable {
        &self.mapping
    }

    pub fn unmapping_rules(&self) -> &RuleTable {
        &self.unmapping
    }

    pub fn mapping_validation_rules(&self) -> &RuleTable {
        &self.validation
    }

    /// Allowed counterparts for `object_type`; a missing key means none.
    pub fn allowed_for(&self, object_type: ObjectType) -> BTreeSet<ObjectType> {
        self.validation
            .get(&object_type)
            .cloned()
            .unwrap_or_default()
    }
}

/// Builds a [`RuleRegistry`]: core tables first, then contributions in order.
pub struct RuleRegistryBuilder {
    include_core: bool,
    contributions: Vec<RuleTable>,
}

impl Default for RuleRegistryBuilder {
    fn default() -> Self {
        Self {
            include_core: true,
            contributions: Vec::new(),
        }
    }
}

impl RuleRegistryBuilder {
    /// Skip the built-in validation table (used for isolated rule sets).
    pub fn without_core(mut self) -> Self {
        self.include_core = false;
        self
    }

    pub fn contribute(mut self, contribution: RuleContribution) -> Self {
        self.contributions.push(contribution());
        self
    }

    pub fn contribute_table(mut self, table: RuleTable) -> Self {
        self.contributions.push(table);
        self
    }

    pub fn build(self) -> RuleRegistry {
        let mapping = builtin::mapping_rules();
        let unmapping = derive_unmapping(&mapping);

        let mut validation = if self.include_core {
            builtin::validation_rules()
        } else {
            RuleTable::new()
        };
        for contribution in self.contributions {
            for (source_type, destination_types) in contribution {
                validation
                    .entry(source_type)
                    .or_default()
                    .extend(destination_types);
            }
        }
        debug!(
            types = validation.len(),
            "Built relationship validation rules"
        );

        RuleRegistry {
            mapping,
            unmapping,
            validation,
        }
    }
}

fn derive_unmapping(mapping: &RuleTable) -> RuleTable {
    let mut unmapping = mapping.clone();
    unmapping.insert(ObjectType::Audit, BTreeSet::new());
    unmapping.insert(ObjectType::Assessment, set_of(&[ObjectType::Issue]));
    unmapping.insert(ObjectType::Issue, set_of(&[ObjectType::Assessment]));
    unmapping
}

/// Mapping rules of the process-wide registry.
pub fn mapping_rules() -> &'static RuleTable {
    RuleRegistry::global().mapping_rules()
}

/// Unmapping rules of the process-wide registry.
pub fn unmapping_rules() -> &'static RuleTable {
    RuleRegistry::global().unmapping_rules()
}

/// Validation rules of the process-wide registry.
pub fn mapping_validation_rules() -> &'static RuleTable {
    RuleRegistry::global().mapping_validation_rules()
}
