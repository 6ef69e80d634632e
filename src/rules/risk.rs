//! Relationship validation rules contributed by the risks module

use super::object_type::ObjectType::{self, *};
use super::{mirror_into, set_of, RuleTable};

const RISK_MAPPINGS: [ObjectType; 20] = [
    AccessGroup,
    Clause,
    Contract,
    Control,
    DataAsset,
    Facility,
    Market,
    Objective,
    OrgGroup,
    Policy,
    Process,
    Product,
    Program,
    Project,
    Regulation,
    Section,
    Standard,
    System,
    Threat,
    Vendor,
];

const THREAT_MAPPINGS: [ObjectType; 19] = [
    AccessGroup,
    Clause,
    Contract,
    Control,
    DataAsset,
    Facility,
    Market,
    Objective,
    OrgGroup,
    Policy,
    Process,
    Product,
    Program,
    Project,
    Regulation,
    Section,
    Standard,
    System,
    Vendor,
];

/// Risk and Threat pairs; each pair is also added in the reverse direction.
pub fn validation_rules() -> RuleTable {
    let mut rules = RuleTable::new();
    rules.insert(Risk, set_of(&RISK_MAPPINGS));
    rules.insert(Threat, set_of(&THREAT_MAPPINGS));
    mirror_into(&mut rules, Risk, &RISK_MAPPINGS);
    mirror_into(&mut rules, Threat, &THREAT_MAPPINGS);
    rules
}
