//! Relationship validation rules contributed by the workflows module

use super::object_type::ObjectType::{self, *};
use super::{mirror_into, set_of, RuleTable};

const CYCLE_TASK_MAPPINGS: [ObjectType; 20] = [
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

pub fn validation_rules() -> RuleTable {
    let mut rules = RuleTable::new();
    rules.insert(CycleTaskGroupObjectTask, set_of(&CYCLE_TASK_MAPPINGS));
    mirror_into(&mut rules, CycleTaskGroupObjectTask, &CYCLE_TASK_MAPPINGS);
    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_task_pairs() {
        let rules = validation_rules();
        assert_eq!(rules[&CycleTaskGroupObjectTask].len(), 20);
        assert!(rules[&Threat].contains(&CycleTaskGroupObjectTask));
        assert!(!rules.contains_key(&Risk));
    }
}
