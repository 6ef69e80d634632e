//! Built-in mapping and validation tables of the core app

use std::collections::BTreeSet;

use super::object_type::ObjectType::{self, *};
use super::{set_of, RuleTable};

/// Types offered by the "map" affordance for ordinary business objects.
const MAPPABLE: [ObjectType; 23] = [
    AccessGroup,
    Clause,
    Contract,
    Control,
    CycleTaskGroupObjectTask,
    DataAsset,
    Facility,
    Market,
    Objective,
    OrgGroup,
    Person,
    Policy,
    Process,
    Product,
    Program,
    Project,
    Regulation,
    Risk,
    Section,
    Standard,
    System,
    Threat,
    Vendor,
];

/// Types that can be related to every other business object.
const ALLOW_ALL: [ObjectType; 19] = [
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

fn minus(base: &BTreeSet<ObjectType>, excluded: &[ObjectType]) -> BTreeSet<ObjectType> {
    base.iter()
        .copied()
        .filter(|t| !excluded.contains(t))
        .collect()
}

/// Mapping rules for the UI "map" affordance.
///
/// Audit maps to its program through a dedicated field, so it gets no
/// entries here. Assessment and Issue may map every snapshottable type plus
/// each other.
pub fn mapping_rules() -> RuleTable {
    let all = set_of(&MAPPABLE);
    let snapshots = set_of(&ObjectType::SNAPSHOTTABLE);
    let directives = ObjectType::DIRECTIVES;

    let mut rules = RuleTable::new();
    for object_type in MAPPABLE {
        let targets = match object_type {
            AccessGroup | Clause | CycleTaskGroupObjectTask | Person | Program | Risk
            | Threat => minus(&all, &[object_type]),
            Contract | Policy | Regulation | Standard => minus(&all, &directives),
            _ => all.clone(),
        };
        rules.insert(object_type, targets);
    }

    let mut assessment = snapshots.clone();
    assessment.insert(Issue);
    let mut issue = snapshots;
    issue.insert(Assessment);

    rules.insert(Audit, BTreeSet::new());
    rules.insert(Assessment, assessment);
    rules.insert(Issue, issue);
    rules
}

/// Relationship validation rules of the core app. Symmetric by construction.
pub fn validation_rules() -> RuleTable {
    let allow_all = set_of(&ALLOW_ALL);
    let audit_scope = set_of(&[Assessment, Issue, Snapshot]);
    let directives = ObjectType::DIRECTIVES;

    let mut assessment = audit_scope.clone();
    assessment.extend([Person, Document, Comment, Audit]);
    assessment.remove(&Assessment);

    let mut audit = audit_scope.clone();
    audit.insert(AssessmentTemplate);

    let mut audit_scope_with_audit = audit_scope;
    audit_scope_with_audit.insert(Audit);

    let mut rules = RuleTable::new();
    rules.insert(AccessGroup, minus(&allow_all, &[AccessGroup]));
    rules.insert(Assessment, assessment);
    rules.insert(AssessmentTemplate, set_of(&[Audit]));
    rules.insert(Audit, audit);
    rules.insert(Clause, minus(&allow_all, &[Clause]));
    rules.insert(Comment, set_of(&[Assessment]));
    rules.insert(Document, set_of(&[Assessment]));
    rules.insert(Issue, audit_scope_with_audit.clone());
    rules.insert(Person, set_of(&[Assessment]));
    rules.insert(Program, minus(&allow_all, &[Program, Audit]));
    rules.insert(Snapshot, audit_scope_with_audit);
    for directive in directives {
        rules.insert(directive, minus(&allow_all, &directives));
    }
    for object_type in [
        Control, DataAsset, Facility, Market, Objective, OrgGroup, Process, Product, Project,
        Section, System, Vendor,
    ] {
        rules.insert(object_type, allow_all.clone());
    }
    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_rules_cover_business_objects() {
        let rules = mapping_rules();
        assert_eq!(rules.len(), 26);
        assert_eq!(rules[&Control].len(), 23);
        assert!(!rules[&Person].contains(&Person));
        assert!(rules[&Audit].is_empty());
    }

    #[test]
    fn test_contract_mapping_excludes_directives() {
        let rules = mapping_rules();
        let expected = set_of(&[
            AccessGroup,
            Clause,
            Control,
            CycleTaskGroupObjectTask,
            DataAsset,
            Facility,
            Market,
            Objective,
            OrgGroup,
            Person,
            Process,
            Product,
            Program,
            Project,
            Risk,
            Section,
            System,
            Threat,
            Vendor,
        ]);
        assert_eq!(rules[&Contract], expected);
        assert_eq!(rules[&Policy], expected);
    }

    #[test]
    fn test_assessment_mapping_is_snapshottable_plus_issue() {
        let rules = mapping_rules();
        let assessment = &rules[&Assessment];
        assert_eq!(assessment.len(), 20);
        assert!(assessment.contains(&Issue));
        assert!(assessment.contains(&Threat));
        assert!(!assessment.contains(&Program));
        assert!(!assessment.contains(&Person));
    }

    #[test]
    fn test_core_validation_rules() {
        let rules = validation_rules();
        assert_eq!(
            rules[&Assessment],
            set_of(&[Audit, Comment, Document, Issue, Person, Snapshot])
        );
        assert_eq!(rules[&AssessmentTemplate], set_of(&[Audit]));
        assert!(!rules[&Program].contains(&Audit));
        assert!(!rules[&Regulation].contains(&Standard));
        assert!(rules[&Control].contains(&Control));
    }
}
