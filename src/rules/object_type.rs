//! Closed set of domain object types used as keys in the rule tables

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GrcError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    AccessGroup,
    Assessment,
    AssessmentTemplate,
    Audit,
    Clause,
    Comment,
    Contract,
    Control,
    CycleTaskGroupObjectTask,
    DataAsset,
    Document,
    Facility,
    Issue,
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
    Snapshot,
    Standard,
    System,
    Threat,
    Vendor,
}

impl ObjectType {
    pub const ALL: [ObjectType; 30] = [
        ObjectType::AccessGroup,
        ObjectType::Assessment,
        ObjectType::AssessmentTemplate,
        ObjectType::Audit,
        ObjectType::Clause,
        ObjectType::Comment,
        ObjectType::Contract,
        ObjectType::Control,
        ObjectType::CycleTaskGroupObjectTask,
        ObjectType::DataAsset,
        ObjectType::Document,
        ObjectType::Facility,
        ObjectType::Issue,
        ObjectType::Market,
        ObjectType::Objective,
        ObjectType::OrgGroup,
        ObjectType::Person,
        ObjectType::Policy,
        ObjectType::Process,
        ObjectType::Product,
        ObjectType::Program,
        ObjectType::Project,
        ObjectType::Regulation,
        ObjectType::Risk,
        ObjectType::Section,
        ObjectType::Snapshot,
        ObjectType::Standard,
        ObjectType::System,
        ObjectType::Threat,
        ObjectType::Vendor,
    ];

    /// Types that can be frozen as snapshots inside an audit.
    pub const SNAPSHOTTABLE: [ObjectType; 19] = [
        ObjectType::AccessGroup,
        ObjectType::Clause,
        ObjectType::Contract,
        ObjectType::Control,
        ObjectType::DataAsset,
        ObjectType::Facility,
        ObjectType::Market,
        ObjectType::Objective,
        ObjectType::OrgGroup,
        ObjectType::Policy,
        ObjectType::Process,
        ObjectType::Product,
        ObjectType::Regulation,
        ObjectType::Risk,
        ObjectType::Section,
        ObjectType::Standard,
        ObjectType::System,
        ObjectType::Threat,
        ObjectType::Vendor,
    ];

    /// Contract, Policy, Regulation and Standard.
    pub const DIRECTIVES: [ObjectType; 4] = [
        ObjectType::Contract,
        ObjectType::Policy,
        ObjectType::Regulation,
        ObjectType::Standard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::AccessGroup => "AccessGroup",
            ObjectType::Assessment => "Assessment",
            ObjectType::AssessmentTemplate => "AssessmentTemplate",
            ObjectType::Audit => "Audit",
            ObjectType::Clause => "Clause",
            ObjectType::Comment => "Comment",
            ObjectType::Contract => "Contract",
            ObjectType::Control => "Control",
            ObjectType::CycleTaskGroupObjectTask => "CycleTaskGroupObjectTask",
            ObjectType::DataAsset => "DataAsset",
            ObjectType::Document => "Document",
            ObjectType::Facility => "Facility",
            ObjectType::Issue => "Issue",
            ObjectType::Market => "Market",
            ObjectType::Objective => "Objective",
            ObjectType::OrgGroup => "OrgGroup",
            ObjectType::Person => "Person",
            ObjectType::Policy => "Policy",
            ObjectType::Process => "Process",
            ObjectType::Product => "Product",
            ObjectType::Program => "Program",
            ObjectType::Project => "Project",
            ObjectType::Regulation => "Regulation",
            ObjectType::Risk => "Risk",
            ObjectType::Section => "Section",
            ObjectType::Snapshot => "Snapshot",
            ObjectType::Standard => "Standard",
            ObjectType::System => "System",
            ObjectType::Threat => "Threat",
            ObjectType::Vendor => "Vendor",
        }
    }

    pub fn is_snapshottable(&self) -> bool {
        Self::SNAPSHOTTABLE.contains(self)
    }

    /// Objects that only exist inside an audit.
    pub fn is_audit_scope(&self) -> bool {
        matches!(
            self,
            ObjectType::Assessment
                | ObjectType::Issue
                | ObjectType::Snapshot
                | ObjectType::AssessmentTemplate
        )
    }

    pub fn is_directive(&self) -> bool {
        Self::DIRECTIVES.contains(self)
    }
}

impl FromStr for ObjectType {
    type Err = GrcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| GrcError::UnknownObjectType(s.to_string()))
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
