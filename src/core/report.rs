use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::{PermissionSummary, ScopeKind, Section, StatusCounts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    PartiallyCompliant,
    NonCompliant,
    NotAssessed,
}

impl ComplianceStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "Compliant",
            ComplianceStatus::PartiallyCompliant => "Partially Compliant",
            ComplianceStatus::NonCompliant => "Non-Compliant",
            ComplianceStatus::NotAssessed => "Not Assessed",
        }
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSummary {
    pub kind: ScopeKind,
    pub requested_id: String,
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalFinding {
    pub section_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub counts: StatusCounts,
    pub compliance_pct: u32,
    pub compliance_status: ComplianceStatus,
    pub critical_findings: Vec<CriticalFinding>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub schema_version: String,
    pub tool_version: String,
    pub generated_at: String,
    pub scope: ScopeSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<PermissionSummary>,
    pub summary: ReportSummary,
    pub sections: Vec<Section>,
}
