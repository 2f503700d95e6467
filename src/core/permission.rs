use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequirement {
    pub requirement_id: String,
    pub permission: String,
    pub available: bool,
}

/// Permission context carried into the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSummary {
    pub total: u64,
    pub available: u64,
    pub coverage_pct: u32,
    pub degraded: bool,
    pub missing: Vec<PermissionRequirement>,
}
