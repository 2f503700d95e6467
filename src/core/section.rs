use serde::{Deserialize, Serialize};

use crate::core::{CheckResult, StatusCounts};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    pub counts: StatusCounts,
    pub compliance_pct: u32,
    pub results: Vec<CheckResult>,
}
