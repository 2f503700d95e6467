mod check;
mod counts;
mod permission;
mod report;
mod scope;
mod section;
mod status;

pub use check::CheckResult;
pub use counts::StatusCounts;
pub use permission::{PermissionRequirement, PermissionSummary};
pub use report::{ComplianceStatus, CriticalFinding, Report, ReportSummary, ScopeSummary};
pub use scope::{Scope, ScopeKind, Target};
pub use section::Section;
pub use status::CheckStatus;
