use serde::{Deserialize, Serialize};

use crate::core::CheckStatus;

/// Running tally of check outcomes, one counter per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub warned: u64,
    pub info: u64,
}

impl StatusCounts {
    pub fn record(&mut self, status: CheckStatus) {
        self.total = self.total.saturating_add(1);
        let slot = match status {
            CheckStatus::Pass => &mut self.passed,
            CheckStatus::Fail => &mut self.failed,
            CheckStatus::Warn => &mut self.warned,
            CheckStatus::Info => &mut self.info,
        };
        *slot = slot.saturating_add(1);
    }

    pub fn merge(&mut self, other: &StatusCounts) {
        self.total = self.total.saturating_add(other.total);
        self.passed = self.passed.saturating_add(other.passed);
        self.failed = self.failed.saturating_add(other.failed);
        self.warned = self.warned.saturating_add(other.warned);
        self.info = self.info.saturating_add(other.info);
    }

    pub fn from_statuses(statuses: impl IntoIterator<Item = CheckStatus>) -> Self {
        let mut counts = Self::default();
        for status in statuses {
            counts.record(status);
        }
        counts
    }
}
