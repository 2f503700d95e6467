use serde::{Deserialize, Serialize};

use crate::core::CheckStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub title: String,
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl CheckResult {
    pub fn new(status: CheckStatus, title: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            status,
            title: title.into(),
            details: details.into(),
            recommendation: None,
            target: None,
        }
    }

    pub fn pass(title: impl Into<String>, details: impl Into<String>) -> Self {
        Self::new(CheckStatus::Pass, title, details)
    }

    pub fn fail(title: impl Into<String>, details: impl Into<String>) -> Self {
        Self::new(CheckStatus::Fail, title, details)
    }

    pub fn warn(title: impl Into<String>, details: impl Into<String>) -> Self {
        Self::new(CheckStatus::Warn, title, details)
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        let recommendation = recommendation.into();
        if !recommendation.trim().is_empty() {
            self.recommendation = Some(recommendation);
        }
        self
    }

    pub fn for_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}
