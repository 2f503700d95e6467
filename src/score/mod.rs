use crate::core::{CheckStatus, ComplianceStatus, CriticalFinding, Section, StatusCounts};

pub const COMPLIANT_THRESHOLD: u32 = 90;
pub const PARTIAL_THRESHOLD: u32 = 70;
pub const CRITICAL_FINDINGS_PER_SECTION: usize = 3;

/// `round(100 * passed / (total - warned))`, or 0 when nothing is evaluable.
///
/// WARN outcomes leave the denominator; INFO outcomes stay in it.
pub fn score(counts: &StatusCounts) -> u32 {
    let evaluable = counts.total.saturating_sub(counts.warned);
    if evaluable == 0 {
        return 0;
    }
    let passed = counts.passed.min(evaluable);
    let pct = (passed.saturating_mul(200) + evaluable) / evaluable.saturating_mul(2);
    u32::try_from(pct).unwrap_or(100)
}

pub fn classify(counts: &StatusCounts) -> ComplianceStatus {
    if counts.total.saturating_sub(counts.warned) == 0 {
        return ComplianceStatus::NotAssessed;
    }
    let pct = score(counts);
    if pct >= COMPLIANT_THRESHOLD {
        ComplianceStatus::Compliant
    } else if pct >= PARTIAL_THRESHOLD {
        ComplianceStatus::PartiallyCompliant
    } else {
        ComplianceStatus::NonCompliant
    }
}

/// The first few FAIL results of each section, in report order.
pub fn critical_findings(sections: &[Section]) -> Vec<CriticalFinding> {
    let mut out = Vec::new();
    for section in sections {
        out.extend(
            section
                .results
                .iter()
                .filter(|r| r.status == CheckStatus::Fail)
                .take(CRITICAL_FINDINGS_PER_SECTION)
                .map(|r| CriticalFinding {
                    section_id: section.id.clone(),
                    title: r.title.clone(),
                    target: r.target.clone(),
                }),
        );
    }
    out
}
