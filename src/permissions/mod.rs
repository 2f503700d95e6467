//! Permission gate: what the run needs, what the caller has, and whether to go on.

use std::collections::HashMap;

use anyhow::Result;

use crate::core::{PermissionRequirement, PermissionSummary, Scope, ScopeKind};
use crate::exit;

pub const DEFAULT_SOFT_THRESHOLD: u32 = 70;

/// Tests whether the caller holds a permission, optionally against one target.
pub trait PermissionProbe {
    fn test_permission(&self, permission: &str, target: Option<&str>) -> Result<bool>;
}

/// Asked only when coverage lands in the degraded band.
pub trait ContinuationPrompt {
    fn confirm_degraded(&mut self, coverage_pct: u32, missing: &[PermissionRequirement])
    -> Result<bool>;
}

/// Fixed answer, for `--yes` and for non-interactive runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedAnswer(pub bool);

impl ContinuationPrompt for FixedAnswer {
    fn confirm_degraded(
        &mut self,
        _coverage_pct: u32,
        _missing: &[PermissionRequirement],
    ) -> Result<bool> {
        Ok(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatePolicy {
    /// Coverage below this is fatal. Zero available permissions is always fatal.
    pub hard_minimum: u32,
    /// Coverage strictly below this asks before continuing.
    pub soft_threshold: u32,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            hard_minimum: 0,
            soft_threshold: DEFAULT_SOFT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageReport {
    pub total: u64,
    pub available: u64,
    pub coverage_pct: u32,
    pub requirements: Vec<PermissionRequirement>,
}

impl CoverageReport {
    pub fn missing(&self) -> Vec<PermissionRequirement> {
        self.requirements
            .iter()
            .filter(|r| !r.available)
            .cloned()
            .collect()
    }

    pub fn summary(&self, degraded: bool) -> PermissionSummary {
        PermissionSummary {
            total: self.total,
            available: self.available,
            coverage_pct: self.coverage_pct,
            degraded,
            missing: self.missing(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Full coverage, or nothing required.
    Proceed,
    /// Partial coverage above the soft threshold; no confirmation needed.
    ProceedPartial,
    /// Partial coverage below the soft threshold; needs confirmation.
    NeedsConfirmation,
    /// Fatal; the run must not dispatch anything.
    Abort,
}

pub fn coverage_pct(available: u64, total: u64) -> u32 {
    if total == 0 {
        return 100;
    }
    let pct = (available.saturating_mul(200) + total) / total.saturating_mul(2);
    u32::try_from(pct.min(100)).unwrap_or(100)
}

pub fn decide(report: &CoverageReport, policy: &GatePolicy) -> GateDecision {
    if report.total == 0 || report.available == report.total {
        return GateDecision::Proceed;
    }
    if report.available == 0 || report.coverage_pct < policy.hard_minimum {
        return GateDecision::Abort;
    }
    if report.coverage_pct < policy.soft_threshold {
        return GateDecision::NeedsConfirmation;
    }
    GateDecision::ProceedPartial
}

/// Outcome of a gate that let the run continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateOutcome {
    pub coverage: CoverageReport,
    pub decision: GateDecision,
    pub confirmed: bool,
}

impl GateOutcome {
    pub fn degraded(&self) -> bool {
        self.coverage.available < self.coverage.total
    }

    pub fn summary(&self) -> PermissionSummary {
        self.coverage.summary(self.degraded())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PermissionSet {
    entries: Vec<(String, Vec<String>)>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the permissions of one requirement.
    pub fn register(&mut self, requirement_id: &str, permissions: &[&str]) {
        let mut names: Vec<String> = Vec::with_capacity(permissions.len());
        for p in permissions {
            let p = p.trim();
            if p.is_empty() || names.iter().any(|n| n == p) {
                continue;
            }
            names.push(p.to_string());
        }

        if let Some(entry) = self.entries.iter_mut().find(|(id, _)| id == requirement_id) {
            entry.1 = names;
        } else {
            self.entries.push((requirement_id.to_string(), names));
        }
    }

    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, p)| p.len()).sum()
    }

    pub fn permissions_for(&self, requirement_id: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(id, _)| id == requirement_id)
            .map(|(_, p)| p.as_slice())
    }

    /// Distinct permission names in registration order.
    pub fn distinct_permissions(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for (_, perms) in &self.entries {
            for p in perms {
                if !out.contains(&p.as_str()) {
                    out.push(p);
                }
            }
        }
        out
    }

    /// Tests every registered permission once. With targets, a permission is
    /// available as soon as one of them grants it; with none, the caller's own
    /// grants are tested. Probe errors count as unavailable.
    pub fn check_all(&self, probe: &dyn PermissionProbe, targets: &[&str]) -> CoverageReport {
        let mut cache: HashMap<&str, bool> = HashMap::new();
        let mut requirements = Vec::with_capacity(self.total());
        for (requirement_id, perms) in &self.entries {
            for p in perms {
                let available = *cache
                    .entry(p.as_str())
                    .or_insert_with(|| granted_anywhere(probe, p, targets));
                requirements.push(PermissionRequirement {
                    requirement_id: requirement_id.clone(),
                    permission: p.clone(),
                    available,
                });
            }
        }

        let total = requirements.len() as u64;
        let available = requirements.iter().filter(|r| r.available).count() as u64;
        CoverageReport {
            total,
            available,
            coverage_pct: coverage_pct(available, total),
            requirements,
        }
    }

    /// For an organization scope, at least one target must answer a permission test.
    pub fn validate_for_scope(&self, scope: &Scope, probe: &dyn PermissionProbe) -> Result<()> {
        if scope.kind != ScopeKind::Organization {
            return Ok(());
        }
        let perms = self.distinct_permissions();
        if perms.is_empty() {
            return Ok(());
        }
        for target in &scope.targets {
            for p in &perms {
                if probe.test_permission(p, Some(&target.id)).unwrap_or(false) {
                    return Ok(());
                }
            }
        }
        Err(exit::insufficient_permissions(format!(
            "none of the {} projects in organization {} granted any required permission",
            scope.targets.len(),
            scope.requested_id
        )))
    }

    /// Runs the full gate: test, decide, and ask when the decision calls for it.
    pub fn gate(
        &self,
        probe: &dyn PermissionProbe,
        targets: &[&str],
        policy: &GatePolicy,
        prompt: &mut dyn ContinuationPrompt,
    ) -> Result<GateOutcome> {
        let coverage = self.check_all(probe, targets);
        let decision = decide(&coverage, policy);
        let confirmed = match decision {
            GateDecision::Proceed | GateDecision::ProceedPartial => false,
            GateDecision::Abort => {
                return Err(exit::insufficient_permissions(format!(
                    "insufficient permissions: {}/{} available ({}% coverage); missing: {}",
                    coverage.available,
                    coverage.total,
                    coverage.coverage_pct,
                    missing_names(&coverage)
                )));
            }
            GateDecision::NeedsConfirmation => {
                let missing = coverage.missing();
                if !prompt.confirm_degraded(coverage.coverage_pct, &missing)? {
                    return Err(exit::continuation_declined(format!(
                        "assessment cancelled at {}% permission coverage; missing: {}",
                        coverage.coverage_pct,
                        missing_names(&coverage)
                    )));
                }
                true
            }
        };
        Ok(GateOutcome {
            coverage,
            decision,
            confirmed,
        })
    }
}

fn granted_anywhere(probe: &dyn PermissionProbe, permission: &str, targets: &[&str]) -> bool {
    if targets.is_empty() {
        return probe.test_permission(permission, None).unwrap_or(false);
    }
    targets
        .iter()
        .any(|t| probe.test_permission(permission, Some(t)).unwrap_or(false))
}

fn missing_names(coverage: &CoverageReport) -> String {
    let names: Vec<&str> = coverage
        .requirements
        .iter()
        .filter(|r| !r.available)
        .map(|r| r.permission.as_str())
        .collect();
    names.join(", ")
}
