use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use serde::Serialize;

use crate::aggregate::ReportBuilder;
use crate::core::{CheckResult, CheckStatus, Report, Scope, ScopeKind};
use crate::dispatch::{
    self, DispatchAttempt, DispatchFailure, DispatchOptions, Dispatcher, FailureKind,
    TAG_DELIMITER, TargetOutcome,
};
use crate::permissions::{
    ContinuationPrompt, GateOutcome, GatePolicy, PermissionProbe, PermissionSet,
};
use crate::rules::Check;
use crate::scope::{Inventory, ScopeRequest, ScopeResolver};

pub const PERMISSIONS_SECTION_ID: &str = "permissions";
pub const PERMISSIONS_SECTION_TITLE: &str = "Assessment permission coverage";

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub dispatch: DispatchOptions,
    pub policy: GatePolicy,
    pub show_progress: bool,
}

/// External systems one run talks to.
pub struct Collaborators<'a> {
    pub inventory: &'a dyn Inventory,
    pub probe: &'a dyn PermissionProbe,
    pub runner: &'a dyn dispatch::CommandRunner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Init,
    ScopeResolved,
    PermissionsChecked,
    Aborted,
    Dispatching,
    Aggregating,
    Finalized,
}

impl RunState {
    pub const fn as_str(self) -> &'static str {
        match self {
            RunState::Init => "INIT",
            RunState::ScopeResolved => "SCOPE_RESOLVED",
            RunState::PermissionsChecked => "PERMISSIONS_CHECKED",
            RunState::Aborted => "ABORTED",
            RunState::Dispatching => "DISPATCHING",
            RunState::Aggregating => "AGGREGATING",
            RunState::Finalized => "FINALIZED",
        }
    }

    fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Init, ScopeResolved)
                | (ScopeResolved, PermissionsChecked)
                | (PermissionsChecked, Dispatching)
                | (Dispatching, Aggregating)
                | (Aggregating, Finalized)
                | (Init | ScopeResolved | PermissionsChecked, Aborted)
        )
    }
}

/// State of one assessment run. Not shared across threads.
pub struct ExecutionContext<'a> {
    opts: &'a EngineOptions,
    state: RunState,
    scope: Option<Scope>,
    gate: Option<GateOutcome>,
    attempts: Vec<DispatchAttempt>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(opts: &'a EngineOptions) -> Self {
        Self {
            opts,
            state: RunState::Init,
            scope: None,
            gate: None,
            attempts: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    pub fn gate(&self) -> Option<&GateOutcome> {
        self.gate.as_ref()
    }

    pub fn attempts(&self) -> &[DispatchAttempt] {
        &self.attempts
    }

    fn advance(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            bail!(
                "invalid run state transition: {} -> {}",
                self.state.as_str(),
                next.as_str()
            );
        }
        self.state = next;
        Ok(())
    }

    /// Runs resolve → gate → dispatch → finalize. Fatal errors leave the context ABORTED.
    pub fn run(
        &mut self,
        request: &ScopeRequest,
        checks: &[&dyn Check],
        collab: &Collaborators<'_>,
        prompt: &mut dyn ContinuationPrompt,
    ) -> Result<Report> {
        if self.state != RunState::Init {
            bail!("run already started (state {})", self.state.as_str());
        }
        let result = self
            .prepare(request, checks, collab, prompt)
            .and_then(|()| self.dispatch_all(checks, collab));
        self.settle(result)
    }

    /// Any error ends the run in ABORTED, whichever step raised it.
    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.state = RunState::Aborted;
        }
        result
    }

    fn prepare(
        &mut self,
        request: &ScopeRequest,
        checks: &[&dyn Check],
        collab: &Collaborators<'_>,
        prompt: &mut dyn ContinuationPrompt,
    ) -> Result<()> {
        let mut resolver = ScopeResolver::new(collab.inventory);
        let scope = resolver.resolve(request)?.clone();
        self.advance(RunState::ScopeResolved)?;

        let mut permissions = PermissionSet::new();
        for check in checks {
            permissions.register(check.id(), check.permissions());
        }
        // Organizations have no project of their own to test against; a permission
        // counts once any resolved project grants it.
        let target_ids: Vec<&str> = scope.targets.iter().map(|t| t.id.as_str()).collect();
        let gate = permissions.gate(collab.probe, &target_ids, &self.opts.policy, prompt)?;
        permissions.validate_for_scope(&scope, collab.probe)?;
        self.advance(RunState::PermissionsChecked)?;

        self.scope = Some(scope);
        self.gate = Some(gate);
        Ok(())
    }

    fn dispatch_all(
        &mut self,
        checks: &[&dyn Check],
        collab: &Collaborators<'_>,
    ) -> Result<Report> {
        self.advance(RunState::Dispatching)?;
        let scope = self
            .scope
            .clone()
            .ok_or_else(|| anyhow!("dispatch without a resolved scope"))?;
        let gate = self
            .gate
            .clone()
            .ok_or_else(|| anyhow!("dispatch without a permission gate"))?;

        let mut builder = ReportBuilder::new(&scope);
        builder.set_permissions(gate.summary());
        record_permission_gaps(&mut builder, &gate)?;

        let opts = self.opts;
        let pb = progress_bar(opts.show_progress);
        let mut dispatcher = Dispatcher::new(collab.runner, &opts.dispatch, &scope.targets);
        let mut failed_targets = 0usize;
        for check in checks {
            if let Some(pb) = &pb {
                pb.set_message(format!(
                    "{} ({} projects)",
                    check.id(),
                    scope.targets.len()
                ));
            }
            let section = builder.add_section(check.section_id(), check.section_title());

            let missing = missing_permissions(*check, &gate);
            if !check.permissions().is_empty() && missing.len() == check.permissions().len() {
                builder.add_check_result(
                    Some(section),
                    CheckResult::warn(
                        format!("{}: not assessed", check.title()),
                        format!(
                            "check {} skipped; permission unavailable: {}",
                            check.id(),
                            missing.join(", ")
                        ),
                    )
                    .with_recommendation(format!(
                        "Grant {} to the assessing identity and re-run.",
                        missing.join(", ")
                    )),
                )?;
                continue;
            }

            let output = dispatcher.run_across_targets(&check.operation());
            failed_targets += output.failures().count();
            let tagged = output.tagged_findings(|record| check.inspect(record));
            for (target, err) in &tagged.unparsable {
                builder.note(format!(
                    "{}: unparsable output from {target}: {err}",
                    check.id()
                ));
            }
            let findings = builder.aggregate_raw(&tagged.lines, TAG_DELIMITER);

            for out in &output.outputs {
                let target = out.target.as_str();
                let result = match &out.outcome {
                    TargetOutcome::Failure(failure) => failure_result(*check, target, failure),
                    TargetOutcome::Success { .. } => {
                        if let Some(err) = tagged.parse_error(target) {
                            CheckResult::warn(
                                format!("{}: output not understood", check.title()),
                                format!("output from {target} could not be parsed: {err}"),
                            )
                        } else if let Some(lines) = findings.get(target) {
                            CheckResult::new(check.severity(), check.title(), lines.join("\n"))
                                .with_recommendation(check.recommendation())
                        } else {
                            CheckResult::pass(
                                check.title(),
                                format!("no non-compliant resources found in {target}"),
                            )
                        }
                    }
                };
                builder.add_check_result(Some(section), result.for_target(target))?;
            }
        }
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
        self.attempts = dispatcher.into_attempts();

        self.advance(RunState::Aggregating)?;
        if scope.kind == ScopeKind::Organization {
            builder.note(format!(
                "assessed {} projects in organization {}",
                scope.targets.len(),
                scope.requested_id
            ));
        }
        if failed_targets > 0 {
            builder.note(format!(
                "{failed_targets} dispatched command(s) failed; affected targets are reported per check"
            ));
        }

        let report = builder.finalize();
        self.advance(RunState::Finalized)?;
        Ok(report)
    }
}

fn record_permission_gaps(builder: &mut ReportBuilder, gate: &GateOutcome) -> Result<()> {
    if !gate.degraded() {
        return Ok(());
    }
    let missing = gate.coverage.missing();
    builder.note(format!(
        "assessment ran with {}% permission coverage ({}/{} available){}",
        gate.coverage.coverage_pct,
        gate.coverage.available,
        gate.coverage.total,
        if gate.confirmed {
            "; continuation was confirmed"
        } else {
            ""
        }
    ));

    let section = builder.add_section(PERMISSIONS_SECTION_ID, PERMISSIONS_SECTION_TITLE);
    let mut seen: Vec<&str> = Vec::new();
    for req in &missing {
        if seen.contains(&req.permission.as_str()) {
            continue;
        }
        seen.push(&req.permission);
        let needed_by: Vec<&str> = missing
            .iter()
            .filter(|m| m.permission == req.permission)
            .map(|m| m.requirement_id.as_str())
            .collect();
        builder.add_check_result(
            Some(section),
            CheckResult::warn(
                format!("Permission unavailable: {}", req.permission),
                format!(
                    "required by {}; results depending on it may be incomplete",
                    needed_by.join(", ")
                ),
            )
            .with_recommendation(format!(
                "Grant {} to the assessing identity.",
                req.permission
            )),
        )?;
    }
    Ok(())
}

fn missing_permissions(check: &dyn Check, gate: &GateOutcome) -> Vec<String> {
    gate.coverage
        .requirements
        .iter()
        .filter(|r| r.requirement_id == check.id() && !r.available)
        .map(|r| r.permission.clone())
        .collect()
}

fn failure_result(check: &dyn Check, target: &str, failure: &DispatchFailure) -> CheckResult {
    let (status, recommendation) = match failure.kind {
        FailureKind::AccessDenied => (
            CheckStatus::Warn,
            format!("Grant the assessing identity read access on {target}."),
        ),
        FailureKind::Timeout => (
            CheckStatus::Fail,
            "Re-run with a longer --timeout or check connectivity to the provider API.".to_string(),
        ),
        FailureKind::CommandFailed | FailureKind::LaunchFailed => (
            CheckStatus::Fail,
            format!("Verify that {target} is reachable and the API is enabled."),
        ),
    };
    CheckResult::new(
        status,
        format!("{}: could not assess", check.title()),
        format!("{} on {target}: {}", failure.kind.as_str(), failure.message),
    )
    .with_recommendation(recommendation)
}

fn progress_bar(enabled: bool) -> Option<indicatif::ProgressBar> {
    use std::io::IsTerminal;
    if !(enabled && std::io::stderr().is_terminal()) {
        return None;
    }
    let pb = indicatif::ProgressBar::new_spinner();
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb.set_message("assessing...");
    pb.enable_steady_tick(Duration::from_millis(120));
    Some(pb)
}
