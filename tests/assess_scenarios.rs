use std::cell::{Cell, RefCell};
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;

use cloudassess::core::{CheckStatus, ComplianceStatus, Target};
use cloudassess::dispatch::{CommandDescriptor, CommandRunner, Operation};
use cloudassess::engine::{Collaborators, EngineOptions, ExecutionContext, RunState};
use cloudassess::exit::{ExitCode, fatal_kind};
use cloudassess::permissions::{ContinuationPrompt, FixedAnswer, PermissionProbe};
use cloudassess::platform::{CommandOutput, TimedOut};
use cloudassess::rules::Check;
use cloudassess::scope::{Inventory, ScopeRequest};

struct Org {
    projects: Vec<&'static str>,
}

impl Inventory for Org {
    fn describe_target(&self, id: &str) -> Result<Target> {
        if self.projects.contains(&id) {
            Ok(Target::new(id))
        } else {
            anyhow::bail!("NOT_FOUND: {id}")
        }
    }

    fn list_targets(&self, _umbrella_id: &str) -> Result<Vec<Target>> {
        Ok(self.projects.iter().map(|id| Target::new(*id)).collect())
    }
}

struct Grants {
    caller: Vec<&'static str>,
    per_target: Option<Vec<&'static str>>,
}

impl PermissionProbe for Grants {
    fn test_permission(&self, permission: &str, target: Option<&str>) -> Result<bool> {
        match (target, &self.per_target) {
            (Some(_), Some(per_target)) => Ok(per_target.contains(&permission)),
            _ => Ok(self.caller.contains(&permission)),
        }
    }
}

/// Reports one bad resource per target; `p2` times out.
struct Cloud {
    calls: Cell<usize>,
    seen: RefCell<Vec<String>>,
}

impl Cloud {
    fn new() -> Self {
        Self {
            calls: Cell::new(0),
            seen: RefCell::new(Vec::new()),
        }
    }
}

impl CommandRunner for Cloud {
    fn run(&self, command: &CommandDescriptor, _timeout: Duration) -> Result<CommandOutput> {
        self.calls.set(self.calls.get() + 1);
        self.seen.borrow_mut().push(command.cmdline());
        let target = command.target.clone().unwrap_or_default();
        if target == "p2" {
            return Err(TimedOut {
                program: command.program.clone(),
                timeout: Duration::from_secs(1),
            }
            .into());
        }
        let stdout = if target == "p3" {
            "[]".to_string()
        } else {
            format!(r#"[{{"name":"bad-{target}"}},{{"name":"ok"}}]"#)
        };
        Ok(CommandOutput {
            exit_code: 0,
            stdout,
            stderr: String::new(),
        })
    }
}

struct ListCheck {
    id: &'static str,
    section: &'static str,
    permissions: &'static [&'static str],
}

impl Check for ListCheck {
    fn id(&self) -> &str {
        self.id
    }
    fn section_id(&self) -> &str {
        self.section
    }
    fn section_title(&self) -> &str {
        "Scenario section"
    }
    fn title(&self) -> &str {
        self.id
    }
    fn permissions(&self) -> &[&str] {
        self.permissions
    }
    fn operation(&self) -> Operation {
        Operation::new(&["things", "list"]).structured()
    }
    fn inspect(&self, record: &Value) -> Option<String> {
        let name = record.get("name")?.as_str()?;
        name.starts_with("bad").then(|| format!("{name} is exposed"))
    }
    fn recommendation(&self) -> &str {
        "Lock it down."
    }
}

const A: ListCheck = ListCheck {
    id: "a-check",
    section: "1.2",
    permissions: &["a.list"],
};
const B: ListCheck = ListCheck {
    id: "b-check",
    section: "1.3",
    permissions: &["b.list"],
};

struct CountingPrompt {
    answer: bool,
    asked: usize,
}

impl ContinuationPrompt for CountingPrompt {
    fn confirm_degraded(
        &mut self,
        _coverage_pct: u32,
        _missing: &[cloudassess::core::PermissionRequirement],
    ) -> Result<bool> {
        self.asked += 1;
        Ok(self.answer)
    }
}

#[test]
fn umbrella_scope_isolates_a_failing_target() {
    let opts = EngineOptions::default();
    let inventory = Org {
        projects: vec!["p1", "p2", "p3"],
    };
    let probe = Grants {
        caller: vec!["a.list"],
        per_target: None,
    };
    let cloud = Cloud::new();
    let collab = Collaborators {
        inventory: &inventory,
        probe: &probe,
        runner: &cloud,
    };
    let mut ctx = ExecutionContext::new(&opts);

    let report = ctx
        .run(
            &ScopeRequest::organization("42"),
            &[&A],
            &collab,
            &mut FixedAnswer(false),
        )
        .expect("assessment");

    assert_eq!(ctx.state(), RunState::Finalized);
    assert_eq!(report.scope.targets, vec!["p1", "p2", "p3"]);
    assert_eq!(cloud.calls.get(), 3);

    let results = &report.sections[0].results;
    let by_target: Vec<(Option<&str>, CheckStatus)> = results
        .iter()
        .map(|r| (r.target.as_deref(), r.status))
        .collect();
    assert_eq!(
        by_target,
        vec![
            (Some("p1"), CheckStatus::Fail),
            (Some("p2"), CheckStatus::Fail),
            (Some("p3"), CheckStatus::Pass),
        ]
    );
    assert_eq!(results[0].details, "bad-p1 is exposed");
    assert!(results[1].details.contains("timeout"), "{}", results[1].details);

    assert_eq!(report.summary.counts.total, 3);
    assert_eq!(report.summary.compliance_pct, 33);
    assert_eq!(report.summary.compliance_status, ComplianceStatus::NonCompliant);
    assert_eq!(ctx.attempts().len(), 3);
    assert!(ctx.attempts()[1].error.is_some());
}

#[test]
fn declined_degraded_gate_dispatches_nothing() {
    let opts = EngineOptions::default();
    let inventory = Org { projects: vec!["p1"] };
    let probe = Grants {
        caller: vec!["a.list"],
        per_target: None,
    };
    let cloud = Cloud::new();
    let collab = Collaborators {
        inventory: &inventory,
        probe: &probe,
        runner: &cloud,
    };
    let mut prompt = CountingPrompt {
        answer: false,
        asked: 0,
    };
    let mut ctx = ExecutionContext::new(&opts);

    let err = ctx
        .run(&ScopeRequest::project("p1"), &[&A, &B], &collab, &mut prompt)
        .unwrap_err();

    assert_eq!(fatal_kind(&err), Some(ExitCode::ContinuationDeclined));
    assert_eq!(prompt.asked, 1);
    assert_eq!(ctx.state(), RunState::Aborted);
    assert_eq!(cloud.calls.get(), 0);
}

#[test]
fn accepted_degraded_gate_records_gaps_as_warnings() {
    let opts = EngineOptions::default();
    let inventory = Org { projects: vec!["p1"] };
    let probe = Grants {
        caller: vec!["a.list"],
        per_target: None,
    };
    let cloud = Cloud::new();
    let collab = Collaborators {
        inventory: &inventory,
        probe: &probe,
        runner: &cloud,
    };
    let mut ctx = ExecutionContext::new(&opts);

    let report = ctx
        .run(
            &ScopeRequest::project("p1"),
            &[&A, &B],
            &collab,
            &mut FixedAnswer(true),
        )
        .expect("assessment");

    let permissions = report.permissions.as_ref().expect("permission summary");
    assert!(permissions.degraded);
    assert_eq!(permissions.coverage_pct, 50);
    assert_eq!(permissions.missing[0].permission, "b.list");

    let ids: Vec<&str> = report.sections.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["permissions", "1.2", "1.3"]);
    assert_eq!(report.sections[0].results[0].status, CheckStatus::Warn);
    assert!(report.sections[0].results[0].title.contains("b.list"));

    // b-check is skipped, a-check still runs.
    assert_eq!(report.sections[2].results.len(), 1);
    assert_eq!(report.sections[2].results[0].status, CheckStatus::Warn);
    assert_eq!(report.sections[1].results[0].status, CheckStatus::Fail);
    assert_eq!(cloud.calls.get(), 1);

    assert_eq!(report.summary.counts.warned, 2);
    assert_eq!(report.summary.compliance_pct, 0);
    assert!(
        report
            .summary
            .notes
            .iter()
            .any(|n| n.contains("50% permission coverage"))
    );
}

#[test]
fn empty_organization_is_fatal_before_gate() {
    let opts = EngineOptions::default();
    let inventory = Org { projects: vec![] };
    let probe = Grants {
        caller: vec!["a.list"],
        per_target: None,
    };
    let cloud = Cloud::new();
    let collab = Collaborators {
        inventory: &inventory,
        probe: &probe,
        runner: &cloud,
    };
    let mut prompt = CountingPrompt {
        answer: true,
        asked: 0,
    };
    let mut ctx = ExecutionContext::new(&opts);

    let err = ctx
        .run(&ScopeRequest::organization("42"), &[&A], &collab, &mut prompt)
        .unwrap_err();
    assert_eq!(fatal_kind(&err), Some(ExitCode::EmptyScope));
    assert_eq!(prompt.asked, 0);
    assert!(ctx.scope().is_none());
    assert_eq!(cloud.calls.get(), 0);
}

#[test]
fn organization_without_target_level_grants_is_insufficient() {
    let opts = EngineOptions::default();
    let inventory = Org {
        projects: vec!["p1", "p3"],
    };
    let probe = Grants {
        caller: vec!["a.list"],
        per_target: Some(vec![]),
    };
    let cloud = Cloud::new();
    let collab = Collaborators {
        inventory: &inventory,
        probe: &probe,
        runner: &cloud,
    };
    let mut ctx = ExecutionContext::new(&opts);

    let err = ctx
        .run(
            &ScopeRequest::organization("42"),
            &[&A],
            &collab,
            &mut FixedAnswer(true),
        )
        .unwrap_err();
    assert_eq!(fatal_kind(&err), Some(ExitCode::InsufficientPermissions));
    assert_eq!(ctx.state(), RunState::Aborted);
    assert_eq!(cloud.calls.get(), 0);
}

/// `pay-4031` no longer exists; everything else is clean.
struct VanishedProject;

impl CommandRunner for VanishedProject {
    fn run(&self, command: &CommandDescriptor, _timeout: Duration) -> Result<CommandOutput> {
        if command.target.as_deref() == Some("pay-4031") {
            return Ok(CommandOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "ERROR: (gcloud.things.list) NOT_FOUND: project pay-4031 was not found"
                    .to_string(),
            });
        }
        Ok(CommandOutput {
            exit_code: 0,
            stdout: "[]".to_string(),
            stderr: String::new(),
        })
    }
}

#[test]
fn unreachable_target_counts_against_the_score() {
    let opts = EngineOptions::default();
    let inventory = Org {
        projects: vec!["pay-4031", "ok-1"],
    };
    let probe = Grants {
        caller: vec!["a.list"],
        per_target: None,
    };
    let collab = Collaborators {
        inventory: &inventory,
        probe: &probe,
        runner: &VanishedProject,
    };
    let mut ctx = ExecutionContext::new(&opts);

    let report = ctx
        .run(
            &ScopeRequest::organization("42"),
            &[&A],
            &collab,
            &mut FixedAnswer(false),
        )
        .expect("assessment");

    let results = &report.sections[0].results;
    assert_eq!(results[0].target.as_deref(), Some("pay-4031"));
    assert_eq!(results[0].status, CheckStatus::Fail);
    assert!(results[0].details.starts_with("command failed"), "{}", results[0].details);
    assert_eq!(results[1].status, CheckStatus::Pass);
    assert_eq!(report.summary.compliance_pct, 50);
    assert_eq!(report.summary.compliance_status, ComplianceStatus::NonCompliant);
}
