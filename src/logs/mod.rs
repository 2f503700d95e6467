use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::{PermissionSummary, Report, Scope, StatusCounts};
use crate::dispatch::DispatchAttempt;
use crate::engine::{ExecutionContext, RunState};
use crate::scope::ScopeRequest;

#[derive(Debug, Serialize)]
struct AssessLog {
    schema_version: &'static str,
    tool_version: String,
    command: &'static str,
    started_at: String,
    finished_at: String,
    status: &'static str,
    final_state: RunState,
    request: RequestLog,
    #[serde(skip_serializing_if = "Option::is_none")]
    targets: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    permissions: Option<PermissionSummary>,
    attempts: Vec<CommandAttemptLog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<OutcomeLog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct RequestLog {
    scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    organization: Option<String>,
    checks: Vec<String>,
}

#[derive(Debug, Serialize)]
struct OutcomeLog {
    counts: StatusCounts,
    compliance_pct: u32,
    compliance_status: String,
}

#[derive(Debug, Serialize)]
struct CommandAttemptLog {
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    cmd: String,
    args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
    duration_ms: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&DispatchAttempt> for CommandAttemptLog {
    fn from(a: &DispatchAttempt) -> Self {
        Self {
            target: a.target.clone(),
            cmd: a.cmd.clone(),
            args: a.args.clone(),
            exit_code: a.exit_code,
            duration_ms: a.duration_ms,
            stderr: a.stderr.clone(),
            error: a.error.clone(),
        }
    }
}

pub fn logs_dir(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/cloudassess/logs")
}

pub struct AssessRun<'a> {
    pub started_at: OffsetDateTime,
    pub finished_at: OffsetDateTime,
    pub request: &'a ScopeRequest,
    pub check_ids: Vec<String>,
    pub ctx: &'a ExecutionContext<'a>,
    pub result: std::result::Result<&'a Report, &'a anyhow::Error>,
}

pub fn write_assess_log(home_dir: &Path, run: &AssessRun<'_>) -> Result<PathBuf> {
    let dir = logs_dir(home_dir);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create log directory: {}", dir.display()))?;

    let pid = std::process::id();
    let ts = run.finished_at.unix_timestamp_nanos();
    let path = dir.join(format!("assess-{pid}-{ts}.json"));

    let log = build_log(run);
    let buf = serde_json::to_vec_pretty(&log).context("failed to serialize run log (JSON)")?;
    std::fs::write(&path, buf)
        .with_context(|| format!("failed to write run log: {}", path.display()))?;
    Ok(path)
}

fn build_log(run: &AssessRun<'_>) -> AssessLog {
    let final_state = run.ctx.state();
    let status = match (&run.result, final_state) {
        (Ok(_), RunState::Finalized) => "finalized",
        (Err(_), RunState::Aborted) => "aborted",
        _ => "error",
    };
    let (outcome, error) = match run.result {
        Ok(report) => (
            Some(OutcomeLog {
                counts: report.summary.counts,
                compliance_pct: report.summary.compliance_pct,
                compliance_status: report.summary.compliance_status.to_string(),
            }),
            None,
        ),
        Err(err) => (None, Some(format!("{err:#}"))),
    };

    AssessLog {
        schema_version: "1.0",
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        command: "assess",
        started_at: format_ts(run.started_at),
        finished_at: format_ts(run.finished_at),
        status,
        final_state,
        request: RequestLog {
            scope: run.request.kind.clone(),
            project: run.request.single_id.clone(),
            organization: run.request.umbrella_id.clone(),
            checks: run.check_ids.clone(),
        },
        targets: run
            .ctx
            .scope()
            .map(|s: &Scope| s.targets.iter().map(|t| t.id.clone()).collect()),
        permissions: run.ctx.gate().map(|g| g.summary()),
        attempts: run.ctx.attempts().iter().map(CommandAttemptLog::from).collect(),
        outcome,
        error,
    }
}

fn format_ts(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| "unknown".to_string())
}
