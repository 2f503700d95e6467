//! Cross-target dispatch: one operation, every resolved target, failures isolated per target.

use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::core::Target;
use crate::platform::{self, CommandOutput};

/// Separator between target id and payload in tagged output lines.
pub const TAG_DELIMITER: char = '/';

const MAX_LOGGED_STDERR_BYTES: usize = 64 * 1024;

/// A cloud CLI operation without any target qualifier, e.g. `compute firewall-rules list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub args: Vec<String>,
    pub structured: bool,
}

impl Operation {
    pub fn new(args: &[&str]) -> Self {
        Self {
            args: args.iter().map(|s| (*s).to_string()).collect(),
            structured: false,
        }
    }

    /// Requests JSON output from the collaborator CLI.
    pub fn structured(mut self) -> Self {
        self.structured = true;
        self
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub program: String,
    pub args: Vec<String>,
    pub target: Option<String>,
}

impl CommandDescriptor {
    pub fn cmdline(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    pub program: String,
    pub target_flag: String,
    pub timeout: Duration,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            program: "gcloud".to_string(),
            target_flag: "--project".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

pub trait CommandRunner {
    fn run(&self, command: &CommandDescriptor, timeout: Duration) -> Result<CommandOutput>;
}

pub fn build_command(
    opts: &DispatchOptions,
    base: &Operation,
    target: Option<&str>,
) -> CommandDescriptor {
    let mut args = base.args.clone();
    if let Some(target) = target {
        args.push(format!("{}={target}", opts.target_flag));
    }
    if base.structured && !args.iter().any(|a| a.starts_with("--format")) {
        args.push("--format=json".to_string());
    }
    CommandDescriptor {
        program: opts.program.clone(),
        args,
        target: target.map(ToOwned::to_owned),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    AccessDenied,
    CommandFailed,
    LaunchFailed,
}

impl FailureKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::AccessDenied => "access denied",
            FailureKind::CommandFailed => "command failed",
            FailureKind::LaunchFailed => "launch failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFailure {
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    Success { stdout: String },
    Failure(DispatchFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutput {
    pub target: String,
    pub outcome: TargetOutcome,
}

/// Per-target outputs of one operation, in scope order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetisedOutput {
    pub outputs: Vec<TargetOutput>,
}

impl TargetisedOutput {
    /// Runs `inspect` over the records of every successful target and tags each
    /// flagged record as `target/line`. Targets whose output is not JSON are
    /// listed separately instead of counting as clean.
    pub fn tagged_findings(&self, inspect: impl Fn(&Value) -> Option<String>) -> TaggedFindings {
        let mut findings = TaggedFindings::default();
        for output in &self.outputs {
            let TargetOutcome::Success { stdout } = &output.outcome else {
                continue;
            };
            match parse_records(stdout) {
                Ok(records) => {
                    for record in &records {
                        if let Some(line) = inspect(record) {
                            findings
                                .lines
                                .push(format!("{}{TAG_DELIMITER}{line}", output.target));
                        }
                    }
                }
                Err(err) => findings
                    .unparsable
                    .push((output.target.clone(), err.to_string())),
            }
        }
        findings
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &DispatchFailure)> {
        self.outputs.iter().filter_map(|o| match &o.outcome {
            TargetOutcome::Failure(failure) => Some((o.target.as_str(), failure)),
            TargetOutcome::Success { .. } => None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaggedFindings {
    pub lines: Vec<String>,
    /// `(target, parse error)` for outputs that could not be read as records.
    pub unparsable: Vec<(String, String)>,
}

impl TaggedFindings {
    pub fn parse_error(&self, target: &str) -> Option<&str> {
        self.unparsable
            .iter()
            .find(|(t, _)| t == target)
            .map(|(_, err)| err.as_str())
    }
}

/// One command execution, kept for the run log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchAttempt {
    pub target: Option<String>,
    pub cmd: String,
    pub args: Vec<String>,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub stderr: String,
    pub error: Option<String>,
}

pub struct Dispatcher<'a> {
    runner: &'a dyn CommandRunner,
    opts: &'a DispatchOptions,
    targets: &'a [Target],
    attempts: Vec<DispatchAttempt>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        opts: &'a DispatchOptions,
        targets: &'a [Target],
    ) -> Self {
        Self {
            runner,
            opts,
            targets,
            attempts: Vec::new(),
        }
    }

    pub fn build_command(&self, base: &Operation, target: Option<&str>) -> CommandDescriptor {
        build_command(self.opts, base, target)
    }

    pub fn run_across_targets(&mut self, base: &Operation) -> TargetisedOutput {
        let mut outputs = Vec::with_capacity(self.targets.len());
        for target in self.targets {
            let command = self.build_command(base, Some(&target.id));
            let outcome = self.run_one(&command);
            outputs.push(TargetOutput {
                target: target.id.clone(),
                outcome,
            });
        }
        TargetisedOutput { outputs }
    }

    fn run_one(&mut self, command: &CommandDescriptor) -> TargetOutcome {
        let started = Instant::now();
        let result = self.runner.run(command, self.opts.timeout);
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let mut attempt = DispatchAttempt {
            target: command.target.clone(),
            cmd: command.program.clone(),
            args: command.args.clone(),
            exit_code: None,
            duration_ms,
            stderr: String::new(),
            error: None,
        };

        let outcome = match result {
            Ok(output) => {
                attempt.exit_code = Some(output.exit_code);
                attempt.stderr = truncate_bytes(&output.stderr, MAX_LOGGED_STDERR_BYTES);
                classify_output(output)
            }
            Err(err) => {
                attempt.error = Some(format!("{err:#}"));
                let kind = if platform::is_timeout(&err) {
                    FailureKind::Timeout
                } else {
                    FailureKind::LaunchFailed
                };
                TargetOutcome::Failure(DispatchFailure {
                    kind,
                    message: format!("{err:#}"),
                })
            }
        };
        self.attempts.push(attempt);
        outcome
    }

    pub fn into_attempts(self) -> Vec<DispatchAttempt> {
        self.attempts
    }
}

fn classify_output(output: CommandOutput) -> TargetOutcome {
    if output.success() {
        return TargetOutcome::Success {
            stdout: output.stdout,
        };
    }

    let stderr = output.stderr.trim();
    let kind = if looks_like_access_denied(stderr) {
        FailureKind::AccessDenied
    } else {
        FailureKind::CommandFailed
    };
    let mut message = format!("exit_code={}", output.exit_code);
    if let Some(first) = stderr.lines().find(|l| !l.trim().is_empty()) {
        message.push_str(": ");
        message.push_str(first.trim());
    }
    TargetOutcome::Failure(DispatchFailure { kind, message })
}

/// Only gcloud's own denial markers count; ids and messages may contain "403" by chance.
fn looks_like_access_denied(stderr: &str) -> bool {
    let s = stderr.to_ascii_lowercase();
    s.contains("permission_denied")
        || s.contains("httperror 403")
        || (s.contains("does not have") && s.contains("permission"))
}

fn truncate_bytes(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(truncated)", &s[..end])
}

/// Parses structured CLI output into resource records.
///
/// Empty output is zero records. A top-level object counts as a single record.
pub fn parse_records(stdout: &str) -> Result<Vec<Value>> {
    let s = stdout.trim();
    if s.is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(s)? {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        obj @ Value::Object(_) => Ok(vec![obj]),
        other => Err(anyhow!("expected a JSON array or object, got: {other}")),
    }
}
