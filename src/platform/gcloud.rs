//! `gcloud`-backed collaborators: project inventory and permission probing.

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;

use crate::core::Target;
use crate::dispatch::{self, CommandRunner, DispatchOptions, Operation, build_command};
use crate::permissions::PermissionProbe;
use crate::platform::CommandOutput;
use crate::rules::Check;
use crate::scope::Inventory;

pub struct GcloudInventory<'a> {
    runner: &'a dyn CommandRunner,
    opts: &'a DispatchOptions,
}

impl<'a> GcloudInventory<'a> {
    pub fn new(runner: &'a dyn CommandRunner, opts: &'a DispatchOptions) -> Self {
        Self { runner, opts }
    }

    fn run_json(&self, op: &Operation) -> Result<String> {
        let command = build_command(self.opts, op, None);
        let output = self
            .runner
            .run(&command, self.opts.timeout)
            .with_context(|| command.cmdline())?;
        ensure_success(&command.cmdline(), output)
    }
}

impl Inventory for GcloudInventory<'_> {
    fn describe_target(&self, id: &str) -> Result<Target> {
        let op = Operation::new(&["projects", "describe"])
            .with_arg(id)
            .structured();
        let stdout = self.run_json(&op)?;
        let record: Value = serde_json::from_str(stdout.trim())
            .with_context(|| format!("unexpected output from projects describe {id}"))?;
        target_from_record(&record).ok_or_else(|| anyhow!("project {id}: projectId missing"))
    }

    fn list_targets(&self, umbrella_id: &str) -> Result<Vec<Target>> {
        let op = Operation::new(&["projects", "list"])
            .with_arg(format!("--filter=parent.id:{umbrella_id}"))
            .structured();
        let stdout = self.run_json(&op)?;
        let records = dispatch::parse_records(&stdout)
            .with_context(|| format!("unexpected output from projects list (org {umbrella_id})"))?;
        Ok(records.iter().filter_map(target_from_record).collect())
    }
}

/// `projectId` is required; the rest falls back to safe defaults.
pub fn target_from_record(record: &Value) -> Option<Target> {
    let id = record.get("projectId").and_then(Value::as_str)?.trim();
    if id.is_empty() {
        return None;
    }
    let display_name = record
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(id);
    let reachable = record
        .get("lifecycleState")
        .and_then(Value::as_str)
        .is_none_or(|s| s.eq_ignore_ascii_case("ACTIVE"));
    Some(Target {
        id: id.to_string(),
        display_name: display_name.to_string(),
        reachable,
    })
}

fn ensure_success(cmdline: &str, output: CommandOutput) -> Result<String> {
    if output.success() {
        return Ok(output.stdout);
    }
    let mut msg = format!("exit_code={}: {cmdline}", output.exit_code);
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        msg.push('\n');
        msg.push_str(stderr);
    }
    Err(anyhow!(msg))
}

/// Tests a permission by running a minimal read (`--limit=1`) that needs it.
pub struct CliPermissionProbe<'a> {
    runner: &'a dyn CommandRunner,
    opts: &'a DispatchOptions,
    probes: HashMap<String, Operation>,
}

impl<'a> CliPermissionProbe<'a> {
    pub fn new(runner: &'a dyn CommandRunner, opts: &'a DispatchOptions) -> Self {
        Self {
            runner,
            opts,
            probes: HashMap::new(),
        }
    }

    pub fn for_checks(
        runner: &'a dyn CommandRunner,
        opts: &'a DispatchOptions,
        checks: &[&dyn Check],
    ) -> Self {
        let mut probe = Self::new(runner, opts);
        for check in checks {
            for permission in check.permissions() {
                probe.add_probe(permission, check.operation());
            }
        }
        probe
    }

    pub fn add_probe(&mut self, permission: &str, operation: Operation) {
        self.probes
            .entry(permission.to_string())
            .or_insert_with(|| operation.with_arg("--limit=1"));
    }
}

impl PermissionProbe for CliPermissionProbe<'_> {
    fn test_permission(&self, permission: &str, target: Option<&str>) -> Result<bool> {
        let op = self
            .probes
            .get(permission)
            .ok_or_else(|| anyhow!("no probe registered for permission {permission}"))?;
        let command = build_command(self.opts, op, target);
        let output = self.runner.run(&command, self.opts.timeout)?;
        Ok(output.success())
    }
}
