use std::io;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;
use time::OffsetDateTime;

use crate::dispatch::DispatchOptions;
use crate::engine::{Collaborators, EngineOptions, ExecutionContext};
use crate::exit::ExitCode;
use crate::permissions::{ContinuationPrompt, FixedAnswer, GatePolicy};
use crate::platform::ProcessRunner;
use crate::platform::gcloud::{CliPermissionProbe, GcloudInventory};
use crate::rules::Check;
use crate::scope::ScopeRequest;
use crate::ui::UiConfig;

mod interactive;

#[derive(Debug, Parser)]
#[command(
    name = "cloudassess",
    version,
    about = "Assess a cloud project or organization against network compliance requirements and produce a scored report"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub json: bool,
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
    #[arg(long, global = true)]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub quiet: bool,
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Per-command timeout in seconds (overrides dispatch.timeout_secs).
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Assess(AssessArgs),
    Checks,
    Config(ConfigArgs),
    Completion(CompletionArgs),
}

#[derive(Debug, Args)]
pub struct AssessArgs {
    /// project | organization
    #[arg(long)]
    pub scope: String,
    #[arg(long)]
    pub project: Option<String>,
    #[arg(long = "org")]
    pub org: Option<String>,
    /// Run only these check ids (repeatable).
    #[arg(long = "check")]
    pub checks: Vec<String>,
    /// Continue without asking when permission coverage is partial.
    #[arg(long)]
    pub yes: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub show: bool,
}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    pub shell: String,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let stdin_is_tty = io::stdin().is_terminal();
    let stdout_is_tty = io::stdout().is_terminal();
    let stderr_is_tty = io::stderr().is_terminal();

    let home_dir = crate::platform::home_dir()?;

    let env_config_path = std::env::var_os("CLOUDASSESS_CONFIG").map(PathBuf::from);
    let cfg = crate::config::load(
        cli.config.as_deref().or(env_config_path.as_deref()),
        &home_dir,
    )
    .map_err(crate::exit::invalid_args_err)?;

    let ui_cfg = UiConfig {
        color: stdout_is_tty && cfg.ui.color && !cli.no_color,
        max_table_rows: cfg.ui.max_table_rows,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    let timeout_secs = cli.timeout.unwrap_or(cfg.dispatch.timeout_secs);
    if timeout_secs == 0 {
        return Err(crate::exit::invalid_args("--timeout must be greater than 0"));
    }
    let engine_opts = EngineOptions {
        dispatch: DispatchOptions {
            program: cfg.cloud.cli.clone(),
            target_flag: cfg.cloud.target_flag.clone(),
            timeout: Duration::from_secs(timeout_secs),
        },
        policy: GatePolicy {
            hard_minimum: cfg.gate.hard_minimum,
            soft_threshold: cfg.gate.soft_threshold,
        },
        show_progress: stderr_is_tty && !cli.quiet && !cli.json,
    };

    match cli.command {
        Commands::Assess(args) => {
            let checks =
                crate::rules::select_checks(&args.checks).map_err(crate::exit::invalid_args)?;
            let check_refs: Vec<&dyn Check> = checks.iter().map(|c| c as &dyn Check).collect();

            let request = ScopeRequest {
                kind: args.scope.clone(),
                single_id: args.project.clone(),
                umbrella_id: args.org.clone(),
            };

            let runner = ProcessRunner;
            let inventory = GcloudInventory::new(&runner, &engine_opts.dispatch);
            let probe = CliPermissionProbe::for_checks(&runner, &engine_opts.dispatch, &check_refs);
            let collab = Collaborators {
                inventory: &inventory,
                probe: &probe,
                runner: &runner,
            };

            let interactive = stdin_is_tty && stderr_is_tty;
            let mut stdin_prompt = interactive::StdinPrompt;
            let mut fixed = FixedAnswer(args.yes);
            let prompt: &mut dyn ContinuationPrompt = if args.yes || !interactive {
                &mut fixed
            } else {
                &mut stdin_prompt
            };

            let mut ctx = ExecutionContext::new(&engine_opts);
            let started_at = OffsetDateTime::now_utc();
            let result = ctx.run(&request, &check_refs, &collab, prompt);
            let finished_at = OffsetDateTime::now_utc();

            if cfg.logs.enabled {
                let run = crate::logs::AssessRun {
                    started_at,
                    finished_at,
                    request: &request,
                    check_ids: check_refs.iter().map(|c| c.id().to_string()).collect(),
                    ctx: &ctx,
                    result: result.as_ref(),
                };
                match crate::logs::write_assess_log(&home_dir, &run) {
                    Ok(path) => {
                        if ui_cfg.verbose {
                            eprintln!("log: {}", path.display());
                        }
                    }
                    Err(err) => {
                        if !ui_cfg.quiet {
                            eprintln!("warning: could not write run log: {err:#}");
                        }
                    }
                }
            }

            let report = match result {
                Ok(report) => report,
                Err(err) => {
                    let declined = crate::exit::fatal_kind(&err)
                        == Some(ExitCode::ContinuationDeclined);
                    if declined && !interactive && !args.yes {
                        return Err(err.context(
                            "stdin is not a terminal; re-run with --yes to accept partial permission coverage",
                        ));
                    }
                    return Err(err);
                }
            };

            if ui_cfg.verbose {
                for attempt in ctx.attempts() {
                    let status = match (&attempt.error, attempt.exit_code) {
                        (Some(err), _) => format!("error: {err}"),
                        (None, Some(code)) => format!("exit_code={code}"),
                        (None, None) => "no status".to_string(),
                    };
                    eprintln!(
                        "dispatch: {} {} ({} ms) {status}",
                        attempt.cmd,
                        attempt.args.join(" "),
                        attempt.duration_ms
                    );
                }
            }

            if cli.json {
                write_json(&report)?;
            } else {
                crate::ui::print_report(&report, &ui_cfg);
            }
        }
        Commands::Checks => {
            let checks = crate::rules::builtin_checks();
            if cli.json {
                let listing: Vec<CheckListing<'_>> = checks
                    .iter()
                    .map(|c| CheckListing {
                        id: c.id(),
                        section: c.section_id(),
                        title: c.title(),
                        severity: c.severity().as_str(),
                        permissions: c.permissions(),
                    })
                    .collect();
                write_json(&listing)?;
            } else {
                let refs: Vec<&dyn Check> = checks.iter().map(|c| c as &dyn Check).collect();
                crate::ui::print_checks(&refs, &ui_cfg);
            }
        }
        Commands::Config(args) => {
            if args.show {
                if cli.json {
                    write_json(&cfg)?;
                } else {
                    println!(
                        "{}",
                        toml::to_string_pretty(&cfg).context("failed to render config")?
                    );
                }
            } else if !ui_cfg.quiet {
                eprintln!("config: use `cloudassess config --show`");
            }
        }
        Commands::Completion(args) => {
            let shell = parse_shell(&args.shell)?;
            let mut cmd = Cli::command();
            let mut out = std::io::stdout().lock();
            clap_complete::generate(shell, &mut cmd, "cloudassess", &mut out);
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct CheckListing<'a> {
    id: &'a str,
    section: &'a str,
    title: &'a str,
    severity: &'a str,
    permissions: &'a [&'a str],
}

fn write_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    use std::io::Write;

    let buf = serde_json::to_vec_pretty(value)?;

    let mut stdout = std::io::stdout().lock();
    match stdout.write_all(&buf) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    match stdout.write_all(b"\n") {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn parse_shell(s: &str) -> Result<clap_complete::Shell> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "bash" => Ok(clap_complete::Shell::Bash),
        "zsh" => Ok(clap_complete::Shell::Zsh),
        "fish" => Ok(clap_complete::Shell::Fish),
        other => Err(crate::exit::invalid_args(format!(
            "unsupported shell: {other} (expected bash|zsh|fish)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn assess_args_parse() {
        let cli = Cli::try_parse_from([
            "cloudassess",
            "--json",
            "assess",
            "--scope",
            "organization",
            "--org",
            "123",
            "--check",
            "1.3.1-open-ingress",
            "--yes",
        ])
        .unwrap();
        assert!(cli.json);
        let Commands::Assess(args) = cli.command else {
            panic!("expected assess");
        };
        assert_eq!(args.scope, "organization");
        assert_eq!(args.org.as_deref(), Some("123"));
        assert_eq!(args.checks, vec!["1.3.1-open-ingress"]);
        assert!(args.yes);
    }

    #[test]
    fn parse_shell_rejects_unknown() {
        assert!(parse_shell("zsh").is_ok());
        assert!(parse_shell("powershell").is_err());
    }
}
