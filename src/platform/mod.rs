use std::io::Read;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use wait_timeout::ChildExt;

use crate::dispatch::{CommandDescriptor, CommandRunner};

pub mod gcloud;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Returned (inside `anyhow::Error`) when a child outlives its timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedOut {
    pub program: String,
    pub timeout: Duration,
}

impl std::fmt::Display for TimedOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timed out after {:?}: {}", self.timeout, self.program)
    }
}

impl std::error::Error for TimedOut {}

pub fn is_timeout(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.downcast_ref::<TimedOut>().is_some())
}

pub fn run_command(cmd: &str, args: &[String], timeout: Duration) -> Result<CommandOutput> {
    let mut child = Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to start process: {cmd}"))?;

    // Drain both pipes on helper threads so a chatty child cannot block on a full pipe.
    let stdout_reader = child.stdout.take().map(drain);
    let stderr_reader = child.stderr.take().map(drain);

    let status = match child
        .wait_timeout(timeout)
        .with_context(|| format!("failed to wait for process: {cmd}"))?
    {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(TimedOut {
                program: cmd.to_string(),
                timeout,
            }
            .into());
        }
    };

    let stdout = collect(stdout_reader).with_context(|| format!("failed to read stdout: {cmd}"))?;
    let stderr = collect(stderr_reader).with_context(|| format!("failed to read stderr: {cmd}"))?;

    Ok(CommandOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<std::io::Result<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

/// Invalid UTF-8 is replaced rather than dropped, so downstream JSON parsing sees it and fails.
fn collect(reader: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> Result<String> {
    let Some(handle) = reader else {
        return Ok(String::new());
    };
    let bytes = handle
        .join()
        .map_err(|_| anyhow::anyhow!("output reader thread panicked"))??;
    Ok(match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    })
}

/// Runs descriptors as direct child processes; arguments never pass through a shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, command: &CommandDescriptor, timeout: Duration) -> Result<CommandOutput> {
        run_command(&command.program, &command.args, timeout)
    }
}

pub fn home_dir() -> Result<std::path::PathBuf> {
    std::env::var_os("HOME")
        .map(std::path::PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("HOME is not set"))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn captures_stdout_and_exit_code() {
        let out = run_command("sh", &args(&["-c", "echo hi; exit 3"]), Duration::from_secs(5))
            .expect("run sh");
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout.trim(), "hi");
    }

    #[test]
    fn kills_child_after_timeout() {
        let err = run_command("sh", &args(&["-c", "sleep 5"]), Duration::from_millis(200))
            .unwrap_err();
        assert!(is_timeout(&err), "err={err:#}");
    }

    #[test]
    fn invalid_utf8_output_is_kept_and_fails_json_parsing() {
        let out = run_command(
            "sh",
            &args(&["-c", r#"printf '\377[{"name":"default"}]'"#]),
            Duration::from_secs(5),
        )
        .expect("run sh");
        assert_eq!(out.exit_code, 0);
        assert!(out.stdout.starts_with('\u{FFFD}'), "stdout={:?}", out.stdout);
        assert!(out.stdout.contains("default"));
        assert!(crate::dispatch::parse_records(&out.stdout).is_err());
    }

    #[test]
    fn missing_program_is_an_error() {
        let err = run_command(
            "cloudassess-definitely-missing-binary",
            &[],
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(!is_timeout(&err));
    }
}
