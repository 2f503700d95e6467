use std::io::{self, BufRead, Write};

use anyhow::Result;

use crate::core::PermissionRequirement;
use crate::permissions::ContinuationPrompt;

/// Asks on stderr and reads the answer from stdin.
pub(crate) struct StdinPrompt;

impl ContinuationPrompt for StdinPrompt {
    fn confirm_degraded(
        &mut self,
        coverage_pct: u32,
        missing: &[PermissionRequirement],
    ) -> Result<bool> {
        let mut stderr = io::stderr().lock();
        writeln!(
            stderr,
            "Limited permissions detected ({coverage_pct}% coverage). Missing:"
        )?;
        let mut shown: Vec<&str> = Vec::new();
        for m in missing {
            if shown.contains(&m.permission.as_str()) {
                continue;
            }
            shown.push(&m.permission);
            writeln!(stderr, "  - {} (required by {})", m.permission, m.requirement_id)?;
        }
        write!(
            stderr,
            "Continue with limited permissions? Some checks will be reported as WARN. (y/N): "
        )?;
        stderr.flush()?;

        let mut input = String::new();
        let mut stdin = io::stdin().lock();
        let n = stdin.read_line(&mut input)?;
        if n == 0 {
            return Ok(false);
        }
        Ok(parse_yes_no(&input))
    }
}

pub(crate) fn parse_yes_no(input: &str) -> bool {
    matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
