use anyhow::Error;
use std::io::{self, Write};
use unicode_width::UnicodeWidthChar;

use crate::core::{CheckResult, CheckStatus, ComplianceStatus, Report, Section};
use crate::rules::Check;

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub color: bool,
    pub max_table_rows: usize,
    pub quiet: bool,
    pub verbose: bool,
}

pub fn eprintln_error(err: &Error) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "error:");
    let _ = writeln!(stderr, "  {err}");

    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        let _ = writeln!(stderr, "caused by:");
        for cause in causes {
            let _ = writeln!(stderr, "  - {cause}");
        }
    }

    let _ = writeln!(stderr, "next:");
    let _ = writeln!(stderr, "  - re-run with `--verbose` for dispatch details");
    let _ = writeln!(
        stderr,
        "  - see `cloudassess --help` for available commands and options"
    );
}

pub fn print_report(report: &Report, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let mut out = io::stdout().lock();
    write_report(&mut out, report, cfg);
}

fn write_report(out: &mut dyn Write, report: &Report, cfg: &UiConfig) {
    let summary = &report.summary;
    let _ = writeln!(
        out,
        "Scope: {} {} ({} target{})",
        report.scope.kind,
        report.scope.requested_id,
        report.scope.targets.len(),
        if report.scope.targets.len() == 1 { "" } else { "s" }
    );
    let _ = writeln!(
        out,
        "Compliance: {}% [{}]",
        summary.compliance_pct,
        format_compliance(summary.compliance_status, cfg.color)
    );
    let c = &summary.counts;
    let _ = writeln!(
        out,
        "Checks: total={} pass={} fail={} warn={} info={}",
        c.total, c.passed, c.failed, c.warned, c.info
    );
    if let Some(perms) = &report.permissions {
        let _ = writeln!(
            out,
            "Permissions: {}/{} available ({}%){}",
            perms.available,
            perms.total,
            perms.coverage_pct,
            if perms.degraded { ", degraded" } else { "" }
        );
    }
    for note in &summary.notes {
        let _ = writeln!(out, "- {note}");
    }

    let _ = writeln!(out);
    print_sections_table(out, &report.sections, cfg.color);

    let rows: Vec<(&Section, &CheckResult)> = report
        .sections
        .iter()
        .flat_map(|s| s.results.iter().map(move |r| (s, r)))
        .filter(|(_, r)| r.status != CheckStatus::Pass || cfg.verbose)
        .collect();
    if !rows.is_empty() {
        let shown = rows.len().min(cfg.max_table_rows.max(1));
        let _ = writeln!(out);
        if rows.len() > shown {
            let _ = writeln!(out, "Results ({shown} of {}):", rows.len());
        } else {
            let _ = writeln!(out, "Results:");
        }
        for (section, result) in rows.iter().take(shown) {
            let status = format_status(result.status, cfg.color);
            let target = result
                .target
                .as_deref()
                .map(|t| format!(" @{t}"))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "- {} {} {}{target}",
                pad_end_display(&status, 4),
                section.id,
                result.title
            );
            if !result.details.is_empty() {
                for line in result.details.lines() {
                    let _ = writeln!(out, "    {}", truncate_middle(line, 160));
                }
            }
            if let Some(rec) = &result.recommendation {
                let _ = writeln!(out, "    fix: {rec}");
            }
        }
        if rows.len() > shown {
            let _ = writeln!(out, "- ... ({} more)", rows.len() - shown);
        }
    }

    if !summary.critical_findings.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Critical findings:");
        for finding in &summary.critical_findings {
            let target = finding
                .target
                .as_deref()
                .map(|t| format!(" @{t}"))
                .unwrap_or_default();
            let _ = writeln!(out, "- [{}] {}{target}", finding.section_id, finding.title);
        }
    }
}

pub fn print_checks(checks: &[&dyn Check], cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let mut out = io::stdout().lock();
    let id_w = checks
        .iter()
        .map(|c| visible_width_ansi(c.id()))
        .max()
        .unwrap_or(0)
        .max(2);
    let _ = writeln!(out, "{}  SEVERITY  TITLE", pad_end_display("ID", id_w));
    for check in checks {
        let severity = format_status(check.severity(), cfg.color);
        let _ = writeln!(
            out,
            "{}  {}  {}",
            pad_end_display(check.id(), id_w),
            pad_end_display(&severity, 8),
            check.title()
        );
        if cfg.verbose {
            let _ = writeln!(out, "    requires: {}", check.permissions().join(", "));
        }
    }
}

fn print_sections_table(out: &mut dyn Write, sections: &[Section], color: bool) {
    let label_id = "SECTION";
    let label_pct = "SCORE";
    let label_counts = "P/F/W/I";
    let label_title = "TITLE";

    let id_w = sections
        .iter()
        .map(|s| visible_width_ansi(&s.id))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label_id));
    let pct_w = visible_width_ansi(label_pct).max(4);
    let counts_w = sections
        .iter()
        .map(|s| visible_width_ansi(&format_counts(s)))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label_counts));

    let _ = writeln!(
        out,
        "{}  {}  {}  {}",
        pad_end_display(label_id, id_w),
        pad_start_display(label_pct, pct_w),
        pad_end_display(label_counts, counts_w),
        label_title
    );
    let _ = writeln!(
        out,
        "{}  {}  {}  {}",
        "-".repeat(id_w),
        "-".repeat(pct_w),
        "-".repeat(counts_w),
        "-".repeat(visible_width_ansi(label_title))
    );

    for section in sections {
        let pct = format!("{}%", section.compliance_pct);
        let pct = if color && section.counts.failed > 0 {
            format!("\x1b[31m{}\x1b[0m", pad_start_display(&pct, pct_w))
        } else {
            pad_start_display(&pct, pct_w)
        };
        let _ = writeln!(
            out,
            "{}  {}  {}  {}",
            pad_end_display(&section.id, id_w),
            pct,
            pad_end_display(&format_counts(section), counts_w),
            section.title
        );
    }
}

fn format_counts(section: &Section) -> String {
    let c = &section.counts;
    format!("{}/{}/{}/{}", c.passed, c.failed, c.warned, c.info)
}

fn format_status(status: CheckStatus, color: bool) -> String {
    let s = status.as_str();
    if !color {
        return s.to_string();
    }
    let code = match status {
        CheckStatus::Pass => "32",
        CheckStatus::Fail => "31",
        CheckStatus::Warn => "33",
        CheckStatus::Info => "90",
    };
    format!("\x1b[{code}m{s}\x1b[0m")
}

fn format_compliance(status: ComplianceStatus, color: bool) -> String {
    let s = status.as_str();
    if !color {
        return s.to_string();
    }
    let code = match status {
        ComplianceStatus::Compliant => "32",
        ComplianceStatus::PartiallyCompliant => "33",
        ComplianceStatus::NonCompliant => "31",
        ComplianceStatus::NotAssessed => "90",
    };
    format!("\x1b[{code}m{s}\x1b[0m")
}

fn truncate_middle(s: &str, max_chars: usize) -> String {
    let len = s.chars().count();
    if len <= max_chars {
        return s.to_string();
    }

    let keep = max_chars.saturating_sub(3);
    let left = keep / 2;
    let right = keep.saturating_sub(left);

    let prefix: String = s.chars().take(left).collect();
    let suffix: String = s.chars().skip(len - right).collect();
    format!("{prefix}...{suffix}")
}

fn pad_end_display(s: &str, width: usize) -> String {
    let w = visible_width_ansi(s);
    if w >= width {
        return s.to_string();
    }
    format!("{s}{}", " ".repeat(width - w))
}

fn pad_start_display(s: &str, width: usize) -> String {
    let w = visible_width_ansi(s);
    if w >= width {
        return s.to_string();
    }
    format!("{}{}", " ".repeat(width - w), s)
}

fn visible_width_ansi(s: &str) -> usize {
    let mut width: usize = 0;
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            let _ = chars.next();
            for ch2 in chars.by_ref() {
                if ch2 == 'm' {
                    break;
                }
            }
            continue;
        }
        width = width.saturating_add(UnicodeWidthChar::width(ch).unwrap_or(0));
    }
    width
}
