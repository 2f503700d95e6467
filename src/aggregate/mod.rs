//! Report model builder: sections, results, counters, and cross-target raw grouping.

use anyhow::{Result, anyhow};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::{
    CheckResult, PermissionSummary, Report, ReportSummary, Scope, ScopeSummary, Section,
    StatusCounts,
};
use crate::score;

pub const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionHandle(usize);

/// Lines grouped per target, de-duplicated, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAggregation {
    groups: Vec<(String, Vec<String>)>,
}

impl RawAggregation {
    pub fn insert(&mut self, target: &str, line: &str) -> bool {
        let idx = match self.groups.iter().position(|(t, _)| t == target) {
            Some(idx) => idx,
            None => {
                self.groups.push((target.to_string(), Vec::new()));
                self.groups.len() - 1
            }
        };
        let lines = &mut self.groups[idx].1;
        if lines.iter().any(|l| l == line) {
            return false;
        }
        lines.push(line.to_string());
        true
    }

    pub fn union(&mut self, other: &RawAggregation) {
        for (target, lines) in &other.groups {
            for line in lines {
                self.insert(target, line);
            }
        }
    }

    pub fn get(&self, target: &str) -> Option<&[String]> {
        self.groups
            .iter()
            .find(|(t, _)| t == target)
            .map(|(_, l)| l.as_slice())
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(t, _)| t.as_str())
    }
}

/// Groups `target<delimiter>line` entries. Entries without a target are returned as skipped.
pub fn aggregate_raw(tagged_lines: &[String], delimiter: char) -> (RawAggregation, Vec<String>) {
    let mut agg = RawAggregation::default();
    let mut skipped = Vec::new();
    for tagged in tagged_lines {
        match tagged.split_once(delimiter) {
            Some((target, line)) if !target.trim().is_empty() && !line.trim().is_empty() => {
                agg.insert(target.trim(), line);
            }
            _ => skipped.push(tagged.clone()),
        }
    }
    (agg, skipped)
}

#[derive(Debug)]
struct SectionDraft {
    id: String,
    title: String,
    counts: StatusCounts,
    results: Vec<CheckResult>,
}

/// Mutable report under construction; `finalize` consumes it.
#[derive(Debug)]
pub struct ReportBuilder {
    scope: ScopeSummary,
    permissions: Option<PermissionSummary>,
    sections: Vec<SectionDraft>,
    default_section: Option<SectionHandle>,
    counts: StatusCounts,
    notes: Vec<String>,
}

impl ReportBuilder {
    pub fn new(scope: &Scope) -> Self {
        Self {
            scope: ScopeSummary {
                kind: scope.kind,
                requested_id: scope.requested_id.clone(),
                targets: scope.targets.iter().map(|t| t.id.clone()).collect(),
            },
            permissions: None,
            sections: Vec::new(),
            default_section: None,
            counts: StatusCounts::default(),
            notes: Vec::new(),
        }
    }

    /// Creates a section, or returns the existing one with the same id.
    /// Either way it becomes the default for untargeted appends.
    pub fn add_section(&mut self, id: &str, title: &str) -> SectionHandle {
        let handle = match self.sections.iter().position(|s| s.id == id) {
            Some(idx) => SectionHandle(idx),
            None => {
                self.sections.push(SectionDraft {
                    id: id.to_string(),
                    title: title.to_string(),
                    counts: StatusCounts::default(),
                    results: Vec::new(),
                });
                SectionHandle(self.sections.len() - 1)
            }
        };
        self.default_section = Some(handle);
        handle
    }

    pub fn add_check_result(
        &mut self,
        section: Option<SectionHandle>,
        result: CheckResult,
    ) -> Result<()> {
        let handle = section
            .or(self.default_section)
            .ok_or_else(|| anyhow!("no section exists for result: {}", result.title))?;
        let draft = self
            .sections
            .get_mut(handle.0)
            .ok_or_else(|| anyhow!("unknown section handle: {}", handle.0))?;
        draft.counts.record(result.status);
        self.counts.record(result.status);
        draft.results.push(result);
        Ok(())
    }

    /// Groups tagged lines; unparsable lines are skipped and noted.
    pub fn aggregate_raw(&mut self, tagged_lines: &[String], delimiter: char) -> RawAggregation {
        let (agg, skipped) = aggregate_raw(tagged_lines, delimiter);
        for line in skipped {
            self.note(format!("skipped unparsable output line: {line:?}"));
        }
        agg
    }

    pub fn set_permissions(&mut self, summary: PermissionSummary) {
        self.permissions = Some(summary);
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn counts(&self) -> &StatusCounts {
        &self.counts
    }

    pub fn finalize(self) -> Report {
        let sections: Vec<Section> = self
            .sections
            .into_iter()
            .map(|draft| {
                let counts = StatusCounts::from_statuses(draft.results.iter().map(|r| r.status));
                debug_assert_eq!(counts, draft.counts, "section counter drift: {}", draft.id);
                Section {
                    compliance_pct: score::score(&counts),
                    id: draft.id,
                    title: draft.title,
                    counts,
                    results: draft.results,
                }
            })
            .collect();

        let mut counts = StatusCounts::default();
        for section in &sections {
            counts.merge(&section.counts);
        }
        debug_assert_eq!(counts, self.counts, "report counter drift");

        let mut notes = self.notes;
        let mut seen = std::collections::HashSet::new();
        notes.retain(|n| seen.insert(n.clone()));

        let generated_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string());

        Report {
            schema_version: SCHEMA_VERSION.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at,
            scope: self.scope,
            permissions: self.permissions,
            summary: ReportSummary {
                compliance_pct: score::score(&counts),
                compliance_status: score::classify(&counts),
                critical_findings: score::critical_findings(&sections),
                counts,
                notes,
            },
            sections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CheckStatus, ComplianceStatus, ScopeKind, Target};

    fn scope() -> Scope {
        Scope {
            kind: ScopeKind::Project,
            requested_id: "p1".to_string(),
            targets: vec![Target::new("p1")],
        }
    }

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn results_need_a_section() {
        let mut b = ReportBuilder::new(&scope());
        assert!(b.add_check_result(None, CheckResult::pass("x", "")).is_err());
        assert!(
            b.add_check_result(Some(SectionHandle(3)), CheckResult::pass("x", ""))
                .is_err()
        );
        assert_eq!(b.counts().total, 0);
    }

    #[test]
    fn default_section_follows_last_added() {
        let mut b = ReportBuilder::new(&scope());
        let first = b.add_section("1", "First");
        b.add_section("2", "Second");
        b.add_check_result(None, CheckResult::pass("a", "")).unwrap();
        b.add_check_result(Some(first), CheckResult::fail("b", ""))
            .unwrap();
        let report = b.finalize();
        assert_eq!(report.sections[0].results[0].title, "b");
        assert_eq!(report.sections[1].results[0].title, "a");
    }

    #[test]
    fn counts_do_not_depend_on_append_order() {
        let statuses = [
            CheckStatus::Pass,
            CheckStatus::Fail,
            CheckStatus::Warn,
            CheckStatus::Pass,
            CheckStatus::Info,
        ];
        let mut reversed = statuses;
        reversed.reverse();
        let mut rotated = statuses;
        rotated.rotate_left(2);

        let mut summaries = Vec::new();
        for order in [statuses, reversed, rotated] {
            let mut b = ReportBuilder::new(&scope());
            let h = b.add_section("s", "S");
            for (i, status) in order.iter().enumerate() {
                b.add_check_result(Some(h), CheckResult::new(*status, format!("r{i}"), ""))
                    .unwrap();
            }
            summaries.push(b.finalize().summary.counts);
        }
        assert!(summaries.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(summaries[0].passed, 2);
        assert_eq!(summaries[0].total, 5);
    }

    #[test]
    fn aggregate_raw_is_idempotent() {
        let input = lines(&["p1/a", "p1/a", "p2/b"]);
        let (once, _) = aggregate_raw(&input, '/');
        assert_eq!(once.get("p1").unwrap(), ["a".to_string()]);
        assert_eq!(once.get("p2").unwrap(), ["b".to_string()]);

        let (mut twice, _) = aggregate_raw(&input, '/');
        let (again, _) = aggregate_raw(&input, '/');
        twice.union(&again);
        assert_eq!(once, twice);
    }

    #[test]
    fn aggregate_raw_keeps_payload_after_first_delimiter() {
        let (agg, skipped) = aggregate_raw(&lines(&["p1/path/to/x", "nodelim", "/orphan"]), '/');
        assert_eq!(agg.get("p1").unwrap(), ["path/to/x".to_string()]);
        assert_eq!(skipped, lines(&["nodelim", "/orphan"]));
    }

    #[test]
    fn skipped_lines_become_notes() {
        let mut b = ReportBuilder::new(&scope());
        let agg = b.aggregate_raw(&lines(&["garbage", "p1/ok"]), '/');
        assert_eq!(agg.targets().collect::<Vec<_>>(), vec!["p1"]);
        b.add_section("s", "S");
        let report = b.finalize();
        assert_eq!(report.summary.notes.len(), 1);
        assert!(report.summary.notes[0].contains("garbage"));
    }

    #[test]
    fn finalize_scores_report_and_sections() {
        let mut b = ReportBuilder::new(&scope());
        let net = b.add_section("1.2", "Network");
        for _ in 0..6 {
            b.add_check_result(Some(net), CheckResult::pass("ok", "")).unwrap();
        }
        for _ in 0..2 {
            b.add_check_result(Some(net), CheckResult::fail("open", "").for_target("p1"))
                .unwrap();
        }
        for _ in 0..2 {
            b.add_check_result(Some(net), CheckResult::warn("meh", "")).unwrap();
        }
        let report = b.finalize();
        assert_eq!(report.summary.counts.total, 10);
        assert_eq!(report.summary.compliance_pct, 75);
        assert_eq!(
            report.summary.compliance_status,
            ComplianceStatus::PartiallyCompliant
        );
        assert_eq!(report.sections[0].compliance_pct, 75);
        assert_eq!(report.summary.critical_findings.len(), 2);
        assert_eq!(
            report.summary.critical_findings[0].target.as_deref(),
            Some("p1")
        );
    }
}
