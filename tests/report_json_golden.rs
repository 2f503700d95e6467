use cloudassess::core::{
    CheckResult, ComplianceStatus, CriticalFinding, PermissionRequirement, PermissionSummary,
    Report, ReportSummary, ScopeKind, ScopeSummary, Section, StatusCounts,
};

#[test]
fn report_json_matches_golden() {
    let results = vec![
        CheckResult::fail(
            "No firewall rule allows ingress from 0.0.0.0/0",
            "firewall rule allow-ssh on network prod allows tcp:22 from 0.0.0.0/0",
        )
        .with_recommendation("Restrict sourceRanges to known networks, or disable the rule.")
        .for_target("pay-prod"),
        CheckResult::pass(
            "No firewall rule allows ingress from 0.0.0.0/0",
            "no non-compliant resources found in pay-dev",
        )
        .for_target("pay-dev"),
    ];
    let counts = StatusCounts::from_statuses(results.iter().map(|r| r.status));

    let report = Report {
        schema_version: "1.0".to_string(),
        tool_version: "0.1.0".to_string(),
        generated_at: "2026-01-01T00:00:00Z".to_string(),
        scope: ScopeSummary {
            kind: ScopeKind::Organization,
            requested_id: "123456789".to_string(),
            targets: vec!["pay-prod".to_string(), "pay-dev".to_string()],
        },
        permissions: Some(PermissionSummary {
            total: 1,
            available: 1,
            coverage_pct: 100,
            degraded: false,
            missing: vec![],
        }),
        summary: ReportSummary {
            counts,
            compliance_pct: 50,
            compliance_status: ComplianceStatus::NonCompliant,
            critical_findings: vec![CriticalFinding {
                section_id: "1.3".to_string(),
                title: "No firewall rule allows ingress from 0.0.0.0/0".to_string(),
                target: Some("pay-prod".to_string()),
            }],
            notes: vec!["assessed 2 projects in organization 123456789".to_string()],
        },
        sections: vec![Section {
            id: "1.3".to_string(),
            title: "Network access to and from the cardholder data environment is restricted"
                .to_string(),
            counts,
            compliance_pct: 50,
            results,
        }],
    };

    let actual = serde_json::to_value(&report).expect("serialize report");
    let expected: serde_json::Value =
        serde_json::from_str(include_str!("golden/report.json")).expect("parse golden json");

    assert_eq!(actual, expected);
}

#[test]
fn missing_permissions_serialize_with_requirement_ids() {
    let summary = PermissionSummary {
        total: 2,
        available: 1,
        coverage_pct: 50,
        degraded: true,
        missing: vec![PermissionRequirement {
            requirement_id: "1.4.2-sql-open-network".to_string(),
            permission: "cloudsql.instances.list".to_string(),
            available: false,
        }],
    };
    let v = serde_json::to_value(&summary).expect("serialize");
    assert_eq!(v["degraded"], true);
    assert_eq!(v["missing"][0]["permission"], "cloudsql.instances.list");
    assert_eq!(v["missing"][0]["requirement_id"], "1.4.2-sql-open-network");
}
