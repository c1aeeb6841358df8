//! Markdown and JSON report generation.
//!
//! This module renders a [`ScoreReport`] for humans (Markdown) and for
//! machines (JSON). Both renderings are pure functions of the report, so a
//! repeated run over the same input produces byte-identical output.

use crate::models::{CategorySummary, ScoreReport, ScoredFinding};
use crate::plugins::ScheduleDecision;
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &ScoreReport) -> String {
    let mut output = String::new();

    output.push_str("# Diff Risk Report\n\n");
    output.push_str(&generate_summary_section(report));
    output.push_str(&generate_category_section(&report.summary));
    output.push_str(&generate_findings_section(&report.findings));
    output.push_str(&generate_plugins_section(&report.plugins));

    output
}

/// Generate the summary section.
fn generate_summary_section(report: &ScoreReport) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str(&format!(
        "- **Risk score:** {}/100 ({})\n",
        report.score,
        report.level()
    ));
    section.push_str(&format!(
        "- **Weighted total:** {:.2}\n",
        report.weighted_total
    ));
    section.push_str(&format!("- **Objective:** `{}`\n", report.objective));
    match report.threshold {
        Some(threshold) => section.push_str(&format!(
            "- **Threshold:** fail above {} -> {}\n",
            threshold,
            if report.passed { "PASS" } else { "FAIL" }
        )),
        None => section.push_str("- **Threshold:** none\n"),
    }
    if report.docs_floor_applied {
        section.push_str("- **Note:** documentation-only change, score capped\n");
    }
    section.push('\n');

    section
}

/// Generate the per-category breakdown.
fn generate_category_section(summary: &[CategorySummary]) -> String {
    if summary.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Categories\n\n");
    section.push_str("| Category | Findings | Points | Weighted |\n");
    section.push_str("|:---|:---:|:---:|:---:|\n");
    for row in summary {
        section.push_str(&format!(
            "| {} | {} | {} | {:.2} |\n",
            row.category, row.findings, row.points, row.weighted_points
        ));
    }
    section.push('\n');

    section
}

/// Generate the ranked findings section.
fn generate_findings_section(findings: &[ScoredFinding]) -> String {
    let mut section = String::new();

    section.push_str("## Findings\n\n");

    if findings.is_empty() {
        section.push_str("No risk signals were found in this diff.\n\n");
        return section;
    }

    for scored in findings {
        section.push_str(&generate_finding_block(scored));
    }

    section
}

/// Generate a single finding block.
fn generate_finding_block(scored: &ScoredFinding) -> String {
    let mut block = String::new();
    let finding = &scored.finding;

    block.push_str(&format!(
        "### `{}` +{} ({}, weighted {:.2})\n\n",
        finding.rule_id, finding.points, finding.category, scored.weighted_points
    ));
    block.push_str(&format!("**Scope:** `{}`\n\n", finding.scope.as_str()));
    if !finding.message.is_empty() {
        block.push_str(&format!("{}\n\n", finding.message));
    }
    if !finding.evidence.is_empty() {
        block.push_str(&format!("> {}\n\n", finding.evidence));
    }

    block
}

/// Generate the plugin schedule table.
fn generate_plugins_section(plugins: &[ScheduleDecision]) -> String {
    if plugins.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Plugins\n\n");
    section.push_str("| Plugin | Tier | Estimate | Decision |\n");
    section.push_str("|:---|:---:|:---:|:---|\n");
    for decision in plugins {
        let verdict = match (decision.run, decision.reason, decision.would_skip) {
            (true, _, Some(would)) => format!("run (forced; would skip: {})", would),
            (true, _, None) if decision.forced => "run (forced)".to_string(),
            (true, _, None) => "run".to_string(),
            (false, Some(reason), _) => format!("skip: {}", reason),
            (false, None, _) => "skip".to_string(),
        };
        section.push_str(&format!(
            "| `{}` | {} | {} ms | {} |\n",
            decision.plugin_id, decision.tier, decision.estimated_ms, verdict
        ));
    }
    section.push('\n');

    section
}

/// Generate a JSON report.
pub fn generate_json_report(report: &ScoreReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{aggregate, AggregateOptions, ObjectiveName, ObjectiveProfile};
    use crate::models::{Category, Finding};
    use crate::plugins::{CostTier, SkipReason};

    fn create_test_report() -> ScoreReport {
        let findings = vec![
            Finding::file(
                "dangerous_patterns",
                Category::Security,
                12,
                "src/auth.py",
                "Dangerous pattern added.",
                "line 2: `eval(data)` matches /\\beval\\(/",
            ),
            Finding::global("magnitude", Category::Quality, 3, "Change size.", "40 lines"),
        ];
        let plugins = vec![
            ScheduleDecision {
                plugin_id: "deferred_work_markers",
                tier: CostTier::Cheap,
                estimated_ms: 1_000,
                run: true,
                reason: None,
                forced: false,
                would_skip: None,
            },
            ScheduleDecision {
                plugin_id: "network_exposure_probe",
                tier: CostTier::Moderate,
                estimated_ms: 3_000,
                run: false,
                reason: Some(SkipReason::DisabledByMode),
                forced: false,
                would_skip: None,
            },
        ];
        aggregate(
            findings,
            &ObjectiveProfile::for_name(ObjectiveName::SecurityStrict),
            AggregateOptions {
                threshold: Some(40),
                docs_floor: 2,
            },
            plugins,
        )
    }

    #[test]
    fn test_generate_markdown_report() {
        let markdown = generate_markdown_report(&create_test_report());

        assert!(markdown.contains("# Diff Risk Report"));
        assert!(markdown.contains("## Summary"));
        assert!(markdown.contains("`security_strict`"));
        assert!(markdown.contains("## Categories"));
        assert!(markdown.contains("### `dangerous_patterns` +12 (security, weighted 19.20)"));
        assert!(markdown
            .contains("| `network_exposure_probe` | moderate | 3000 ms | skip: disabled by mode |"));
    }

    #[test]
    fn test_empty_report_has_no_optional_sections() {
        let report = aggregate(
            Vec::new(),
            &ObjectiveProfile::for_name(ObjectiveName::FeatureOneshot),
            AggregateOptions::default(),
            Vec::new(),
        );
        let markdown = generate_markdown_report(&report);
        assert!(markdown.contains("No risk signals"));
        assert!(markdown.contains("- **Threshold:** none"));
        assert!(!markdown.contains("## Plugins"));
        assert!(!markdown.contains("## Categories"));
    }

    #[test]
    fn test_generate_json_report() {
        let report = create_test_report();
        let json = generate_json_report(&report).unwrap();
        assert_eq!(json, generate_json_report(&report).unwrap());

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["findings"][0]["rule_id"], "dangerous_patterns");
        assert_eq!(value["findings"][0]["scope"], "src/auth.py");
        assert_eq!(value["findings"][0]["weight"], 1.6);
        assert_eq!(value["plugins"][1]["reason"], "disabled by mode");
        // 12 * 1.6 + 3 * 0.8 = 21.6 -> 45, above the threshold of 40
        assert_eq!(value["score"], 45);
        assert_eq!(value["passed"], false);
    }
}
