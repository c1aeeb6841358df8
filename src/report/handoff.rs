//! Handoff payload for an external reviewer.
//!
//! The payload bundles the score summary, the ranked findings and a selected
//! slice of the diff. Everything outbound passes through the redaction and
//! byte-budget filter first.

use super::redact::{self, FilterOptions, RedactionWarning, EVIDENCE_WITHHELD};
use crate::config::{DiffSelection, ResolvedConfig};
use crate::diff::ChangeSet;
use crate::models::{Category, ScoreReport};
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

/// Files shown when `risky-only` finds no file-scoped findings.
const FALLBACK_FILES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandoffSummary {
    pub score: u8,
    pub level: &'static str,
    pub target_score: u8,
    pub meets_target: bool,
    pub objective: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u8>,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandoffFinding {
    pub rule_id: String,
    pub category: Category,
    pub points: u32,
    pub weighted_points: f64,
    pub scope: String,
    pub message: String,
    pub evidence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandoffPayload {
    pub summary: HandoffSummary,
    pub findings: Vec<HandoffFinding>,
    pub include_diff: DiffSelection,
    pub diff: String,
    pub diff_truncated: bool,
    pub max_bytes: usize,
    pub redacted: bool,
    pub warnings: Vec<RedactionWarning>,
}

impl HandoffPayload {
    pub fn build(report: &ScoreReport, changes: &ChangeSet, config: &ResolvedConfig) -> Self {
        let settings = &config.handoff;
        let mut warnings = Vec::new();

        let findings = report
            .findings
            .iter()
            .map(|scored| {
                let f = &scored.finding;
                let evidence = if settings.redact_secrets {
                    redact::redact_evidence(&f.evidence).unwrap_or_else(|| {
                        warnings.push(RedactionWarning::EvidenceWithheld {
                            rule_id: f.rule_id.clone(),
                        });
                        EVIDENCE_WITHHELD.to_string()
                    })
                } else {
                    f.evidence.clone()
                };
                HandoffFinding {
                    rule_id: f.rule_id.clone(),
                    category: f.category,
                    points: f.points,
                    weighted_points: scored.weighted_points,
                    scope: f.scope.as_str().to_string(),
                    message: f.message.clone(),
                    evidence,
                }
            })
            .collect();

        let selected = select_diff(report, changes, settings.include_diff);
        let filtered = redact::filter(
            &selected,
            FilterOptions {
                max_bytes: settings.max_bytes,
                redact_secrets: settings.redact_secrets,
            },
        );
        warnings.extend(filtered.warnings);
        debug!(
            "Handoff diff: {} of {} bytes{}",
            filtered.text.len(),
            selected.len(),
            if filtered.truncated { " (truncated)" } else { "" }
        );

        Self {
            summary: HandoffSummary {
                score: report.score,
                level: report.level(),
                target_score: settings.target_score,
                meets_target: report.score <= settings.target_score,
                objective: report.objective.clone(),
                threshold: report.threshold,
                passed: report.passed,
            },
            findings,
            include_diff: settings.include_diff,
            diff: filtered.text,
            diff_truncated: filtered.truncated,
            max_bytes: settings.max_bytes,
            redacted: settings.redact_secrets,
            warnings,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        let s = &self.summary;

        output.push_str("# Diff Risk Handoff\n\n");
        output.push_str("## Summary\n\n");
        output.push_str(&format!("- **Risk score:** {}/100 ({})\n", s.score, s.level));
        output.push_str(&format!("- **Target score:** {}/100\n", s.target_score));
        output.push_str(&format!("- **Objective:** `{}`\n", s.objective));
        if let Some(threshold) = s.threshold {
            output.push_str(&format!(
                "- **Threshold:** fail above {} ({})\n",
                threshold,
                if s.passed { "passed" } else { "failed" }
            ));
        }
        output.push('\n');

        output.push_str("## Findings\n\n");
        if self.findings.is_empty() {
            output.push_str("- No findings.\n");
        }
        for f in &self.findings {
            output.push_str(&format!(
                "- `{}` ({}, {} pts, weighted {:.2}) {}\n",
                f.rule_id, f.category, f.points, f.weighted_points, f.message
            ));
            output.push_str(&format!("  - scope: `{}`\n", f.scope));
            output.push_str(&format!("  - evidence: {}\n", f.evidence));
        }
        output.push('\n');

        if self.include_diff != DiffSelection::None {
            output.push_str("## Diff\n\n```diff\n");
            if self.diff.is_empty() {
                output.push_str("# (no diff selected)\n");
            } else {
                output.push_str(&self.diff);
                if !self.diff.ends_with('\n') {
                    output.push('\n');
                }
            }
            output.push_str("```\n\n");
            if self.diff_truncated {
                output.push_str(&format!(
                    "_Diff was truncated to {} bytes._\n\n",
                    self.max_bytes
                ));
            }
        }

        if !self.warnings.is_empty() {
            output.push_str("## Redaction Warnings\n\n");
            for warning in &self.warnings {
                output.push_str(&format!("- {}\n", warning));
            }
            output.push('\n');
        }

        output.push_str("## Instructions\n\n");
        output.push_str(&format!(
            "Revise the patch to bring the risk score to {} or below. Add tests for the \
             flagged paths, keep changes minimal, and explain what you changed.\n",
            s.target_score
        ));

        output
    }
}

/// Diff text for the configured selection.
fn select_diff(report: &ScoreReport, changes: &ChangeSet, selection: DiffSelection) -> String {
    match selection {
        DiffSelection::Full => changes.render(None),
        DiffSelection::None => String::new(),
        DiffSelection::RiskyOnly => {
            let mut risky: BTreeSet<String> = report
                .contributing()
                .filter_map(|f| f.finding.scope.path())
                .map(str::to_string)
                .collect();
            if risky.is_empty() {
                let mut largest: Vec<_> = changes.files().iter().collect();
                largest.sort_by(|a, b| {
                    b.changed_count()
                        .cmp(&a.changed_count())
                        .then_with(|| a.path.cmp(&b.path))
                });
                risky = largest
                    .into_iter()
                    .take(FALLBACK_FILES)
                    .map(|f| f.path.clone())
                    .collect();
            }
            changes.render(Some(&risky))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{aggregate, AggregateOptions, ObjectiveName, ObjectiveProfile};
    use crate::diff::testing::DiffText;
    use crate::models::Finding;

    fn report(findings: Vec<Finding>) -> ScoreReport {
        aggregate(
            findings,
            &ObjectiveProfile::for_name(ObjectiveName::FeatureOneshot),
            AggregateOptions {
                threshold: Some(40),
                docs_floor: 2,
            },
            Vec::new(),
        )
    }

    fn config(selection: DiffSelection, redact_secrets: bool) -> ResolvedConfig {
        let mut config = ResolvedConfig::defaults().unwrap();
        config.handoff.include_diff = selection;
        config.handoff.redact_secrets = redact_secrets;
        config
    }

    fn changes() -> ChangeSet {
        DiffText::new()
            .modified("src/auth.py", &["check()"], &["eval(data)"])
            .modified("src/util.py", &["a"], &["b"])
            .parse()
    }

    #[test]
    fn test_risky_only_selects_flagged_files() {
        let report = report(vec![
            Finding::file("dangerous_patterns", Category::Security, 12, "src/auth.py", "m", "e"),
            Finding::global("magnitude", Category::Quality, 2, "m", "lines"),
        ]);
        let payload =
            HandoffPayload::build(&report, &changes(), &config(DiffSelection::RiskyOnly, false));
        assert!(payload.diff.contains("src/auth.py"));
        assert!(!payload.diff.contains("src/util.py"));

        let payload =
            HandoffPayload::build(&report, &changes(), &config(DiffSelection::Full, false));
        assert!(payload.diff.contains("src/util.py"));

        let payload =
            HandoffPayload::build(&report, &changes(), &config(DiffSelection::None, false));
        assert!(payload.diff.is_empty());
        assert!(!payload.to_markdown().contains("## Diff"));
    }

    #[test]
    fn test_evidence_withheld_when_unmaskable() {
        let report = report(vec![Finding::file(
            "dangerous_patterns",
            Category::Security,
            12,
            "src/auth.py",
            "m",
            "line 2: `key = AKIA1234`",
        )]);
        let payload =
            HandoffPayload::build(&report, &changes(), &config(DiffSelection::Full, true));
        assert_eq!(payload.findings[0].evidence, EVIDENCE_WITHHELD);
        assert!(payload.warnings.contains(&RedactionWarning::EvidenceWithheld {
            rule_id: "dangerous_patterns".to_string()
        }));
    }

    #[test]
    fn test_summary_and_rendering() {
        let report = report(vec![Finding::global(
            "magnitude",
            Category::Quality,
            2,
            "Small change.",
            "2 lines",
        )]);
        let payload =
            HandoffPayload::build(&report, &changes(), &config(DiffSelection::Full, false));
        assert_eq!(payload.summary.target_score, 30);
        assert!(payload.summary.meets_target);

        let markdown = payload.to_markdown();
        assert!(markdown.starts_with("# Diff Risk Handoff"));
        assert!(markdown.contains("`magnitude`"));
        assert!(markdown.contains("```diff\ndiff --git a/src/auth.py b/src/auth.py"));

        let json: serde_json::Value = serde_json::from_str(&payload.to_json().unwrap()).unwrap();
        assert_eq!(json["summary"]["target_score"], 30);
        assert_eq!(json["include_diff"], "full");
        assert_eq!(json["findings"][0]["scope"], "global");
    }
}
