//! Finding aggregation and the 0-100 score.
//!
//! This module weights findings by the active objective profile, ranks them,
//! computes per-category summaries and maps the weighted total onto the
//! final score.

use super::objective::ObjectiveProfile;
use crate::models::{Category, CategorySummary, Finding, ScoreReport, ScoredFinding};
use crate::plugins::ScheduleDecision;
use crate::rules::{curve, DOCS_ONLY_ID};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

/// Weighted total at which the score reaches ~63.
const SCORE_SCALE: f64 = 36.0;

/// Knobs that come from configuration rather than the profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateOptions {
    /// Fail when the score is above this value.
    pub threshold: Option<u8>,
    /// Score ceiling for documentation-only changes.
    pub docs_floor: u8,
}

/// Map a weighted total onto 0-100. Strictly increasing before rounding.
pub fn transform(weighted_total: f64) -> u8 {
    if !weighted_total.is_finite() || weighted_total <= 0.0 {
        return 0;
    }
    curve(100.0, weighted_total, SCORE_SCALE).round().clamp(0.0, 100.0) as u8
}

/// Rank order: weighted points desc, then rule id, scope and evidence asc.
pub fn rank(a: &ScoredFinding, b: &ScoredFinding) -> Ordering {
    b.weighted_points
        .total_cmp(&a.weighted_points)
        .then_with(|| a.finding.rule_id.cmp(&b.finding.rule_id))
        .then_with(|| a.finding.scope.as_str().cmp(b.finding.scope.as_str()))
        .then_with(|| a.finding.evidence.cmp(&b.finding.evidence))
}

/// Build the score report.
pub fn aggregate(
    findings: Vec<Finding>,
    profile: &ObjectiveProfile,
    options: AggregateOptions,
    plugins: Vec<ScheduleDecision>,
) -> ScoreReport {
    let docs_only = findings.iter().any(|f| f.rule_id == DOCS_ONLY_ID);

    let mut scored: Vec<ScoredFinding> = findings
        .into_iter()
        .map(|finding| {
            let weight = profile.weight(finding.category);
            ScoredFinding {
                weighted_points: finding.points as f64 * weight,
                weight,
                finding,
            }
        })
        .collect();
    scored.sort_by(rank);

    let weighted_total: f64 = scored.iter().map(|f| f.weighted_points).sum();
    let raw_score = transform(weighted_total);
    let score = if docs_only {
        raw_score.min(options.docs_floor)
    } else {
        raw_score
    };
    let passed = options.threshold.map_or(true, |t| score <= t);

    debug!(
        "Aggregated {} findings: weighted total {:.2}, score {}{}",
        scored.len(),
        weighted_total,
        score,
        if docs_only { " (docs floor)" } else { "" }
    );

    ScoreReport {
        score,
        weighted_total,
        objective: profile.name.to_string(),
        threshold: options.threshold,
        passed,
        docs_floor_applied: docs_only && score < raw_score,
        summary: summarize(&scored),
        findings: scored,
        plugins,
    }
}

/// Per-category counts and subtotals, in category order. Empty categories are left out.
pub fn summarize(findings: &[ScoredFinding]) -> Vec<CategorySummary> {
    let mut by_category: BTreeMap<Category, CategorySummary> = BTreeMap::new();
    for scored in findings {
        let entry = by_category
            .entry(scored.finding.category)
            .or_insert_with(|| CategorySummary {
                category: scored.finding.category,
                findings: 0,
                points: 0,
                weighted_points: 0.0,
            });
        entry.findings += 1;
        entry.points += u64::from(scored.finding.points);
        entry.weighted_points += scored.weighted_points;
    }
    by_category.into_values().collect()
}
