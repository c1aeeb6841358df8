//! Data models for the risk scorer.
//!
//! This module contains the core data structures shared by rules, plugins,
//! the aggregator and the report renderers.

use crate::error::ExitClass;
use crate::plugins::ScheduleDecision;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Category of a finding. Categories double as rule packs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Behavioral risk: size, guard removal, destructive edits
    Logic,
    /// Cross-component risk: dependencies, config, public API
    Integration,
    /// Missing or removed tests
    TestAdequacy,
    /// Unsafe code patterns and exposure
    Security,
    /// Diagnostics and low-signal hygiene
    Quality,
    /// Repository-specific path signals
    Profile,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Logic,
        Category::Integration,
        Category::TestAdequacy,
        Category::Security,
        Category::Quality,
        Category::Profile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Logic => "logic",
            Category::Integration => "integration",
            Category::TestAdequacy => "test_adequacy",
            Category::Security => "security",
            Category::Quality => "quality",
            Category::Profile => "profile",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| format!("unknown category `{}`", s))
    }
}

/// Where a finding applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    File(String),
}

impl Scope {
    pub fn as_str(&self) -> &str {
        match self {
            Scope::Global => "global",
            Scope::File(path) => path,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            Scope::Global => None,
            Scope::File(path) => Some(path),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Scope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A single rule- or plugin-attributed risk contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    /// Id of the rule or plugin that produced the finding.
    pub rule_id: String,
    pub category: Category,
    /// Non-negative magnitude; the category weight scales it.
    pub points: u32,
    pub scope: Scope,
    /// Short human-readable reason.
    pub message: String,
    /// Short snippet tying the finding to the diff.
    pub evidence: String,
}

impl Finding {
    pub fn file(
        rule_id: &str,
        category: Category,
        points: u32,
        path: &str,
        message: impl Into<String>,
        evidence: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            category,
            points,
            scope: Scope::File(path.to_string()),
            message: message.into(),
            evidence: evidence.into(),
        }
    }

    pub fn global(
        rule_id: &str,
        category: Category,
        points: u32,
        message: impl Into<String>,
        evidence: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            category,
            points,
            scope: Scope::Global,
            message: message.into(),
            evidence: evidence.into(),
        }
    }

    /// Identity of a finding within one run.
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.rule_id, self.scope.as_str(), &self.evidence)
    }
}

/// Clip a diff line to a short single-line evidence snippet.
pub fn clip_evidence(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let kept: String = trimmed.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// A finding with its objective weight applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredFinding {
    #[serde(flatten)]
    pub finding: Finding,
    pub weight: f64,
    pub weighted_points: f64,
}

/// Per-category totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub category: Category,
    pub findings: usize,
    pub points: u64,
    pub weighted_points: f64,
}

/// The complete scoring result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreReport {
    /// Final 0-100 risk score.
    pub score: u8,
    /// Sum of weighted points before the 0-100 transform.
    pub weighted_total: f64,
    /// Objective profile used for weighting.
    pub objective: String,
    /// Fail threshold, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u8>,
    pub passed: bool,
    /// True when a docs-only override capped the score.
    pub docs_floor_applied: bool,
    pub findings: Vec<ScoredFinding>,
    pub summary: Vec<CategorySummary>,
    pub plugins: Vec<ScheduleDecision>,
}

impl ScoreReport {
    pub fn exit_class(&self) -> ExitClass {
        if self.passed {
            ExitClass::Success
        } else {
            ExitClass::ThresholdExceeded
        }
    }

    /// Findings that actually moved the score.
    pub fn contributing(&self) -> impl Iterator<Item = &ScoredFinding> {
        self.findings.iter().filter(|f| f.weighted_points > 0.0)
    }

    /// Short label used in summaries.
    pub fn level(&self) -> &'static str {
        match self.score {
            75..=100 => "HIGH",
            40..=74 => "MEDIUM",
            _ => "LOW",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_str() {
        assert_eq!("security".parse::<Category>(), Ok(Category::Security));
        assert_eq!("Test-Adequacy".parse::<Category>(), Ok(Category::TestAdequacy));
        assert!("style".parse::<Category>().is_err());
    }

    #[test]
    fn test_scope_serializes_as_plain_string() {
        let finding = Finding::file("r", Category::Logic, 3, "src/a.rs", "m", "e");
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["scope"], "src/a.rs");
        assert_eq!(json["category"], "logic");

        let global = Finding::global("r", Category::Logic, 3, "m", "e");
        assert_eq!(global.key(), ("r", "global", "e"));
    }

    #[test]
    fn test_clip_evidence() {
        assert_eq!(clip_evidence("  short  ", 10), "short");
        let long = "x".repeat(100);
        let clipped = clip_evidence(&long, 20);
        assert_eq!(clipped.chars().count(), 20);
        assert!(clipped.ends_with("..."));
    }
}
