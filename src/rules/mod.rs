//! Built-in rules.
//!
//! Each rule is a pure function of the change set and the resolved config.
//! Rules never see each other's findings; combining them is the
//! aggregator's job.

mod destructive;
mod docs_only;
mod heuristics;
mod magnitude;
mod manifests;
mod paths;
mod patterns;
mod test_signals;

use crate::config::ResolvedConfig;
use crate::diff::ChangeSet;
use crate::models::{Category, Finding};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

pub use docs_only::ID as DOCS_ONLY_ID;
pub use magnitude::curve;

/// Closed set of built-in rule kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Magnitude,
    CriticalPaths,
    DangerousPatterns,
    TestSignals,
    DependencyChanges,
    ConfigChanges,
    ErrorHandling,
    ApiSurface,
    DestructiveChanges,
    DocsOnly,
}

impl RuleKind {
    pub const ALL: [RuleKind; 10] = [
        RuleKind::Magnitude,
        RuleKind::CriticalPaths,
        RuleKind::DangerousPatterns,
        RuleKind::TestSignals,
        RuleKind::DependencyChanges,
        RuleKind::ConfigChanges,
        RuleKind::ErrorHandling,
        RuleKind::ApiSurface,
        RuleKind::DestructiveChanges,
        RuleKind::DocsOnly,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            RuleKind::Magnitude => "magnitude",
            RuleKind::CriticalPaths => "critical_paths",
            RuleKind::DangerousPatterns => "dangerous_patterns",
            RuleKind::TestSignals => "test_signals",
            RuleKind::DependencyChanges => "dependency_changes",
            RuleKind::ConfigChanges => "config_changes",
            RuleKind::ErrorHandling => "error_handling",
            RuleKind::ApiSurface => "api_surface",
            RuleKind::DestructiveChanges => "destructive_changes",
            RuleKind::DocsOnly => docs_only::ID,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            RuleKind::Magnitude | RuleKind::ErrorHandling | RuleKind::DestructiveChanges => {
                Category::Logic
            }
            RuleKind::CriticalPaths => Category::Profile,
            RuleKind::DangerousPatterns => Category::Security,
            RuleKind::TestSignals => Category::TestAdequacy,
            RuleKind::DependencyChanges | RuleKind::ConfigChanges | RuleKind::ApiSurface => {
                Category::Integration
            }
            RuleKind::DocsOnly => Category::Quality,
        }
    }

    /// Pack the rule belongs to. Packs are named after categories.
    pub fn pack(&self) -> Category {
        self.category()
    }

    pub fn evaluate(&self, changes: &ChangeSet, config: &ResolvedConfig) -> Vec<Finding> {
        match self {
            RuleKind::Magnitude => magnitude::evaluate(changes),
            RuleKind::CriticalPaths => paths::evaluate(changes, config),
            RuleKind::DangerousPatterns => patterns::evaluate(changes, config),
            RuleKind::TestSignals => test_signals::evaluate(changes, config),
            RuleKind::DependencyChanges => manifests::dependency_changes(changes),
            RuleKind::ConfigChanges => manifests::config_changes(changes),
            RuleKind::ErrorHandling => heuristics::error_handling(changes, config),
            RuleKind::ApiSurface => heuristics::api_surface(changes, config),
            RuleKind::DestructiveChanges => destructive::evaluate(changes, config),
            RuleKind::DocsOnly => docs_only::evaluate(changes, config),
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RuleKind::ALL
            .into_iter()
            .find(|kind| kind.id() == s.trim())
            .ok_or_else(|| format!("unknown rule id `{}`", s))
    }
}

/// Rules that run for this config: the explicit enable list if present,
/// otherwise every rule of an active pack; then minus the disable list.
pub fn active_rules(config: &ResolvedConfig) -> Vec<RuleKind> {
    let selected: Vec<RuleKind> = match &config.rule_enable {
        Some(enabled) => enabled.clone(),
        None => RuleKind::ALL
            .into_iter()
            .filter(|kind| config.pack_active(kind.pack()))
            .collect(),
    };
    selected
        .into_iter()
        .filter(|kind| !config.rule_disable.contains(kind))
        .collect()
}

/// Evaluate every active rule.
pub fn evaluate(changes: &ChangeSet, config: &ResolvedConfig) -> Vec<Finding> {
    let mut findings = Vec::new();
    for kind in active_rules(config) {
        let produced = kind.evaluate(changes, config);
        debug!("Rule {} produced {} findings", kind, produced.len());
        findings.extend(produced);
    }
    findings
}

/// Lowercased final path component.
fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Lowercased extension without the dot.
fn extension(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ConfigLayer, SourcedLayer};
    use crate::diff::testing::DiffText;
    use std::collections::BTreeSet;

    fn config_from(toml_content: &str) -> ResolvedConfig {
        let layer = ConfigLayer::parse(toml_content, Path::new("test.toml")).unwrap();
        resolve(ConfigLayer::defaults(), None, layer).unwrap()
    }

    fn file_config(toml_content: &str) -> ResolvedConfig {
        let file = SourcedLayer {
            source: "test.toml".to_string(),
            layer: ConfigLayer::parse(toml_content, Path::new("test.toml")).unwrap(),
        };
        resolve(ConfigLayer::defaults(), Some(file), ConfigLayer::default()).unwrap()
    }

    #[test]
    fn test_rule_ids_round_trip() {
        for kind in RuleKind::ALL {
            assert_eq!(kind.id().parse::<RuleKind>(), Ok(kind));
        }
        assert!("profile_signals".parse::<RuleKind>().is_err());
    }

    #[test]
    fn test_active_rules_follow_packs_and_lists() {
        let all = active_rules(&ResolvedConfig::defaults().unwrap());
        assert_eq!(all.len(), RuleKind::ALL.len());

        let strict = active_rules(&config_from("[objective]\nname = \"security_strict\"\n"));
        assert!(!strict.contains(&RuleKind::DocsOnly));
        assert!(strict.contains(&RuleKind::DangerousPatterns));

        // A file layer may name a rule in both lists; disable wins.
        let explicit = active_rules(&file_config(
            "[rules]\nenable = [\"docs_only\", \"magnitude\"]\ndisable = [\"magnitude\"]\n\
             [objective]\nname = \"security_strict\"\n",
        ));
        assert_eq!(explicit, vec![RuleKind::DocsOnly]);

        let narrowed = active_rules(&config_from(
            "[rules]\nenable = [\"docs_only\", \"magnitude\"]\n",
        ));
        assert_eq!(narrowed, vec![RuleKind::DocsOnly, RuleKind::Magnitude]);
    }

    #[test]
    fn test_findings_have_unique_keys() {
        let changes = DiffText::new()
            .modified(
                "src/auth/session.py",
                &["    raise PermissionError()", "def login(user):"],
                &["def login(user, token):", "    eval(payload)", "    eval(other)"],
            )
            .added("package.json", &["{}"])
            .added("config/app.yml", &["debug=true"])
            .deleted("src/legacy.py", &["x = 1"])
            .parse();
        let config = ResolvedConfig::defaults().unwrap();
        let findings = evaluate(&changes, &config);
        assert!(!findings.is_empty());

        let keys: BTreeSet<_> = findings.iter().map(|f| f.key()).collect();
        assert_eq!(keys.len(), findings.len());
    }

    #[test]
    fn test_minimal_config_never_errors() {
        let config = config_from("");
        let changes = DiffText::new().modified("a.txt", &["a"], &["b"]).parse();
        let _ = evaluate(&changes, &config);
    }

    #[test]
    fn test_file_name_helpers() {
        assert_eq!(file_name("web/Package.JSON"), "package.json");
        assert_eq!(extension("src/Main.RS"), "rs");
        assert_eq!(extension("Makefile"), "");
    }
}
