//! Critical and sensitive path globs.

use crate::config::{PathRule, ResolvedConfig};
use crate::diff::ChangeSet;
use crate::models::{Category, Finding};

const ID: &str = "critical_paths";

pub(super) fn evaluate(changes: &ChangeSet, config: &ResolvedConfig) -> Vec<Finding> {
    let tiers: Vec<(&str, &PathRule)> = config
        .critical_paths
        .iter()
        .map(|rule| ("critical", rule))
        .chain(config.sensitive_paths.iter().map(|rule| ("sensitive", rule)))
        .collect();

    changes
        .files()
        .iter()
        .filter_map(|file| {
            // First matching glob wins; one finding per file at most.
            let (tier, rule) = tiers
                .iter()
                .find(|(_, rule)| rule.matcher.is_match(&file.path))?;
            if rule.points == 0 {
                return None;
            }
            let message = if rule.reason.is_empty() {
                format!("Changed file is on a {} path.", tier)
            } else {
                rule.reason.clone()
            };
            Some(Finding::file(
                ID,
                Category::Profile,
                rule.points,
                &file.path,
                message,
                format!("{} matches {} glob `{}`", file.path, tier, rule.glob),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ConfigLayer};
    use crate::diff::testing::DiffText;
    use std::path::Path;

    fn config(toml_content: &str) -> ResolvedConfig {
        let layer = ConfigLayer::parse(toml_content, Path::new("t.toml")).unwrap();
        resolve(ConfigLayer::defaults(), None, layer).unwrap()
    }

    #[test]
    fn test_overlapping_globs_count_once() {
        let config = config(
            r#"
[profile]
clear = ["critical"]
[profile.paths]
critical = [
  { glob = "src/billing/**", points = 20, reason = "money" },
  { glob = "src/**", points = 5, reason = "source" },
]
sensitive = [{ glob = "src/billing/*.py", points = 7, reason = "also" }]
"#,
        );
        let changes = DiffText::new()
            .modified("src/billing/charge.py", &["a"], &["b"])
            .modified("src/util.py", &["a"], &["b"])
            .modified("README.md", &["a"], &["b"])
            .parse();

        let findings = evaluate(&changes, &config);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].points, 20);
        assert_eq!(findings[0].message, "money");
        assert_eq!(findings[1].points, 5);
    }

    #[test]
    fn test_default_globs() {
        let config = ResolvedConfig::defaults().unwrap();
        let changes = DiffText::new()
            .modified("src/auth/session.rs", &["a"], &["b"])
            .modified("db/migrations/0001_init.sql", &["a"], &["b"])
            .modified("src/render.rs", &["a"], &["b"])
            .parse();
        let findings = evaluate(&changes, &config);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].points, 16);
        assert_eq!(findings[1].points, 13);
        assert_eq!(findings[0].category, Category::Profile);
    }
}
