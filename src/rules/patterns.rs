//! Risky patterns on added lines.

use crate::config::ResolvedConfig;
use crate::diff::{ChangeSet, LineKind};
use crate::models::{clip_evidence, Category, Finding};
use std::collections::BTreeSet;

const ID: &str = "dangerous_patterns";

pub(super) fn evaluate(changes: &ChangeSet, config: &ResolvedConfig) -> Vec<Finding> {
    let mut findings = Vec::new();

    for file in changes.files() {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for line in file.lines_of(LineKind::Added) {
            for rule in &config.unsafe_patterns {
                let source = rule.regex.as_str();
                if seen.contains(source) || !rule.regex.is_match(&line.text) {
                    continue;
                }
                seen.insert(source);
                let message = if rule.reason.is_empty() {
                    "Risky pattern added.".to_string()
                } else {
                    rule.reason.clone()
                };
                findings.push(Finding::file(
                    ID,
                    Category::Security,
                    rule.points,
                    &file.path,
                    message,
                    format!(
                        "line {}: `{}` matches /{}/",
                        line.line_number,
                        clip_evidence(&line.text, 80),
                        source
                    ),
                ));
            }
        }
    }

    findings
}
