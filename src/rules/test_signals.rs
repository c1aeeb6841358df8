//! Missing and removed tests.

use crate::config::ResolvedConfig;
use crate::diff::{ChangeKind, ChangeSet};
use crate::models::{Category, Finding};

const ID: &str = "test_signals";
const MISSING_TEST_POINTS: u32 = 10;
const DELETED_TEST_POINTS: u32 = 12;

pub(super) fn evaluate(changes: &ChangeSet, config: &ResolvedConfig) -> Vec<Finding> {
    let mut findings = Vec::new();

    // A deleted test does not count as a test change.
    let tests_changed = changes
        .files()
        .iter()
        .any(|f| f.kind != ChangeKind::Deleted && config.is_test_path(&f.path));

    if !tests_changed && !config.required_for.is_empty() {
        for file in changes.files() {
            if file.kind == ChangeKind::Deleted
                || config.is_test_path(&file.path)
                || !config.required_for.is_match(&file.path)
            {
                continue;
            }
            findings.push(Finding::file(
                ID,
                Category::TestAdequacy,
                MISSING_TEST_POINTS,
                &file.path,
                "Code changed without corresponding test changes.",
                format!("{} changed; no file matching the test globs changed", file.path),
            ));
        }
    }

    for file in changes.files() {
        if file.kind == ChangeKind::Deleted && config.is_test_path(&file.path) {
            findings.push(Finding::file(
                ID,
                Category::TestAdequacy,
                DELETED_TEST_POINTS,
                &file.path,
                "Test file removed.",
                format!("deleted test file {}", file.path),
            ));
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::testing::DiffText;

    #[test]
    fn test_each_offending_file_is_penalized() {
        let config = ResolvedConfig::defaults().unwrap();
        let changes = DiffText::new()
            .modified("src/a.rs", &["a"], &["b"])
            .modified("src/b.py", &["a"], &["b"])
            .modified("README.md", &["a"], &["b"])
            .parse();
        let findings = evaluate(&changes, &config);
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.points == MISSING_TEST_POINTS));
    }

    #[test]
    fn test_any_test_change_satisfies_requirement() {
        let config = ResolvedConfig::defaults().unwrap();
        let changes = DiffText::new()
            .modified("src/a.rs", &["a"], &["b"])
            .modified("tests/a_flow.rs", &["a"], &["b"])
            .parse();
        assert!(evaluate(&changes, &config).is_empty());
    }

    #[test]
    fn test_deleted_test_is_penalized_and_does_not_satisfy() {
        let config = ResolvedConfig::defaults().unwrap();
        let changes = DiffText::new()
            .modified("src/a.rs", &["a"], &["b"])
            .deleted("tests/test_a.py", &["def test_a(): pass"])
            .parse();
        let findings = evaluate(&changes, &config);
        let points: Vec<u32> = findings.iter().map(|f| f.points).collect();
        assert_eq!(points, vec![MISSING_TEST_POINTS, DELETED_TEST_POINTS]);
        assert_eq!(findings[1].scope.as_str(), "tests/test_a.py");
    }
}
