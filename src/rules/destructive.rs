//! File removals and deletion-heavy edits.

use crate::config::ResolvedConfig;
use crate::diff::{ChangeKind, ChangeSet};
use crate::models::{Category, Finding};

const ID: &str = "destructive_changes";
const HEAVY_MIN_REMOVED: usize = 20;

pub(super) fn evaluate(changes: &ChangeSet, config: &ResolvedConfig) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut deleted_files = 0;

    for file in changes.files() {
        if file.kind == ChangeKind::Deleted {
            if config.is_docs_path(&file.path) || config.is_test_path(&file.path) {
                continue;
            }
            deleted_files += 1;
            findings.push(Finding::file(
                ID,
                Category::Logic,
                9,
                &file.path,
                "File deletion detected.",
                format!("deleted file {}", file.path),
            ));
            continue;
        }

        let added = file.added_count();
        let removed = file.removed_count();
        if removed >= HEAVY_MIN_REMOVED && removed >= 2 * added {
            let ratio = removed as f64 / (added + removed) as f64;
            findings.push(Finding::file(
                ID,
                Category::Logic,
                (10.0 * ratio).round() as u32,
                &file.path,
                "Deletion-heavy change.",
                format!("{} removed lines vs {} added", removed, added),
            ));
        }
    }

    if deleted_files >= 3 {
        findings.push(Finding::global(
            ID,
            Category::Logic,
            8,
            "Multiple files deleted.",
            format!("{} non-doc/test files removed", deleted_files),
        ));
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::testing::DiffText;

    #[test]
    fn test_deleted_files_skip_docs_and_tests() {
        let changes = DiffText::new()
            .deleted("src/a.rs", &["fn a() {}"])
            .deleted("src/b.rs", &["fn b() {}"])
            .deleted("src/c.rs", &["fn c() {}"])
            .deleted("docs/guide.md", &["# guide"])
            .deleted("tests/old.rs", &["#[test] fn t() {}"])
            .parse();
        let findings = evaluate(&changes, &ResolvedConfig::defaults().unwrap());
        let points: Vec<u32> = findings.iter().map(|f| f.points).collect();
        assert_eq!(points, vec![9, 9, 9, 8]);
    }

    #[test]
    fn test_deletion_ratio() {
        let removed: Vec<String> = (0..30).map(|i| format!("line {}", i)).collect();
        let removed: Vec<&str> = removed.iter().map(String::as_str).collect();
        let changes = DiffText::new()
            .modified("src/core.rs", &removed, &["one", "two", "three", "four", "five"])
            .modified("src/small.rs", &["a"; 10], &[])
            .parse();
        let findings = evaluate(&changes, &ResolvedConfig::defaults().unwrap());
        assert_eq!(findings.len(), 1);
        // 10 * 30/35 = 8.57
        assert_eq!(findings[0].points, 9);
    }
}
