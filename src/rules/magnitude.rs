//! Change volume with diminishing returns.

use crate::diff::ChangeSet;
use crate::models::{Category, Finding};

const ID: &str = "magnitude";

/// `max · (1 − e^(−x/scale))`: continuous, strictly increasing, bounded by `max`.
pub fn curve(max: f64, x: f64, scale: f64) -> f64 {
    max * (1.0 - (-x / scale).exp())
}

pub(super) fn evaluate(changes: &ChangeSet) -> Vec<Finding> {
    let (added, removed) = changes.totals();
    let lines = added + removed;
    let mut findings = Vec::new();

    let line_points = curve(24.0, lines as f64, 150.0).round() as u32;
    if line_points > 0 {
        findings.push(Finding::global(
            ID,
            Category::Logic,
            line_points,
            "Diff volume increases regression risk.",
            format!("{} changed lines ({} added, {} removed)", lines, added, removed),
        ));
    }

    let file_points = curve(10.0, changes.len() as f64, 8.0).round() as u32;
    if file_points > 0 {
        findings.push(Finding::global(
            ID,
            Category::Logic,
            file_points,
            "File spread increases integration risk.",
            format!("{} files changed", changes.len()),
        ));
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::testing::DiffText;

    #[test]
    fn test_curve_is_bounded_and_increasing() {
        let mut previous = 0.0;
        for x in [1.0, 10.0, 100.0, 1_000.0, 100_000.0] {
            let value = curve(24.0, x, 150.0);
            assert!(value > previous);
            assert!(value <= 24.0);
            previous = value;
        }
        assert_eq!(curve(24.0, 0.0, 150.0), 0.0);
    }

    #[test]
    fn test_points_scale_with_volume() {
        let added: Vec<String> = (0..150).map(|i| format!("let v{} = {};", i, i)).collect();
        let added: Vec<&str> = added.iter().map(String::as_str).collect();
        let changes = DiffText::new().added("src/big.rs", &added).parse();

        let findings = evaluate(&changes);
        // 24 * (1 - e^-1) = 15.17
        assert_eq!(findings[0].points, 15);
        assert_eq!(findings[0].evidence, "150 changed lines (150 added, 0 removed)");
        // 10 * (1 - e^-0.125) = 1.18
        assert_eq!(findings[1].points, 1);
    }

    #[test]
    fn test_tiny_change_only_counts_files() {
        let changes = DiffText::new().modified("a.rs", &["a"], &["b"]).parse();
        let findings = evaluate(&changes);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].evidence, "1 files changed");
    }
}
