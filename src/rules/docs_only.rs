//! Documentation-only override.

use crate::config::ResolvedConfig;
use crate::diff::ChangeSet;
use crate::models::{Category, Finding};

pub const ID: &str = "docs_only";

/// Emits a zero-point marker when every changed file is documentation.
/// The aggregator caps the score when it sees this marker.
pub(super) fn evaluate(changes: &ChangeSet, config: &ResolvedConfig) -> Vec<Finding> {
    if changes.is_empty() || !changes.paths().all(|p| config.is_docs_path(p)) {
        return Vec::new();
    }
    vec![Finding::global(
        ID,
        Category::Quality,
        0,
        "Documentation-only change.",
        format!("{} documentation files changed", changes.len()),
    )]
}
