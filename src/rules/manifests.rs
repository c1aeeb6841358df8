//! Dependency manifests and runtime configuration files.

use super::file_name;
use crate::diff::{ChangeSet, FileChange, LineKind};
use crate::models::{Category, Finding};

const DEPENDENCY_ID: &str = "dependency_changes";
const CONFIG_ID: &str = "config_changes";

const MANIFEST_FILES: &[&str] = &[
    "cargo.toml",
    "pyproject.toml",
    "requirements.txt",
    "setup.py",
    "setup.cfg",
    "package.json",
    "pom.xml",
    "build.gradle",
    "go.mod",
    "gemfile",
];

const LOCK_FILES: &[&str] = &[
    "cargo.lock",
    "poetry.lock",
    "pdm.lock",
    "pipfile.lock",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "go.sum",
    "gemfile.lock",
];

const CONFIG_FILES: &[&str] = &[
    "nginx.conf",
    "gunicorn.conf.py",
    "application.yml",
    "application.yaml",
    "config.toml",
];

const CONFIG_DIRS: &[&str] = &["config/", "settings/", "k8s/", "helm/", ".cargo/"];

const RISKY_CONFIG_TOKENS: &[&str] = &["debug=true", "allow_all", "allow-unauthenticated", "0.0.0.0"];

pub(super) fn dependency_changes(changes: &ChangeSet) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut dependency_files = 0;

    for file in changes.files() {
        let changed = file.changed_count();
        if changed == 0 {
            continue;
        }
        let name = file_name(&file.path);
        let (points, message) = if MANIFEST_FILES.contains(&name.as_str()) {
            (8, "Dependency manifest changed.")
        } else if LOCK_FILES.contains(&name.as_str()) {
            (5, "Dependency lock file changed.")
        } else {
            continue;
        };
        dependency_files += 1;
        findings.push(Finding::file(
            DEPENDENCY_ID,
            Category::Integration,
            points,
            &file.path,
            message,
            format!("{} updated with {} changed lines", name, changed),
        ));
    }

    if dependency_files >= 3 {
        findings.push(Finding::global(
            DEPENDENCY_ID,
            Category::Integration,
            6,
            "Multiple dependency files changed.",
            format!("{} dependency-related files modified", dependency_files),
        ));
    }

    findings
}

fn is_config_path(path: &str) -> bool {
    let lowered = format!("/{}", path.to_lowercase());
    let name = file_name(path);
    name.starts_with(".env")
        || name.starts_with("docker-compose")
        || CONFIG_FILES.contains(&name.as_str())
        || CONFIG_DIRS.iter().any(|dir| lowered.contains(&format!("/{}", dir)))
}

fn risky_hits(file: &FileChange) -> usize {
    file.lines_of(LineKind::Added)
        .filter(|line| {
            let compact: String = line
                .text
                .to_lowercase()
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            RISKY_CONFIG_TOKENS.iter().any(|token| compact.contains(token))
        })
        .count()
}

pub(super) fn config_changes(changes: &ChangeSet) -> Vec<Finding> {
    changes
        .files()
        .iter()
        .filter(|file| is_config_path(&file.path))
        .filter_map(|file| {
            let changed = file.changed_count();
            if changed == 0 {
                return None;
            }
            let hits = risky_hits(file);
            let points = 7 + (2 * hits).min(4) as u32;
            let mut evidence = format!("{} has {} changed config lines", file.path, changed);
            if hits > 0 {
                evidence.push_str(&format!(", {} risky settings added", hits));
            }
            Some(Finding::file(
                CONFIG_ID,
                Category::Integration,
                points,
                &file.path,
                "Configuration surface changed.",
                evidence,
            ))
        })
        .collect()
}
