//! Line-level heuristics for weakened error handling and public API churn.
//!
//! Both rules stay quiet when the signal is ambiguous: a guard that moves
//! within a file, or a signature that is removed and re-added verbatim,
//! produces nothing.

use super::extension;
use crate::config::ResolvedConfig;
use crate::diff::{ChangeSet, FileChange, LineKind};
use crate::models::{clip_evidence, Category, Finding};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

const ERROR_HANDLING_ID: &str = "error_handling";
const API_SURFACE_ID: &str = "api_surface";

const GUARD_PREFIXES: &[&str] = &[
    "raise ",
    "assert ",
    "assert(",
    "assert!(",
    "assert_eq!(",
    "assert_ne!(",
    "throw ",
    "return Err(",
    "bail!(",
    "ensure!(",
];

const SIGNATURE_PREFIXES: &[&str] = &[
    "pub fn ",
    "pub async fn ",
    "pub struct ",
    "pub enum ",
    "pub trait ",
    "pub type ",
    "def ",
    "async def ",
    "class ",
    "function ",
    "export function ",
    "export async function ",
    "export default function ",
    "export class ",
    "export interface ",
    "export type ",
    "interface ",
    "func ",
    "public ",
];

const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "ts", "tsx", "jsx", "go", "java", "kt", "rb", "cs", "swift", "php",
];

const API_PATH_MARKERS: &[&str] = &["/api/", "/routes/", "/route/", "/controllers/", "/endpoints/"];

static EMPTY_CATCH: OnceLock<Regex> = OnceLock::new();

fn empty_catch() -> &'static Regex {
    EMPTY_CATCH.get_or_init(|| {
        Regex::new(r"^\}?\s*catch\s*(\([^)]*\))?\s*\{\s*\}$").expect("valid regex")
    })
}

fn is_catch_all(trimmed: &str) -> bool {
    trimmed.starts_with("except:") || empty_catch().is_match(trimmed)
}

fn is_guard(trimmed: &str) -> bool {
    trimmed == "assert" || GUARD_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}

fn trimmed_lines(file: &FileChange, kind: LineKind) -> impl Iterator<Item = &str> {
    file.lines_of(kind).map(|line| line.text.trim())
}

pub(super) fn error_handling(changes: &ChangeSet, config: &ResolvedConfig) -> Vec<Finding> {
    let mut findings = Vec::new();

    for file in changes.files() {
        if config.is_test_path(&file.path) {
            continue;
        }

        let catch_alls: Vec<&str> = trimmed_lines(file, LineKind::Added)
            .filter(|t| is_catch_all(t))
            .collect();
        if let Some(first) = catch_alls.first() {
            findings.push(Finding::file(
                ERROR_HANDLING_ID,
                Category::Logic,
                (6 * catch_alls.len()).min(12) as u32,
                &file.path,
                "Catch-all error handler introduced.",
                format!(
                    "{} catch-all handler(s) added, first: `{}`",
                    catch_alls.len(),
                    clip_evidence(first, 60)
                ),
            ));
        }

        let re_added: BTreeSet<&str> = trimmed_lines(file, LineKind::Added).collect();
        let removed_guards: Vec<&str> = trimmed_lines(file, LineKind::Removed)
            .filter(|t| is_guard(t) && !re_added.contains(t))
            .collect();
        if let Some(first) = removed_guards.first() {
            findings.push(Finding::file(
                ERROR_HANDLING_ID,
                Category::Logic,
                (3 * removed_guards.len()).min(10) as u32,
                &file.path,
                "Guard or error path removed.",
                format!(
                    "{} guard line(s) removed, first: `{}`",
                    removed_guards.len(),
                    clip_evidence(first, 60)
                ),
            ));
        }
    }

    findings
}

fn is_signature(trimmed: &str) -> bool {
    SIGNATURE_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}

pub(super) fn api_surface(changes: &ChangeSet, config: &ResolvedConfig) -> Vec<Finding> {
    let mut findings = Vec::new();

    for file in changes.files() {
        if config.is_test_path(&file.path)
            || !SOURCE_EXTENSIONS.contains(&extension(&file.path).as_str())
        {
            continue;
        }

        let removed: BTreeSet<&str> = trimmed_lines(file, LineKind::Removed)
            .filter(|t| is_signature(t))
            .collect();
        let added: BTreeSet<&str> = trimmed_lines(file, LineKind::Added)
            .filter(|t| is_signature(t))
            .collect();
        let gone: Vec<&str> = removed.difference(&added).copied().collect();
        let Some(first) = gone.first() else {
            continue;
        };
        let changed = gone.len() + added.difference(&removed).count();

        let mut points = (2 * changed).min(14) as u32;
        let lowered = format!("/{}", file.path.to_lowercase());
        if API_PATH_MARKERS.iter().any(|m| lowered.contains(m)) {
            points += 4;
        }

        findings.push(Finding::file(
            API_SURFACE_ID,
            Category::Integration,
            points.min(18),
            &file.path,
            "Public API or signature surface changed.",
            format!(
                "{} signature-level line changes, removed: `{}`",
                changed,
                clip_evidence(first, 60)
            ),
        ));
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::testing::DiffText;

    fn config() -> ResolvedConfig {
        ResolvedConfig::defaults().unwrap()
    }

    #[test]
    fn test_catch_all_detection() {
        assert!(is_catch_all("except:"));
        assert!(is_catch_all("} catch (e) {}"));
        assert!(is_catch_all("catch {}"));
        assert!(!is_catch_all("except ValueError:"));
        assert!(!is_catch_all("} catch (e) { log(e) }"));
    }

    #[test]
    fn test_removed_guards_and_moved_guards() {
        let changes = DiffText::new()
            .modified(
                "src/service.py",
                &["    raise ValueError('bad')", "    assert user"],
                &["    pass"],
            )
            .modified(
                "src/moved.rs",
                &["    return Err(Error::Empty);"],
                &["  return Err(Error::Empty);"],
            )
            .parse();
        let findings = error_handling(&changes, &config());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].points, 6);
        assert_eq!(findings[0].scope.as_str(), "src/service.py");
    }

    #[test]
    fn test_bare_except_added() {
        let changes = DiffText::new()
            .modified("app/job.py", &[], &["try:", "    run()", "except:", "    pass"])
            .parse();
        let findings = error_handling(&changes, &config());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].points, 6);
    }

    #[test]
    fn test_api_surface_requires_removed_signature() {
        let added_only = DiffText::new()
            .modified("src/lib.rs", &[], &["pub fn new_helper() {}"])
            .parse();
        assert!(api_surface(&added_only, &config()).is_empty());

        let changed = DiffText::new()
            .modified(
                "src/api/users.py",
                &["def get_user(id):"],
                &["def get_user(id, include_deleted=False):"],
            )
            .parse();
        let findings = api_surface(&changed, &config());
        assert_eq!(findings.len(), 1);
        // 2 changed lines -> 4, plus 4 under an API path
        assert_eq!(findings[0].points, 8);
    }

    #[test]
    fn test_api_surface_ignores_moves_and_tests() {
        let moved = DiffText::new()
            .modified("src/lib.rs", &["pub fn stable() {}"], &["pub fn stable() {}"])
            .modified("tests/api.rs", &["pub fn helper() {}"], &[])
            .parse();
        assert!(api_surface(&moved, &config()).is_empty());
    }
}
