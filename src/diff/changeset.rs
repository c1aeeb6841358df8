//! Structured change set produced by the diff parser.
//!
//! A `ChangeSet` is built once per analysis and only ever handed out by
//! shared reference, so rules and plugins are read-only consumers.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// How a file was affected by the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Deleted => write!(f, "deleted"),
            ChangeKind::Renamed => write!(f, "renamed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Context,
    Added,
    Removed,
}

/// A single line inside a hunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Line {
    pub kind: LineKind,
    pub text: String,
    /// New-file line for context/added lines, old-file line for removed lines.
    pub line_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hunk {
    pub old_start: u32,
    pub old_len: u32,
    pub new_start: u32,
    pub new_len: u32,
    /// Trailing section heading after the second `@@`, trimmed.
    pub section: String,
    pub lines: Vec<Line>,
}

impl Hunk {
    /// Renders the `@@ -a,b +c,d @@` header line.
    pub fn header(&self) -> String {
        let mut header = format!(
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_len, self.new_start, self.new_len
        );
        if !self.section.is_empty() {
            header.push(' ');
            header.push_str(&self.section);
        }
        header
    }
}

/// One file's worth of changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    /// Canonical path for reporting (new path, or old path for deletions).
    pub path: String,
    /// Previous path when the file was renamed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    pub kind: ChangeKind,
    pub binary: bool,
    pub hunks: Vec<Hunk>,
}

impl FileChange {
    /// All lines of the given kind, in diff order.
    pub fn lines_of(&self, kind: LineKind) -> impl Iterator<Item = &Line> {
        self.hunks
            .iter()
            .flat_map(|h| h.lines.iter())
            .filter(move |l| l.kind == kind)
    }

    pub fn added_count(&self) -> usize {
        self.lines_of(LineKind::Added).count()
    }

    pub fn removed_count(&self) -> usize {
        self.lines_of(LineKind::Removed).count()
    }

    pub fn changed_count(&self) -> usize {
        self.added_count() + self.removed_count()
    }
}

/// Ordered list of file changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    files: Vec<FileChange>,
}

impl ChangeSet {
    pub(crate) fn new(files: Vec<FileChange>) -> Self {
        Self { files }
    }

    pub fn files(&self) -> &[FileChange] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.path.as_str())
    }

    /// Total (added, removed) line counts.
    pub fn totals(&self) -> (usize, usize) {
        self.files.iter().fold((0, 0), |(a, r), f| {
            (a + f.added_count(), r + f.removed_count())
        })
    }

    /// Returns a new change set holding only the files `keep` accepts.
    pub fn filtered(&self, keep: impl Fn(&FileChange) -> bool) -> ChangeSet {
        ChangeSet::new(self.files.iter().filter(|f| keep(f)).cloned().collect())
    }

    /// Renders the change set back into unified diff text.
    ///
    /// With `only`, files whose path is not in the set are left out.
    pub fn render(&self, only: Option<&BTreeSet<String>>) -> String {
        let mut out = String::new();
        for file in &self.files {
            if let Some(only) = only {
                if !only.contains(&file.path) {
                    continue;
                }
            }
            render_file(file, &mut out);
        }
        out
    }
}

fn render_file(file: &FileChange, out: &mut String) {
    let old = file.old_path.as_deref().unwrap_or(&file.path);
    out.push_str(&format!("diff --git a/{} b/{}\n", old, file.path));

    match file.kind {
        ChangeKind::Added => out.push_str("new file mode 100644\n"),
        ChangeKind::Deleted => out.push_str("deleted file mode 100644\n"),
        ChangeKind::Renamed => {
            out.push_str(&format!("rename from {}\nrename to {}\n", old, file.path));
        }
        ChangeKind::Modified => {}
    }

    if file.binary {
        out.push_str(&format!("Binary files a/{} and b/{} differ\n", old, file.path));
        return;
    }
    if file.hunks.is_empty() {
        return;
    }

    let minus = match file.kind {
        ChangeKind::Added => "/dev/null".to_string(),
        _ => format!("a/{}", old),
    };
    let plus = match file.kind {
        ChangeKind::Deleted => "/dev/null".to_string(),
        _ => format!("b/{}", file.path),
    };
    out.push_str(&format!("--- {}\n+++ {}\n", minus, plus));

    for hunk in &file.hunks {
        out.push_str(&hunk.header());
        out.push('\n');
        for line in &hunk.lines {
            let prefix = match line.kind {
                LineKind::Context => ' ',
                LineKind::Added => '+',
                LineKind::Removed => '-',
            };
            out.push(prefix);
            out.push_str(&line.text);
            out.push('\n');
        }
    }
}
