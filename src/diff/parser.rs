//! Unified diff parser.
//!
//! Accepts `git diff` output as well as plain unified diffs. Hunk bodies are
//! consumed by their declared line counts, so removed lines that happen to
//! look like headers (`--- foo`) are never mistaken for metadata.

use crate::diff::changeset::{ChangeKind, ChangeSet, FileChange, Hunk, Line, LineKind};
use crate::error::ParseError;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

const DEV_NULL: &str = "/dev/null";

static HUNK_HEADER: OnceLock<Regex> = OnceLock::new();

fn hunk_header() -> &'static Regex {
    HUNK_HEADER.get_or_init(|| {
        Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@(.*)$").expect("valid regex")
    })
}

/// Parse raw diff text into a [`ChangeSet`].
pub fn parse(raw: &str) -> Result<ChangeSet, ParseError> {
    let mut files = Vec::new();
    let mut file: Option<FileBuilder> = None;
    let mut hunk: Option<HunkBuilder> = None;
    // Counts of the last completed hunk, until a header closes its body.
    let mut closed: Option<ClosedHunk> = None;
    let lines: Vec<&str> = raw.lines().collect();

    for (index, &text) in lines.iter().enumerate() {
        let line_no = index + 1;

        if let Some(open) = hunk.as_mut() {
            if !open.is_complete() && open.accepts(text) {
                open.push(text);
                continue;
            }
            if text.starts_with('\\') {
                // "\ No newline at end of file"
                continue;
            }
            if let Some(open) = hunk.take() {
                let summary = open.summary();
                if let Some(current) = file.as_mut() {
                    current.hunks.push(open.finish()?);
                }
                closed = Some(summary);
            }
        }

        if let Some(summary) = closed.as_ref() {
            let file_header = text.starts_with("--- ")
                && lines.get(index + 1).is_some_and(|next| next.starts_with("+++ "));
            if text.starts_with("diff --git ") || text.starts_with("@@") || file_header {
                closed = None;
            } else if text.starts_with([' ', '+', '-']) {
                return Err(summary.surplus(text));
            }
        }

        if let Some(rest) = text.strip_prefix("diff --git ") {
            if let Some(done) = file.take() {
                files.push(done.finish());
            }
            file = Some(FileBuilder::from_git_header(rest));
        } else if let Some(rest) = text.strip_prefix("--- ") {
            // A plain unified diff has no `diff --git` line between files.
            let starts_new = file
                .as_ref()
                .map_or(true, |f| !f.hunks.is_empty() || f.minus.is_some());
            if starts_new {
                if let Some(done) = file.take() {
                    files.push(done.finish());
                }
                file = Some(FileBuilder::default());
            }
            if let Some(current) = file.as_mut() {
                current.minus = Some(header_path(rest));
            }
        } else if let Some(rest) = text.strip_prefix("+++ ") {
            let current = file.get_or_insert_with(FileBuilder::default);
            current.plus = Some(header_path(rest));
        } else if text.starts_with("@@") {
            let current = file
                .as_ref()
                .ok_or(ParseError::HunkWithoutFile { line: line_no })?;
            hunk = Some(HunkBuilder::open(text, line_no, current.display_path())?);
        } else if let Some(current) = file.as_mut() {
            current.metadata(text);
        }
    }

    if let Some(open) = hunk.take() {
        let done = open.finish()?;
        if let Some(current) = file.as_mut() {
            current.hunks.push(done);
        }
    }
    if let Some(done) = file.take() {
        files.push(done.finish());
    }

    debug!("Parsed diff: {} files", files.len());
    Ok(ChangeSet::new(files))
}

#[derive(Debug, Default)]
struct FileBuilder {
    git_old: Option<String>,
    git_new: Option<String>,
    minus: Option<String>,
    plus: Option<String>,
    rename_from: Option<String>,
    rename_to: Option<String>,
    new_file: bool,
    deleted_file: bool,
    binary: bool,
    hunks: Vec<Hunk>,
}

impl FileBuilder {
    fn from_git_header(rest: &str) -> Self {
        let (old, new) = match rest.rfind(" b/") {
            Some(split) => (&rest[..split], &rest[split + 1..]),
            None => match rest.split_once(' ') {
                Some((old, new)) => (old, new),
                None => (rest, rest),
            },
        };
        Self {
            git_old: Some(strip_prefix(old).to_string()),
            git_new: Some(strip_prefix(new).to_string()),
            ..Self::default()
        }
    }

    fn metadata(&mut self, text: &str) {
        if text.starts_with("new file mode") {
            self.new_file = true;
        } else if text.starts_with("deleted file mode") {
            self.deleted_file = true;
        } else if let Some(from) = text.strip_prefix("rename from ") {
            self.rename_from = Some(from.trim().to_string());
        } else if let Some(to) = text.strip_prefix("rename to ") {
            self.rename_to = Some(to.trim().to_string());
        } else if text.starts_with("Binary files ") || text.starts_with("GIT binary patch") {
            self.binary = true;
        }
    }

    fn old_path(&self) -> Option<&str> {
        self.rename_from
            .as_deref()
            .or(self.minus.as_deref())
            .or(self.git_old.as_deref())
    }

    fn new_path(&self) -> Option<&str> {
        self.rename_to
            .as_deref()
            .or(self.plus.as_deref())
            .or(self.git_new.as_deref())
    }

    fn display_path(&self) -> String {
        match (self.old_path(), self.new_path()) {
            (_, Some(new)) if new != DEV_NULL => new.to_string(),
            (Some(old), _) if old != DEV_NULL => old.to_string(),
            _ => "<unknown>".to_string(),
        }
    }

    fn finish(self) -> FileChange {
        let path = self.display_path();
        let old = self.old_path().map(str::to_string);
        let new = self.new_path().map(str::to_string);

        let kind = if self.deleted_file || new.as_deref() == Some(DEV_NULL) {
            ChangeKind::Deleted
        } else if self.new_file || old.as_deref() == Some(DEV_NULL) {
            ChangeKind::Added
        } else if matches!((&old, &new), (Some(o), Some(n)) if o != n) {
            ChangeKind::Renamed
        } else {
            ChangeKind::Modified
        };

        let old_path = match kind {
            ChangeKind::Renamed => old,
            _ => None,
        };

        FileChange {
            path,
            old_path,
            kind,
            binary: self.binary,
            hunks: self.hunks,
        }
    }
}

/// A hunk whose declared counts were met.
struct ClosedHunk {
    header_line: usize,
    path: String,
    old_len: u32,
    new_len: u32,
}

impl ClosedHunk {
    /// Body line found after the hunk already had all its lines.
    fn surplus(&self, text: &str) -> ParseError {
        let (extra_old, extra_new) = match text.chars().next() {
            Some('+') => (0, 1),
            Some('-') => (1, 0),
            _ => (1, 1),
        };
        ParseError::LineCountMismatch {
            line: self.header_line,
            path: self.path.clone(),
            expected_old: self.old_len,
            expected_new: self.new_len,
            actual_old: self.old_len + extra_old,
            actual_new: self.new_len + extra_new,
        }
    }
}

struct HunkBuilder {
    header_line: usize,
    path: String,
    hunk: Hunk,
    old_seen: u32,
    new_seen: u32,
}

impl HunkBuilder {
    fn open(header: &str, line_no: usize, path: String) -> Result<Self, ParseError> {
        let malformed = || ParseError::MalformedHunkHeader {
            line: line_no,
            header: header.to_string(),
        };
        let caps = hunk_header().captures(header).ok_or_else(malformed)?;
        let number = |i: usize, default: u32| -> Result<u32, ParseError> {
            match caps.get(i) {
                Some(m) => m.as_str().parse().map_err(|_| malformed()),
                None => Ok(default),
            }
        };

        Ok(Self {
            header_line: line_no,
            path,
            hunk: Hunk {
                old_start: number(1, 0)?,
                old_len: number(2, 1)?,
                new_start: number(3, 0)?,
                new_len: number(4, 1)?,
                section: caps.get(5).map_or("", |m| m.as_str()).trim().to_string(),
                lines: Vec::new(),
            },
            old_seen: 0,
            new_seen: 0,
        })
    }

    fn summary(&self) -> ClosedHunk {
        ClosedHunk {
            header_line: self.header_line,
            path: self.path.clone(),
            old_len: self.hunk.old_len,
            new_len: self.hunk.new_len,
        }
    }

    fn is_complete(&self) -> bool {
        self.old_seen >= self.hunk.old_len && self.new_seen >= self.hunk.new_len
    }

    fn accepts(&self, text: &str) -> bool {
        text.is_empty() || text.starts_with([' ', '+', '-'])
    }

    fn push(&mut self, text: &str) {
        let (kind, body) = match text.chars().next() {
            Some('+') => (LineKind::Added, &text[1..]),
            Some('-') => (LineKind::Removed, &text[1..]),
            Some(' ') => (LineKind::Context, &text[1..]),
            _ => (LineKind::Context, ""),
        };
        let line_number = match kind {
            LineKind::Removed => self.hunk.old_start + self.old_seen,
            _ => self.hunk.new_start + self.new_seen,
        };
        match kind {
            LineKind::Context => {
                self.old_seen += 1;
                self.new_seen += 1;
            }
            LineKind::Added => self.new_seen += 1,
            LineKind::Removed => self.old_seen += 1,
        }
        self.hunk.lines.push(Line {
            kind,
            text: body.to_string(),
            line_number,
        });
    }

    fn finish(self) -> Result<Hunk, ParseError> {
        if self.old_seen != self.hunk.old_len || self.new_seen != self.hunk.new_len {
            return Err(ParseError::LineCountMismatch {
                line: self.header_line,
                path: self.path,
                expected_old: self.hunk.old_len,
                expected_new: self.hunk.new_len,
                actual_old: self.old_seen,
                actual_new: self.new_seen,
            });
        }
        Ok(self.hunk)
    }
}

fn header_path(rest: &str) -> String {
    let token = rest.split('\t').next().unwrap_or(rest).trim();
    strip_prefix(token).to_string()
}

fn strip_prefix(path: &str) -> &str {
    path.strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modified_file_with_line_numbers() {
        let diff = "\
diff --git a/src/app.py b/src/app.py
index 1111111..2222222 100644
--- a/src/app.py
+++ b/src/app.py
@@ -10,3 +10,4 @@ def main():
 a = 1
-b = 2
+b = 3
+c = 4
 d = 5
";
        let changes = parse(diff).unwrap();
        assert_eq!(changes.len(), 1);
        let file = &changes.files()[0];
        assert_eq!(file.path, "src/app.py");
        assert_eq!(file.kind, ChangeKind::Modified);
        assert_eq!(file.hunks[0].section, "def main():");

        let numbers: Vec<(LineKind, u32)> = file.hunks[0]
            .lines
            .iter()
            .map(|l| (l.kind, l.line_number))
            .collect();
        assert_eq!(
            numbers,
            vec![
                (LineKind::Context, 10),
                (LineKind::Removed, 11),
                (LineKind::Added, 11),
                (LineKind::Added, 12),
                (LineKind::Context, 13),
            ]
        );
    }

    #[test]
    fn test_removed_line_that_looks_like_header() {
        let diff = "\
--- a/notes.txt
+++ b/notes.txt
@@ -1,2 +1 @@
--- not a header
 keep
";
        let changes = parse(diff).unwrap();
        let file = &changes.files()[0];
        assert_eq!(file.removed_count(), 1);
        assert_eq!(file.hunks[0].lines[0].text, "-- not a header");
    }

    #[test]
    fn test_added_and_deleted_files() {
        let diff = "\
diff --git a/new.rs b/new.rs
new file mode 100644
--- /dev/null
+++ b/new.rs
@@ -0,0 +1,2 @@
+fn a() {}
+fn b() {}
diff --git a/old.rs b/old.rs
deleted file mode 100644
--- a/old.rs
+++ /dev/null
@@ -1 +0,0 @@
-fn gone() {}
";
        let changes = parse(diff).unwrap();
        assert_eq!(changes.files()[0].kind, ChangeKind::Added);
        assert_eq!(changes.files()[0].added_count(), 2);
        assert_eq!(changes.files()[1].kind, ChangeKind::Deleted);
        assert_eq!(changes.files()[1].path, "old.rs");
    }

    #[test]
    fn test_rename_and_binary_have_no_hunks() {
        let diff = "\
diff --git a/lib/old_name.rs b/lib/new_name.rs
similarity index 100%
rename from lib/old_name.rs
rename to lib/new_name.rs
diff --git a/logo.png b/logo.png
index 3333333..4444444 100644
Binary files a/logo.png and b/logo.png differ
";
        let changes = parse(diff).unwrap();
        let rename = &changes.files()[0];
        assert_eq!(rename.kind, ChangeKind::Renamed);
        assert_eq!(rename.path, "lib/new_name.rs");
        assert_eq!(rename.old_path.as_deref(), Some("lib/old_name.rs"));
        assert!(rename.hunks.is_empty());

        let binary = &changes.files()[1];
        assert!(binary.binary);
        assert!(binary.hunks.is_empty());
    }

    #[test]
    fn test_no_newline_marker_and_blank_context() {
        let diff = "\
--- a/a.txt
+++ b/a.txt
@@ -1,3 +1,3 @@
 one

-three
\\ No newline at end of file
+three!
\\ No newline at end of file
";
        let changes = parse(diff).unwrap();
        let hunk = &changes.files()[0].hunks[0];
        assert_eq!(hunk.lines.len(), 4);
        assert_eq!(hunk.lines[1].kind, LineKind::Context);
        assert_eq!(hunk.lines[1].text, "");
    }

    #[test]
    fn test_malformed_hunk_header_reports_line() {
        let diff = "\
--- a/a.txt
+++ b/a.txt
@@ -x,1 +1 @@
";
        let err = parse(diff).unwrap_err();
        assert!(matches!(err, ParseError::MalformedHunkHeader { line: 3, .. }));
    }

    #[test]
    fn test_mismatched_line_counts() {
        let diff = "\
diff --git a/a.txt b/a.txt
--- a/a.txt
+++ b/a.txt
@@ -1,3 +1,3 @@
 one
-two
+TWO
diff --git a/b.txt b/b.txt
";
        let err = parse(diff).unwrap_err();
        match err {
            ParseError::LineCountMismatch {
                line,
                path,
                actual_old,
                ..
            } => {
                assert_eq!(line, 4);
                assert_eq!(path, "a.txt");
                assert_eq!(actual_old, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_lines_past_declared_counts_are_rejected() {
        let diff = "--- a/a.txt\n+++ b/a.txt\n@@ -1 +1 @@\n-a\n+b\n+c\n+eval(x)\n";
        match parse(diff).unwrap_err() {
            ParseError::LineCountMismatch {
                line,
                path,
                expected_new,
                actual_new,
                ..
            } => {
                assert_eq!(line, 3);
                assert_eq!(path, "a.txt");
                assert_eq!(expected_new, 1);
                assert_eq!(actual_new, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let stray_header = "--- a/a.txt\n+++ b/a.txt\n@@ -1 +1 @@\n-a\n+b\n--- x\n";
        assert!(matches!(
            parse(stray_header),
            Err(ParseError::LineCountMismatch { .. })
        ));
    }

    #[test]
    fn test_next_file_and_blank_lines_after_complete_hunk() {
        let diff = "\
--- a/a.txt
+++ b/a.txt
@@ -1 +1 @@
-a
+b

--- a/b.txt
+++ b/b.txt
@@ -1 +1,2 @@
 x
+y
";
        let changes = parse(diff).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes.totals(), (2, 1));
    }

    #[test]
    fn test_hunk_without_file() {
        let err = parse("@@ -1 +1 @@\n-a\n+b\n").unwrap_err();
        assert_eq!(err, ParseError::HunkWithoutFile { line: 1 });
    }

    #[test]
    fn test_empty_input_is_empty_change_set() {
        assert!(parse("").unwrap().is_empty());
    }
}
