//! Error types for the scoring pipeline.
//!
//! Fatal errors (`ParseError`, `ConfigError`, `CheckpointError`) abort an
//! invocation before any report exists. Plugin faults and redaction warnings
//! are non-fatal and live next to the code that produces them.

use std::path::PathBuf;
use thiserror::Error;

/// Malformed diff input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line {line}: malformed hunk header: {header}")]
    MalformedHunkHeader { line: usize, header: String },

    #[error("line {line}: hunk content found before any file header")]
    HunkWithoutFile { line: usize },

    #[error(
        "line {line}: hunk in {path} declares -{expected_old}/+{expected_new} lines \
         but contains -{actual_old}/+{actual_new}"
    )]
    LineCountMismatch {
        line: usize,
        path: String,
        expected_old: u32,
        expected_new: u32,
        actual_old: u32,
        actual_new: u32,
    },
}

impl ParseError {
    /// 1-based line of the diff text where the problem was detected.
    pub fn line(&self) -> usize {
        match self {
            ParseError::MalformedHunkHeader { line, .. }
            | ParseError::HunkWithoutFile { line }
            | ParseError::LineCountMismatch { line, .. } => *line,
        }
    }
}

/// Schema or merge violation in the configuration layers.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file does not exist: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {}: {source}", .path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{field}: invalid glob `{glob}`: {reason}")]
    InvalidGlob {
        field: String,
        glob: String,
        reason: String,
    },

    #[error("{field}: invalid regex `{regex}`: {reason}")]
    InvalidRegex {
        field: String,
        regex: String,
        reason: String,
    },

    #[error("{field}: points must not be negative (got {points})")]
    NegativePoints { field: String, points: i64 },

    #[error("{field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("unknown rule id `{0}`")]
    UnknownRule(String),

    #[error("unknown plugin id `{0}`")]
    UnknownPlugin(String),

    #[error("rule id `{0}` appears more than once in the resolved rule set")]
    DuplicateRule(String),

    #[error("override both enables and disables `{0}`")]
    ConflictingOverride(String),
}

impl ConfigError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// A single plugin misbehaved. Never fatal: the run records a diagnostic
/// finding and carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginFault {
    #[error("plugin failed: {0}")]
    Failed(String),

    #[error("plugin panicked")]
    Panicked,

    #[error("plugin exceeded its {0} ms timeout")]
    TimedOut(u64),

    #[error("plugin emitted a finding under foreign rule id `{0}`")]
    ForeignRuleId(String),
}

/// Failures of the persisted review-mode checkpoint.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint is held by another invocation: {0}")]
    Conflict(String),

    #[error("checkpoint I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Any fatal pipeline error.
#[derive(Debug, Error)]
pub enum RiskError {
    #[error("parse: {0}")]
    Parse(#[from] ParseError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("checkpoint: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("diff source: {0}")]
    Source(String),
}

/// Outcome classes for CI gating. The binary maps these to process status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitClass {
    Success,
    ThresholdExceeded,
    InputFailure,
}

impl ExitClass {
    pub fn code(self) -> i32 {
        match self {
            ExitClass::Success => 0,
            ExitClass::InputFailure => 1,
            ExitClass::ThresholdExceeded => 2,
        }
    }
}

impl RiskError {
    pub fn exit_class(&self) -> ExitClass {
        ExitClass::InputFailure
    }
}
