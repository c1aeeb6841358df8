//! diffrisk - deterministic regression-risk scoring for code diffs.
//!
//! A unified diff is parsed into an immutable [`diff::ChangeSet`], scored by
//! the built-in [`rules`] and any budget-admitted [`plugins`], weighted by the
//! active objective profile and mapped onto a 0-100 score. The
//! [`engine::Engine`] wires the stages together; [`report`] renders the
//! result and builds redacted handoff payloads.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod models;
pub mod plugins;
pub mod report;
pub mod rules;

pub use config::ResolvedConfig;
pub use engine::{Analysis, Engine, RunOptions};
pub use error::{ExitClass, RiskError};
pub use models::{Finding, ScoreReport};
