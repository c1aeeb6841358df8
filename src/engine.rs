//! The scoring pipeline.
//!
//! One invocation runs parse, path filtering, rules, plugin scheduling and
//! execution, then aggregation. Configuration is fully resolved and plugin
//! ids are validated before any rule sees the change set.

use crate::analysis::{aggregate, AggregateOptions};
use crate::config::ResolvedConfig;
use crate::diff::{
    self, resolve_range, ChangeSet, Checkpoint, CheckpointSession, CheckpointStore, DiffSource,
    ReviewMode,
};
use crate::error::RiskError;
use crate::models::{Finding, ScoreReport};
use crate::plugins::{self, Plugin, ScheduleRequest, TierTimeouts};
use crate::rules;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Per-invocation switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Schedule plugins but do not execute any.
    pub dry_run: bool,
}

/// Result of one analysis.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// The change set after include/exclude filtering.
    pub changes: Arc<ChangeSet>,
    pub report: ScoreReport,
}

/// Scores diffs against one resolved configuration.
pub struct Engine {
    config: Arc<ResolvedConfig>,
    plugins: Vec<Arc<dyn Plugin>>,
    timeouts: TierTimeouts,
}

impl Engine {
    /// Create an engine with the plugins the configuration asks for.
    pub fn new(config: ResolvedConfig) -> Result<Self, RiskError> {
        let plugins = plugins::registry(config.plugins.include_builtin);
        Self::with_plugins(config, plugins)
    }

    /// Create an engine with an explicit plugin set.
    pub fn with_plugins(
        config: ResolvedConfig,
        plugins: Vec<Arc<dyn Plugin>>,
    ) -> Result<Self, RiskError> {
        config.validate_plugins(plugins.iter().map(|p| p.descriptor().id))?;
        Ok(Self {
            config: Arc::new(config),
            plugins,
            timeouts: TierTimeouts::default(),
        })
    }

    pub fn with_timeouts(mut self, timeouts: TierTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Score a unified diff.
    pub async fn analyze(
        &self,
        diff_text: &str,
        options: RunOptions,
    ) -> Result<Analysis, RiskError> {
        let parsed = diff::parse(diff_text)?;
        let changes = Arc::new(parsed.filtered(|f| self.config.is_in_scope(&f.path)));
        let (added, removed) = changes.totals();
        info!(
            "Analyzing {} files (+{} -{}), {} filtered out",
            changes.len(),
            added,
            removed,
            parsed.len() - changes.len()
        );

        let mut findings = rules::evaluate(&changes, &self.config);

        let request = ScheduleRequest::from_config(&self.config, options.dry_run);
        let decisions = plugins::schedule(&self.plugins, &request);
        if !options.dry_run {
            findings.extend(
                plugins::execute(
                    &self.plugins,
                    &decisions,
                    Arc::clone(&changes),
                    Arc::clone(&self.config),
                    self.timeouts,
                )
                .await,
            );
        }

        let report = aggregate(
            dedupe(findings),
            &self.config.profile,
            AggregateOptions {
                threshold: self.config.fail_above,
                docs_floor: self.config.docs_floor,
            },
            decisions,
        );
        info!(
            "Risk score {} ({}), {} findings",
            report.score,
            report.level(),
            report.findings.len()
        );

        Ok(Analysis { changes, report })
    }

    /// Review a range, advancing the checkpoint only after a successful analysis.
    ///
    /// `current_marker` identifies the state under review and becomes the
    /// next checkpoint. The checkpoint stays untouched on any error and
    /// during dry runs.
    pub async fn review<S, D>(
        &self,
        mode: &ReviewMode,
        store: &S,
        source: &D,
        current_marker: &str,
        options: RunOptions,
    ) -> Result<Analysis, RiskError>
    where
        S: CheckpointStore + ?Sized,
        D: DiffSource + ?Sized,
    {
        let session = CheckpointSession::begin(store)?;
        let range = resolve_range(mode, session.previous(), current_marker, self.config.seed);
        debug!("Review range {:?} -> {}", range.base, range.head);

        let text = source
            .diff(&range)
            .map_err(|e| RiskError::Source(format!("{:#}", e)))?;
        let analysis = self.analyze(&text, options).await?;

        if mode == &ReviewMode::SinceCheckpoint && !options.dry_run {
            session.commit(Checkpoint::now(current_marker))?;
        }
        Ok(analysis)
    }
}

/// Drop repeated findings, keeping the first of each (rule, scope, evidence).
fn dedupe(findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    findings
        .into_iter()
        .filter(|f| {
            let (rule, scope, evidence) = f.key();
            seen.insert((rule.to_string(), scope.to_string(), evidence.to_string()))
        })
        .collect()
}
