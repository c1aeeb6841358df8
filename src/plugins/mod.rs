//! Budgeted analyzer plugins.
//!
//! Scheduling is a pure function of the declared descriptors and the request:
//! admission uses estimated durations only, never measured runtime, so the
//! same inputs always produce the same schedule. Admitted plugins then run
//! concurrently on the blocking pool with a hard per-tier timeout, and their
//! findings are collected in schedule order.
//!
//! A timeout abandons the plugin, it does not stop it: blocking-pool threads
//! cannot be cancelled, so the evaluation keeps running detached until it
//! returns or the runtime shuts down. Its late result is discarded. The
//! binary exits through `std::process::exit`, which does not wait for such
//! threads; an embedding runtime that is dropped normally does.

pub mod builtin;

use crate::config::{Mode, ResolvedConfig};
use crate::diff::ChangeSet;
use crate::error::PluginFault;
use crate::models::{Category, Finding};
use futures::future::join_all;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Declared relative execution expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CostTier {
    Cheap,
    Moderate,
    Expensive,
}

impl CostTier {
    /// Whether `mode` allows this tier at all.
    pub fn eligible(self, mode: Mode) -> bool {
        match mode {
            Mode::Fast => self == CostTier::Cheap,
            Mode::Standard => self <= CostTier::Moderate,
            Mode::Deep => true,
        }
    }

    /// Hard execution limit for a plugin of this tier.
    pub fn timeout(self) -> Duration {
        match self {
            CostTier::Cheap => Duration::from_secs(2),
            CostTier::Moderate => Duration::from_secs(8),
            CostTier::Expensive => Duration::from_secs(60),
        }
    }
}

impl fmt::Display for CostTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostTier::Cheap => write!(f, "cheap"),
            CostTier::Moderate => write!(f, "moderate"),
            CostTier::Expensive => write!(f, "expensive"),
        }
    }
}

/// Static metadata a plugin declares up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginDescriptor {
    pub id: &'static str,
    /// Rule id every finding of this plugin must carry.
    pub rule_id: &'static str,
    pub category: Category,
    pub tier: CostTier,
    pub estimated_ms: u64,
    pub description: &'static str,
}

/// Capability contract for analyzer plugins.
///
/// `evaluate` must be a pure function of its inputs. It may be abandoned
/// after its tier timeout while still running, so it must not hold locks or
/// leave shared state half-written.
pub trait Plugin: Send + Sync {
    fn descriptor(&self) -> &PluginDescriptor;

    fn evaluate(
        &self,
        changes: &ChangeSet,
        config: &ResolvedConfig,
    ) -> anyhow::Result<Vec<Finding>>;
}

/// Plugins known to this build.
pub fn registry(include_builtin: bool) -> Vec<Arc<dyn Plugin>> {
    if include_builtin {
        builtin::all()
    } else {
        Vec::new()
    }
}

/// Why a plugin did not run (or would not have, for forced admissions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    PackInactive,
    DisabledByMode,
    OverBudget,
    AdmissionStopped,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Disabled => "disabled",
            SkipReason::PackInactive => "pack inactive",
            SkipReason::DisabledByMode => "disabled by mode",
            SkipReason::OverBudget => "over budget",
            SkipReason::AdmissionStopped => "over budget (admission stopped)",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SkipReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Outcome of scheduling one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleDecision {
    pub plugin_id: &'static str,
    pub tier: CostTier,
    pub estimated_ms: u64,
    pub run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
    /// Admitted through the explicit enable list.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub forced: bool,
    /// For forced admissions: the reason it would otherwise have been skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub would_skip: Option<SkipReason>,
}

/// Inputs to [`schedule`].
#[derive(Debug, Clone)]
pub struct ScheduleRequest<'a> {
    pub mode: Mode,
    pub budget_ms: u64,
    pub enable: &'a [String],
    pub disable: &'a [String],
    pub active_packs: &'a BTreeSet<Category>,
    /// Plan only; nothing executes.
    pub dry_run: bool,
}

impl<'a> ScheduleRequest<'a> {
    pub fn from_config(config: &'a ResolvedConfig, dry_run: bool) -> Self {
        Self {
            mode: config.objective.mode,
            budget_ms: config.objective.budget_ms(),
            enable: &config.plugins.enable,
            disable: &config.plugins.disable,
            active_packs: &config.profile.packs,
            dry_run,
        }
    }
}

/// Decide which plugins run. Decisions come back sorted by (tier, id).
pub fn schedule(
    plugins: &[Arc<dyn Plugin>],
    request: &ScheduleRequest<'_>,
) -> Vec<ScheduleDecision> {
    let mut ordered: Vec<&PluginDescriptor> = plugins.iter().map(|p| p.descriptor()).collect();
    ordered.sort_by(|a, b| (a.tier, a.id).cmp(&(b.tier, b.id)));

    let mut spent_ms: u64 = 0;
    let mut stopped = false;
    let mut decisions = Vec::with_capacity(ordered.len());

    for descriptor in ordered {
        let id = descriptor.id.to_string();
        let mut decision = ScheduleDecision {
            plugin_id: descriptor.id,
            tier: descriptor.tier,
            estimated_ms: descriptor.estimated_ms,
            run: false,
            reason: None,
            forced: false,
            would_skip: None,
        };

        let gate = if !request.active_packs.contains(&descriptor.category) {
            Some(SkipReason::PackInactive)
        } else if !descriptor.tier.eligible(request.mode) {
            Some(SkipReason::DisabledByMode)
        } else {
            None
        };

        if request.disable.contains(&id) {
            decision.reason = Some(SkipReason::Disabled);
        } else if request.enable.contains(&id) {
            decision.run = true;
            decision.forced = true;
            decision.would_skip = gate.or_else(|| {
                if stopped {
                    Some(SkipReason::AdmissionStopped)
                } else if spent_ms + descriptor.estimated_ms > request.budget_ms {
                    Some(SkipReason::OverBudget)
                } else {
                    None
                }
            });
        } else if let Some(reason) = gate {
            decision.reason = Some(reason);
        } else if stopped {
            decision.reason = Some(SkipReason::AdmissionStopped);
        } else if spent_ms + descriptor.estimated_ms > request.budget_ms {
            decision.reason = Some(SkipReason::OverBudget);
            stopped = true;
        } else {
            spent_ms += descriptor.estimated_ms;
            decision.run = true;
        }

        debug!(
            "Plugin {} ({}, {} ms): run={} reason={:?}",
            descriptor.id, descriptor.tier, descriptor.estimated_ms, decision.run, decision.reason
        );
        decisions.push(decision);
    }

    info!(
        "Scheduled {} of {} plugins ({} of {} ms budget){}",
        decisions.iter().filter(|d| d.run).count(),
        decisions.len(),
        spent_ms,
        request.budget_ms,
        if request.dry_run { ", dry run" } else { "" }
    );
    decisions
}

/// Per-tier execution limits.
#[derive(Debug, Clone, Copy)]
pub struct TierTimeouts {
    pub cheap: Duration,
    pub moderate: Duration,
    pub expensive: Duration,
}

impl Default for TierTimeouts {
    fn default() -> Self {
        Self {
            cheap: CostTier::Cheap.timeout(),
            moderate: CostTier::Moderate.timeout(),
            expensive: CostTier::Expensive.timeout(),
        }
    }
}

impl TierTimeouts {
    pub fn for_tier(&self, tier: CostTier) -> Duration {
        match tier {
            CostTier::Cheap => self.cheap,
            CostTier::Moderate => self.moderate,
            CostTier::Expensive => self.expensive,
        }
    }
}

/// Run every admitted plugin and collect findings in schedule order.
pub async fn execute(
    plugins: &[Arc<dyn Plugin>],
    decisions: &[ScheduleDecision],
    changes: Arc<ChangeSet>,
    config: Arc<ResolvedConfig>,
    timeouts: TierTimeouts,
) -> Vec<Finding> {
    let tasks = decisions
        .iter()
        .filter(|decision| decision.run)
        .filter_map(|decision| {
            plugins
                .iter()
                .find(|p| p.descriptor().id == decision.plugin_id)
        })
        .map(|plugin| {
            let timeout = timeouts.for_tier(plugin.descriptor().tier);
            run_one(Arc::clone(plugin), Arc::clone(&changes), Arc::clone(&config), timeout)
        });

    join_all(tasks).await.into_iter().flatten().collect()
}

async fn run_one(
    plugin: Arc<dyn Plugin>,
    changes: Arc<ChangeSet>,
    config: Arc<ResolvedConfig>,
    timeout: Duration,
) -> Vec<Finding> {
    let descriptor = plugin.descriptor().clone();
    let handle = tokio::task::spawn_blocking(move || plugin.evaluate(&changes, &config));

    let outcome = match tokio::time::timeout(timeout, handle).await {
        Err(_) => Err(PluginFault::TimedOut(timeout.as_millis() as u64)),
        Ok(Err(join)) if join.is_panic() => Err(PluginFault::Panicked),
        Ok(Err(join)) => Err(PluginFault::Failed(join.to_string())),
        Ok(Ok(Err(e))) => Err(PluginFault::Failed(format!("{:#}", e))),
        Ok(Ok(Ok(findings))) => match findings.iter().find(|f| f.rule_id != descriptor.rule_id) {
            Some(foreign) => Err(PluginFault::ForeignRuleId(foreign.rule_id.clone())),
            None => Ok(findings),
        },
    };

    match outcome {
        Ok(findings) => {
            debug!("Plugin {} produced {} findings", descriptor.id, findings.len());
            findings
        }
        Err(fault) => {
            warn!("Plugin {} faulted: {}", descriptor.id, fault);
            vec![fault_finding(&descriptor, &fault)]
        }
    }
}

/// Zero-point diagnostic recorded in place of a faulted plugin's findings.
pub fn fault_finding(descriptor: &PluginDescriptor, fault: &PluginFault) -> Finding {
    Finding::global(
        descriptor.rule_id,
        Category::Quality,
        0,
        "Plugin fault; its analysis is missing from this run.",
        format!("{}: {}", descriptor.id, fault),
    )
}
