//! Plugins shipped with the binary.

use super::{CostTier, Plugin, PluginDescriptor};
use crate::config::ResolvedConfig;
use crate::diff::{ChangeSet, FileChange, LineKind};
use crate::models::{clip_evidence, Category, Finding};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Every built-in plugin, in registration order.
pub fn all() -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(DeferredWorkMarkers),
        Arc::new(CrossLayerTouchpoints),
        Arc::new(NetworkExposureProbe),
    ]
}

/// Added lines whose lowercase text contains any of `tokens`, clipped.
fn added_hits(file: &FileChange, tokens: &[&str]) -> Vec<String> {
    file.lines_of(LineKind::Added)
        .filter(|line| {
            let lowered = line.text.to_lowercase();
            tokens.iter().any(|t| lowered.contains(t))
        })
        .map(|line| clip_evidence(&line.text, 80))
        .collect()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Flags TODO/FIXME-style markers added outside tests and docs.
pub struct DeferredWorkMarkers;

static DEFERRED_WORK_MARKERS: PluginDescriptor = PluginDescriptor {
    id: "deferred_work_markers",
    rule_id: "plugin_deferred_work_markers",
    category: Category::Logic,
    tier: CostTier::Cheap,
    estimated_ms: 1_000,
    description: "Unfinished-work markers added to non-test code",
};

const DEFERRED_TOKENS: &[&str] = &[
    "todo",
    "fixme",
    "xxx",
    "notimplemented",
    "not implemented",
    "unimplemented",
];

impl Plugin for DeferredWorkMarkers {
    fn descriptor(&self) -> &PluginDescriptor {
        &DEFERRED_WORK_MARKERS
    }

    fn evaluate(
        &self,
        changes: &ChangeSet,
        config: &ResolvedConfig,
    ) -> anyhow::Result<Vec<Finding>> {
        let d = self.descriptor();
        let mut findings = Vec::new();
        for file in changes.files() {
            if config.is_test_path(&file.path) || config.is_docs_path(&file.path) {
                continue;
            }
            let markers: BTreeSet<String> =
                added_hits(file, DEFERRED_TOKENS).into_iter().collect();
            if markers.is_empty() {
                continue;
            }
            let shown: Vec<&str> = markers.iter().take(3).map(String::as_str).collect();
            findings.push(Finding::file(
                d.rule_id,
                d.category,
                (4 + markers.len()).min(10) as u32,
                &file.path,
                "Deferred implementation marker added.",
                format!("{} adds TODO/FIXME-style markers: {}", file.path, shown.join(", ")),
            ));
        }
        Ok(findings)
    }
}

/// Backend or schema changes with no consumer-side or contract-test evidence.
pub struct CrossLayerTouchpoints;

static CROSS_LAYER_TOUCHPOINTS: PluginDescriptor = PluginDescriptor {
    id: "cross_layer_touchpoints",
    rule_id: "plugin_cross_layer_touchpoints",
    category: Category::Integration,
    tier: CostTier::Moderate,
    estimated_ms: 4_000,
    description: "Backend or schema changes without client or contract-test updates",
};

const BACKEND_MARKERS: &[&str] = &[
    "/api/",
    "/route",
    "/controller",
    "/service",
    "/handler",
    "/server",
    "/resolver",
];
const CLIENT_MARKERS: &[&str] = &[
    "/frontend/",
    "/web/",
    "/ui/",
    "/mobile/",
    "/ios/",
    "/android/",
    "/client/",
];
const SCHEMA_MARKERS: &[&str] = &["openapi", "swagger", "graphql", "/schema", ".proto", ".avsc"];
const CONTRACT_TEST_MARKERS: &[&str] = &["contract", "integration", "e2e", "api"];

impl Plugin for CrossLayerTouchpoints {
    fn descriptor(&self) -> &PluginDescriptor {
        &CROSS_LAYER_TOUCHPOINTS
    }

    fn evaluate(
        &self,
        changes: &ChangeSet,
        config: &ResolvedConfig,
    ) -> anyhow::Result<Vec<Finding>> {
        let d = self.descriptor();
        let mut backend = 0;
        let mut client_changed = false;
        let mut contract_tests_changed = false;
        let mut schema_changed = false;

        for path in changes.paths() {
            // Leading slash so top-level directories match the markers too.
            let lowered = format!("/{}", path.to_lowercase());
            let is_test = config.is_test_path(path);
            if !is_test && !config.is_docs_path(path) && contains_any(&lowered, BACKEND_MARKERS) {
                backend += 1;
            }
            client_changed |= contains_any(&lowered, CLIENT_MARKERS);
            contract_tests_changed |= is_test && contains_any(&lowered, CONTRACT_TEST_MARKERS);
            schema_changed |= contains_any(&lowered, SCHEMA_MARKERS);
        }

        let mut findings = Vec::new();
        if client_changed || contract_tests_changed {
            return Ok(findings);
        }
        if backend > 0 {
            findings.push(Finding::global(
                d.rule_id,
                d.category,
                9,
                "Backend touchpoints changed without consumer-side evidence.",
                format!(
                    "{} backend path(s) changed, but no client/contract-test changes detected",
                    backend
                ),
            ));
        }
        if schema_changed {
            findings.push(Finding::global(
                d.rule_id,
                d.category,
                10,
                "Schema/contract surface changed without downstream verification.",
                "schema-like paths changed with no client or contract-test updates",
            ));
        }
        Ok(findings)
    }
}

/// Added lines that widen network exposure or disable verification.
pub struct NetworkExposureProbe;

static NETWORK_EXPOSURE_PROBE: PluginDescriptor = PluginDescriptor {
    id: "network_exposure_probe",
    rule_id: "plugin_network_exposure_probe",
    category: Category::Security,
    tier: CostTier::Moderate,
    estimated_ms: 3_000,
    description: "Wildcard binds, permissive CORS and disabled TLS verification",
};

const EXPOSURE_TOKENS: &[&str] = &[
    "0.0.0.0",
    "allow_origins=[\"*\"]",
    "access-control-allow-origin: *",
    "verify=false",
    "insecure_skip_verify",
    "--allow-all",
];

impl Plugin for NetworkExposureProbe {
    fn descriptor(&self) -> &PluginDescriptor {
        &NETWORK_EXPOSURE_PROBE
    }

    fn evaluate(&self, changes: &ChangeSet, _: &ResolvedConfig) -> anyhow::Result<Vec<Finding>> {
        let d = self.descriptor();
        let findings = changes
            .files()
            .iter()
            .filter_map(|file| {
                let hits = added_hits(file, EXPOSURE_TOKENS);
                if hits.is_empty() {
                    return None;
                }
                let shown: Vec<&str> = hits.iter().take(3).map(String::as_str).collect();
                Some(Finding::file(
                    d.rule_id,
                    d.category,
                    (6 + hits.len()).min(10) as u32,
                    &file.path,
                    "Potential network-exposure pattern introduced.",
                    format!("{}: {}", file.path, shown.join(", ")),
                ))
            })
            .collect();
        Ok(findings)
    }
}
