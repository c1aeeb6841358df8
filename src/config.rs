//! Configuration layers and their resolution.
//!
//! Three layers feed a run: the built-in defaults, at most one file layer
//! (an explicit path or the first of `.diffrisk.toml`, `diffrisk.toml`, or the
//! `diffrisk` metadata table of `Cargo.toml`), and the override layer built
//! from command-line flags. [`resolve`] merges them in one pure pass and
//! validates the result once; rules only ever see a [`ResolvedConfig`].

use crate::analysis::objective::{ObjectiveName, ObjectiveProfile};
use crate::diff::SeedPolicy;
use crate::error::ConfigError;
use crate::models::Category;
use crate::rules::RuleKind;
use globset::{Glob, GlobMatcher, GlobSet, GlobSetBuilder};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Config file names searched in a repository root, in order.
pub const CONFIG_FILENAMES: [&str; 2] = [".diffrisk.toml", "diffrisk.toml"];

/// Profile arrays a layer may name in `profile.clear`.
const CLEARABLE: [&str; 6] = [
    "critical",
    "sensitive",
    "unsafe_added",
    "required_for",
    "test_globs",
    "docs_globs",
];

/// Output rendering selected for the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
    Handoff,
}

/// How much diff text the handoff payload carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DiffSelection {
    #[default]
    Full,
    RiskyOnly,
    None,
}

/// Analysis depth; gates which plugin cost tiers may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Fast,
    #[default]
    Standard,
    Deep,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Fast => write!(f, "fast"),
            Mode::Standard => write!(f, "standard"),
            Mode::Deep => write!(f, "deep"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" => Ok(Mode::Fast),
            "standard" => Ok(Mode::Standard),
            "deep" => Ok(Mode::Deep),
            other => Err(format!("unknown mode `{}` (expected fast, standard or deep)", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Layers
// ---------------------------------------------------------------------------

/// One configuration layer as written in TOML. Every field is optional so
/// that "not set" and "set to the default" stay distinguishable while merging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigLayer {
    pub fail_above: Option<i64>,
    pub format: Option<OutputFormat>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub rules: ListSection,
    pub objective: ObjectiveSection,
    pub plugins: PluginsSection,
    pub profile: ProfileSection,
    pub handoff: HandoffSection,
    pub review: ReviewSection,
    pub scoring: ScoringSection,
}

/// An enable/disable pair. Each list replaces the lower layer's list wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListSection {
    pub enable: Option<Vec<String>>,
    pub disable: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveSection {
    pub name: Option<String>,
    pub mode: Option<String>,
    pub budget_seconds: Option<f64>,
    pub packs: ListSection,
    pub weights: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsSection {
    pub include_builtin: Option<bool>,
    pub enable: Option<Vec<String>>,
    pub disable: Option<Vec<String>>,
}

/// Repository-specific signals. Arrays concatenate across layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSection {
    pub paths: PathsSection,
    pub patterns: PatternsSection,
    pub tests: TestsSection,
    pub docs_globs: Vec<String>,
    /// Arrays for which everything inherited from lower layers is dropped.
    pub clear: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub critical: Vec<PathSignal>,
    pub sensitive: Vec<PathSignal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternsSection {
    pub unsafe_added: Vec<PatternSignal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestsSection {
    pub required_for: Vec<String>,
    pub test_globs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSignal {
    pub glob: String,
    pub points: i64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSignal {
    pub regex: String,
    pub points: i64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffSection {
    pub max_bytes: Option<usize>,
    pub redact_secrets: Option<bool>,
    pub target_score: Option<i64>,
    pub include_diff: Option<DiffSelection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewSection {
    pub seed: Option<SeedPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSection {
    pub docs_floor: Option<i64>,
}

fn path_signal(glob: &str, points: i64, reason: &str) -> PathSignal {
    PathSignal {
        glob: glob.to_string(),
        points,
        reason: reason.to_string(),
    }
}

fn pattern_signal(regex: &str, points: i64, reason: &str) -> PatternSignal {
    PatternSignal {
        regex: regex.to_string(),
        points,
        reason: reason.to_string(),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl ConfigLayer {
    /// The built-in defaults layer.
    pub fn defaults() -> Self {
        Self {
            fail_above: None,
            format: Some(OutputFormat::Markdown),
            include: None,
            exclude: None,
            rules: ListSection::default(),
            objective: ObjectiveSection {
                name: Some(ObjectiveName::FeatureOneshot.to_string()),
                mode: Some(Mode::Standard.to_string()),
                budget_seconds: Some(15.0),
                packs: ListSection::default(),
                weights: BTreeMap::new(),
            },
            plugins: PluginsSection {
                include_builtin: Some(true),
                enable: None,
                disable: None,
            },
            profile: ProfileSection {
                paths: PathsSection {
                    critical: vec![
                        path_signal(
                            "*{auth,permission,token,secret,oauth,crypto}*",
                            16,
                            "Security-sensitive code path modified.",
                        ),
                        path_signal(
                            "*{payment,billing,invoice,checkout,ledger}*",
                            14,
                            "Financial transaction path modified.",
                        ),
                        path_signal(
                            "*{migrations/,alembic/,schema,.sql}*",
                            13,
                            "Schema or migration surface modified.",
                        ),
                        path_signal(
                            "*{.github/workflows/,Dockerfile,dockerfile,terraform,helm/,k8s/,deploy,infra/}*",
                            10,
                            "CI/CD or deployment surface modified.",
                        ),
                    ],
                    sensitive: Vec::new(),
                },
                patterns: PatternsSection {
                    unsafe_added: vec![
                        pattern_signal(r"\beval\s*\(", 12, "Dynamic code evaluation added."),
                        pattern_signal(r"\bexec\s*\(", 10, "Dynamic execution added."),
                        pattern_signal(r"os\.system\s*\(", 8, "Shell command execution added."),
                        pattern_signal(r"(?i)shell\s*=\s*true", 10, "Subprocess shell mode enabled."),
                        pattern_signal(r"yaml\.load\s*\(", 8, "Unsafe YAML loader added."),
                        pattern_signal(r"pickle\.loads?\s*\(", 9, "Pickle deserialization added."),
                        pattern_signal(r"\bunsafe\s*\{", 6, "Unsafe block added."),
                    ],
                },
                tests: TestsSection {
                    required_for: strings(&[
                        "*.{rs,py,js,ts,jsx,tsx,go,java,c,cpp,h,hpp,cs,rb,php,swift,kt,scala,vue,svelte}",
                    ]),
                    test_globs: strings(&[
                        "**/tests/**",
                        "**/test/**",
                        "**/test_*",
                        "**/*_test.*",
                        "**/*.test.*",
                        "**/*.spec.*",
                    ]),
                },
                docs_globs: strings(&["**/*.md", "**/*.rst", "**/*.adoc", "docs/**", "**/docs/**"]),
                clear: Vec::new(),
            },
            handoff: HandoffSection {
                max_bytes: Some(200_000),
                redact_secrets: Some(false),
                target_score: Some(30),
                include_diff: Some(DiffSelection::Full),
            },
            review: ReviewSection {
                seed: Some(SeedPolicy::Head),
            },
            scoring: ScoringSection {
                docs_floor: Some(2),
            },
        }
    }

    /// Parse a layer from TOML text; `path` is only used for error messages.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load a layer from a dedicated config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = read(path)?;
        Self::parse(&content, path)
    }
}

/// A layer together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedLayer {
    pub source: String,
    pub layer: ConfigLayer,
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Find and load the file layer for a repository.
///
/// An explicit path must exist. Otherwise the search order is the dedicated
/// file names, then the `diffrisk` metadata table in `Cargo.toml`. Returns
/// `Ok(None)` when nothing is found.
pub fn load_file_layer(
    repo_root: &Path,
    explicit: Option<&Path>,
) -> Result<Option<SourcedLayer>, ConfigError> {
    if let Some(path) = explicit {
        let resolved: PathBuf = if path.is_absolute() {
            path.to_path_buf()
        } else {
            repo_root.join(path)
        };
        if !resolved.exists() {
            return Err(ConfigError::MissingFile(resolved));
        }
        info!("Using config file {}", resolved.display());
        return Ok(Some(SourcedLayer {
            layer: ConfigLayer::load(&resolved)?,
            source: resolved.display().to_string(),
        }));
    }

    for name in CONFIG_FILENAMES {
        let candidate = repo_root.join(name);
        if candidate.exists() {
            info!("Discovered config file {}", candidate.display());
            return Ok(Some(SourcedLayer {
                layer: ConfigLayer::load(&candidate)?,
                source: candidate.display().to_string(),
            }));
        }
    }

    let manifest = repo_root.join("Cargo.toml");
    if manifest.exists() {
        if let Some(layer) = load_cargo_metadata(&manifest)? {
            info!("Using [metadata.diffrisk] from {}", manifest.display());
            return Ok(Some(SourcedLayer {
                layer,
                source: format!("{}#metadata.diffrisk", manifest.display()),
            }));
        }
    }

    debug!("No config file found under {}", repo_root.display());
    Ok(None)
}

fn load_cargo_metadata(manifest: &Path) -> Result<Option<ConfigLayer>, ConfigError> {
    let content = read(manifest)?;
    let toml_error = |source| ConfigError::Toml {
        path: manifest.to_path_buf(),
        source,
    };
    let value: toml::Value = toml::from_str(&content).map_err(toml_error)?;

    for section in ["package", "workspace"] {
        let table = value
            .get(section)
            .and_then(|s| s.get("metadata"))
            .and_then(|m| m.get("diffrisk"));
        if let Some(table) = table {
            let layer: ConfigLayer = table.clone().try_into().map_err(toml_error)?;
            return Ok(Some(layer));
        }
    }
    Ok(None)
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

fn concat<T: Clone>(lower: Vec<T>, upper: Vec<T>, cleared: bool) -> Vec<T> {
    if cleared {
        return upper;
    }
    let mut merged = lower;
    merged.extend(upper);
    merged
}

/// Merge `upper` over `lower`. Pure; neither input is observed afterwards.
pub fn merge(lower: ConfigLayer, upper: ConfigLayer) -> ConfigLayer {
    let clears = |name: &str| upper.profile.clear.iter().any(|c| c == name);
    let clear_critical = clears("critical");
    let clear_sensitive = clears("sensitive");
    let clear_unsafe = clears("unsafe_added");
    let clear_required = clears("required_for");
    let clear_tests = clears("test_globs");
    let clear_docs = clears("docs_globs");

    let mut weights = lower.objective.weights;
    weights.extend(upper.objective.weights);

    ConfigLayer {
        fail_above: upper.fail_above.or(lower.fail_above),
        format: upper.format.or(lower.format),
        include: upper.include.or(lower.include),
        exclude: upper.exclude.or(lower.exclude),
        rules: ListSection {
            enable: upper.rules.enable.or(lower.rules.enable),
            disable: upper.rules.disable.or(lower.rules.disable),
        },
        objective: ObjectiveSection {
            name: upper.objective.name.or(lower.objective.name),
            mode: upper.objective.mode.or(lower.objective.mode),
            budget_seconds: upper.objective.budget_seconds.or(lower.objective.budget_seconds),
            packs: ListSection {
                enable: upper.objective.packs.enable.or(lower.objective.packs.enable),
                disable: upper.objective.packs.disable.or(lower.objective.packs.disable),
            },
            weights,
        },
        plugins: PluginsSection {
            include_builtin: upper.plugins.include_builtin.or(lower.plugins.include_builtin),
            enable: upper.plugins.enable.or(lower.plugins.enable),
            disable: upper.plugins.disable.or(lower.plugins.disable),
        },
        profile: ProfileSection {
            paths: PathsSection {
                critical: concat(
                    lower.profile.paths.critical,
                    upper.profile.paths.critical,
                    clear_critical,
                ),
                sensitive: concat(
                    lower.profile.paths.sensitive,
                    upper.profile.paths.sensitive,
                    clear_sensitive,
                ),
            },
            patterns: PatternsSection {
                unsafe_added: concat(
                    lower.profile.patterns.unsafe_added,
                    upper.profile.patterns.unsafe_added,
                    clear_unsafe,
                ),
            },
            tests: TestsSection {
                required_for: concat(
                    lower.profile.tests.required_for,
                    upper.profile.tests.required_for,
                    clear_required,
                ),
                test_globs: concat(
                    lower.profile.tests.test_globs,
                    upper.profile.tests.test_globs,
                    clear_tests,
                ),
            },
            docs_globs: concat(
                lower.profile.docs_globs,
                upper.profile.docs_globs,
                clear_docs,
            ),
            clear: Vec::new(),
        },
        handoff: HandoffSection {
            max_bytes: upper.handoff.max_bytes.or(lower.handoff.max_bytes),
            redact_secrets: upper.handoff.redact_secrets.or(lower.handoff.redact_secrets),
            target_score: upper.handoff.target_score.or(lower.handoff.target_score),
            include_diff: upper.handoff.include_diff.or(lower.handoff.include_diff),
        },
        review: ReviewSection {
            seed: upper.review.seed.or(lower.review.seed),
        },
        scoring: ScoringSection {
            docs_floor: upper.scoring.docs_floor.or(lower.scoring.docs_floor),
        },
    }
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// A compiled list of globs; matches when any glob matches.
#[derive(Debug, Clone)]
pub struct GlobList {
    patterns: Vec<String>,
    set: GlobSet,
}

impl GlobList {
    pub fn compile(field: &str, patterns: &[String]) -> Result<Self, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(compile_glob(field, pattern)?);
        }
        let set = builder.build().map_err(|e| ConfigError::InvalidGlob {
            field: field.to_string(),
            glob: patterns.join(", "),
            reason: e.to_string(),
        })?;
        Ok(Self {
            patterns: patterns.to_vec(),
            set,
        })
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.set.is_match(path)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

fn compile_glob(field: &str, pattern: &str) -> Result<Glob, ConfigError> {
    Glob::new(pattern).map_err(|e| ConfigError::InvalidGlob {
        field: field.to_string(),
        glob: pattern.to_string(),
        reason: e.kind().to_string(),
    })
}

/// A compiled path signal.
#[derive(Debug, Clone)]
pub struct PathRule {
    pub glob: String,
    pub matcher: GlobMatcher,
    pub points: u32,
    pub reason: String,
}

/// A compiled added-line pattern.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub regex: Regex,
    pub points: u32,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ObjectiveSettings {
    pub name: ObjectiveName,
    pub mode: Mode,
    pub budget_seconds: f64,
}

impl ObjectiveSettings {
    /// Budget in whole milliseconds, the unit plugin estimates use.
    pub fn budget_ms(&self) -> u64 {
        (self.budget_seconds * 1000.0).round() as u64
    }
}

#[derive(Debug, Clone, Default)]
pub struct PluginSettings {
    pub include_builtin: bool,
    pub enable: Vec<String>,
    pub disable: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HandoffSettings {
    pub max_bytes: usize,
    pub redact_secrets: bool,
    pub target_score: u8,
    pub include_diff: DiffSelection,
}

/// Fully merged and validated configuration.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub fail_above: Option<u8>,
    pub format: OutputFormat,
    pub include: GlobList,
    pub exclude: GlobList,
    /// Explicit rule selection; `None` means "every rule of an active pack".
    pub rule_enable: Option<Vec<RuleKind>>,
    pub rule_disable: Vec<RuleKind>,
    pub critical_paths: Vec<PathRule>,
    pub sensitive_paths: Vec<PathRule>,
    pub unsafe_patterns: Vec<PatternRule>,
    pub required_for: GlobList,
    pub test_globs: GlobList,
    pub docs_globs: GlobList,
    pub objective: ObjectiveSettings,
    /// Weights and active packs after config adjustments.
    pub profile: ObjectiveProfile,
    pub plugins: PluginSettings,
    pub handoff: HandoffSettings,
    pub seed: SeedPolicy,
    pub docs_floor: u8,
    /// Where each contributing layer came from, lowest first.
    pub sources: Vec<String>,
}

impl ResolvedConfig {
    /// Resolve the built-in defaults alone.
    pub fn defaults() -> Result<Self, ConfigError> {
        resolve(ConfigLayer::defaults(), None, ConfigLayer::default())
    }

    pub fn is_test_path(&self, path: &str) -> bool {
        self.test_globs.is_match(path)
    }

    pub fn is_docs_path(&self, path: &str) -> bool {
        self.docs_globs.is_match(path)
    }

    /// Whether a path survives the include/exclude filters.
    pub fn is_in_scope(&self, path: &str) -> bool {
        let included = self.include.is_empty() || self.include.is_match(path);
        included && !self.exclude.is_match(path)
    }

    pub fn pack_active(&self, pack: Category) -> bool {
        self.profile.packs.contains(&pack)
    }

    /// Check plugin ids named in the config against the known set.
    pub fn validate_plugins<'a>(
        &self,
        known: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ConfigError> {
        let known: BTreeSet<&str> = known.into_iter().collect();
        for id in self.plugins.enable.iter().chain(&self.plugins.disable) {
            if !known.contains(id.as_str()) {
                return Err(ConfigError::UnknownPlugin(id.clone()));
            }
        }
        Ok(())
    }
}

fn check_no_conflict(
    section: &str,
    enable: &Option<Vec<String>>,
    disable: &Option<Vec<String>>,
) -> Result<(), ConfigError> {
    if let (Some(enable), Some(disable)) = (enable, disable) {
        if let Some(id) = enable.iter().find(|id| disable.contains(id)) {
            return Err(ConfigError::ConflictingOverride(format!("{}.{}", section, id)));
        }
    }
    Ok(())
}

fn check_clear_names(layer: &ConfigLayer) -> Result<(), ConfigError> {
    for name in &layer.profile.clear {
        if !CLEARABLE.contains(&name.as_str()) {
            return Err(ConfigError::invalid(
                "profile.clear",
                format!("unknown array `{}` (expected one of {})", name, CLEARABLE.join(", ")),
            ));
        }
    }
    Ok(())
}

fn score_value(field: &str, value: i64) -> Result<u8, ConfigError> {
    u8::try_from(value)
        .ok()
        .filter(|v| *v <= 100)
        .ok_or_else(|| ConfigError::invalid(field, format!("must be within 0-100 (got {})", value)))
}

fn points_value(field: &str, points: i64) -> Result<u32, ConfigError> {
    if points < 0 {
        return Err(ConfigError::NegativePoints {
            field: field.to_string(),
            points,
        });
    }
    u32::try_from(points).map_err(|_| ConfigError::invalid(field, "points out of range"))
}

fn rule_ids(ids: &[String]) -> Result<Vec<RuleKind>, ConfigError> {
    ids.iter()
        .map(|id| id.parse::<RuleKind>().map_err(|_| ConfigError::UnknownRule(id.clone())))
        .collect()
}

fn categories(field: &str, names: &[String]) -> Result<Vec<Category>, ConfigError> {
    names
        .iter()
        .map(|name| name.parse::<Category>().map_err(|e| ConfigError::invalid(field, e)))
        .collect()
}

fn compile_paths(field: &str, signals: &[PathSignal]) -> Result<Vec<PathRule>, ConfigError> {
    signals
        .iter()
        .map(|signal| {
            Ok(PathRule {
                glob: signal.glob.clone(),
                matcher: compile_glob(field, &signal.glob)?.compile_matcher(),
                points: points_value(field, signal.points)?,
                reason: signal.reason.clone(),
            })
        })
        .collect()
}

fn compile_patterns(
    field: &str,
    signals: &[PatternSignal],
) -> Result<Vec<PatternRule>, ConfigError> {
    signals
        .iter()
        .map(|signal| {
            let regex = Regex::new(&signal.regex).map_err(|e| ConfigError::InvalidRegex {
                field: field.to_string(),
                regex: signal.regex.clone(),
                reason: e.to_string(),
            })?;
            Ok(PatternRule {
                regex,
                points: points_value(field, signal.points)?,
                reason: signal.reason.clone(),
            })
        })
        .collect()
}

/// Merge `defaults < file < overrides` and validate the result.
pub fn resolve(
    defaults: ConfigLayer,
    file: Option<SourcedLayer>,
    overrides: ConfigLayer,
) -> Result<ResolvedConfig, ConfigError> {
    check_no_conflict("rules", &overrides.rules.enable, &overrides.rules.disable)?;
    check_no_conflict("plugins", &overrides.plugins.enable, &overrides.plugins.disable)?;
    check_no_conflict(
        "objective.packs",
        &overrides.objective.packs.enable,
        &overrides.objective.packs.disable,
    )?;

    let mut sources = vec!["defaults".to_string()];
    let mut merged = defaults;
    if let Some(file) = file {
        check_clear_names(&file.layer)?;
        merged = merge(merged, file.layer);
        sources.push(file.source);
    }
    check_clear_names(&overrides)?;
    if overrides != ConfigLayer::default() {
        sources.push("overrides".to_string());
    }
    let merged = merge(merged, overrides);

    let config = validate(merged, sources)?;
    debug!(
        "Resolved config: objective={} mode={} budget={}s sources={:?}",
        config.objective.name, config.objective.mode, config.objective.budget_seconds, config.sources
    );
    Ok(config)
}

fn validate(layer: ConfigLayer, sources: Vec<String>) -> Result<ResolvedConfig, ConfigError> {
    let fail_above = layer
        .fail_above
        .map(|v| score_value("fail_above", v))
        .transpose()?;

    let rule_enable = match &layer.rules.enable {
        Some(ids) => {
            let kinds = rule_ids(ids)?;
            let mut seen = BTreeSet::new();
            for kind in &kinds {
                if !seen.insert(*kind) {
                    return Err(ConfigError::DuplicateRule(kind.id().to_string()));
                }
            }
            Some(kinds)
        }
        None => None,
    };
    let rule_disable = rule_ids(layer.rules.disable.as_deref().unwrap_or(&[]))?;

    let name: ObjectiveName = layer
        .objective
        .name
        .as_deref()
        .unwrap_or("feature_oneshot")
        .parse()
        .map_err(|e: String| ConfigError::invalid("objective.name", e))?;
    let mode: Mode = layer
        .objective
        .mode
        .as_deref()
        .unwrap_or("standard")
        .parse()
        .map_err(|e: String| ConfigError::invalid("objective.mode", e))?;
    let budget_seconds = layer.objective.budget_seconds.unwrap_or(15.0);
    if !budget_seconds.is_finite() || budget_seconds <= 0.0 {
        return Err(ConfigError::invalid(
            "objective.budget_seconds",
            format!("must be > 0 (got {})", budget_seconds),
        ));
    }

    let mut weights = BTreeMap::new();
    for (key, weight) in &layer.objective.weights {
        let category: Category = key
            .parse()
            .map_err(|e: String| ConfigError::invalid("objective.weights", e))?;
        if !weight.is_finite() || *weight < 0.0 {
            return Err(ConfigError::invalid(
                "objective.weights",
                format!("weight for `{}` must be a finite non-negative number", key),
            ));
        }
        weights.insert(category, *weight);
    }
    let enable_packs = categories(
        "objective.packs.enable",
        layer.objective.packs.enable.as_deref().unwrap_or(&[]),
    )?;
    let disable_packs = categories(
        "objective.packs.disable",
        layer.objective.packs.disable.as_deref().unwrap_or(&[]),
    )?;
    let profile = ObjectiveProfile::for_name(name).adjusted(&weights, &enable_packs, &disable_packs);

    let handoff = HandoffSettings {
        max_bytes: layer.handoff.max_bytes.unwrap_or(200_000),
        redact_secrets: layer.handoff.redact_secrets.unwrap_or(false),
        target_score: score_value("handoff.target_score", layer.handoff.target_score.unwrap_or(30))?,
        include_diff: layer.handoff.include_diff.unwrap_or_default(),
    };

    Ok(ResolvedConfig {
        fail_above,
        format: layer.format.unwrap_or_default(),
        include: GlobList::compile("include", layer.include.as_deref().unwrap_or(&[]))?,
        exclude: GlobList::compile("exclude", layer.exclude.as_deref().unwrap_or(&[]))?,
        rule_enable,
        rule_disable,
        critical_paths: compile_paths("profile.paths.critical", &layer.profile.paths.critical)?,
        sensitive_paths: compile_paths("profile.paths.sensitive", &layer.profile.paths.sensitive)?,
        unsafe_patterns: compile_patterns(
            "profile.patterns.unsafe_added",
            &layer.profile.patterns.unsafe_added,
        )?,
        required_for: GlobList::compile("profile.tests.required_for", &layer.profile.tests.required_for)?,
        test_globs: GlobList::compile("profile.tests.test_globs", &layer.profile.tests.test_globs)?,
        docs_globs: GlobList::compile("profile.docs_globs", &layer.profile.docs_globs)?,
        objective: ObjectiveSettings {
            name,
            mode,
            budget_seconds,
        },
        profile,
        plugins: PluginSettings {
            include_builtin: layer.plugins.include_builtin.unwrap_or(true),
            enable: layer.plugins.enable.unwrap_or_default(),
            disable: layer.plugins.disable.unwrap_or_default(),
        },
        handoff,
        seed: layer.review.seed.unwrap_or_default(),
        docs_floor: score_value("scoring.docs_floor", layer.scoring.docs_floor.unwrap_or(2))?,
        sources,
    })
}

/// A documented starter configuration.
pub fn default_toml() -> &'static str {
    r#"# diffrisk configuration
# Fail (exit code 2) when the score is above this value.
fail_above = 40
format = "markdown"
# include = ["src/**"]
exclude = ["vendor/**"]

[objective]
name = "feature_oneshot"   # or "security_strict"
mode = "standard"          # fast | standard | deep
budget_seconds = 15

[objective.packs]
# enable = ["security"]
disable = []

[objective.weights]
# logic = 1.30
# test_adequacy = 1.35

[rules]
# enable = ["magnitude", "critical_paths", "dangerous_patterns"]
disable = []

[plugins]
include_builtin = true
enable = []
disable = []

[profile]
# Drop inherited entries for these arrays instead of appending to them.
clear = []

[profile.paths]
critical = [
  { glob = "src/payments/**", points = 20, reason = "money movement path" },
]
sensitive = [
  { glob = "infra/**", points = 10, reason = "deployment surface" },
]

[profile.patterns]
unsafe_added = [
  { regex = "\\bunwrap\\(\\)", points = 2, reason = "new unwrap call" },
]

[profile.tests]
required_for = ["src/**"]
test_globs = ["tests/**"]

[handoff]
max_bytes = 120000
redact_secrets = true
target_score = 30
include_diff = "risky-only"   # full | risky-only | none

[review]
seed = "head"                 # head | empty

[scoring]
docs_floor = 2
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(toml_content: &str) -> ConfigLayer {
        ConfigLayer::parse(toml_content, Path::new("test.toml")).unwrap()
    }

    fn file(toml_content: &str) -> Option<SourcedLayer> {
        Some(SourcedLayer {
            source: "test.toml".to_string(),
            layer: layer(toml_content),
        })
    }

    #[test]
    fn test_default_config() {
        let config = ResolvedConfig::defaults().unwrap();
        assert_eq!(config.objective.name, ObjectiveName::FeatureOneshot);
        assert_eq!(config.objective.mode, Mode::Standard);
        assert_eq!(config.objective.budget_ms(), 15_000);
        assert_eq!(config.docs_floor, 2);
        assert_eq!(config.fail_above, None);
        assert!(config.is_test_path("tests/api.rs"));
        assert!(config.is_test_path("pkg/handler_test.go"));
        assert!(config.is_docs_path("README.md"));
        assert!(config.required_for.is_match("src/lib.rs"));
        assert!(config.is_in_scope("anything/at/all.rs"));
        assert_eq!(config.sources, vec!["defaults"]);
    }

    #[test]
    fn test_minimal_and_unknown_sections_are_valid() {
        let config = resolve(
            ConfigLayer::defaults(),
            file("[future_section]\nkey = 1\n"),
            ConfigLayer::default(),
        )
        .unwrap();
        assert_eq!(config.sources, vec!["defaults", "test.toml"]);
    }

    #[test]
    fn test_profile_arrays_concatenate_unless_cleared() {
        let base = ConfigLayer::defaults().profile.paths.critical.len();
        let appended = resolve(
            ConfigLayer::defaults(),
            file(r#"
[profile.paths]
critical = [{ glob = "src/core/**", points = 20, reason = "core" }]
"#),
            ConfigLayer::default(),
        )
        .unwrap();
        assert_eq!(appended.critical_paths.len(), base + 1);
        assert_eq!(appended.critical_paths[base].glob, "src/core/**");

        let cleared = resolve(
            ConfigLayer::defaults(),
            file(r#"
[profile]
clear = ["critical"]

[profile.paths]
critical = [{ glob = "src/core/**", points = 20, reason = "core" }]
"#),
            ConfigLayer::default(),
        )
        .unwrap();
        assert_eq!(cleared.critical_paths.len(), 1);
        assert!(!cleared.unsafe_patterns.is_empty());
    }

    #[test]
    fn test_rule_lists_replace_wholesale() {
        let file_layer = file("[rules]\nenable = [\"magnitude\", \"docs_only\"]\n");
        let mut overrides = ConfigLayer::default();
        overrides.rules.enable = Some(vec!["api_surface".to_string()]);

        let config = resolve(ConfigLayer::defaults(), file_layer, overrides).unwrap();
        assert_eq!(config.rule_enable, Some(vec![RuleKind::ApiSurface]));
        assert_eq!(config.sources.last().map(String::as_str), Some("overrides"));
    }

    #[test]
    fn test_weights_merge_per_key_and_scalars_take_highest() {
        let file_layer = file(r#"
fail_above = 50
[objective]
budget_seconds = 4
[objective.weights]
logic = 2.0
security = 3.0
"#);
        let mut overrides = ConfigLayer::default();
        overrides.fail_above = Some(10);
        overrides.objective.weights.insert("security".to_string(), 0.5);

        let config = resolve(ConfigLayer::defaults(), file_layer, overrides).unwrap();
        assert_eq!(config.fail_above, Some(10));
        assert_eq!(config.objective.budget_ms(), 4_000);
        assert_eq!(config.profile.weight(Category::Logic), 2.0);
        assert_eq!(config.profile.weight(Category::Security), 0.5);
        assert_eq!(config.profile.weight(Category::Integration), 1.15);
    }

    #[test]
    fn test_conflicting_override_is_rejected() {
        let mut overrides = ConfigLayer::default();
        overrides.plugins.enable = Some(vec!["network_exposure_probe".to_string()]);
        overrides.plugins.disable = Some(vec!["network_exposure_probe".to_string()]);
        let err = resolve(ConfigLayer::defaults(), None, overrides).unwrap_err();
        assert!(matches!(err, ConfigError::ConflictingOverride(_)));
    }

    #[test]
    fn test_file_layer_disable_wins_without_error() {
        let config = resolve(
            ConfigLayer::defaults(),
            file("[rules]\nenable = [\"magnitude\"]\ndisable = [\"magnitude\"]\n"),
            ConfigLayer::default(),
        )
        .unwrap();
        assert_eq!(config.rule_disable, vec![RuleKind::Magnitude]);
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            ("[rules]\nenable = [\"nope\"]\n", "unknown rule"),
            ("[rules]\nenable = [\"magnitude\", \"magnitude\"]\n", "more than once"),
            ("[objective]\nname = \"speedrun\"\n", "objective.name"),
            ("[objective]\nmode = \"turbo\"\n", "objective.mode"),
            ("[objective]\nbudget_seconds = 0\n", "budget_seconds"),
            ("[objective.packs]\ndisable = [\"style\"]\n", "objective.packs.disable"),
            ("[objective.weights]\nlogic = -1.0\n", "objective.weights"),
            ("[objective.weights]\nstyle = 1.0\n", "objective.weights"),
            ("fail_above = 101\n", "fail_above"),
            ("[profile]\nclear = [\"everything\"]\n", "profile.clear"),
            (
                "[profile.paths]\ncritical = [{ glob = \"src/[\", points = 1 }]\n",
                "invalid glob",
            ),
            (
                "[profile.patterns]\nunsafe_added = [{ regex = \"(\", points = 1 }]\n",
                "invalid regex",
            ),
            (
                "[profile.paths]\nsensitive = [{ glob = \"src/**\", points = -3 }]\n",
                "must not be negative",
            ),
        ];
        for (content, expected) in cases {
            let err = resolve(ConfigLayer::defaults(), file(content), ConfigLayer::default())
                .unwrap_err();
            assert!(
                err.to_string().contains(expected),
                "{:?} -> {} (expected `{}`)",
                content,
                err,
                expected
            );
        }
    }

    #[test]
    fn test_invalid_toml_names_file() {
        let err = ConfigLayer::parse("fail_above = [", Path::new("broken.toml")).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_file_discovery_order() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_file_layer(dir.path(), None).unwrap().is_none());

        std::fs::write(
            dir.path().join("Cargo.toml"),
            "[package]\nname = \"x\"\n\n[package.metadata.diffrisk]\nfail_above = 70\n",
        )
        .unwrap();
        let found = load_file_layer(dir.path(), None).unwrap().unwrap();
        assert_eq!(found.layer.fail_above, Some(70));
        assert!(found.source.ends_with("#metadata.diffrisk"));

        std::fs::write(dir.path().join("diffrisk.toml"), "fail_above = 60\n").unwrap();
        let found = load_file_layer(dir.path(), None).unwrap().unwrap();
        assert_eq!(found.layer.fail_above, Some(60));

        std::fs::write(dir.path().join(".diffrisk.toml"), "fail_above = 50\n").unwrap();
        let found = load_file_layer(dir.path(), None).unwrap().unwrap();
        assert_eq!(found.layer.fail_above, Some(50));

        let missing = load_file_layer(dir.path(), Some(Path::new("other.toml"))).unwrap_err();
        assert!(matches!(missing, ConfigError::MissingFile(_)));
    }

    #[test]
    fn test_plugin_ids_checked_against_known_set() {
        let mut overrides = ConfigLayer::default();
        overrides.plugins.enable = Some(vec!["ghost".to_string()]);
        let config = resolve(ConfigLayer::defaults(), None, overrides).unwrap();
        assert!(config.validate_plugins(["deferred_work_markers"]).is_err());
        assert!(ResolvedConfig::defaults()
            .unwrap()
            .validate_plugins(["deferred_work_markers"])
            .is_ok());
    }

    #[test]
    fn test_default_toml_resolves() {
        let template = default_toml();
        assert!(template.contains("[objective]"));
        let config = resolve(ConfigLayer::defaults(), file(template), ConfigLayer::default())
            .unwrap();
        assert_eq!(config.fail_above, Some(40));
        assert_eq!(config.handoff.include_diff, DiffSelection::RiskyOnly);
        assert!(config.handoff.redact_secrets);
        assert!(!config.is_in_scope("vendor/lib.rs"));
    }
}
