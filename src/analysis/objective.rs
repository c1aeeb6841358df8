//! Objective profiles: category weights and default pack enablement.

use crate::models::Category;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Built-in objective names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveName {
    /// Land a feature in one pass; tests and logic weigh most.
    FeatureOneshot,
    /// Security review; security and integration weigh most.
    SecurityStrict,
}

impl ObjectiveName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectiveName::FeatureOneshot => "feature_oneshot",
            ObjectiveName::SecurityStrict => "security_strict",
        }
    }
}

impl fmt::Display for ObjectiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectiveName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "feature_oneshot" => Ok(ObjectiveName::FeatureOneshot),
            "security_strict" => Ok(ObjectiveName::SecurityStrict),
            other => Err(format!(
                "unknown objective `{}` (expected feature_oneshot or security_strict)",
                other
            )),
        }
    }
}

/// Weight table plus the packs a run evaluates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectiveProfile {
    pub name: ObjectiveName,
    pub weights: BTreeMap<Category, f64>,
    pub packs: BTreeSet<Category>,
}

impl ObjectiveProfile {
    pub fn for_name(name: ObjectiveName) -> Self {
        use Category::*;
        let (table, packs): ([f64; 6], BTreeSet<Category>) = match name {
            ObjectiveName::FeatureOneshot => {
                ([1.30, 1.15, 1.35, 0.60, 1.00, 1.00], Category::ALL.into_iter().collect())
            }
            ObjectiveName::SecurityStrict => (
                [1.00, 1.20, 1.00, 1.60, 0.80, 1.20],
                Category::ALL.into_iter().filter(|c| *c != Quality).collect(),
            ),
        };
        let weights = [Logic, Integration, TestAdequacy, Security, Quality, Profile]
            .into_iter()
            .zip(table)
            .collect();
        Self {
            name,
            weights,
            packs,
        }
    }

    /// Apply per-key weight overrides and pack toggles. Disable wins over enable.
    pub fn adjusted(
        mut self,
        weights: &BTreeMap<Category, f64>,
        enable: &[Category],
        disable: &[Category],
    ) -> Self {
        self.weights.extend(weights.iter().map(|(c, w)| (*c, *w)));
        self.packs.extend(enable.iter().copied());
        for pack in disable {
            self.packs.remove(pack);
        }
        self
    }

    pub fn weight(&self, category: Category) -> f64 {
        self.weights.get(&category).copied().unwrap_or(1.0)
    }
}
