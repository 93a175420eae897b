//! Entitlement Configuration
//!
//! ```toml
//! default_plan = "free"
//! allow_overage = true
//!
//! [[plans]]
//! id = "free"
//! features = [
//!     { dimension = "seats", value = 5 },
//!     { dimension = "apiCalls", value = 10000, policy = "sum" },
//! ]
//! ```
//!
//! Leaving out `plans` selects the built-in catalog.

use crate::catalog::{PlanCatalog, DEFAULT_PLAN};
use crate::error::{EntitlementError, EntitlementResult};
use crate::model::{Dimension, FeatureEntry, FeatureValue, MergePolicy, Plan, PlanId};
use crate::usage::OveragePolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Entitlement configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitlementConfig {
    /// Plan for spaces without a purchased base plan
    pub default_plan: PlanId,
    /// Overage default when neither plan nor caller decides
    pub allow_overage: bool,
    /// Plan definitions; empty selects the built-in catalog
    pub plans: Vec<PlanConfig>,
}

/// One `[[plans]]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Plan ID
    pub id: PlanId,
    /// Feature lines
    #[serde(default)]
    pub features: Vec<FeatureConfig>,
}

/// One feature line of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Dimension name
    pub dimension: Dimension,
    /// `true`/`false` for flags; an integer for limits, `-1` for unbounded
    pub value: FeatureValue,
    /// Merge policy; inferred from the value kind when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<MergePolicy>,
}

impl Default for EntitlementConfig {
    fn default() -> Self {
        Self {
            default_plan: PlanId::from_static(DEFAULT_PLAN),
            allow_overage: true,
            plans: Vec::new(),
        }
    }
}

impl EntitlementConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> EntitlementResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| EntitlementError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), plans = config.plans.len(), "entitlement config loaded");
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> EntitlementResult<Self> {
        toml::from_str(content).map_err(|e| EntitlementError::Config(e.to_string()))
    }

    /// Caller-side overage default
    pub fn overage_policy(&self) -> OveragePolicy {
        OveragePolicy { allow_overage: self.allow_overage }
    }

    /// Build and validate the plan catalog
    pub fn build_catalog(&self) -> EntitlementResult<PlanCatalog> {
        if self.plans.is_empty() {
            return PlanCatalog::standard().with_default_plan(self.default_plan.clone());
        }

        let plans = self
            .plans
            .iter()
            .map(PlanConfig::to_plan)
            .collect::<EntitlementResult<Vec<_>>>()?;
        PlanCatalog::new(plans, self.default_plan.clone())
    }
}

impl PlanConfig {
    fn to_plan(&self) -> EntitlementResult<Plan> {
        let features = self
            .features
            .iter()
            .map(|f| {
                let entry = FeatureEntry::new(f.dimension.clone(), f.value);
                match f.policy {
                    Some(policy) => entry.with_policy(policy),
                    None => entry,
                }
            })
            .collect();
        Plan::new(self.id.clone(), features)
    }
}
