//! Plan Catalog
//!
//! Registered plans and the features each contributes. The catalog is
//! validated once when it is assembled; afterwards it is a read-only lookup
//! table that can be shared across threads.

use crate::config::EntitlementConfig;
use crate::error::{EntitlementError, EntitlementResult};
use crate::model::{Dimension, FeatureEntry, Limit, MergePolicy, Plan, PlanId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const GIB: u64 = 1024 * 1024 * 1024;

/// Plan id every space falls back to when it has no purchased base plan.
pub const DEFAULT_PLAN: &str = "free";

/// Plan catalog
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: HashMap<PlanId, Arc<Plan>>,
    default_plan: PlanId,
}

impl PlanCatalog {
    /// Assemble a catalog.
    ///
    /// Fails on duplicate plan ids, on a default plan that is not part of the
    /// catalog, and on any dimension that two plans merge differently.
    pub fn new(plans: Vec<Plan>, default_plan: PlanId) -> EntitlementResult<Self> {
        let mut policies: HashMap<&Dimension, MergePolicy> = HashMap::new();
        for plan in &plans {
            for entry in plan.features() {
                match policies.get(&entry.dimension) {
                    Some(expected) if *expected != entry.policy => {
                        return Err(EntitlementError::ConflictingPolicy {
                            dimension: entry.dimension.clone(),
                            plan_id: plan.id().clone(),
                            expected: *expected,
                            found: entry.policy,
                        });
                    }
                    Some(_) => {}
                    None => {
                        policies.insert(&entry.dimension, entry.policy);
                    }
                }
            }
        }

        let mut registered = HashMap::with_capacity(plans.len());
        for plan in plans {
            let id = plan.id().clone();
            if registered.insert(id.clone(), Arc::new(plan)).is_some() {
                return Err(EntitlementError::InvalidCatalog(format!("duplicate plan id {id}")));
            }
        }

        if !registered.contains_key(&default_plan) {
            return Err(EntitlementError::UnknownPlan(default_plan));
        }

        debug!(plans = registered.len(), default_plan = %default_plan, "plan catalog loaded");
        Ok(Self { plans: registered, default_plan })
    }

    /// Built-in catalog: three base plans and three add-ons.
    pub fn standard() -> Self {
        let plan = |id: &'static str, features| Arc::new(Plan::builtin(id, features));
        let api = |n: u64| {
            FeatureEntry::limit(Dimension::API_CALLS, Limit::Bounded(n))
                .with_policy(MergePolicy::Sum)
        };

        let plans = [
            plan(DEFAULT_PLAN, vec![
                FeatureEntry::limit(Dimension::SEATS, Limit::Bounded(5)),
                FeatureEntry::limit(Dimension::STORAGE, Limit::Bounded(GIB)),
                api(10_000),
            ]),
            plan("silver", vec![
                FeatureEntry::limit(Dimension::SEATS, Limit::Bounded(100)),
                FeatureEntry::limit(Dimension::STORAGE, Limit::Bounded(50 * GIB)),
                api(100_000),
            ]),
            plan("gold", vec![
                FeatureEntry::limit(Dimension::SEATS, Limit::Unbounded),
                FeatureEntry::limit(Dimension::STORAGE, Limit::Bounded(500 * GIB)),
                api(1_000_000),
                FeatureEntry::flag(Dimension::api_calls().overage_flag(), true),
            ]),
            plan("addon_api_50k", vec![api(50_000)]),
            plan("addon_storage_1t", vec![
                FeatureEntry::limit(Dimension::STORAGE, Limit::Bounded(1024 * GIB)),
            ]),
            plan("addon_overage", vec![
                FeatureEntry::flag(Dimension::api_calls().overage_flag(), true),
                FeatureEntry::flag(Dimension::storage().overage_flag(), true),
            ]),
        ];

        Self {
            plans: plans.into_iter().map(|p| (p.id().clone(), p)).collect(),
            default_plan: PlanId::from_static(DEFAULT_PLAN),
        }
    }

    /// Build the catalog described by a configuration
    pub fn from_config(config: &EntitlementConfig) -> EntitlementResult<Self> {
        config.build_catalog()
    }

    /// Swap the default plan for another registered plan
    pub fn with_default_plan(mut self, plan_id: PlanId) -> EntitlementResult<Self> {
        if !self.plans.contains_key(&plan_id) {
            return Err(EntitlementError::UnknownPlan(plan_id));
        }
        self.default_plan = plan_id;
        Ok(self)
    }

    /// Feature entries of a plan
    pub fn features(&self, plan_id: &PlanId) -> EntitlementResult<&[FeatureEntry]> {
        self.plans
            .get(plan_id)
            .map(|p| p.features())
            .ok_or_else(|| EntitlementError::UnknownPlan(plan_id.clone()))
    }

    /// Shared handle to a plan
    pub fn plan(&self, plan_id: &PlanId) -> EntitlementResult<Arc<Plan>> {
        self.plans
            .get(plan_id)
            .cloned()
            .ok_or_else(|| EntitlementError::UnknownPlan(plan_id.clone()))
    }

    /// Plan applied to spaces without a purchased base plan
    pub fn default_plan(&self) -> Arc<Plan> {
        // presence checked at construction
        self.plans[&self.default_plan].clone()
    }

    /// Default plan id
    pub fn default_plan_id(&self) -> &PlanId {
        &self.default_plan
    }

    /// Whether a plan is registered
    pub fn contains(&self, plan_id: &PlanId) -> bool {
        self.plans.contains_key(plan_id)
    }

    /// Registered plan ids, sorted
    pub fn plan_ids(&self) -> Vec<&PlanId> {
        let mut ids: Vec<_> = self.plans.keys().collect();
        ids.sort();
        ids
    }

    /// Number of registered plans
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn insert_unchecked(&mut self, plan: Plan) {
        self.plans.insert(plan.id().clone(), Arc::new(plan));
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
