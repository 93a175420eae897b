//! Feature Merging
//!
//! Collapses a base plan and its add-ons into one [`PlanFeatureSet`]. Each
//! dimension is folded with its declared [`MergePolicy`]; all three policies
//! are commutative and associative, so add-on order never changes the result.

use crate::error::{EntitlementError, EntitlementResult};
use crate::model::{Dimension, FeatureValue, MergePolicy, Plan, PlanFeatureSet, Subscription};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Stateless plan merger
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureMerger;

impl FeatureMerger {
    /// Merge a base plan with its add-ons.
    ///
    /// The result is all-or-nothing: a policy conflict on any dimension
    /// fails the whole merge.
    pub fn merge<'a>(
        base: &'a Plan,
        add_ons: impl IntoIterator<Item = &'a Plan>,
    ) -> EntitlementResult<PlanFeatureSet> {
        let mut acc: BTreeMap<Dimension, (MergePolicy, FeatureValue)> = BTreeMap::new();
        let mut contributors = 0usize;

        for plan in std::iter::once(base).chain(add_ons) {
            contributors += 1;
            for entry in plan.features() {
                match acc.get_mut(&entry.dimension) {
                    None => {
                        acc.insert(entry.dimension.clone(), (entry.policy, entry.value));
                    }
                    Some((policy, _)) if *policy != entry.policy => {
                        warn!(
                            dimension = %entry.dimension,
                            plan = %plan.id(),
                            expected = %policy,
                            found = %entry.policy,
                            "conflicting merge policy"
                        );
                        return Err(EntitlementError::ConflictingPolicy {
                            dimension: entry.dimension.clone(),
                            plan_id: plan.id().clone(),
                            expected: *policy,
                            found: entry.policy,
                        });
                    }
                    Some((policy, current)) => {
                        *current = combine(*policy, *current, entry.value).ok_or_else(|| {
                            EntitlementError::InvalidFeature {
                                plan_id: plan.id().clone(),
                                dimension: entry.dimension.clone(),
                                reason: format!("policy {policy} cannot merge this value"),
                            }
                        })?;
                    }
                }
            }
        }

        debug!(base = %base.id(), contributors, dimensions = acc.len(), "merged plan features");
        Ok(PlanFeatureSet::from_map(
            acc.into_iter().map(|(dim, (_, value))| (dim, value)).collect(),
        ))
    }

    /// Merge the plans of a subscription
    pub fn merge_subscription(subscription: &Subscription) -> EntitlementResult<PlanFeatureSet> {
        Self::merge(subscription.base(), subscription.add_ons())
    }
}

/// Fold two contributions under one policy. `None` when the value kinds do
/// not fit the policy, which `Plan::new` already rules out.
fn combine(policy: MergePolicy, a: FeatureValue, b: FeatureValue) -> Option<FeatureValue> {
    match (policy, a, b) {
        (MergePolicy::Max, FeatureValue::Limit(x), FeatureValue::Limit(y)) => {
            Some(FeatureValue::Limit(x.max(y)))
        }
        (MergePolicy::Sum, FeatureValue::Limit(x), FeatureValue::Limit(y)) => {
            Some(FeatureValue::Limit(x.saturating_add(y)))
        }
        (MergePolicy::Or, FeatureValue::Flag(x), FeatureValue::Flag(y)) => {
            Some(FeatureValue::Flag(x || y))
        }
        _ => None,
    }
}
