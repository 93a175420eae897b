//! Usage Accounting
//!
//! Compares externally supplied usage counters against a resolved
//! [`PlanFeatureSet`]. Evaluation is a pure function: it never fails and
//! never writes counters back. Missing data degrades to permissive defaults
//! (unbounded limit, zero usage) so usage queries stay available while
//! upstream counters are momentarily absent.

use crate::model::{Dimension, Limit, PlanFeatureSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Caller-side default for whether a dimension may exceed its limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OveragePolicy {
    /// Whether usage may exceed a limit when the plan is silent
    pub allow_overage: bool,
}

impl OveragePolicy {
    /// Allow exceeding limits unless a plan says otherwise
    pub const fn permissive() -> Self {
        Self { allow_overage: true }
    }

    /// Deny exceeding limits unless a plan grants it
    pub const fn strict() -> Self {
        Self { allow_overage: false }
    }
}

impl Default for OveragePolicy {
    fn default() -> Self {
        Self::permissive()
    }
}

/// Counter for one dimension
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEntry {
    /// Amount consumed in the current period
    pub used: u64,
    /// Caller override for the overage default on this dimension
    pub allow_overage: Option<bool>,
}

/// Usage counters of one space, keyed by dimension
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageSnapshot {
    entries: BTreeMap<Dimension, UsageEntry>,
}

impl UsageSnapshot {
    /// Empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `record`
    pub fn with_used(mut self, dimension: impl Into<Dimension>, used: u64) -> Self {
        self.record(dimension, used);
        self
    }

    /// Set the used amount for a dimension
    pub fn record(&mut self, dimension: impl Into<Dimension>, used: u64) {
        self.entries.entry(dimension.into()).or_default().used = used;
    }

    /// Set the caller overage override for a dimension
    pub fn set_allow_overage(&mut self, dimension: impl Into<Dimension>, allow: bool) {
        self.entries.entry(dimension.into()).or_default().allow_overage = Some(allow);
    }

    /// Used amount, if recorded
    pub fn used(&self, dimension: &str) -> Option<u64> {
        self.entries.get(dimension).map(|e| e.used)
    }

    /// Entry for a dimension
    pub fn entry(&self, dimension: &str) -> Option<&UsageEntry> {
        self.entries.get(dimension)
    }

    /// Recorded dimensions
    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.entries.keys()
    }

    /// Whether nothing is recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Usage of one dimension measured against its resolved limit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageView {
    /// Evaluated dimension
    pub dimension: Dimension,
    /// Resolved limit; `Unbounded` when no plan declares one
    pub limit: Limit,
    /// Amount consumed; zero when no counter exists
    pub used: u64,
    /// Headroom left; zero once over the limit
    pub remaining: Limit,
    /// Amount beyond the limit; zero while within it
    pub overage: u64,
    /// Whether usage exceeds the limit
    pub over_limit: bool,
    /// Whether exceeding the limit is permitted
    pub allow_overage: bool,
}

/// Stateless usage evaluator
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageAccountant;

impl UsageAccountant {
    /// Evaluate a single dimension against a raw used amount.
    pub fn evaluate_one(
        features: &PlanFeatureSet,
        dimension: &Dimension,
        used: u64,
        policy: OveragePolicy,
    ) -> UsageView {
        Self::view(features, dimension, used, policy.allow_overage)
    }

    /// Evaluate the requested dimensions, in request order.
    pub fn evaluate(
        features: &PlanFeatureSet,
        usage: &UsageSnapshot,
        dimensions: &[Dimension],
        policy: OveragePolicy,
    ) -> Vec<UsageView> {
        dimensions
            .iter()
            .map(|dimension| Self::evaluate_snapshot(features, usage, dimension, policy))
            .collect()
    }

    /// Evaluate every numeric dimension of the feature set together with
    /// every dimension that only appears in the usage counters.
    pub fn evaluate_all(
        features: &PlanFeatureSet,
        usage: &UsageSnapshot,
        policy: OveragePolicy,
    ) -> Vec<UsageView> {
        let dimensions: BTreeSet<&Dimension> = features
            .limits()
            .map(|(dimension, _)| dimension)
            .chain(usage.dimensions())
            .filter(|dimension| !dimension.is_overage_flag())
            .collect();

        dimensions
            .into_iter()
            .map(|dimension| Self::evaluate_snapshot(features, usage, dimension, policy))
            .collect()
    }

    pub(crate) fn evaluate_snapshot(
        features: &PlanFeatureSet,
        usage: &UsageSnapshot,
        dimension: &Dimension,
        policy: OveragePolicy,
    ) -> UsageView {
        let entry = usage.entry(dimension.as_str()).copied().unwrap_or_default();
        let caller_default = entry.allow_overage.unwrap_or(policy.allow_overage);
        Self::view(features, dimension, entry.used, caller_default)
    }

    fn view(
        features: &PlanFeatureSet,
        dimension: &Dimension,
        used: u64,
        caller_default: bool,
    ) -> UsageView {
        let limit = features.limit(dimension.as_str()).unwrap_or(Limit::Unbounded);

        let (remaining, overage) = match limit {
            Limit::Unbounded => (Limit::Unbounded, 0),
            Limit::Bounded(max) if used <= max => (Limit::Bounded(max - used), 0),
            Limit::Bounded(max) => (Limit::Bounded(0), used - max),
        };

        let allow_overage = match features.flag(dimension.overage_flag().as_str()) {
            Some(plan_flag) => {
                if plan_flag != caller_default {
                    debug!(
                        dimension = %dimension,
                        plan_flag,
                        caller_default,
                        "plan overage flag overrides caller default"
                    );
                }
                plan_flag
            }
            None => caller_default,
        };

        UsageView {
            dimension: dimension.clone(),
            limit,
            used,
            remaining,
            overage,
            over_limit: overage > 0,
            allow_overage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::FeatureMerger;
    use crate::model::{FeatureEntry, Plan, PlanId};
    use proptest::prelude::*;

    fn features(entries: Vec<FeatureEntry>) -> PlanFeatureSet {
        let plan = Plan::new(PlanId::new("test").unwrap(), entries).unwrap();
        FeatureMerger::merge(&plan, []).unwrap()
    }

    #[test]
    fn test_overage_with_plan_allowance() {
        let set = features(vec![
            FeatureEntry::limit("apiCalls", Limit::Bounded(1000)),
            FeatureEntry::flag("apiCalls.allowOverage", true),
        ]);

        let view = UsageAccountant::evaluate_one(
            &set,
            &Dimension::api_calls(),
            1500,
            OveragePolicy::strict(),
        );

        assert_eq!(
            view,
            UsageView {
                dimension: Dimension::api_calls(),
                limit: Limit::Bounded(1000),
                used: 1500,
                remaining: Limit::Bounded(0),
                overage: 500,
                over_limit: true,
                allow_overage: true,
            }
        );
    }

    #[test]
    fn test_missing_dimension_is_unbounded() {
        let set = features(vec![]);
        let views = UsageAccountant::evaluate(
            &set,
            &UsageSnapshot::new(),
            &[Dimension::storage()],
            OveragePolicy::default(),
        );

        assert_eq!(views.len(), 1);
        assert_eq!(views[0].limit, Limit::Unbounded);
        assert_eq!(views[0].used, 0);
        assert_eq!(views[0].remaining, Limit::Unbounded);
        assert!(!views[0].over_limit);
        assert!(views[0].allow_overage);
    }

    #[test]
    fn test_within_limit() {
        let set = features(vec![FeatureEntry::limit("storage", Limit::Bounded(1024))]);
        let usage = UsageSnapshot::new().with_used("storage", 1000);

        let dims = [Dimension::storage()];
        let views = UsageAccountant::evaluate(&set, &usage, &dims, OveragePolicy::default());
        assert_eq!(views[0].remaining, Limit::Bounded(24));
        assert_eq!(views[0].overage, 0);
        assert!(!views[0].over_limit);
    }

    #[test]
    fn test_exactly_at_limit() {
        let set = features(vec![FeatureEntry::limit("seats", Limit::Bounded(5))]);
        let view =
            UsageAccountant::evaluate_one(&set, &Dimension::seats(), 5, OveragePolicy::default());

        assert_eq!(view.remaining, Limit::Bounded(0));
        assert!(!view.over_limit);
    }

    #[test]
    fn test_over_limit_without_allowance_still_reports() {
        let set = features(vec![
            FeatureEntry::limit("storage", Limit::Bounded(100)),
            FeatureEntry::flag("storage.allowOverage", false),
        ]);

        let view = UsageAccountant::evaluate_one(
            &set,
            &Dimension::storage(),
            250,
            OveragePolicy::permissive(),
        );
        assert!(view.over_limit);
        assert_eq!(view.overage, 150);
        assert!(!view.allow_overage);
    }

    #[test]
    fn test_caller_default_applies_when_plan_silent() {
        let set = features(vec![FeatureEntry::limit("storage", Limit::Bounded(100))]);

        let storage = Dimension::storage();
        let strict = UsageAccountant::evaluate_one(&set, &storage, 0, OveragePolicy::strict());
        let permissive =
            UsageAccountant::evaluate_one(&set, &storage, 0, OveragePolicy::permissive());
        assert!(!strict.allow_overage);
        assert!(permissive.allow_overage);
    }

    #[test]
    fn test_snapshot_override_beats_policy_default() {
        let set = features(vec![FeatureEntry::limit("storage", Limit::Bounded(100))]);
        let mut usage = UsageSnapshot::new().with_used("storage", 10);
        usage.set_allow_overage("storage", false);

        let views = UsageAccountant::evaluate(
            &set,
            &usage,
            &[Dimension::storage()],
            OveragePolicy::permissive(),
        );
        assert!(!views[0].allow_overage);
        assert_eq!(views[0].used, 10);
    }

    #[test]
    fn test_evaluate_all() {
        let set = features(vec![
            FeatureEntry::limit("seats", Limit::Bounded(5)),
            FeatureEntry::limit("storage", Limit::Bounded(100)),
            FeatureEntry::flag("storage.allowOverage", true),
            FeatureEntry::flag("sso", true),
        ]);
        let usage = UsageSnapshot::new().with_used("seats", 3).with_used("sheets", 40);

        let views = UsageAccountant::evaluate_all(&set, &usage, OveragePolicy::default());
        let names: Vec<_> = views.iter().map(|v| v.dimension.as_str()).collect();

        assert_eq!(names, vec!["seats", "sheets", "storage"]);
        assert_eq!(views[1].limit, Limit::Unbounded);
        assert_eq!(views[1].used, 40);
    }

    #[test]
    fn test_view_serializes_camel_case() {
        let set = features(vec![FeatureEntry::limit("apiCalls", Limit::Bounded(1000))]);
        let api_calls = Dimension::api_calls();
        let view = UsageAccountant::evaluate_one(&set, &api_calls, 10, OveragePolicy::default());
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["dimension"], "apiCalls");
        assert_eq!(json["limit"], 1000);
        assert_eq!(json["remaining"], 990);
        assert_eq!(json["overLimit"], false);
        assert_eq!(json["allowOverage"], true);
    }

    proptest! {
        #[test]
        fn prop_evaluate_is_idempotent(
            limit in proptest::option::of(any::<u64>()),
            flag in proptest::option::of(any::<bool>()),
            used in any::<u64>(),
            allow in any::<bool>(),
        ) {
            let mut entries = Vec::new();
            if let Some(limit) = limit {
                entries.push(FeatureEntry::limit("storage", Limit::Bounded(limit)));
            }
            if let Some(flag) = flag {
                entries.push(FeatureEntry::flag("storage.allowOverage", flag));
            }
            let set = features(entries);
            let usage = UsageSnapshot::new().with_used("storage", used);
            let policy = OveragePolicy { allow_overage: allow };
            let dims = [Dimension::storage()];

            let first = UsageAccountant::evaluate(&set, &usage, &dims, policy);
            let second = UsageAccountant::evaluate(&set, &usage, &dims, policy);
            prop_assert_eq!(&first, &second);

            let view = &first[0];
            if let Limit::Bounded(max) = view.limit {
                prop_assert_eq!(view.used, used);
                if used > max {
                    prop_assert_eq!(view.overage, used - max);
                    prop_assert_eq!(view.remaining, Limit::Bounded(0));
                } else {
                    prop_assert_eq!(view.remaining, Limit::Bounded(max - used));
                }
            }
        }
    }
}
