//! Space Entitlement Queries
//!
//! Read-only queries a space exposes about its own plan: storage capacity,
//! the subscription summary, all usages, and API call usage for a member.

use crate::config::EntitlementConfig;
use crate::error::{EntitlementError, EntitlementResult};
use crate::model::{Dimension, PlanFeatureSet, PlanId, SpaceId, UserId};
use crate::resolver::EntitlementResolver;
use crate::store::{MembershipDirectory, SubscriptionStore, UsageSource};
use crate::usage::{OveragePolicy, UsageAccountant, UsageView};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Subscription as presented to a space
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    /// Space the summary describes
    pub space_id: SpaceId,
    /// Purchased base plan, or the default plan
    pub base_plan_id: PlanId,
    /// Add-ons in purchase order, without duplicates
    pub add_on_plan_ids: Vec<PlanId>,
    /// Merged entitlements
    pub features: PlanFeatureSet,
}

/// Entitlement service
#[derive(Clone)]
pub struct EntitlementService {
    resolver: EntitlementResolver,
    usage: Arc<dyn UsageSource>,
    members: Arc<dyn MembershipDirectory>,
    policy: OveragePolicy,
}

impl EntitlementService {
    /// Create service from its collaborators
    pub fn new(
        resolver: EntitlementResolver,
        usage: Arc<dyn UsageSource>,
        members: Arc<dyn MembershipDirectory>,
        policy: OveragePolicy,
    ) -> Self {
        Self { resolver, usage, members, policy }
    }

    /// Wire a service from configuration and collaborators.
    pub fn from_config(
        config: &EntitlementConfig,
        subscriptions: Arc<dyn SubscriptionStore>,
        usage: Arc<dyn UsageSource>,
        members: Arc<dyn MembershipDirectory>,
    ) -> EntitlementResult<Self> {
        let catalog = Arc::new(config.build_catalog()?);
        let resolver = EntitlementResolver::new(catalog, subscriptions);
        Ok(Self::new(resolver, usage, members, config.overage_policy()))
    }

    /// Underlying resolver
    pub fn resolver(&self) -> &EntitlementResolver {
        &self.resolver
    }

    /// Storage capacity of a space
    pub fn capacity(&self, space_id: &SpaceId) -> EntitlementResult<UsageView> {
        self.usage_of(space_id, &Dimension::storage())
    }

    /// Subscription summary with the merged feature set
    pub fn subscription(&self, space_id: &SpaceId) -> EntitlementResult<SubscriptionSummary> {
        let subscription = self.resolver.subscription(space_id)?;
        let features = self.resolver.merge(&subscription)?;

        Ok(SubscriptionSummary {
            space_id: subscription.space_id().clone(),
            base_plan_id: subscription.base().id().clone(),
            add_on_plan_ids: subscription.add_on_ids(),
            features,
        })
    }

    /// Every limited or metered dimension of a space
    pub fn usages(&self, space_id: &SpaceId) -> EntitlementResult<Vec<UsageView>> {
        let features = self.resolver.resolve(space_id)?;
        let snapshot = self.usage.usage(space_id);
        Ok(UsageAccountant::evaluate_all(&features, &snapshot, self.policy))
    }

    /// API call usage, visible to members of the space only.
    pub fn api_usage(&self, space_id: &SpaceId, user_id: UserId) -> EntitlementResult<UsageView> {
        let features = self.resolver.resolve(space_id)?;
        if !self.members.is_member(user_id, space_id) {
            debug!(space = %space_id, user = %user_id, "api usage denied to non-member");
            return Err(EntitlementError::NotMember {
                user_id,
                space_id: space_id.clone(),
            });
        }
        Ok(self.evaluate(space_id, &features, &Dimension::api_calls()))
    }

    fn usage_of(&self, space_id: &SpaceId, dimension: &Dimension) -> EntitlementResult<UsageView> {
        let features = self.resolver.resolve(space_id)?;
        Ok(self.evaluate(space_id, &features, dimension))
    }

    fn evaluate(
        &self,
        space_id: &SpaceId,
        features: &PlanFeatureSet,
        dimension: &Dimension,
    ) -> UsageView {
        let snapshot = self.usage.usage(space_id);
        UsageAccountant::evaluate_snapshot(features, &snapshot, dimension, self.policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PlanCatalog;
    use crate::model::{FeatureEntry, Limit, MergePolicy, Plan};
    use crate::store::{
        InMemoryMembershipDirectory, InMemorySubscriptionStore, InMemoryUsageSource,
        SubscriptionRecord,
    };

    const GIB: u64 = 1024 * 1024 * 1024;

    struct Fixture {
        service: EntitlementService,
        store: Arc<InMemorySubscriptionStore>,
        usage: Arc<InMemoryUsageSource>,
        members: Arc<InMemoryMembershipDirectory>,
    }

    fn fixture(policy: OveragePolicy) -> Fixture {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let usage = Arc::new(InMemoryUsageSource::new());
        let members = Arc::new(InMemoryMembershipDirectory::new());
        let resolver = EntitlementResolver::new(Arc::new(PlanCatalog::standard()), store.clone());
        let service = EntitlementService::new(resolver, usage.clone(), members.clone(), policy);
        Fixture { service, store, usage, members }
    }

    fn space(id: &str) -> SpaceId {
        SpaceId::new(id).unwrap()
    }

    fn plan_id(id: &str) -> PlanId {
        PlanId::new(id).unwrap()
    }

    #[test]
    fn test_capacity() {
        let fx = fixture(OveragePolicy::permissive());
        fx.store.put(space("spc1"), SubscriptionRecord::with_base(plan_id("silver")));
        fx.usage.record(&space("spc1"), "storage", 10 * GIB);

        let view = fx.service.capacity(&space("spc1")).unwrap();
        assert_eq!(view.limit, Limit::Bounded(50 * GIB));
        assert_eq!(view.remaining, Limit::Bounded(40 * GIB));
        assert!(!view.over_limit);
        assert!(view.allow_overage);
    }

    #[test]
    fn test_subscription_summary() {
        let fx = fixture(OveragePolicy::permissive());
        fx.store.put(
            space("spc1"),
            SubscriptionRecord::default_plan().with_add_on(plan_id("addon_api_50k")),
        );

        let summary = fx.service.subscription(&space("spc1")).unwrap();
        assert_eq!(summary.base_plan_id.as_str(), "free");
        assert_eq!(summary.add_on_plan_ids, vec![plan_id("addon_api_50k")]);
        assert_eq!(summary.features.limit("apiCalls"), Some(Limit::Bounded(60_000)));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["basePlanId"], "free");
        assert_eq!(json["features"]["apiCalls"], 60_000);
    }

    #[test]
    fn test_usages_lists_every_dimension() {
        let fx = fixture(OveragePolicy::permissive());
        fx.store.put(space("spc1"), SubscriptionRecord::with_base(plan_id("gold")));
        fx.usage.record(&space("spc1"), "apiCalls", 2_000_000);
        fx.usage.record(&space("spc1"), "exports", 7);

        let views = fx.service.usages(&space("spc1")).unwrap();
        let dims: Vec<_> = views.iter().map(|v| v.dimension.as_str()).collect();
        assert_eq!(dims, vec!["apiCalls", "exports", "seats", "storage"]);

        let api = &views[0];
        assert_eq!(api.overage, 1_000_000);
        assert!(api.over_limit);
        assert!(api.allow_overage);

        let exports = &views[1];
        assert_eq!(exports.limit, Limit::Unbounded);
        assert_eq!(exports.used, 7);
    }

    #[test]
    fn test_api_usage_requires_membership() {
        let fx = fixture(OveragePolicy::strict());
        fx.store.put(space("spc1"), SubscriptionRecord::default_plan());
        fx.usage.record(&space("spc1"), "apiCalls", 12_000);
        let member = UserId::new(1001);
        fx.members.add_member(&space("spc1"), member);

        let view = fx.service.api_usage(&space("spc1"), member).unwrap();
        assert_eq!(view.limit, Limit::Bounded(10_000));
        assert_eq!(view.overage, 2_000);
        assert!(!view.allow_overage);

        assert_eq!(
            fx.service.api_usage(&space("spc1"), UserId::new(1002)).unwrap_err(),
            EntitlementError::NotMember {
                user_id: UserId::new(1002),
                space_id: space("spc1"),
            }
        );
    }

    #[test]
    fn test_unknown_space_reported_before_membership() {
        let fx = fixture(OveragePolicy::permissive());

        let err = fx.service.api_usage(&space("nonexistent-space"), UserId::new(1)).unwrap_err();
        assert!(err.is_not_found());
        assert!(fx.service.capacity(&space("nonexistent-space")).unwrap_err().is_not_found());
        assert!(fx.service.usages(&space("nonexistent-space")).is_err());
    }

    #[test]
    fn test_plan_flag_beats_configured_default() {
        let fx = fixture(OveragePolicy::strict());
        fx.store.put(
            space("spc1"),
            SubscriptionRecord::with_base(plan_id("silver")).with_add_on(plan_id("addon_overage")),
        );
        fx.members.add_member(&space("spc1"), UserId::new(1));

        assert!(fx.service.capacity(&space("spc1")).unwrap().allow_overage);
        assert!(fx.service.api_usage(&space("spc1"), UserId::new(1)).unwrap().allow_overage);
    }

    #[test]
    fn test_subscription_reports_merge_conflict() {
        let mut catalog = PlanCatalog::standard();
        catalog.insert_unchecked(
            Plan::new(plan_id("seats_sum"), vec![
                FeatureEntry::limit("seats", Limit::Bounded(10)).with_policy(MergePolicy::Sum),
            ])
            .unwrap(),
        );
        let store = Arc::new(InMemorySubscriptionStore::new());
        store.put(
            space("spc1"),
            SubscriptionRecord::default_plan().with_add_on(plan_id("seats_sum")),
        );
        let resolver = EntitlementResolver::new(Arc::new(catalog), store);
        let service = EntitlementService::new(
            resolver,
            Arc::new(InMemoryUsageSource::new()),
            Arc::new(InMemoryMembershipDirectory::new()),
            OveragePolicy::default(),
        );

        let err = service.subscription(&space("spc1")).unwrap_err();
        assert!(matches!(err, EntitlementError::ConflictingPolicy { .. }));
        assert!(err.is_internal());
    }
}
