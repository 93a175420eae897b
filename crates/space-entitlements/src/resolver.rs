//! Entitlement Resolution
//!
//! space id -> subscription record -> catalog plans -> merged feature set.
//! Every call reads the subscription store afresh; nothing is cached and no
//! error is retried here.

use crate::catalog::PlanCatalog;
use crate::error::{EntitlementError, EntitlementResult};
use crate::merge::FeatureMerger;
use crate::model::{PlanFeatureSet, SpaceId, Subscription};
use crate::store::SubscriptionStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves a space's effective entitlements
#[derive(Clone)]
pub struct EntitlementResolver {
    catalog: Arc<PlanCatalog>,
    store: Arc<dyn SubscriptionStore>,
}

impl EntitlementResolver {
    /// Create resolver over a catalog and a subscription store
    pub fn new(catalog: Arc<PlanCatalog>, store: Arc<dyn SubscriptionStore>) -> Self {
        Self { catalog, store }
    }

    /// Catalog used for plan lookups
    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    /// Look up a space's subscription and attach catalog plans to it.
    ///
    /// A record without a base plan resolves to the catalog default plan.
    pub fn subscription(&self, space_id: &SpaceId) -> EntitlementResult<Subscription> {
        let record = self.store.get_subscription(space_id).ok_or_else(|| {
            debug!(space = %space_id, "no subscription record");
            EntitlementError::SpaceNotFound(space_id.clone())
        })?;

        let base = match &record.base_plan_id {
            Some(plan_id) => self.catalog.plan(plan_id),
            None => Ok(self.catalog.default_plan()),
        };
        let add_ons = record
            .add_on_plan_ids
            .iter()
            .map(|plan_id| self.catalog.plan(plan_id))
            .collect::<EntitlementResult<Vec<_>>>();

        let (base, add_ons) = match (base, add_ons) {
            (Ok(base), Ok(add_ons)) => (base, add_ons),
            (Err(e), _) | (_, Err(e)) => {
                warn!(space = %space_id, error = %e, "subscription references unknown plan");
                return Err(e);
            }
        };

        Ok(Subscription::new(space_id.clone(), base, add_ons))
    }

    /// Resolve the merged feature set of a space.
    pub fn resolve(&self, space_id: &SpaceId) -> EntitlementResult<PlanFeatureSet> {
        let subscription = self.subscription(space_id)?;
        self.merge(&subscription)
    }

    /// Merge an already looked-up subscription.
    pub fn merge(&self, subscription: &Subscription) -> EntitlementResult<PlanFeatureSet> {
        let space_id = subscription.space_id();
        let features = FeatureMerger::merge_subscription(subscription).inspect_err(|e| {
            warn!(space = %space_id, error = %e, "plan merge failed");
        })?;

        debug!(
            space = %space_id,
            base = %subscription.base().id(),
            add_ons = subscription.add_on_ids().len(),
            dimensions = features.len(),
            "resolved entitlements"
        );
        Ok(features)
    }
}
