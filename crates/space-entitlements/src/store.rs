//! Collaborator Interfaces
//!
//! The subscription store, the usage source and the membership directory
//! live outside this crate; it only reads from them. In-memory versions are
//! provided for tests and for embedding without a database.

use crate::model::{PlanId, SpaceId, UserId};
use crate::usage::UsageSnapshot;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Raw subscription record as kept by the subscription store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Purchased base plan; `None` means the space runs on the default plan
    pub base_plan_id: Option<PlanId>,
    /// Add-on plans in purchase order
    #[serde(default)]
    pub add_on_plan_ids: Vec<PlanId>,
}

impl SubscriptionRecord {
    /// Record for a space on the default plan
    pub fn default_plan() -> Self {
        Self::default()
    }

    /// Record with a purchased base plan
    pub fn with_base(base_plan_id: PlanId) -> Self {
        Self {
            base_plan_id: Some(base_plan_id),
            add_on_plan_ids: Vec::new(),
        }
    }

    /// Append an add-on
    pub fn with_add_on(mut self, plan_id: PlanId) -> Self {
        self.add_on_plan_ids.push(plan_id);
        self
    }
}

/// Subscription store
pub trait SubscriptionStore: Send + Sync {
    /// Current subscription of a space; `None` when the space has no record
    fn get_subscription(&self, space_id: &SpaceId) -> Option<SubscriptionRecord>;
}

/// Source of raw usage counters
pub trait UsageSource: Send + Sync {
    /// Current-period counters of a space
    fn usage(&self, space_id: &SpaceId) -> UsageSnapshot;
}

/// Space membership lookup
pub trait MembershipDirectory: Send + Sync {
    /// Whether the user belongs to the space
    fn is_member(&self, user_id: UserId, space_id: &SpaceId) -> bool;
}

/// In-memory subscription store (for testing and development)
#[derive(Debug, Default)]
pub struct InMemorySubscriptionStore {
    records: RwLock<HashMap<SpaceId, SubscriptionRecord>>,
}

impl InMemorySubscriptionStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record of a space
    pub fn put(&self, space_id: SpaceId, record: SubscriptionRecord) {
        self.records.write().insert(space_id, record);
    }

    /// Remove a space's record
    pub fn remove(&self, space_id: &SpaceId) -> Option<SubscriptionRecord> {
        self.records.write().remove(space_id)
    }
}

impl SubscriptionStore for InMemorySubscriptionStore {
    fn get_subscription(&self, space_id: &SpaceId) -> Option<SubscriptionRecord> {
        self.records.read().get(space_id).cloned()
    }
}

/// In-memory usage counters
#[derive(Debug, Default)]
pub struct InMemoryUsageSource {
    usage: RwLock<HashMap<SpaceId, UsageSnapshot>>,
}

impl InMemoryUsageSource {
    /// Source with no counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one counter of a space
    pub fn record(&self, space_id: &SpaceId, dimension: &str, used: u64) {
        self.usage
            .write()
            .entry(space_id.clone())
            .or_default()
            .record(dimension, used);
    }

    /// Replace all counters of a space
    pub fn put(&self, space_id: SpaceId, snapshot: UsageSnapshot) {
        self.usage.write().insert(space_id, snapshot);
    }
}

impl UsageSource for InMemoryUsageSource {
    fn usage(&self, space_id: &SpaceId) -> UsageSnapshot {
        self.usage.read().get(space_id).cloned().unwrap_or_default()
    }
}

/// In-memory membership directory
#[derive(Debug, Default)]
pub struct InMemoryMembershipDirectory {
    members: RwLock<HashMap<SpaceId, HashSet<UserId>>>,
}

impl InMemoryMembershipDirectory {
    /// Directory with no members
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user to a space
    pub fn add_member(&self, space_id: &SpaceId, user_id: UserId) {
        self.members
            .write()
            .entry(space_id.clone())
            .or_default()
            .insert(user_id);
    }

    /// Remove a user from a space
    pub fn remove_member(&self, space_id: &SpaceId, user_id: UserId) -> bool {
        self.members
            .write()
            .get_mut(space_id)
            .is_some_and(|members| members.remove(&user_id))
    }
}

impl MembershipDirectory for InMemoryMembershipDirectory {
    fn is_member(&self, user_id: UserId, space_id: &SpaceId) -> bool {
        self.members
            .read()
            .get(space_id)
            .is_some_and(|members| members.contains(&user_id))
    }
}
