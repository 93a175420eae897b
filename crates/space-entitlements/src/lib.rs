//! Space Entitlements
//!
//! Resolves what a space is allowed to use from its base plan and add-ons,
//! and measures current usage against the result.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        ENTITLEMENT SERVICE                          │
//! │     capacity │ subscription │ usages │ api_usage (members only)     │
//! │                                                                     │
//! │  ┌──────────────────────────┐      ┌────────────────────────────┐  │
//! │  │   ENTITLEMENT RESOLVER   │      │     USAGE ACCOUNTANT       │  │
//! │  │  space -> subscription   │      │  limit vs used -> view     │  │
//! │  │  ┌────────┐ ┌─────────┐  │      │  remaining │ overage │     │  │
//! │  │  │Catalog │ │ Merger  │──┼─────►│  allowOverage              │  │
//! │  │  │ plans  │ │ MAX/SUM │  │      └─────────────▲──────────────┘  │
//! │  │  └────────┘ └─────────┘  │                    │                 │
//! │  └────────────▲─────────────┘                    │                 │
//! └───────────────┼──────────────────────────────────┼─────────────────┘
//!                 │                                  │
//!       SubscriptionStore                       UsageSource
//! ```
//!
//! Everything here is synchronous and read-only. Storage, counters and
//! membership are reached through the traits in [`store`].

#![warn(missing_docs)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod merge;
pub mod model;
pub mod resolver;
pub mod service;
pub mod store;
pub mod usage;

pub use catalog::PlanCatalog;
pub use config::EntitlementConfig;
pub use error::{EntitlementError, EntitlementResult};
pub use merge::FeatureMerger;
pub use model::{
    Dimension, FeatureEntry, FeatureValue, Limit, MergePolicy, Plan, PlanFeatureSet, PlanId,
    SpaceId, Subscription, UserId,
};
pub use resolver::EntitlementResolver;
pub use service::{EntitlementService, SubscriptionSummary};
pub use store::{MembershipDirectory, SubscriptionRecord, SubscriptionStore, UsageSource};
pub use usage::{OveragePolicy, UsageAccountant, UsageSnapshot, UsageView};
