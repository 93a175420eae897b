//! Error types for entitlement resolution

use crate::model::{Dimension, MergePolicy, PlanId, SpaceId, UserId};
use thiserror::Error;

/// Entitlement error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntitlementError {
    /// The subscription store holds no record for the space
    #[error("space not found: {0}")]
    SpaceNotFound(SpaceId),

    /// A plan id is not registered in the catalog
    #[error("unknown plan: {0}")]
    UnknownPlan(PlanId),

    /// Two plans disagree on how a dimension is merged
    #[error(
        "conflicting merge policy for {dimension}: plan {plan_id} declares {found}, expected {expected}"
    )]
    ConflictingPolicy {
        /// Dimension the plans disagree on
        dimension: Dimension,
        /// Plan whose policy differs from the first one seen
        plan_id: PlanId,
        /// Policy declared by the first contributing plan
        expected: MergePolicy,
        /// Policy declared by `plan_id`
        found: MergePolicy,
    },

    /// A plan declares a feature that cannot be merged
    #[error("invalid feature {dimension} in plan {plan_id}: {reason}")]
    InvalidFeature {
        /// Offending plan
        plan_id: PlanId,
        /// Offending dimension
        dimension: Dimension,
        /// What is wrong with the entry
        reason: String,
    },

    /// Catalog could not be assembled
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    /// Identifier failed validation
    #[error("invalid id: {0}")]
    InvalidId(String),

    /// Caller is not a member of the space
    #[error("user {user_id} is not a member of space {space_id}")]
    NotMember {
        /// Requesting user
        user_id: UserId,
        /// Space queried
        space_id: SpaceId,
    },

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),
}

impl EntitlementError {
    /// Whether the error should surface as a not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SpaceNotFound(_))
    }

    /// Whether the error points at broken catalog or subscription data
    /// rather than at the request.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::UnknownPlan(_)
                | Self::ConflictingPolicy { .. }
                | Self::InvalidFeature { .. }
                | Self::InvalidCatalog(_)
                | Self::Config(_)
        )
    }
}

/// Result type for entitlement operations
pub type EntitlementResult<T> = Result<T, EntitlementError>;
