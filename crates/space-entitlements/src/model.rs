//! Entitlement Data Model
//!
//! Value objects shared by the catalog, the merger and the accountant. All of
//! them are immutable once built; plans are shared behind `Arc` so a
//! subscription can reference catalog plans without copying them.

use crate::error::{EntitlementError, EntitlementResult};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Wire value standing for an unbounded limit.
pub const UNBOUNDED_SENTINEL: i64 = -1;

const MAX_ID_LEN: usize = 64;

fn validate_id(kind: &str, id: &str) -> EntitlementResult<()> {
    if id.is_empty() {
        return Err(EntitlementError::InvalidId(format!("{kind} id cannot be empty")));
    }
    if id.len() > MAX_ID_LEN {
        return Err(EntitlementError::InvalidId(format!(
            "{kind} id exceeds {MAX_ID_LEN} characters"
        )));
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(EntitlementError::InvalidId(format!(
            "{kind} id '{id}' must be alphanumeric"
        )));
    }
    Ok(())
}

/// Space identifier (Value Object)
///
/// # Invariants
/// - Non-empty, at most 64 characters
/// - ASCII alphanumeric with `-` and `_`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SpaceId(String);

impl SpaceId {
    /// Create new space ID with validation
    pub fn new(id: impl Into<String>) -> EntitlementResult<Self> {
        let id = id.into();
        validate_id("space", &id)?;
        Ok(Self(id))
    }

    /// Get inner value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SpaceId {
    type Error = EntitlementError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SpaceId> for String {
    fn from(id: SpaceId) -> Self {
        id.0
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Plan identifier (Value Object)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlanId(String);

impl PlanId {
    /// Create new plan ID with validation
    pub fn new(id: impl Into<String>) -> EntitlementResult<Self> {
        let id = id.into();
        validate_id("plan", &id)?;
        Ok(Self(id))
    }

    /// Get inner value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn from_static(id: &'static str) -> Self {
        Self(id.to_owned())
    }
}

impl TryFrom<String> for PlanId {
    type Error = EntitlementError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PlanId> for String {
    fn from(id: PlanId) -> Self {
        id.0
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// User identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

impl UserId {
    /// Wrap a raw user id
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get raw value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named resource or capability axis, e.g. storage bytes or API calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dimension(String);

impl Dimension {
    /// Attachment storage, in bytes
    pub const STORAGE: &'static str = "storage";
    /// API calls in the current billing period
    pub const API_CALLS: &'static str = "apiCalls";
    /// Member seats
    pub const SEATS: &'static str = "seats";

    const OVERAGE_SUFFIX: &'static str = ".allowOverage";

    /// Create a dimension
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Storage dimension
    pub fn storage() -> Self {
        Self::new(Self::STORAGE)
    }

    /// API call dimension
    pub fn api_calls() -> Self {
        Self::new(Self::API_CALLS)
    }

    /// Seat dimension
    pub fn seats() -> Self {
        Self::new(Self::SEATS)
    }

    /// The boolean dimension that grants overage on this one.
    pub fn overage_flag(&self) -> Self {
        Self(format!("{}{}", self.0, Self::OVERAGE_SUFFIX))
    }

    /// Whether this dimension is itself an overage flag
    pub fn is_overage_flag(&self) -> bool {
        self.0.ends_with(Self::OVERAGE_SUFFIX)
    }

    /// Get inner value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Dimension {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Dimension {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric limit. `Unbounded` orders above every bounded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Limit {
    /// Finite limit
    Bounded(u64),
    /// No limit
    Unbounded,
}

impl Limit {
    /// Whether the limit is finite
    pub fn is_bounded(&self) -> bool {
        matches!(self, Self::Bounded(_))
    }

    /// Finite value, if any
    pub fn value(&self) -> Option<u64> {
        match self {
            Self::Bounded(v) => Some(*v),
            Self::Unbounded => None,
        }
    }

    /// Additive combination; saturates, and `Unbounded` absorbs.
    pub fn saturating_add(self, other: Limit) -> Limit {
        match (self, other) {
            (Self::Bounded(a), Self::Bounded(b)) => Self::Bounded(a.saturating_add(b)),
            _ => Self::Unbounded,
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(v) => write!(f, "{v}"),
            Self::Unbounded => f.write_str("unbounded"),
        }
    }
}

impl Serialize for Limit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bounded(v) => serializer.serialize_u64(*v),
            Self::Unbounded => serializer.serialize_i64(UNBOUNDED_SENTINEL),
        }
    }
}

impl<'de> Deserialize<'de> for Limit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LimitVisitor;

        impl<'de> Visitor<'de> for LimitVisitor {
            type Value = Limit;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer, or -1 for unbounded")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Limit, E> {
                Ok(Limit::Bounded(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Limit, E> {
                if v == UNBOUNDED_SENTINEL {
                    return Ok(Limit::Unbounded);
                }
                u64::try_from(v)
                    .map(Limit::Bounded)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
            }
        }

        deserializer.deserialize_i64(LimitVisitor)
    }
}

/// Value a plan contributes for one dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    /// Capability flag
    Flag(bool),
    /// Capacity or quota
    Limit(Limit),
}

impl FeatureValue {
    /// Limit value, if this is a limit
    pub fn as_limit(&self) -> Option<Limit> {
        match self {
            Self::Limit(limit) => Some(*limit),
            Self::Flag(_) => None,
        }
    }

    /// Flag value, if this is a flag
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(flag) => Some(*flag),
            Self::Limit(_) => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Flag(_) => "flag",
            Self::Limit(_) => "limit",
        }
    }
}

/// How contributions from several plans collapse into one value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Largest contribution wins
    Max,
    /// Contributions add up
    Sum,
    /// True if any contribution is true
    Or,
}

impl MergePolicy {
    /// Policy used when a plan does not name one.
    pub fn default_for(value: &FeatureValue) -> Self {
        match value {
            FeatureValue::Flag(_) => Self::Or,
            FeatureValue::Limit(_) => Self::Max,
        }
    }

    fn accepts(&self, value: &FeatureValue) -> bool {
        matches!(
            (self, value),
            (Self::Or, FeatureValue::Flag(_)) | (Self::Max | Self::Sum, FeatureValue::Limit(_))
        )
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Max => "max",
            Self::Sum => "sum",
            Self::Or => "or",
        })
    }
}

/// One feature line of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureEntry {
    /// Dimension the entry applies to
    pub dimension: Dimension,
    /// Contributed value
    pub value: FeatureValue,
    /// How contributions to this dimension combine
    pub policy: MergePolicy,
}

impl FeatureEntry {
    /// Entry with the default policy for its value
    pub fn new(dimension: impl Into<Dimension>, value: FeatureValue) -> Self {
        Self {
            dimension: dimension.into(),
            policy: MergePolicy::default_for(&value),
            value,
        }
    }

    /// Numeric entry merged by `Max`
    pub fn limit(dimension: impl Into<Dimension>, limit: Limit) -> Self {
        Self::new(dimension, FeatureValue::Limit(limit))
    }

    /// Boolean entry merged by `Or`
    pub fn flag(dimension: impl Into<Dimension>, enabled: bool) -> Self {
        Self::new(dimension, FeatureValue::Flag(enabled))
    }

    /// Override the merge policy
    pub fn with_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Named bundle of feature values. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    id: PlanId,
    features: Vec<FeatureEntry>,
}

impl Plan {
    /// Build a plan, rejecting repeated dimensions and policies that do not
    /// fit their value kind.
    pub fn new(id: PlanId, features: Vec<FeatureEntry>) -> EntitlementResult<Self> {
        let mut seen = HashSet::new();
        for entry in &features {
            if !seen.insert(entry.dimension.as_str()) {
                return Err(EntitlementError::InvalidFeature {
                    plan_id: id,
                    dimension: entry.dimension.clone(),
                    reason: "dimension declared more than once".into(),
                });
            }
            if !entry.policy.accepts(&entry.value) {
                return Err(EntitlementError::InvalidFeature {
                    plan_id: id,
                    dimension: entry.dimension.clone(),
                    reason: format!(
                        "policy {} cannot merge a {} value",
                        entry.policy,
                        entry.value.kind()
                    ),
                });
            }
        }
        Ok(Self { id, features })
    }

    /// Built-in plan whose entries are known to be well formed.
    pub(crate) fn builtin(id: &'static str, features: Vec<FeatureEntry>) -> Self {
        Self { id: PlanId::from_static(id), features }
    }

    /// Plan ID
    pub fn id(&self) -> &PlanId {
        &self.id
    }

    /// Feature entries in declaration order
    pub fn features(&self) -> &[FeatureEntry] {
        &self.features
    }

    /// Entry for a dimension
    pub fn feature(&self, dimension: &str) -> Option<&FeatureEntry> {
        self.features.iter().find(|f| f.dimension.as_str() == dimension)
    }
}

/// A space's base plan and add-ons, as read from the subscription store.
#[derive(Debug, Clone)]
pub struct Subscription {
    space_id: SpaceId,
    base: Arc<Plan>,
    add_ons: Vec<Arc<Plan>>,
}

impl Subscription {
    /// Create subscription. Every plan id appears once: add-ons repeating
    /// the base plan or an earlier add-on are dropped.
    pub fn new(
        space_id: SpaceId,
        base: Arc<Plan>,
        add_ons: impl IntoIterator<Item = Arc<Plan>>,
    ) -> Self {
        let mut seen = HashSet::from([base.id().clone()]);
        let add_ons = add_ons
            .into_iter()
            .filter(|plan| seen.insert(plan.id().clone()))
            .collect();
        Self { space_id, base, add_ons }
    }

    /// Owning space
    pub fn space_id(&self) -> &SpaceId {
        &self.space_id
    }

    /// Base plan
    pub fn base(&self) -> &Plan {
        &self.base
    }

    /// Add-on plans
    pub fn add_ons(&self) -> impl Iterator<Item = &Plan> + '_ {
        self.add_ons.iter().map(|p| p.as_ref())
    }

    /// Add-on plan ids in subscription order
    pub fn add_on_ids(&self) -> Vec<PlanId> {
        self.add_ons.iter().map(|p| p.id().clone()).collect()
    }
}

/// Resolved entitlements: exactly one value per dimension.
///
/// A dimension missing here is absent from every contributing plan, which
/// is not the same as a zero limit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PlanFeatureSet {
    features: BTreeMap<Dimension, FeatureValue>,
}

impl PlanFeatureSet {
    pub(crate) fn from_map(features: BTreeMap<Dimension, FeatureValue>) -> Self {
        Self { features }
    }

    /// Resolved value for a dimension
    pub fn get(&self, dimension: &str) -> Option<&FeatureValue> {
        self.features.get(dimension)
    }

    /// Resolved limit, if the dimension is numeric
    pub fn limit(&self, dimension: &str) -> Option<Limit> {
        self.get(dimension).and_then(FeatureValue::as_limit)
    }

    /// Resolved flag, if the dimension is boolean
    pub fn flag(&self, dimension: &str) -> Option<bool> {
        self.get(dimension).and_then(FeatureValue::as_flag)
    }

    /// Whether the dimension is present
    pub fn contains(&self, dimension: &str) -> bool {
        self.features.contains_key(dimension)
    }

    /// Iterate in dimension order
    pub fn iter(&self) -> impl Iterator<Item = (&Dimension, &FeatureValue)> {
        self.features.iter()
    }

    /// Numeric dimensions in dimension order
    pub fn limits(&self) -> impl Iterator<Item = (&Dimension, Limit)> {
        self.features
            .iter()
            .filter_map(|(d, v)| v.as_limit().map(|limit| (d, limit)))
    }

    /// Number of resolved dimensions
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether nothing resolved
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
