//! Subscription plans and feature sets

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::Money;

/// Unique plan identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(pub Uuid);

impl PlanId {
    /// Create a new random plan ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A service plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Plan ID
    pub id: PlanId,
    /// Display name
    pub name: String,
    /// Monthly rate; zero means the plan is free (no card, no billing)
    pub rate: Money,
    /// Feature set granted by the plan
    pub feature_set_id: String,
}

impl Plan {
    /// Create a plan
    pub fn new(name: impl Into<String>, rate: Money, feature_set_id: impl Into<String>) -> Self {
        Self {
            id: PlanId::new(),
            name: name.into(),
            rate,
            feature_set_id: feature_set_id.into(),
        }
    }

    /// Whether subscribers on this plan are billed at all
    pub fn is_paid(&self) -> bool {
        self.rate.is_positive()
    }

    /// Whether this plan is free of charge
    pub fn is_free(&self) -> bool {
        !self.is_paid()
    }
}

/// A named set of feature flags granted by a plan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureSet {
    /// Feature set identifier, referenced from [`Plan::feature_set_id`]
    pub id: String,
    /// Feature flags
    pub features: HashMap<String, bool>,
}

impl FeatureSet {
    /// Create a feature set
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            features: HashMap::new(),
        }
    }

    /// Grant a feature
    pub fn with_feature(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.features.insert(name.into(), enabled);
        self
    }

    /// Whether the feature is granted; unknown features are not
    pub fn has(&self, feature: &str) -> bool {
        self.features.get(feature).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paid_and_free() {
        let free = Plan::new("free", Money::ZERO, "basic");
        let paid = Plan::new("premium", Money::from_cents(3041), "full");
        assert!(free.is_free());
        assert!(!free.is_paid());
        assert!(paid.is_paid());
    }

    #[test]
    fn test_feature_set_lookup() {
        let features = FeatureSet::new("full")
            .with_feature("api_access", true)
            .with_feature("exports", false);
        assert!(features.has("api_access"));
        assert!(!features.has("exports"));
        assert!(!features.has("unknown"));
    }
}
