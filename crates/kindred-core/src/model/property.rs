//! Properties: per-field comparison and probability calibration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use strum::{Display, EnumString};

use super::comparators::Comparator;
use crate::error::{KindredError, KindredResult};

/// Uninformative probability, used when a property has no comparator.
pub const NEUTRAL: f64 = 0.5;

/// What a property is used for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PropertyRole {
    /// Identifies the record; never compared.
    Id,
    /// Carried along but never compared.
    Ignored,
    #[default]
    Comparable,
}

/// Whether a property drives candidate retrieval.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LookupPolicy {
    /// Used for lookup, and candidates must share a token in it.
    Required,
    /// Always used for lookup.
    Always,
    /// Never used for lookup.
    Never,
    /// Decided from the calibration and the threshold.
    #[default]
    Auto,
}

/// A configured property.
#[derive(Clone)]
pub struct Property {
    name: String,
    role: PropertyRole,
    comparator: Option<Arc<dyn Comparator>>,
    low: f64,
    high: f64,
    lookup: LookupPolicy,
}

impl Property {
    /// The identity property.
    pub fn id(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: PropertyRole::Id,
            comparator: None,
            low: NEUTRAL,
            high: NEUTRAL,
            lookup: LookupPolicy::Never,
        }
    }

    /// A property that is kept but never compared.
    pub fn ignored(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: PropertyRole::Ignored,
            comparator: None,
            low: NEUTRAL,
            high: NEUTRAL,
            lookup: LookupPolicy::Never,
        }
    }

    /// A compared property with its calibration.
    pub fn comparable(
        name: impl Into<String>,
        comparator: Arc<dyn Comparator>,
        low: f64,
        high: f64,
    ) -> Self {
        Self {
            name: name.into(),
            role: PropertyRole::Comparable,
            comparator: Some(comparator),
            low,
            high,
            lookup: LookupPolicy::Auto,
        }
    }

    /// A compared property without a comparator; it always yields 0.5.
    pub fn uncompared(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: PropertyRole::Comparable,
            comparator: None,
            low: NEUTRAL,
            high: NEUTRAL,
            lookup: LookupPolicy::Auto,
        }
    }

    /// Set the lookup policy.
    pub fn with_lookup(mut self, lookup: LookupPolicy) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> PropertyRole {
        self.role
    }

    pub fn is_id(&self) -> bool {
        self.role == PropertyRole::Id
    }

    pub fn is_ignored(&self) -> bool {
        self.role == PropertyRole::Ignored
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn lookup(&self) -> LookupPolicy {
        self.lookup
    }

    pub fn comparator(&self) -> Option<&Arc<dyn Comparator>> {
        self.comparator.as_ref()
    }

    /// Whether this property contributes evidence when records are compared.
    pub fn is_compared(&self) -> bool {
        self.role == PropertyRole::Comparable && self.comparator.is_some()
    }

    /// Probability that two values denote the same entity.
    ///
    /// Similarity at or above 0.5 maps quadratically onto `[0.5, high]`;
    /// anything weaker yields `low`.
    pub fn compare(&self, v1: &str, v2: &str) -> KindredResult<f64> {
        let Some(comparator) = &self.comparator else {
            return Ok(NEUTRAL);
        };

        let sim = comparator.similarity(v1, v2).map_err(|e| match e {
            e @ KindredError::Comparison { .. } => e,
            other => KindredError::Comparison {
                property: self.name.clone(),
                value1: v1.to_string(),
                value2: v2.to_string(),
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        })?;
        if !(0.0..=1.0).contains(&sim) {
            return Err(KindredError::comparison(
                &self.name,
                v1,
                v2,
                format!("similarity {} outside [0, 1]", sim),
            ));
        }

        if sim >= 0.5 {
            Ok(NEUTRAL + (self.high - NEUTRAL) * sim * sim)
        } else {
            Ok(self.low)
        }
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("compared", &self.comparator.is_some())
            .field("low", &self.low)
            .field("high", &self.high)
            .field("lookup", &self.lookup)
            .finish()
    }
}
