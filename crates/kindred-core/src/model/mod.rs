//! Property model: per-property calibration and record-level scoring.
//!
//! The model owns the configured properties, the match thresholds, and the
//! lookup set: the properties worth indexing and querying for candidates.

pub mod bayes;
pub mod comparators;
mod property;

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::MatchConfig;
use crate::error::{ErrorCode, KindredError, KindredResult};
use crate::types::Record;

pub use comparators::{Comparator, ComparatorKind};
pub use property::{LookupPolicy, Property, PropertyRole, NEUTRAL};

/// Outcome of comparing a pair against the thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchClass {
    Match,
    Maybe,
    NoMatch,
}

/// Validated set of properties plus thresholds.
#[derive(Debug, Clone)]
pub struct PropertyModel {
    properties: Vec<Property>,
    by_name: HashMap<String, usize>,
    identity: usize,
    lookup: Vec<usize>,
    threshold: f64,
    maybe_threshold: f64,
}

impl PropertyModel {
    /// Validate the properties and thresholds and derive the lookup set.
    pub fn new(
        properties: Vec<Property>,
        threshold: f64,
        maybe_threshold: f64,
    ) -> KindredResult<Self> {
        if properties.is_empty() {
            return Err(KindredError::configuration(
                ErrorCode::CfgNoProperties,
                "No properties configured",
            ));
        }
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(KindredError::configuration(
                ErrorCode::CfgInvalidValue,
                format!("threshold {} is outside (0, 1]", threshold),
            ));
        }
        if !(0.0..threshold).contains(&maybe_threshold) {
            return Err(KindredError::configuration_with_suggestion(
                ErrorCode::CfgInvalidValue,
                format!(
                    "maybe threshold {} must be in [0, threshold {})",
                    maybe_threshold, threshold
                ),
                "Use 0 to disable possible matches",
            ));
        }

        let mut by_name = HashMap::with_capacity(properties.len());
        for (ix, prop) in properties.iter().enumerate() {
            if by_name.insert(prop.name().to_string(), ix).is_some() {
                return Err(KindredError::configuration(
                    ErrorCode::CfgDuplicateProperty,
                    format!("Property '{}' is configured twice", prop.name()),
                ));
            }
            if prop.is_compared() {
                for (label, p) in [("low", prop.low()), ("high", prop.high())] {
                    if !(p > 0.0 && p < 1.0) {
                        return Err(KindredError::configuration(
                            ErrorCode::CfgInvalidProbability,
                            format!(
                                "Property '{}' has {} probability {} outside (0, 1)",
                                prop.name(),
                                label,
                                p
                            ),
                        ));
                    }
                }
            }
        }

        let ids: Vec<usize> = properties
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_id())
            .map(|(ix, _)| ix)
            .collect();
        let identity = match ids.as_slice() {
            [] => {
                return Err(KindredError::configuration(
                    ErrorCode::CfgMissingIdentity,
                    "No identity property",
                ))
            }
            [ix] => *ix,
            _ => {
                return Err(KindredError::configuration(
                    ErrorCode::CfgDuplicateIdentity,
                    "Only one identity property is allowed",
                ))
            }
        };

        let max = bayes::combine_all(
            properties.iter().filter(|p| p.is_compared()).map(Property::high),
        );
        if max < threshold {
            return Err(KindredError::configuration_with_suggestion(
                ErrorCode::CfgUnreachableThreshold,
                format!(
                    "Maximum possible probability is {}, which is below the threshold {}; no matches will ever be found",
                    max, threshold
                ),
                "Raise the high probabilities or lower the threshold",
            ));
        }

        let lookup = derive_lookup(&properties, threshold);
        debug!(
            lookup = ?lookup.iter().map(|ix| properties[*ix].name()).collect::<Vec<_>>(),
            threshold,
            "Derived lookup properties"
        );

        Ok(Self {
            properties,
            by_name,
            identity,
            lookup,
            threshold,
            maybe_threshold,
        })
    }

    /// Build the model described by a configuration.
    pub fn from_config(config: &MatchConfig) -> KindredResult<Self> {
        let properties = config
            .properties
            .iter()
            .map(|pc| {
                let prop = match (pc.role, &pc.comparator) {
                    (PropertyRole::Id, _) => Property::id(&pc.name),
                    (PropertyRole::Ignored, _) => Property::ignored(&pc.name),
                    (PropertyRole::Comparable, Some(kind)) => {
                        Property::comparable(&pc.name, kind.build(), pc.low, pc.high)
                    }
                    (PropertyRole::Comparable, None) => Property::uncompared(&pc.name),
                };
                if pc.role == PropertyRole::Comparable {
                    prop.with_lookup(pc.lookup)
                } else {
                    prop
                }
            })
            .collect();
        Self::new(properties, config.threshold, config.maybe_threshold)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn maybe_threshold(&self) -> f64 {
        self.maybe_threshold
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.by_name.get(name).map(|ix| &self.properties[*ix])
    }

    /// The single identity property.
    pub fn identity_property(&self) -> &Property {
        &self.properties[self.identity]
    }

    /// The identity value of a record.
    pub fn identity<'r>(&self, record: &'r Record) -> Option<&'r str> {
        record.value(self.identity_property().name())
    }

    /// Properties used for indexing and candidate lookup.
    pub fn lookup_properties(&self) -> impl Iterator<Item = &Property> {
        self.lookup.iter().map(|ix| &self.properties[*ix])
    }

    /// Whether two records share an identity value.
    pub fn same_identity(&self, r1: &Record, r2: &Record) -> bool {
        let name = self.identity_property().name();
        r1.non_blank_values(name)
            .any(|v1| r2.non_blank_values(name).any(|v2| v1 == v2))
    }

    /// Probability that two records describe the same entity.
    ///
    /// Every compared property with a value on both sides contributes the best
    /// probability over its value pairs.
    pub fn compare(&self, r1: &Record, r2: &Record) -> KindredResult<f64> {
        let mut prob = bayes::PRIOR;
        for prop in self.properties.iter().filter(|p| p.is_compared()) {
            let mut best: Option<f64> = None;
            for v1 in r1.non_blank_values(prop.name()) {
                for v2 in r2.non_blank_values(prop.name()) {
                    let p = prop.compare(v1, v2)?;
                    best = Some(best.map_or(p, |b| b.max(p)));
                }
            }
            if let Some(p) = best {
                prob = bayes::combine(prob, p);
            }
        }
        Ok(prob)
    }

    /// Classify a probability against the thresholds.
    pub fn classify(&self, prob: f64) -> MatchClass {
        if prob > self.threshold {
            MatchClass::Match
        } else if self.maybe_threshold != 0.0 && prob > self.maybe_threshold {
            MatchClass::Maybe
        } else {
            MatchClass::NoMatch
        }
    }
}

/// Accumulate high probabilities from the strongest property downwards; the
/// shortest prefix that reaches the threshold is looked up, together with
/// every ALWAYS and REQUIRED property.
fn derive_lookup(properties: &[Property], threshold: f64) -> Vec<usize> {
    let mut candidates: Vec<usize> = properties
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_compared() && p.lookup() != LookupPolicy::Never && p.high() > 0.0)
        .map(|(ix, _)| ix)
        .collect();
    // stable: ties keep declaration order
    candidates.sort_by(|a, b| properties[*b].high().total_cmp(&properties[*a].high()));

    let mut prob = bayes::PRIOR;
    let mut end = None;
    for (pos, ix) in candidates.iter().enumerate() {
        prob = bayes::combine(prob, properties[*ix].high());
        if prob >= threshold {
            end = Some(pos + 1);
            break;
        }
    }

    let mut lookup = match end {
        Some(end) => candidates[..end].to_vec(),
        None => {
            warn!(
                threshold,
                "No lookup prefix reaches the threshold, looking up every candidate property"
            );
            candidates
        }
    };

    for (ix, prop) in properties.iter().enumerate() {
        if matches!(prop.lookup(), LookupPolicy::Always | LookupPolicy::Required)
            && prop.role() == PropertyRole::Comparable
            && !lookup.contains(&ix)
        {
            lookup.push(ix);
        }
    }
    lookup
}
