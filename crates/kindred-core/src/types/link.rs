//! Link types: persisted match judgments between two record identities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// What a link claims about its two records.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkKind {
    Same,
    MaybeSame,
    Different,
}

impl LinkKind {
    /// Stable integer code used by persistent stores.
    pub fn code(&self) -> i64 {
        match self {
            LinkKind::Same => 1,
            LinkKind::MaybeSame => 2,
            LinkKind::Different => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(LinkKind::Same),
            2 => Some(LinkKind::MaybeSame),
            3 => Some(LinkKind::Different),
            _ => None,
        }
    }
}

/// Where a link came from, and whether it still holds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkStatus {
    /// Externally supplied truth.
    Asserted,
    /// Produced by matching or by inference.
    Inferred,
    /// No longer believed. Kept for the audit trail.
    Retracted,
}

impl LinkStatus {
    /// Stable integer code used by persistent stores.
    pub fn code(&self) -> i64 {
        match self {
            LinkStatus::Retracted => 0,
            LinkStatus::Inferred => 1,
            LinkStatus::Asserted => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(LinkStatus::Retracted),
            1 => Some(LinkStatus::Inferred),
            2 => Some(LinkStatus::Asserted),
            _ => None,
        }
    }
}

/// A link between two record identities.
///
/// The pair is unordered and always stored with `id1 < id2`. Two links are
/// equal when they connect the same pair, whatever their kind or status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    id1: String,
    id2: String,
    pub kind: LinkKind,
    pub status: LinkStatus,
    /// Confidence in the judgment, in [0, 1].
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl Link {
    /// Create a link stamped with the current time. The ids must differ.
    pub fn new(
        id1: impl Into<String>,
        id2: impl Into<String>,
        kind: LinkKind,
        status: LinkStatus,
        confidence: f64,
    ) -> Self {
        let (id1, id2) = (id1.into(), id2.into());
        debug_assert_ne!(id1, id2, "a link needs two distinct ids");
        let (id1, id2) = if id1 <= id2 { (id1, id2) } else { (id2, id1) };
        Self {
            id1,
            id2,
            kind,
            status,
            confidence: confidence.clamp(0.0, 1.0),
            timestamp: Utc::now(),
        }
    }

    /// Create an ASSERTED link with full confidence.
    pub fn asserted(id1: impl Into<String>, id2: impl Into<String>, kind: LinkKind) -> Self {
        Self::new(id1, id2, kind, LinkStatus::Asserted, 1.0)
    }

    /// Create an INFERRED link.
    pub fn inferred(
        id1: impl Into<String>,
        id2: impl Into<String>,
        kind: LinkKind,
        confidence: f64,
    ) -> Self {
        Self::new(id1, id2, kind, LinkStatus::Inferred, confidence)
    }

    /// Set the timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn id1(&self) -> &str {
        &self.id1
    }

    pub fn id2(&self) -> &str {
        &self.id2
    }

    /// Whether `id` is one of the two endpoints.
    pub fn involves(&self, id: &str) -> bool {
        self.id1 == id || self.id2 == id
    }

    /// The endpoint that is not `id`. Returns `id2` if `id` is neither.
    pub fn other_id(&self, id: &str) -> &str {
        if self.id1 == id {
            &self.id2
        } else {
            &self.id1
        }
    }

    pub fn is_retracted(&self) -> bool {
        self.status == LinkStatus::Retracted
    }

    /// Whether this link should replace `other` for the same pair.
    ///
    /// ASSERTED outranks anything else. Otherwise the strictly newer link wins.
    pub fn overrides(&self, other: &Link) -> bool {
        match (self.status, other.status) {
            (LinkStatus::Asserted, s) if s != LinkStatus::Asserted => true,
            (s, LinkStatus::Asserted) if s != LinkStatus::Asserted => false,
            _ => self.timestamp > other.timestamp,
        }
    }

    /// Flip to RETRACTED, reset confidence and restamp.
    pub fn retract(&mut self) {
        self.status = LinkStatus::Retracted;
        self.confidence = 0.0;
        self.timestamp = Utc::now();
    }

    /// Whether two links make the same claim (kind and status).
    pub fn same_judgment(&self, other: &Link) -> bool {
        self.kind == other.kind && self.status == other.status
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.id1 == other.id1 && self.id2 == other.id2
    }
}

impl Eq for Link {}

impl std::hash::Hash for Link {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id1.hash(state);
        self.id2.hash(state);
    }
}

impl std::fmt::Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} {} {} {} {:.3}]",
            self.id1, self.kind, self.id2, self.status, self.confidence
        )
    }
}
