//! Link store contract and inference.
//!
//! A [`LinkStore`] persists pairwise judgments ([`Link`]s) between record
//! identities. Backends only provide storage primitives; precedence,
//! transitive inference and consistency checking are provided methods
//! shared by every backend.

mod gold;
mod memory;

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use tracing::{debug, warn};

use crate::error::{ErrorCode, KindredError, KindredResult};
use crate::types::{Link, LinkKind, LinkStatus};

pub use gold::load_gold_standard;
pub use memory::InMemoryLinkStore;

/// Two identities in one SAME closure that also carry a direct DIFFERENT link.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Inconsistency {
    pub id1: String,
    pub id2: String,
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.id1, self.id2)
    }
}

/// Storage for links between record identities.
///
/// Methods take `&self`; backends synchronize internally. Retracted links are
/// kept for audit but never contribute to classes, closures or inference.
#[cfg_attr(test, mockall::automock)]
pub trait LinkStore: Send + Sync {
    /// Insert or replace the link for its pair, unconditionally.
    fn put_link(&self, link: Link) -> KindredResult<()>;

    /// The stored link for a pair, in either order, retracted or not.
    fn link_between(&self, id1: &str, id2: &str) -> KindredResult<Option<Link>>;

    /// Every stored link involving `id`.
    fn links_for(&self, id: &str) -> KindredResult<Vec<Link>>;

    /// Every stored link, once each.
    fn all_links(&self) -> KindredResult<Vec<Link>>;

    /// Links stamped after `since` and at or before `before`, newest first.
    fn changes_since(
        &self,
        since: DateTime<Utc>,
        before: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> KindredResult<Vec<Link>>;

    /// Remove every link.
    fn clear(&self) -> KindredResult<()>;

    /// Whether [`LinkStore::assert_link`] derives transitive links.
    fn inference_enabled(&self) -> bool;

    /// Check the backing connection and reconnect if it went stale.
    fn validate_connection(&self) -> KindredResult<()> {
        Ok(())
    }

    /// Make pending writes durable.
    fn commit(&self) -> KindredResult<()> {
        Ok(())
    }

    fn close(&self) -> KindredResult<()> {
        Ok(())
    }

    /// Record a judgment, honoring precedence.
    ///
    /// Returns `false` without touching the store when the existing link for
    /// the pair outranks `link`. With inference enabled, a SAME link gives
    /// each side's class the other side's links, and a DIFFERENT link makes
    /// each side's class different from the other side. Derived links only
    /// fill pairs that are absent or retracted. A link from an id to itself
    /// is rejected.
    fn assert_link(&self, link: Link) -> KindredResult<bool> {
        if link.id1() == link.id2() {
            return Err(KindredError::Parse {
                message: format!("link from '{}' to itself", link.id1()),
                code: ErrorCode::ParseInvalidValue,
            });
        }
        if let Some(existing) = self.link_between(link.id1(), link.id2())? {
            if !link.overrides(&existing) {
                debug!(link = %link, existing = %existing, "Existing link takes precedence");
                return Ok(false);
            }
        }

        if self.inference_enabled() && !link.is_retracted() {
            match link.kind {
                LinkKind::Same => {
                    copy_links(self, &link, link.id1(), link.id2())?;
                    copy_links(self, &link, link.id2(), link.id1())?;
                }
                LinkKind::Different => {
                    spread_difference(self, &link, link.id1(), link.id2())?;
                    spread_difference(self, &link, link.id2(), link.id1())?;
                }
                LinkKind::MaybeSame => {}
            }
        }

        self.put_link(link)?;
        Ok(true)
    }

    /// `id` and every identity one live SAME link away from it.
    fn class_of(&self, id: &str) -> KindredResult<BTreeSet<String>> {
        let mut class: BTreeSet<String> = same_links(self, id)?
            .iter()
            .map(|l| l.other_id(id).to_string())
            .collect();
        class.insert(id.to_string());
        Ok(class)
    }

    /// Every identity reachable from `id` over live SAME links, `id` included.
    fn closure_of(&self, id: &str) -> KindredResult<BTreeSet<String>> {
        let mut seen = BTreeSet::from([id.to_string()]);
        let mut queue = VecDeque::from([id.to_string()]);
        while let Some(current) = queue.pop_front() {
            for link in same_links(self, &current)? {
                let other = link.other_id(&current);
                if seen.insert(other.to_string()) {
                    queue.push_back(other.to_string());
                }
            }
        }
        Ok(seen)
    }

    /// The live direct link for a pair, or an INFERRED SAME link if the two
    /// are connected through a chain of SAME links.
    ///
    /// The inferred confidence is the weakest link on the shortest chain.
    fn infer_link(&self, id1: &str, id2: &str) -> KindredResult<Option<Link>> {
        if let Some(link) = self.link_between(id1, id2)? {
            if !link.is_retracted() {
                return Ok(Some(link));
            }
        }

        let mut confidence = HashMap::from([(id1.to_string(), 1.0_f64)]);
        let mut queue = VecDeque::from([id1.to_string()]);
        while let Some(current) = queue.pop_front() {
            let reached = confidence.get(&current).copied().unwrap_or(1.0);
            for link in same_links(self, &current)? {
                let other = link.other_id(&current).to_string();
                if confidence.contains_key(&other) {
                    continue;
                }
                let conf = reached.min(link.confidence);
                if other == id2 {
                    return Ok(Some(Link::inferred(id1, id2, LinkKind::Same, conf)));
                }
                confidence.insert(other.clone(), conf);
                queue.push_back(other);
            }
        }
        Ok(None)
    }

    /// Every pair that is SAME by closure yet directly DIFFERENT.
    fn check_consistency(&self) -> KindredResult<Vec<Inconsistency>> {
        let mut found = BTreeSet::new();
        let mut ids = BTreeSet::new();
        for link in self.all_links()? {
            ids.insert(link.id1().to_string());
            ids.insert(link.id2().to_string());
        }

        for id in &ids {
            let different: BTreeSet<String> = self
                .links_for(id)?
                .into_iter()
                .filter(|l| l.kind == LinkKind::Different && !l.is_retracted())
                .map(|l| l.other_id(id).to_string())
                .collect();
            if different.is_empty() {
                continue;
            }
            for member in self.closure_of(id)? {
                if different.contains(&member) {
                    let (id1, id2) = if *id < member {
                        (id.clone(), member)
                    } else {
                        (member, id.clone())
                    };
                    found.insert(Inconsistency { id1, id2 });
                }
            }
        }

        for inconsistency in &found {
            warn!(pair = %inconsistency, "Inconsistent links");
        }
        Ok(found.into_iter().collect())
    }
}

fn same_links<S: LinkStore + ?Sized>(store: &S, id: &str) -> KindredResult<Vec<Link>> {
    Ok(store
        .links_for(id)?
        .into_iter()
        .filter(|l| l.kind == LinkKind::Same && !l.is_retracted())
        .collect())
}

/// A link derived from the given links: ASSERTED only if all of them are,
/// as confident as the weakest.
fn derive(id1: &str, id2: &str, kind: LinkKind, from: &[&Link]) -> Link {
    let status = if from.iter().all(|l| l.status == LinkStatus::Asserted) {
        LinkStatus::Asserted
    } else {
        LinkStatus::Inferred
    };
    let confidence = from.iter().map(|l| l.confidence).fold(1.0, f64::min);
    Link::new(id1, id2, kind, status, confidence)
}

/// Store a derived link unless the pair already has a live one.
fn fill<S: LinkStore + ?Sized>(store: &S, link: Link) -> KindredResult<()> {
    match store.link_between(link.id1(), link.id2())? {
        Some(existing) if !existing.is_retracted() => Ok(()),
        _ => {
            debug!(link = %link, "Derived link");
            store.put_link(link)
        }
    }
}

/// Give every member of `a`'s class copies of `b`'s SAME and DIFFERENT links.
fn copy_links<S: LinkStore + ?Sized>(
    store: &S,
    trigger: &Link,
    a: &str,
    b: &str,
) -> KindredResult<()> {
    let mut members: Vec<(String, Option<Link>)> = vec![(a.to_string(), None)];
    for link in same_links(store, a)? {
        if link.involves(b) {
            continue;
        }
        members.push((link.other_id(a).to_string(), Some(link)));
    }

    for (member, via) in &members {
        for source in store.links_for(b)? {
            if source.is_retracted() || source.kind == LinkKind::MaybeSame {
                continue;
            }
            let other = source.other_id(b);
            if other == member || other == a {
                continue;
            }
            let mut from = vec![trigger, &source];
            from.extend(via.as_ref());
            fill(store, derive(member, other, source.kind, &from))?;
        }
    }
    Ok(())
}

/// Make every SAME neighbour of `a` DIFFERENT from `b`.
fn spread_difference<S: LinkStore + ?Sized>(
    store: &S,
    trigger: &Link,
    a: &str,
    b: &str,
) -> KindredResult<()> {
    for via in same_links(store, a)? {
        let member = via.other_id(a);
        if member == b {
            continue;
        }
        fill(store, derive(member, b, LinkKind::Different, &[trigger, &via]))?;
    }
    Ok(())
}
