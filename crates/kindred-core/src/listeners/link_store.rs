//! Persisting matches as links.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::identity_of;
use crate::engine::MatchListener;
use crate::error::KindredResult;
use crate::links::LinkStore;
use crate::model::PropertyModel;
use crate::types::{Link, LinkKind, LinkStatus, Record};

/// Writes engine results into a [`LinkStore`].
///
/// Events are grouped per query record. When a record's group ends, its new
/// links are reconciled with the links already stored for it: links the
/// store already holds unchanged are skipped and links outranked by a stored
/// judgment are dropped.
///
/// Stored INFERRED links a record did not reproduce are retracted at the end
/// of the run, unless the pair turned up again from its other record. A run
/// that stops early leaves those links as they were.
pub struct LinkStoreListener {
    model: Arc<PropertyModel>,
    store: Arc<dyn LinkStore>,
    current: Option<String>,
    pending: Vec<Link>,
    retractions: BTreeMap<(String, String), Link>,
}

impl LinkStoreListener {
    pub fn new(model: Arc<PropertyModel>, store: Arc<dyn LinkStore>) -> Self {
        Self {
            model,
            store,
            current: None,
            pending: Vec::new(),
            retractions: BTreeMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn LinkStore> {
        &self.store
    }

    fn add(
        &mut self,
        r1: &Record,
        r2: &Record,
        kind: LinkKind,
        confidence: f64,
    ) -> KindredResult<()> {
        let id1 = identity_of(&self.model, r1)?;
        let id2 = identity_of(&self.model, r2)?;
        if self.current.as_deref() != Some(id1) {
            self.end_record()?;
            self.current = Some(id1.to_string());
        }
        self.pending.push(Link::inferred(id1, id2, kind, confidence));
        Ok(())
    }

    fn end_record(&mut self) -> KindredResult<()> {
        let Some(id) = self.current.take() else {
            return Ok(());
        };
        let fresh = std::mem::take(&mut self.pending);

        let mut old: BTreeMap<(String, String), Link> = self
            .store
            .links_for(&id)?
            .into_iter()
            .map(|l| ((l.id1().to_string(), l.id2().to_string()), l))
            .collect();

        let mut writes = Vec::with_capacity(fresh.len());
        for link in fresh {
            let key = (link.id1().to_string(), link.id2().to_string());
            self.retractions.remove(&key);
            match old.remove(&key) {
                Some(existing) if existing.overrides(&link) || existing.same_judgment(&link) => {}
                _ => writes.push(link),
            }
        }
        for (key, stale) in old {
            if stale.status == LinkStatus::Inferred {
                self.retractions.entry(key).or_insert(stale);
            }
        }

        debug!(record = %id, writes = writes.len(), "Reconciled links");
        for link in writes {
            self.store.assert_link(link)?;
        }
        Ok(())
    }

    fn apply_retractions(&mut self) -> KindredResult<()> {
        let retractions = std::mem::take(&mut self.retractions);
        if !retractions.is_empty() {
            debug!(links = retractions.len(), "Retracting links not found again");
        }
        for (_, mut stale) in retractions {
            stale.retract();
            self.store.assert_link(stale)?;
        }
        Ok(())
    }
}

impl MatchListener for LinkStoreListener {
    fn start_processing(&mut self) -> KindredResult<()> {
        self.current = None;
        self.pending.clear();
        self.retractions.clear();
        Ok(())
    }

    fn batch_ready(&mut self, _size: usize) -> KindredResult<()> {
        self.store.validate_connection()
    }

    fn matches(&mut self, r1: &Record, r2: &Record, confidence: f64) -> KindredResult<()> {
        self.add(r1, r2, LinkKind::Same, confidence)
    }

    fn matches_perhaps(&mut self, r1: &Record, r2: &Record, confidence: f64) -> KindredResult<()> {
        self.add(r1, r2, LinkKind::MaybeSame, confidence)
    }

    fn no_match_for(&mut self, record: &Record) -> KindredResult<()> {
        self.end_record()?;
        self.current = Some(identity_of(&self.model, record)?.to_string());
        Ok(())
    }

    fn batch_done(&mut self) -> KindredResult<()> {
        self.end_record()?;
        self.store.commit()
    }

    fn end_processing(&mut self) -> KindredResult<()> {
        self.end_record()?;
        self.apply_retractions()?;
        self.store.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KindredError;
    use crate::links::{InMemoryLinkStore, MockLinkStore};
    use crate::model::comparators::Exact;
    use crate::model::Property;
    use chrono::{Duration, Utc};

    fn model() -> Arc<PropertyModel> {
        Arc::new(
            PropertyModel::new(
                vec![
                    Property::id("ID"),
                    Property::comparable("NAME", Arc::new(Exact), 0.3, 0.9),
                ],
                0.8,
                0.0,
            )
            .unwrap(),
        )
    }

    fn rec(id: &str) -> Record {
        Record::new().with_value("ID", id).with_value("NAME", "x")
    }

    #[test]
    fn test_batch_lifecycle() {
        let mut store = MockLinkStore::new();
        store.expect_validate_connection().times(1).returning(|| Ok(()));
        store
            .expect_links_for()
            .withf(|id| id == "2")
            .times(1)
            .returning(|_| Ok(vec![]));
        store
            .expect_assert_link()
            .withf(|l| l.id1() == "1" && l.id2() == "2" && l.kind == LinkKind::Same)
            .times(1)
            .returning(|_| Ok(true));
        store.expect_commit().times(1).returning(|| Ok(()));

        let mut listener = LinkStoreListener::new(model(), Arc::new(store));
        listener.batch_ready(2).unwrap();
        listener.matches(&rec("2"), &rec("1"), 0.9).unwrap();
        listener.batch_done().unwrap();
    }

    #[test]
    fn test_stale_inferred_links_are_retracted() {
        let mut store = MockLinkStore::new();
        store.expect_links_for().returning(|_| {
            Ok(vec![
                Link::inferred("1", "2", LinkKind::Same, 0.9),
                Link::inferred("1", "3", LinkKind::Same, 0.9),
                Link::asserted("1", "4", LinkKind::Same),
            ])
        });
        // 1-2 is unchanged, 1-4 is asserted truth: only 1-3 is written
        store
            .expect_assert_link()
            .withf(|l| l.id2() == "3" && l.is_retracted())
            .times(1)
            .returning(|_| Ok(true));
        store.expect_commit().returning(|| Ok(()));

        let mut listener = LinkStoreListener::new(model(), Arc::new(store));
        listener.matches(&rec("1"), &rec("2"), 0.95).unwrap();
        listener.batch_done().unwrap();
        listener.end_processing().unwrap();
    }

    #[test]
    fn test_store_failure_propagates() {
        let mut store = MockLinkStore::new();
        store
            .expect_validate_connection()
            .returning(|| Err(KindredError::connection("gone")));
        let mut listener = LinkStoreListener::new(model(), Arc::new(store));
        assert!(listener.batch_ready(1).is_err());
    }

    #[test]
    fn test_groups_by_query_record() {
        let store = Arc::new(InMemoryLinkStore::new());
        let mut listener = LinkStoreListener::new(model(), store.clone());

        listener.matches(&rec("3"), &rec("1"), 0.9).unwrap();
        listener.matches(&rec("3"), &rec("2"), 0.85).unwrap();
        listener.no_match_for(&rec("4")).unwrap();
        listener.matches_perhaps(&rec("5"), &rec("1"), 0.6).unwrap();
        listener.batch_done().unwrap();

        assert_eq!(store.links_for("3").unwrap().len(), 2);
        assert_eq!(
            store.link_between("1", "5").unwrap().map(|l| l.kind),
            Some(LinkKind::MaybeSame)
        );
        assert!(store.links_for("4").unwrap().is_empty());
    }

    #[test]
    fn test_rerun_retracts_vanished_match() {
        let store = Arc::new(InMemoryLinkStore::new());
        store
            .put_link(
                Link::inferred("1", "2", LinkKind::Same, 0.9)
                    .with_timestamp(Utc::now() - Duration::minutes(1)),
            )
            .unwrap();

        let mut listener = LinkStoreListener::new(model(), store.clone());
        listener.no_match_for(&rec("2")).unwrap();
        listener.batch_done().unwrap();
        assert!(!store.link_between("1", "2").unwrap().unwrap().is_retracted());

        listener.end_processing().unwrap();
        let link = store.link_between("1", "2").unwrap().unwrap();
        assert!(link.is_retracted());
    }

    #[test]
    fn test_pair_found_from_later_record_is_kept() {
        let store = Arc::new(InMemoryLinkStore::new());
        let stamped = Utc::now() - Duration::minutes(1);
        store
            .put_link(Link::inferred("1", "2", LinkKind::Same, 0.9).with_timestamp(stamped))
            .unwrap();

        let mut listener = LinkStoreListener::new(model(), store.clone());
        listener.start_processing().unwrap();
        // record 1 only finds 0; its pair with 2 is decided when 2 comes up
        listener.matches(&rec("1"), &rec("0"), 0.9).unwrap();
        listener.batch_done().unwrap();
        assert!(!store.link_between("1", "2").unwrap().unwrap().is_retracted());

        listener.matches(&rec("2"), &rec("1"), 0.9).unwrap();
        listener.batch_done().unwrap();
        listener.end_processing().unwrap();

        let link = store.link_between("1", "2").unwrap().unwrap();
        assert_eq!(link.status, LinkStatus::Inferred);
        assert_eq!(link.timestamp, stamped);
        assert!(store.link_between("0", "1").unwrap().is_some());
    }

    #[test]
    fn test_missing_identity_is_an_error() {
        let store = Arc::new(InMemoryLinkStore::new());
        let mut listener = LinkStoreListener::new(model(), store);
        let anonymous = Record::new().with_value("NAME", "x");
        assert!(matches!(
            listener.matches(&anonymous, &rec("1"), 0.9),
            Err(KindredError::Listener { .. })
        ));
    }
}
