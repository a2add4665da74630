//! In-memory token index.

use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

use super::bucket::{specificity, Bucket};
use super::{Candidate, InternalId, StorageBackend, BUMP_CUTOFF_FACTOR, COLLECT_CUTOFF_FACTOR};
use crate::config::IndexConfig;
use crate::error::KindredResult;
use crate::model::comparators::tokenize;
use crate::model::{LookupPolicy, PropertyModel};
use crate::types::Record;

/// Blocking index kept entirely in memory.
///
/// Every lookup-property value is split on whitespace and the record's
/// internal id appended to the bucket for `(property, token)`. Records become
/// visible to lookups at [`StorageBackend::commit`].
pub struct InMemoryCandidateIndex {
    model: Arc<PropertyModel>,
    config: IndexConfig,
    records: Vec<Arc<Record>>,
    by_identity: HashMap<String, InternalId>,
    buckets: HashMap<String, HashMap<String, Bucket>>,
    watermark: InternalId,
    saturated: usize,
}

/// Buckets relevant to one query, before scoring.
struct QueryBuckets<'a> {
    open: Vec<&'a [InternalId]>,
    /// Per REQUIRED property: its open buckets and whether any were saturated.
    required: Vec<(Vec<&'a [InternalId]>, bool)>,
}

impl InMemoryCandidateIndex {
    pub fn new(model: Arc<PropertyModel>, config: IndexConfig) -> Self {
        Self {
            model,
            config,
            records: Vec::new(),
            by_identity: HashMap::new(),
            buckets: HashMap::new(),
            watermark: 0,
            saturated: 0,
        }
    }

    /// Number of distinct (property, token) buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.values().map(HashMap::len).sum()
    }

    /// Number of buckets that outgrew the size cap.
    pub fn saturated_bucket_count(&self) -> usize {
        self.saturated
    }

    fn query_buckets(&self, record: &Record, limit: InternalId) -> QueryBuckets<'_> {
        let mut seen: HashSet<(&str, &str)> = HashSet::new();
        let mut open = Vec::new();
        let mut required = Vec::new();

        for prop in self.model.lookup_properties() {
            let Some(tokens) = self.buckets.get(prop.name()) else {
                if prop.lookup() == LookupPolicy::Required && record.has_value(prop.name()) {
                    // nothing indexed shares this property, so nothing qualifies
                    required.push((Vec::new(), false));
                }
                continue;
            };
            let mut prop_open = Vec::new();
            let mut prop_saturated = false;
            for value in record.non_blank_values(prop.name()) {
                for token in tokenize(value) {
                    if !seen.insert((prop.name(), token)) {
                        continue;
                    }
                    match tokens.get(token) {
                        Some(bucket) if bucket.is_saturated() => prop_saturated = true,
                        Some(bucket) => {
                            let ids = bucket.visible(limit);
                            if !ids.is_empty() {
                                open.push(ids);
                                prop_open.push(ids);
                            }
                        }
                        None => {}
                    }
                }
            }
            if prop.lookup() == LookupPolicy::Required && record.has_value(prop.name()) {
                required.push((prop_open, prop_saturated));
            }
        }

        QueryBuckets { open, required }
    }
}

impl StorageBackend for InMemoryCandidateIndex {
    fn index(&mut self, record: Arc<Record>) -> KindredResult<InternalId> {
        let id = self.records.len() as InternalId;

        for value in record.non_blank_values(self.model.identity_property().name()) {
            self.by_identity.insert(value.to_string(), id);
        }

        for prop in self.model.lookup_properties() {
            let tokens = self.buckets.entry(prop.name().to_string()).or_default();
            for value in record.non_blank_values(prop.name()) {
                for token in tokenize(value) {
                    let bucket = tokens.entry(token.to_string()).or_default();
                    if bucket.push(id, self.config.max_bucket_size) {
                        self.saturated += 1;
                        debug!(
                            property = prop.name(),
                            token,
                            max_size = self.config.max_bucket_size,
                            "Bucket saturated"
                        );
                    }
                }
            }
        }

        self.records.push(record);
        Ok(id)
    }

    fn commit(&mut self) -> KindredResult<()> {
        self.watermark = self.records.len() as InternalId;
        trace!(records = self.watermark, "Index committed");
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> KindredResult<Option<Arc<Record>>> {
        Ok(self
            .by_identity
            .get(id)
            .filter(|ix| **ix < self.watermark)
            .map(|ix| Arc::clone(&self.records[*ix as usize])))
    }

    fn find_candidates_before(
        &self,
        record: &Record,
        bound: InternalId,
    ) -> KindredResult<Vec<Candidate>> {
        let QueryBuckets { mut open, required } =
            self.query_buckets(record, self.watermark.min(bound));
        if open.is_empty() {
            return Ok(Vec::new());
        }

        open.sort_by_key(|ids| ids.len());
        let scores: Vec<f64> = open.iter().map(|ids| specificity(ids.len())).collect();
        let total: f64 = scores.iter().sum();
        let min_relevance = self.config.min_relevance;

        // the largest buckets, up to min_relevance of the score mass, are
        // only checked for membership
        let mut full_scan = open.len();
        if min_relevance > 0.0 {
            let mut tail = 0.0;
            while full_scan > 1 && (tail + scores[full_scan - 1]) / total < min_relevance {
                tail += scores[full_scan - 1];
                full_scan -= 1;
            }
        }

        let collect_limit = COLLECT_CUTOFF_FACTOR.saturating_mul(self.config.max_search_hits);
        let mut found: HashMap<InternalId, f64> = HashMap::new();
        let mut next = 0;
        while next < full_scan && found.len() < collect_limit {
            for id in open[next] {
                *found.entry(*id).or_insert(0.0) += scores[next];
            }
            next += 1;
        }

        for (ids, score) in open[next..].iter().zip(&scores[next..]) {
            if ids.len() > BUMP_CUTOFF_FACTOR.saturating_mul(found.len()) {
                break;
            }
            for (id, acc) in found.iter_mut() {
                if ids.binary_search(id).is_ok() {
                    *acc += score;
                }
            }
        }

        for (buckets, saturated) in &required {
            if buckets.is_empty() && *saturated {
                continue;
            }
            found.retain(|id, _| buckets.iter().any(|ids| ids.binary_search(id).is_ok()));
        }

        let mut ranked: Vec<(InternalId, f64)> =
            if min_relevance == 0.0 && found.len() <= self.config.max_search_hits {
                found.into_iter().collect()
            } else {
                let best = found.values().copied().fold(0.0, f64::max);
                let mut heap = BinaryHeap::with_capacity(self.config.max_search_hits + 1);
                for (id, score) in found {
                    if best > 0.0 && score / best < min_relevance {
                        continue;
                    }
                    heap.push(Reverse((OrderedFloat(score), Reverse(id))));
                    if heap.len() > self.config.max_search_hits {
                        heap.pop();
                    }
                }
                heap.into_iter()
                    .map(|Reverse((score, Reverse(id)))| (id, score.into_inner()))
                    .collect()
            };
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        trace!(
            buckets = open.len(),
            full_scan,
            candidates = ranked.len(),
            "Found candidates"
        );

        Ok(ranked
            .into_iter()
            .map(|(internal_id, score)| Candidate {
                internal_id,
                score,
                record: Arc::clone(&self.records[internal_id as usize]),
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.watermark as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::comparators::Exact;
    use crate::model::Property;

    fn model() -> Arc<PropertyModel> {
        Arc::new(
            PropertyModel::new(
                vec![
                    Property::id("ID"),
                    Property::comparable("NAME", Arc::new(Exact), 0.3, 0.9)
                        .with_lookup(LookupPolicy::Always),
                    Property::comparable("EMAIL", Arc::new(Exact), 0.3, 0.95)
                        .with_lookup(LookupPolicy::Always),
                ],
                0.85,
                0.0,
            )
            .unwrap(),
        )
    }

    fn person(id: &str, name: &str, email: &str) -> Arc<Record> {
        Arc::new(
            Record::new()
                .with_value("ID", id)
                .with_value("NAME", name)
                .with_value("EMAIL", email),
        )
    }

    fn ids(candidates: &[Candidate]) -> Vec<&str> {
        candidates
            .iter()
            .map(|c| c.record.value("ID").unwrap())
            .collect()
    }

    #[test]
    fn test_internal_ids_are_monotonic() {
        let mut index = InMemoryCandidateIndex::new(model(), IndexConfig::default());
        assert_eq!(index.index(person("1", "a", "a@x")).unwrap(), 0);
        assert_eq!(index.index(person("1", "a", "a@x")).unwrap(), 1);
        assert_eq!(index.index(person("2", "b", "b@x")).unwrap(), 2);
    }

    #[test]
    fn test_uncommitted_records_are_invisible() {
        let mut index = InMemoryCandidateIndex::new(model(), IndexConfig::default());
        let r = person("1", "john smith", "js@x.com");
        index.index(Arc::clone(&r)).unwrap();
        assert!(index.find_candidates(&r).unwrap().is_empty());
        assert!(index.find_by_id("1").unwrap().is_none());
        assert!(index.is_empty());

        index.commit().unwrap();
        assert_eq!(ids(&index.find_candidates(&r).unwrap()), vec!["1"]);
        assert_eq!(index.find_by_id("1").unwrap().as_deref(), Some(r.as_ref()));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_identical_record_is_always_found() {
        let mut index = InMemoryCandidateIndex::new(model(), IndexConfig::default());
        let records: Vec<Arc<Record>> = (0..50)
            .map(|i| person(&i.to_string(), &format!("name{} common", i), &format!("e{}@x", i)))
            .collect();
        for r in &records {
            index.index(Arc::clone(r)).unwrap();
        }
        index.commit().unwrap();

        for r in &records {
            let found = index.find_candidates(r).unwrap();
            assert!(ids(&found).contains(&r.value("ID").unwrap()));
        }
    }

    #[test]
    fn test_bound_applies_before_max_search_hits() {
        let config = IndexConfig {
            max_search_hits: 1,
            ..Default::default()
        };
        let mut index = InMemoryCandidateIndex::new(model(), config);
        index.index(person("1", "john smith", "js@x.com")).unwrap();
        let later = person("2", "john smith jr", "js@x.com");
        let own = index.index(Arc::clone(&later)).unwrap();
        index.commit().unwrap();

        // the record itself outranks everything else
        assert_eq!(ids(&index.find_candidates(&later).unwrap()), vec!["2"]);
        assert_eq!(
            ids(&index.find_candidates_before(&later, own).unwrap()),
            vec!["1"]
        );
        assert!(index.find_candidates_before(&later, 0).unwrap().is_empty());
    }

    #[test]
    fn test_rare_tokens_rank_first() {
        let mut index = InMemoryCandidateIndex::new(model(), IndexConfig::default());
        index.index(person("1", "john smith", "js@x.com")).unwrap();
        index.index(person("2", "john doe", "jd@x.com")).unwrap();
        index.index(person("3", "john smith", "other@x.com")).unwrap();
        index.commit().unwrap();

        let query = person("q", "john smith", "js@x.com");
        let found = index.find_candidates(&query).unwrap();
        assert_eq!(ids(&found), vec!["1", "3", "2"]);
        assert!(found[0].score > found[1].score);
    }

    #[test]
    fn test_max_search_hits() {
        let config = IndexConfig {
            max_search_hits: 2,
            ..Default::default()
        };
        let mut index = InMemoryCandidateIndex::new(model(), config);
        index.index(person("1", "john smith", "js@x.com")).unwrap();
        index.index(person("2", "john doe", "jd@x.com")).unwrap();
        index.index(person("3", "john smith", "other@x.com")).unwrap();
        index.commit().unwrap();

        let found = index.find_candidates(&person("q", "john smith", "js@x.com")).unwrap();
        assert_eq!(ids(&found), vec!["1", "3"]);
    }

    #[test]
    fn test_min_relevance_drops_weak_candidates() {
        let config = IndexConfig {
            min_relevance: 0.9,
            ..Default::default()
        };
        let mut index = InMemoryCandidateIndex::new(model(), config);
        index.index(person("1", "john smith", "js@x.com")).unwrap();
        index.index(person("2", "john doe", "jd@x.com")).unwrap();
        index.commit().unwrap();

        let found = index.find_candidates(&person("q", "john smith", "js@x.com")).unwrap();
        assert_eq!(ids(&found), vec!["1"]);
    }

    #[test]
    fn test_saturated_bucket_contributes_nothing() {
        let config = IndexConfig {
            max_bucket_size: 2,
            ..Default::default()
        };
        let mut index = InMemoryCandidateIndex::new(model(), config);
        for i in 0..3 {
            index.index(person(&i.to_string(), "john", &format!("{}@x", i))).unwrap();
        }
        index.commit().unwrap();
        assert_eq!(index.saturated_bucket_count(), 1);

        let found = index.find_candidates(&person("q", "john", "1@x")).unwrap();
        assert_eq!(ids(&found), vec!["1"]);
        let found = index.find_candidates(&person("q", "john", "none@x")).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_required_property_filters_candidates() {
        let model = Arc::new(
            PropertyModel::new(
                vec![
                    Property::id("ID"),
                    Property::comparable("NAME", Arc::new(Exact), 0.3, 0.95),
                    Property::comparable("COUNTRY", Arc::new(Exact), 0.4, 0.6)
                        .with_lookup(LookupPolicy::Required),
                ],
                0.9,
                0.0,
            )
            .unwrap(),
        );
        let mut index = InMemoryCandidateIndex::new(model, IndexConfig::default());
        let rec = |id: &str, name: &str, country: &str| {
            Arc::new(
                Record::new()
                    .with_value("ID", id)
                    .with_value("NAME", name)
                    .with_value("COUNTRY", country),
            )
        };
        index.index(rec("1", "acme", "no")).unwrap();
        index.index(rec("2", "acme", "se")).unwrap();
        index.commit().unwrap();

        let found = index.find_candidates(&rec("q", "acme", "no")).unwrap();
        assert_eq!(ids(&found), vec!["1"]);
        let found = index.find_candidates(&rec("q", "acme", "dk")).unwrap();
        assert!(found.is_empty());
    }
}
