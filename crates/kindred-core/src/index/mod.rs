//! Candidate retrieval.
//!
//! A [`StorageBackend`] indexes records by token and, for a query record,
//! returns a bounded, ranked set of indexed records worth a full comparison.

mod bucket;
mod memory;

use std::sync::Arc;

use crate::error::KindredResult;
use crate::types::Record;

pub use bucket::Bucket;
pub use memory::InMemoryCandidateIndex;

/// Candidate collection stops once this many times `max_search_hits`
/// candidates have been gathered.
pub const COLLECT_CUTOFF_FACTOR: usize = 20;

/// Membership bumping stops at a bucket larger than this many times the
/// current candidate count.
pub const BUMP_CUTOFF_FACTOR: usize = 50;

/// Internal record id, assigned at indexing time and never reused.
pub type InternalId = u64;

/// A previously indexed record retrieved for a query.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub internal_id: InternalId,
    /// Accumulated bucket specificity; only meaningful relative to other
    /// candidates of the same query.
    pub score: f64,
    pub record: Arc<Record>,
}

/// Index and retrieval contract shared by candidate index backends.
///
/// Mutation (`index`, `commit`) happens between comparison phases; lookups
/// may run concurrently from several workers.
pub trait StorageBackend: Send + Sync {
    /// Index a record and return its internal id. Duplicate identity values
    /// are accepted.
    fn index(&mut self, record: Arc<Record>) -> KindredResult<InternalId>;

    /// Make everything indexed so far visible to lookups.
    fn commit(&mut self) -> KindredResult<()>;

    /// Committed record with the given identity value.
    fn find_by_id(&self, id: &str) -> KindredResult<Option<Arc<Record>>>;

    /// Ranked candidates for a query record, best first.
    fn find_candidates(&self, record: &Record) -> KindredResult<Vec<Candidate>> {
        self.find_candidates_before(record, InternalId::MAX)
    }

    /// Like [`find_candidates`](Self::find_candidates), restricted to records
    /// whose internal id is below `bound`. The restriction applies before the
    /// relevance and count cutoffs.
    fn find_candidates_before(
        &self,
        record: &Record,
        bound: InternalId,
    ) -> KindredResult<Vec<Candidate>>;

    /// Number of committed records.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn close(&mut self) -> KindredResult<()> {
        Ok(())
    }
}
