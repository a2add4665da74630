//! Match listener contract.

use crate::error::KindredResult;
use crate::types::Record;

/// Receives match events from a [`crate::engine::MatchEngine`] run.
///
/// Callbacks arrive on the thread that drives the engine, one at a time, in
/// listener registration order. All events for one query record are
/// delivered together; the query record is always the first argument. An
/// error aborts the current batch and is returned from the engine call.
pub trait MatchListener {
    /// A run is starting.
    fn start_processing(&mut self) -> KindredResult<()> {
        Ok(())
    }

    /// A batch of `size` records has been read and is about to be processed.
    fn batch_ready(&mut self, _size: usize) -> KindredResult<()> {
        Ok(())
    }

    /// The two records are considered the same entity.
    fn matches(&mut self, _r1: &Record, _r2: &Record, _confidence: f64) -> KindredResult<()> {
        Ok(())
    }

    /// The two records may be the same entity.
    fn matches_perhaps(
        &mut self,
        _r1: &Record,
        _r2: &Record,
        _confidence: f64,
    ) -> KindredResult<()> {
        Ok(())
    }

    /// A linkage query record matched nothing.
    fn no_match_for(&mut self, _record: &Record) -> KindredResult<()> {
        Ok(())
    }

    /// The current batch has been fully processed.
    fn batch_done(&mut self) -> KindredResult<()> {
        Ok(())
    }

    /// The run has finished.
    fn end_processing(&mut self) -> KindredResult<()> {
        Ok(())
    }
}
