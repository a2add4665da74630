use std::sync::Arc;
use tracing::{debug, info};

use crate::engine::MatchListener;
use crate::error::KindredResult;
use crate::model::PropertyModel;
use crate::types::Record;

/// Logs every match through `tracing`, identifying records by identity value.
pub struct LoggingListener {
    model: Arc<PropertyModel>,
    matches: u64,
    maybes: u64,
    unmatched: u64,
}

impl LoggingListener {
    pub fn new(model: Arc<PropertyModel>) -> Self {
        Self {
            model,
            matches: 0,
            maybes: 0,
            unmatched: 0,
        }
    }

    fn id<'r>(&self, record: &'r Record) -> &'r str {
        self.model.identity(record).unwrap_or("<no id>")
    }
}

impl MatchListener for LoggingListener {
    fn start_processing(&mut self) -> KindredResult<()> {
        self.matches = 0;
        self.maybes = 0;
        self.unmatched = 0;
        Ok(())
    }

    fn batch_ready(&mut self, size: usize) -> KindredResult<()> {
        debug!(size, "Batch ready");
        Ok(())
    }

    fn matches(&mut self, r1: &Record, r2: &Record, confidence: f64) -> KindredResult<()> {
        self.matches += 1;
        info!(id1 = self.id(r1), id2 = self.id(r2), confidence, "Match");
        Ok(())
    }

    fn matches_perhaps(&mut self, r1: &Record, r2: &Record, confidence: f64) -> KindredResult<()> {
        self.maybes += 1;
        info!(id1 = self.id(r1), id2 = self.id(r2), confidence, "Possible match");
        Ok(())
    }

    fn no_match_for(&mut self, record: &Record) -> KindredResult<()> {
        self.unmatched += 1;
        debug!(id = self.id(record), "No match");
        Ok(())
    }

    fn end_processing(&mut self) -> KindredResult<()> {
        info!(
            matches = self.matches,
            maybes = self.maybes,
            unmatched = self.unmatched,
            "Matching finished"
        );
        Ok(())
    }
}
