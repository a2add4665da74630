//! Record sources.

use std::collections::VecDeque;

use crate::error::KindredResult;
use crate::types::Record;

/// A finite, lazily produced sequence of records.
pub trait DataSource {
    /// Next record, or `None` once exhausted.
    fn next_record(&mut self) -> KindredResult<Option<Record>>;

    /// Called after every batch containing this source's records has been
    /// processed. Stateful sources can checkpoint here.
    fn batch_processed(&mut self) -> KindredResult<()> {
        Ok(())
    }

    /// Release resources. Called once the source is exhausted or the run fails.
    fn close(&mut self) -> KindredResult<()> {
        Ok(())
    }
}

/// Source over records already in memory.
#[derive(Debug, Default)]
pub struct InMemoryDataSource {
    records: VecDeque<Record>,
    batches_processed: usize,
    closed: bool,
}

impl InMemoryDataSource {
    pub fn new(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            records: records.into_iter().collect(),
            batches_processed: 0,
            closed: false,
        }
    }

    /// Number of `batch_processed` notifications received.
    pub fn batches_processed(&self) -> usize {
        self.batches_processed
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl DataSource for InMemoryDataSource {
    fn next_record(&mut self) -> KindredResult<Option<Record>> {
        Ok(self.records.pop_front())
    }

    fn batch_processed(&mut self) -> KindredResult<()> {
        self.batches_processed += 1;
        Ok(())
    }

    fn close(&mut self) -> KindredResult<()> {
        self.closed = true;
        Ok(())
    }
}

/// Pull up to `batch_size` records, draining sources in order.
pub(crate) fn read_batch(
    sources: &mut [Box<dyn DataSource>],
    current: &mut usize,
    batch_size: usize,
) -> KindredResult<Vec<Record>> {
    let mut batch = Vec::with_capacity(batch_size.min(4096));
    while batch.len() < batch_size && *current < sources.len() {
        match sources[*current].next_record()? {
            Some(record) => batch.push(record),
            None => *current += 1,
        }
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(range: std::ops::Range<u32>) -> Box<dyn DataSource> {
        Box::new(InMemoryDataSource::new(
            range.map(|i| Record::new().with_value("ID", i.to_string())),
        ))
    }

    #[test]
    fn test_read_batch_spans_sources() {
        let mut sources = vec![numbered(0..3), numbered(3..5)];
        let mut current = 0;

        let batch = read_batch(&mut sources, &mut current, 4).unwrap();
        let ids: Vec<&str> = batch.iter().map(|r| r.value("ID").unwrap()).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3"]);

        let batch = read_batch(&mut sources, &mut current, 4).unwrap();
        assert_eq!(batch.len(), 1);
        assert!(read_batch(&mut sources, &mut current, 4).unwrap().is_empty());
        assert_eq!(current, 2);
    }
}
