use std::sync::{Arc, Mutex};

use crate::engine::MatchListener;
use crate::error::{KindredError, KindredResult};
use crate::types::Record;

/// A callback captured by [`EventRecorder`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedEvent {
    Start,
    BatchReady(usize),
    Match { r1: Record, r2: Record, confidence: f64 },
    Maybe { r1: Record, r2: Record, confidence: f64 },
    NoMatch(Record),
    BatchDone,
    End,
}

/// Listener that keeps every callback it receives.
///
/// Clones share the same event log, so keep one clone and hand the other to
/// the engine.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events so far.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// `(r1, r2, confidence)` of every MATCH event, in delivery order.
    pub fn recorded_matches(&self) -> Vec<(Record, Record, f64)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RecordedEvent::Match { r1, r2, confidence } => Some((r1, r2, confidence)),
                _ => None,
            })
            .collect()
    }

    /// `(r1, r2, confidence)` of every MAYBE event, in delivery order.
    pub fn maybe_matches(&self) -> Vec<(Record, Record, f64)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RecordedEvent::Maybe { r1, r2, confidence } => Some((r1, r2, confidence)),
                _ => None,
            })
            .collect()
    }

    /// Records reported as matching nothing.
    pub fn no_matches(&self) -> Vec<Record> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RecordedEvent::NoMatch(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    fn push(&self, event: RecordedEvent) -> KindredResult<()> {
        self.events
            .lock()
            .map_err(|_| KindredError::lock_poisoned("event log"))?
            .push(event);
        Ok(())
    }
}

impl MatchListener for EventRecorder {
    fn start_processing(&mut self) -> KindredResult<()> {
        self.push(RecordedEvent::Start)
    }

    fn batch_ready(&mut self, size: usize) -> KindredResult<()> {
        self.push(RecordedEvent::BatchReady(size))
    }

    fn matches(&mut self, r1: &Record, r2: &Record, confidence: f64) -> KindredResult<()> {
        self.push(RecordedEvent::Match {
            r1: r1.clone(),
            r2: r2.clone(),
            confidence,
        })
    }

    fn matches_perhaps(&mut self, r1: &Record, r2: &Record, confidence: f64) -> KindredResult<()> {
        self.push(RecordedEvent::Maybe {
            r1: r1.clone(),
            r2: r2.clone(),
            confidence,
        })
    }

    fn no_match_for(&mut self, record: &Record) -> KindredResult<()> {
        self.push(RecordedEvent::NoMatch(record.clone()))
    }

    fn batch_done(&mut self) -> KindredResult<()> {
        self.push(RecordedEvent::BatchDone)
    }

    fn end_processing(&mut self) -> KindredResult<()> {
        self.push(RecordedEvent::End)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_log() {
        let recorder = EventRecorder::new();
        let mut listener = recorder.clone();
        let r1 = Record::new().with_value("ID", "1");
        let r2 = Record::new().with_value("ID", "2");

        listener.start_processing().unwrap();
        listener.matches(&r1, &r2, 0.9).unwrap();
        listener.no_match_for(&r2).unwrap();

        assert_eq!(recorder.events().len(), 3);
        assert_eq!(recorder.recorded_matches(), vec![(r1, r2.clone(), 0.9)]);
        assert_eq!(recorder.no_matches(), vec![r2]);
        recorder.clear();
        assert!(recorder.events().is_empty());
    }
}
