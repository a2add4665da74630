//! Run profiling.
//!
//! [`ProfileStats`] accumulates wall-clock time per processing phase. The
//! engine writes into it from every worker; the [`Profiler`] listener logs
//! the breakdown when the run ends. Profiling never changes match outcomes.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use super::listener::MatchListener;
use crate::error::KindredResult;

/// A timed processing phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    SourceRead,
    Indexing,
    Searching,
    Comparing,
    Callbacks,
}

/// Shared, thread-safe phase timers and counters.
#[derive(Debug, Default)]
pub struct ProfileStats {
    source_read: AtomicU64,
    indexing: AtomicU64,
    searching: AtomicU64,
    comparing: AtomicU64,
    callbacks: AtomicU64,
    records: AtomicU64,
    comparisons: AtomicU64,
    batches: AtomicU64,
}

impl ProfileStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn slot(&self, phase: Phase) -> &AtomicU64 {
        match phase {
            Phase::SourceRead => &self.source_read,
            Phase::Indexing => &self.indexing,
            Phase::Searching => &self.searching,
            Phase::Comparing => &self.comparing,
            Phase::Callbacks => &self.callbacks,
        }
    }

    /// Add elapsed time to a phase.
    pub fn add(&self, phase: Phase, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.slot(phase).fetch_add(nanos, Ordering::Relaxed);
    }

    /// Time a closure under a phase.
    pub fn time<T>(&self, phase: Phase, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.add(phase, start.elapsed());
        out
    }

    pub fn add_records(&self, n: u64) {
        self.records.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_comparisons(&self, n: u64) {
        self.comparisons.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of the counters.
    pub fn report(&self, total: Duration) -> ProfileReport {
        let ms = |slot: &AtomicU64| slot.load(Ordering::Relaxed) / 1_000_000;
        ProfileReport {
            total_ms: u64::try_from(total.as_millis()).unwrap_or(u64::MAX),
            source_read_ms: ms(&self.source_read),
            indexing_ms: ms(&self.indexing),
            searching_ms: ms(&self.searching),
            comparing_ms: ms(&self.comparing),
            callbacks_ms: ms(&self.callbacks),
            records: self.records.load(Ordering::Relaxed),
            comparisons: self.comparisons.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
        }
    }
}

/// Phase breakdown of a finished run.
///
/// Searching and comparing are summed over workers, so with several threads
/// they can exceed the total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileReport {
    pub total_ms: u64,
    pub source_read_ms: u64,
    pub indexing_ms: u64,
    pub searching_ms: u64,
    pub comparing_ms: u64,
    pub callbacks_ms: u64,
    pub records: u64,
    pub comparisons: u64,
    pub batches: u64,
}

impl ProfileReport {
    /// Average comparisons per record.
    pub fn comparisons_per_record(&self) -> f64 {
        if self.records == 0 {
            0.0
        } else {
            self.comparisons as f64 / self.records as f64
        }
    }
}

impl fmt::Display for ProfileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Total time: {} ms, {} records in {} batches",
            self.total_ms, self.records, self.batches
        )?;
        writeln!(f, "  source read: {} ms", self.source_read_ms)?;
        writeln!(f, "  indexing:    {} ms", self.indexing_ms)?;
        writeln!(f, "  searching:   {} ms", self.searching_ms)?;
        writeln!(f, "  comparing:   {} ms", self.comparing_ms)?;
        writeln!(f, "  callbacks:   {} ms", self.callbacks_ms)?;
        write!(
            f,
            "  comparisons: {} ({:.1} per record)",
            self.comparisons,
            self.comparisons_per_record()
        )
    }
}

/// Listener that logs the profile of a run when it ends.
pub struct Profiler {
    stats: Arc<ProfileStats>,
    started: Option<Instant>,
    last: Option<ProfileReport>,
}

impl Profiler {
    pub fn new(stats: Arc<ProfileStats>) -> Self {
        Self {
            stats,
            started: None,
            last: None,
        }
    }

    /// Report of the most recently finished run.
    pub fn last_report(&self) -> Option<&ProfileReport> {
        self.last.as_ref()
    }
}

impl MatchListener for Profiler {
    fn start_processing(&mut self) -> KindredResult<()> {
        self.started = Some(Instant::now());
        Ok(())
    }

    fn batch_ready(&mut self, size: usize) -> KindredResult<()> {
        self.stats.add_records(size as u64);
        self.stats.add_batch();
        Ok(())
    }

    fn end_processing(&mut self) -> KindredResult<()> {
        let total = self.started.take().map(|s| s.elapsed()).unwrap_or_default();
        let report = self.stats.report(total);
        info!(
            total_ms = report.total_ms,
            records = report.records,
            comparisons = report.comparisons,
            "Run finished\n{}",
            report
        );
        self.last = Some(report);
        Ok(())
    }
}
