//! Match engine.
//!
//! Reads records in batches, indexes them, retrieves candidates for each
//! record and scores them with the [`PropertyModel`]. Accepted pairs are
//! reported to the registered [`MatchListener`]s.
//!
//! Within a batch, comparison runs on a fixed pool of scoped worker threads.
//! Records are dealt round-robin to workers up front. Workers only read the
//! committed index and send one outcome per record over a channel; the
//! calling thread delivers those outcomes to listeners in input order.

mod listener;
mod profiler;
mod source;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Instant;
use strum::{Display, EnumString};
use tracing::{debug, info};

use crate::config::MatchConfig;
use crate::error::{KindredError, KindredResult};
use crate::index::{InMemoryCandidateIndex, InternalId, StorageBackend};
use crate::model::{MatchClass, PropertyModel};
use crate::types::Record;

pub use listener::MatchListener;
pub use profiler::{Phase, ProfileReport, ProfileStats, Profiler};
pub use source::{DataSource, InMemoryDataSource};

/// Which candidate pairs a query record reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum AcceptanceStrategy {
    /// Every candidate above the threshold (or maybe threshold).
    #[default]
    AllAboveThreshold,
    /// Only the single best candidate; the other group is treated as a
    /// duplicate-free master.
    BestOnly,
}

/// One of the two record groups in linkage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Group {
    First,
    Second,
}

impl Group {
    pub fn other(self) -> Self {
        match self {
            Group::First => Group::Second,
            Group::Second => Group::First,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Deduplicate,
    Link,
}

enum Event {
    Match(Arc<Record>, f64),
    Maybe(Arc<Record>, f64),
    NoMatch,
}

struct RecordOutcome {
    query: Arc<Record>,
    events: Vec<Event>,
}

/// A query record plus, in deduplication, its own internal id.
struct Query {
    record: Arc<Record>,
    internal_id: Option<InternalId>,
}

/// Read-only state shared with workers during a comparison phase.
struct Scoring<'a> {
    model: &'a PropertyModel,
    index: &'a dyn StorageBackend,
    mode: Mode,
    strategy: AcceptanceStrategy,
    comparisons: &'a AtomicU64,
    profile: Option<&'a ProfileStats>,
}

impl Scoring<'_> {
    fn timed<T>(&self, phase: Phase, f: impl FnOnce() -> T) -> T {
        match self.profile {
            Some(stats) => stats.time(phase, f),
            None => f(),
        }
    }

    fn score(&self, query: &Query) -> KindredResult<RecordOutcome> {
        // each unordered pair is compared once, from its later record
        let bound = query.internal_id.unwrap_or(InternalId::MAX);
        let candidates = self.timed(Phase::Searching, || {
            self.index.find_candidates_before(&query.record, bound)
        })?;

        let start = Instant::now();
        let mut events = Vec::new();
        let mut best: Option<(f64, &Arc<Record>)> = None;
        let mut compared = 0u64;
        for candidate in &candidates {
            if self.model.same_identity(&query.record, &candidate.record) {
                continue;
            }

            let prob = self.model.compare(&query.record, &candidate.record)?;
            compared += 1;
            match self.strategy {
                AcceptanceStrategy::AllAboveThreshold => {
                    let other = Arc::clone(&candidate.record);
                    match self.model.classify(prob) {
                        MatchClass::Match => events.push(Event::Match(other, prob)),
                        MatchClass::Maybe => events.push(Event::Maybe(other, prob)),
                        MatchClass::NoMatch => {}
                    }
                }
                AcceptanceStrategy::BestOnly => {
                    if best.map_or(true, |(p, _)| prob > p) {
                        best = Some((prob, &candidate.record));
                    }
                }
            }
        }

        if let Some((prob, record)) = best {
            match self.model.classify(prob) {
                MatchClass::Match => events.push(Event::Match(Arc::clone(record), prob)),
                MatchClass::Maybe => events.push(Event::Maybe(Arc::clone(record), prob)),
                MatchClass::NoMatch => {}
            }
        }
        if self.mode == Mode::Link && events.is_empty() {
            events.push(Event::NoMatch);
        }

        self.comparisons.fetch_add(compared, Ordering::Relaxed);
        if let Some(stats) = self.profile {
            stats.add(Phase::Comparing, start.elapsed());
            stats.add_comparisons(compared);
        }
        Ok(RecordOutcome {
            query: Arc::clone(&query.record),
            events,
        })
    }
}

/// Drives deduplication and record linkage runs.
pub struct MatchEngine {
    model: Arc<PropertyModel>,
    group1: Box<dyn StorageBackend>,
    group2: Box<dyn StorageBackend>,
    listeners: Vec<Box<dyn MatchListener>>,
    threads: usize,
    batch_size: usize,
    profile: Option<Arc<ProfileStats>>,
    comparisons: AtomicU64,
}

impl MatchEngine {
    /// Engine with in-memory candidate indexes and default settings.
    pub fn new(model: Arc<PropertyModel>) -> Self {
        let config = MatchConfig::default();
        let group1 = InMemoryCandidateIndex::new(Arc::clone(&model), config.index.clone());
        let group2 = InMemoryCandidateIndex::new(Arc::clone(&model), config.index);
        Self::with_backends(model, Box::new(group1), Box::new(group2))
            .with_threads(config.engine.threads)
            .with_batch_size(config.engine.batch_size)
    }

    /// Engine over caller-supplied candidate indexes.
    pub fn with_backends(
        model: Arc<PropertyModel>,
        group1: Box<dyn StorageBackend>,
        group2: Box<dyn StorageBackend>,
    ) -> Self {
        Self {
            model,
            group1,
            group2,
            listeners: Vec::new(),
            threads: 1,
            batch_size: crate::config::DEFAULT_BATCH_SIZE,
            profile: None,
            comparisons: AtomicU64::new(0),
        }
    }

    /// Validate a configuration and build an engine from it.
    pub fn from_config(config: &MatchConfig) -> KindredResult<Self> {
        config.validate()?;
        let model = Arc::new(PropertyModel::from_config(config)?);
        let group1 = InMemoryCandidateIndex::new(Arc::clone(&model), config.index.clone());
        let group2 = InMemoryCandidateIndex::new(Arc::clone(&model), config.index.clone());
        let engine = Self::with_backends(model, Box::new(group1), Box::new(group2))
            .with_threads(config.engine.threads)
            .with_batch_size(config.engine.batch_size);
        Ok(if config.engine.profiling {
            engine.with_profiling()
        } else {
            engine
        })
    }

    /// Set the number of worker threads (at least one).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Set the batch size (at least one).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Collect phase timings and log them at the end of every run.
    pub fn with_profiling(mut self) -> Self {
        let stats = ProfileStats::new();
        self.listeners.push(Box::new(Profiler::new(Arc::clone(&stats))));
        self.profile = Some(stats);
        self
    }

    /// Register a listener (builder style).
    pub fn with_listener(mut self, listener: impl MatchListener + 'static) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    /// Register a listener.
    pub fn add_listener(&mut self, listener: Box<dyn MatchListener>) {
        self.listeners.push(listener);
    }

    pub fn model(&self) -> &Arc<PropertyModel> {
        &self.model
    }

    /// Phase timings, if profiling is enabled.
    pub fn profile(&self) -> Option<&Arc<ProfileStats>> {
        self.profile.as_ref()
    }

    /// Pairwise comparisons performed so far.
    pub fn comparison_count(&self) -> u64 {
        self.comparisons.load(Ordering::Relaxed)
    }

    /// Probability that two records match.
    pub fn compare(&self, r1: &Record, r2: &Record) -> KindredResult<f64> {
        self.model.compare(r1, r2)
    }

    /// Find duplicates among all records of the sources.
    pub fn deduplicate(&mut self, sources: Vec<Box<dyn DataSource>>) -> KindredResult<()> {
        self.run(sources, |engine, sources| {
            let mut current = 0;
            loop {
                let batch = engine.read(sources, &mut current)?;
                if batch.is_empty() {
                    return Ok(());
                }
                engine.deduplicate_batch(batch)?;
                notify_batch_processed(sources)?;
            }
        })
    }

    /// Deduplicate one batch against itself and everything indexed earlier.
    ///
    /// Emits `batch_ready` and `batch_done` but not the run-level callbacks.
    pub fn deduplicate_batch(&mut self, records: Vec<Record>) -> KindredResult<()> {
        self.emit(|l| l.batch_ready(records.len()))?;
        let queries = self.index_batch(Group::First, records)?;
        self.score_batch(
            Group::First,
            &queries,
            Mode::Deduplicate,
            AcceptanceStrategy::AllAboveThreshold,
        )?;
        self.emit(|l| l.batch_done())
    }

    /// Link records across two groups, never within a group.
    ///
    /// First-group batches are indexed and matched against the second group
    /// with [`AcceptanceStrategy::AllAboveThreshold`]; second-group batches
    /// are indexed and matched against the first group with `strategy`.
    pub fn link(
        &mut self,
        sources1: Vec<Box<dyn DataSource>>,
        sources2: Vec<Box<dyn DataSource>>,
        strategy: AcceptanceStrategy,
    ) -> KindredResult<()> {
        let mut sources: Vec<Box<dyn DataSource>> =
            Vec::with_capacity(sources1.len() + sources2.len());
        let split = sources1.len();
        sources.extend(sources1);
        sources.extend(sources2);

        self.run(sources, move |engine, sources| {
            let (first, second) = sources.split_at_mut(split);
            engine.link_pass(first, Group::First, AcceptanceStrategy::AllAboveThreshold)?;
            engine.link_pass(second, Group::Second, strategy)
        })
    }

    /// Match records against an already indexed group without indexing them.
    pub fn link_records(
        &mut self,
        against: Group,
        sources: Vec<Box<dyn DataSource>>,
        strategy: AcceptanceStrategy,
    ) -> KindredResult<()> {
        self.run(sources, move |engine, sources| {
            let mut current = 0;
            loop {
                let batch = engine.read(sources, &mut current)?;
                if batch.is_empty() {
                    return Ok(());
                }
                engine.emit(|l| l.batch_ready(batch.len()))?;
                let queries: Vec<Query> = batch
                    .into_iter()
                    .map(|record| Query {
                        record: Arc::new(record),
                        internal_id: None,
                    })
                    .collect();
                engine.score_batch(against, &queries, Mode::Link, strategy)?;
                engine.emit(|l| l.batch_done())?;
                notify_batch_processed(sources)?;
            }
        })
    }

    /// Index every record of the sources into a group. No events are emitted.
    pub fn index_sources(
        &mut self,
        group: Group,
        mut sources: Vec<Box<dyn DataSource>>,
    ) -> KindredResult<usize> {
        let result = (|| {
            let mut current = 0;
            let mut total = 0;
            loop {
                let batch = self.read(&mut sources, &mut current)?;
                if batch.is_empty() {
                    return Ok(total);
                }
                total += batch.len();
                self.index_batch(group, batch)?;
                notify_batch_processed(&mut sources)?;
            }
        })();
        close_sources(&mut sources, result)
    }

    /// Close both candidate indexes.
    pub fn close(&mut self) -> KindredResult<()> {
        self.group1.close()?;
        self.group2.close()
    }

    fn run<F>(&mut self, mut sources: Vec<Box<dyn DataSource>>, body: F) -> KindredResult<()>
    where
        F: FnOnce(&mut Self, &mut [Box<dyn DataSource>]) -> KindredResult<()>,
    {
        let started = Instant::now();
        let result = self
            .emit(|l| l.start_processing())
            .and_then(|()| body(self, sources.as_mut_slice()))
            .and_then(|()| self.emit(|l| l.end_processing()));
        let result = close_sources(&mut sources, result);
        match &result {
            Ok(()) => info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                comparisons = self.comparison_count(),
                "Run complete"
            ),
            Err(e) => debug!(error = %e, "Run aborted"),
        }
        result
    }

    fn link_pass(
        &mut self,
        sources: &mut [Box<dyn DataSource>],
        group: Group,
        strategy: AcceptanceStrategy,
    ) -> KindredResult<()> {
        let mut current = 0;
        loop {
            let batch = self.read(sources, &mut current)?;
            if batch.is_empty() {
                return Ok(());
            }
            self.emit(|l| l.batch_ready(batch.len()))?;
            let queries = self.index_batch(group, batch)?;
            if self.backend(group.other()).is_empty() {
                debug!(group = %group, "Other group is empty, skipping comparison");
            } else {
                let queries: Vec<Query> = queries
                    .into_iter()
                    .map(|q| Query {
                        internal_id: None,
                        ..q
                    })
                    .collect();
                self.score_batch(group.other(), &queries, Mode::Link, strategy)?;
            }
            self.emit(|l| l.batch_done())?;
            notify_batch_processed(sources)?;
        }
    }

    fn backend(&self, group: Group) -> &dyn StorageBackend {
        match group {
            Group::First => self.group1.as_ref(),
            Group::Second => self.group2.as_ref(),
        }
    }

    fn read(
        &self,
        sources: &mut [Box<dyn DataSource>],
        current: &mut usize,
    ) -> KindredResult<Vec<Record>> {
        let start = Instant::now();
        let batch = source::read_batch(sources, current, self.batch_size);
        if let Some(stats) = &self.profile {
            stats.add(Phase::SourceRead, start.elapsed());
        }
        batch
    }

    fn index_batch(&mut self, group: Group, records: Vec<Record>) -> KindredResult<Vec<Query>> {
        let start = Instant::now();
        let backend = match group {
            Group::First => &mut self.group1,
            Group::Second => &mut self.group2,
        };
        let mut queries = Vec::with_capacity(records.len());
        for record in records {
            let record = Arc::new(record);
            let internal_id = backend.index(Arc::clone(&record))?;
            queries.push(Query {
                record,
                internal_id: Some(internal_id),
            });
        }
        backend.commit()?;
        if let Some(stats) = &self.profile {
            stats.add(Phase::Indexing, start.elapsed());
        }
        debug!(group = %group, records = queries.len(), "Indexed batch");
        Ok(queries)
    }

    /// Score a batch on the worker pool and deliver outcomes in input order.
    fn score_batch(
        &mut self,
        against: Group,
        queries: &[Query],
        mode: Mode,
        strategy: AcceptanceStrategy,
    ) -> KindredResult<()> {
        let index: &dyn StorageBackend = match against {
            Group::First => self.group1.as_ref(),
            Group::Second => self.group2.as_ref(),
        };
        let scoring = Scoring {
            model: &self.model,
            index,
            mode,
            strategy,
            comparisons: &self.comparisons,
            profile: self.profile.as_deref(),
        };
        let listeners = &mut self.listeners;
        let profile = self.profile.as_deref();
        let workers = self.threads.min(queries.len()).max(1);
        let abort = AtomicBool::new(false);

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<KindredResult<(usize, RecordOutcome)>>();
            for worker in 0..workers {
                let tx = tx.clone();
                let (scoring, abort) = (&scoring, &abort);
                scope.spawn(move || {
                    for pos in (worker..queries.len()).step_by(workers) {
                        if abort.load(Ordering::Relaxed) {
                            break;
                        }
                        let outcome = scoring.score(&queries[pos]);
                        let failed = outcome.is_err();
                        if tx.send(outcome.map(|o| (pos, o))).is_err() || failed {
                            abort.store(true, Ordering::Relaxed);
                            break;
                        }
                    }
                });
            }
            drop(tx);

            let mut pending = BTreeMap::new();
            let mut next = 0;
            let mut failure = None;
            for message in rx {
                if failure.is_some() {
                    continue;
                }
                match message {
                    Ok((pos, outcome)) => {
                        pending.insert(pos, outcome);
                        while let Some(outcome) = pending.remove(&next) {
                            next += 1;
                            let delivered = match profile {
                                Some(stats) => {
                                    stats.time(Phase::Callbacks, || deliver(listeners, &outcome))
                                }
                                None => deliver(listeners, &outcome),
                            };
                            if let Err(e) = delivered {
                                abort.store(true, Ordering::Relaxed);
                                failure = Some(e);
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        abort.store(true, Ordering::Relaxed);
                        failure = Some(e);
                    }
                }
            }
            match failure {
                Some(e) => Err(e),
                None if next == queries.len() => Ok(()),
                None => Err(KindredError::Internal(format!(
                    "worker pool delivered {} of {} records",
                    next,
                    queries.len()
                ))),
            }
        })
    }

    fn emit(
        &mut self,
        mut f: impl FnMut(&mut dyn MatchListener) -> KindredResult<()>,
    ) -> KindredResult<()> {
        let start = Instant::now();
        let result = self.listeners.iter_mut().try_for_each(|l| f(l.as_mut()));
        if let Some(stats) = &self.profile {
            stats.add(Phase::Callbacks, start.elapsed());
        }
        result
    }
}

fn deliver(listeners: &mut [Box<dyn MatchListener>], outcome: &RecordOutcome) -> KindredResult<()> {
    for event in &outcome.events {
        for listener in listeners.iter_mut() {
            match event {
                Event::Match(other, prob) => listener.matches(&outcome.query, other, *prob)?,
                Event::Maybe(other, prob) => {
                    listener.matches_perhaps(&outcome.query, other, *prob)?
                }
                Event::NoMatch => listener.no_match_for(&outcome.query)?,
            }
        }
    }
    Ok(())
}

fn notify_batch_processed(sources: &mut [Box<dyn DataSource>]) -> KindredResult<()> {
    sources.iter_mut().try_for_each(|s| s.batch_processed())
}

/// Close every source; the first error wins, the run's own error first.
fn close_sources<T>(
    sources: &mut [Box<dyn DataSource>],
    result: KindredResult<T>,
) -> KindredResult<T> {
    let mut closed = Ok(());
    for source in sources.iter_mut() {
        if let Err(e) = source.close() {
            if closed.is_ok() {
                closed = Err(e);
            }
        }
    }
    let value = result?;
    closed.map(|()| value)
}
