//! Scoring a run against a gold standard.

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::identity_of;
use crate::engine::MatchListener;
use crate::error::{KindredError, KindredResult};
use crate::links::{InMemoryLinkStore, LinkStore};
use crate::model::PropertyModel;
use crate::types::{Link, LinkKind, Record};

/// Outcome of an evaluated run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    /// Distinct matched pairs the gold standard marks SAME.
    pub correct_found: usize,
    /// SAME pairs in the gold standard.
    pub correct_total: usize,
    /// Matches the gold standard marks DIFFERENT.
    pub wrong_found: usize,
    /// Matches the gold standard says nothing about.
    pub unknown: usize,
    /// Gold SAME links of records reported as matching nothing.
    pub missed: usize,
    pub precision: f64,
    pub recall: f64,
    pub f_measure: f64,
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "correct {}/{}, wrong {}, unknown {}, precision {:.1}%, recall {:.1}%, f-measure {:.3}",
            self.correct_found,
            self.correct_total,
            self.wrong_found,
            self.unknown,
            self.precision * 100.0,
            self.recall * 100.0,
            self.f_measure
        )
    }
}

/// Shared access to the report produced when the run ends.
#[derive(Debug, Clone, Default)]
pub struct ReportHandle(Arc<Mutex<Option<EvaluationReport>>>);

impl ReportHandle {
    /// The report of the last finished run, if any.
    pub fn get(&self) -> Option<EvaluationReport> {
        self.0.lock().ok().and_then(|r| r.clone())
    }
}

/// Compares MATCH events with a gold-standard [`LinkStore`].
///
/// Gold links are looked up with [`LinkStore::infer_link`], so pairs implied
/// by chains of SAME links count as known.
pub struct EvaluationListener {
    model: Arc<PropertyModel>,
    gold: Arc<dyn LinkStore>,
    found: InMemoryLinkStore,
    wrong: usize,
    unknown: usize,
    missed: usize,
    pessimistic: bool,
    report: ReportHandle,
}

impl EvaluationListener {
    pub fn new(model: Arc<PropertyModel>, gold: Arc<dyn LinkStore>) -> Self {
        Self {
            model,
            gold,
            found: InMemoryLinkStore::new(),
            wrong: 0,
            unknown: 0,
            missed: 0,
            pessimistic: false,
            report: ReportHandle::default(),
        }
    }

    /// Count matches absent from the gold standard as wrong when computing
    /// precision.
    pub fn pessimistic(mut self, pessimistic: bool) -> Self {
        self.pessimistic = pessimistic;
        self
    }

    pub fn report_handle(&self) -> ReportHandle {
        self.report.clone()
    }

    fn evaluate(&self) -> KindredResult<EvaluationReport> {
        let correct_found = self.found.len()?;
        let correct_total = self
            .gold
            .all_links()?
            .iter()
            .filter(|l| l.kind == LinkKind::Same && !l.is_retracted())
            .count();

        let mut total = correct_found + self.wrong;
        if self.pessimistic {
            total += self.unknown;
        }
        let ratio = |part: usize, whole: usize| {
            if whole == 0 {
                0.0
            } else {
                part as f64 / whole as f64
            }
        };
        let precision = ratio(correct_found, total);
        let recall = ratio(correct_found, correct_total);
        let f_measure = if correct_found == 0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        Ok(EvaluationReport {
            correct_found,
            correct_total,
            wrong_found: self.wrong,
            unknown: self.unknown,
            missed: self.missed,
            precision,
            recall,
            f_measure,
        })
    }
}

impl MatchListener for EvaluationListener {
    fn start_processing(&mut self) -> KindredResult<()> {
        self.found.clear()?;
        self.wrong = 0;
        self.unknown = 0;
        self.missed = 0;
        Ok(())
    }

    fn matches(&mut self, r1: &Record, r2: &Record, confidence: f64) -> KindredResult<()> {
        let id1 = identity_of(&self.model, r1)?;
        let id2 = identity_of(&self.model, r2)?;
        match self.gold.infer_link(id1, id2)?.map(|l| l.kind) {
            Some(LinkKind::Same) => self
                .found
                .put_link(Link::inferred(id1, id2, LinkKind::Same, confidence))?,
            Some(LinkKind::Different) => {
                debug!(id1, id2, confidence, "Incorrect match");
                self.wrong += 1;
            }
            _ => {
                debug!(id1, id2, confidence, "Match not in gold standard");
                self.unknown += 1;
            }
        }
        Ok(())
    }

    fn no_match_for(&mut self, record: &Record) -> KindredResult<()> {
        let id = identity_of(&self.model, record)?;
        let missed = self
            .gold
            .links_for(id)?
            .iter()
            .filter(|l| l.kind == LinkKind::Same && !l.is_retracted())
            .count();
        if missed > 0 {
            debug!(id, missed, "Gold links not found");
        }
        self.missed += missed;
        Ok(())
    }

    fn end_processing(&mut self) -> KindredResult<()> {
        let report = self.evaluate()?;
        info!(
            correct = report.correct_found,
            wrong = report.wrong_found,
            unknown = report.unknown,
            precision = report.precision,
            recall = report.recall,
            f_measure = report.f_measure,
            "Evaluation finished"
        );
        *self
            .report
            .0
            .lock()
            .map_err(|_| KindredError::lock_poisoned("evaluation report"))? = Some(report);
        Ok(())
    }
}
