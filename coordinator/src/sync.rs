//! The per-iteration barrier.
//!
//! Boundary reports are queued per worker and keyed by iteration. Only the
//! current iteration's reports count towards the barrier, reports for the
//! next one wait in their queue until the barrier advances.

use std::collections::BTreeMap;

use comms::msg::{Edge, Outcome};
use heat::{Partition, Relaxation, stencil};

use crate::RunError;

/// One boundary row and the local max-delta reported with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub edge: Edge,
    pub row: Vec<f64>,
    pub max_delta: f64,
}

/// Every worker's reports for a finished iteration.
#[derive(Debug)]
pub struct Round {
    pub iteration: u32,
    /// Indexed by worker.
    pub reports: Vec<Vec<Report>>,
    pub global_delta: f64,
}

pub struct Synchronizer {
    iteration: u32,
    width: usize,
    expected: Vec<Vec<Edge>>,
    pending: Vec<BTreeMap<u32, Vec<Report>>>,
}

/// The edges a worker reports every iteration given its neighbors.
pub fn expected_edges(part: &Partition) -> Vec<Edge> {
    match (part.prev, part.next) {
        (None, None) => vec![Edge::Solo],
        (Some(_), None) => vec![Edge::Top],
        (None, Some(_)) => vec![Edge::Bottom],
        (Some(_), Some(_)) => vec![Edge::Top, Edge::Bottom],
    }
}

/// Decides how a run continues after an iteration with `global_delta`.
pub fn decide(relax: &Relaxation, iteration: u32, global_delta: f64) -> Outcome {
    if relax.is_done(iteration, global_delta) {
        Outcome::Converge
    } else {
        Outcome::Continue
    }
}

impl Synchronizer {
    pub fn new(partitions: &[Partition], width: usize) -> Self {
        Self {
            iteration: 0,
            width,
            expected: partitions.iter().map(expected_edges).collect(),
            pending: vec![BTreeMap::new(); partitions.len()],
        }
    }

    /// The iteration the barrier is waiting on.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Queues a boundary report from `worker`.
    ///
    /// # Errors
    /// `RunError::Protocol` if the report is stale, too far ahead, a duplicate,
    /// for an edge the worker doesn't have or has a row of the wrong length.
    pub fn offer(&mut self, worker: usize, iteration: u32, report: Report) -> Result<(), RunError> {
        let current = self.iteration;
        if iteration < current {
            let detail = format!("stale boundary for iteration {iteration}, barrier is at {current}");
            return Err(RunError::protocol(worker, detail));
        }

        if iteration > current.saturating_add(1) {
            let detail = format!("boundary for iteration {iteration} is too far ahead of {current}");
            return Err(RunError::protocol(worker, detail));
        }

        if !self.expected[worker].contains(&report.edge) {
            let detail = format!("boundary for an edge the worker doesn't have: {:?}", report.edge);
            return Err(RunError::protocol(worker, detail));
        }

        let row_len = if report.edge == Edge::Solo { 0 } else { self.width };
        if report.row.len() != row_len {
            let detail = format!("boundary row of {} values, expected {row_len}", report.row.len());
            return Err(RunError::protocol(worker, detail));
        }

        let queue = self.pending[worker].entry(iteration).or_default();
        if queue.iter().any(|r| r.edge == report.edge) {
            let detail = format!("duplicate {:?} boundary for iteration {iteration}", report.edge);
            return Err(RunError::protocol(worker, detail));
        }

        queue.push(report);
        Ok(())
    }

    fn has_all(&self, worker: usize) -> bool {
        self.pending[worker]
            .get(&self.iteration)
            .is_some_and(|q| q.len() == self.expected[worker].len())
    }

    /// Whether every worker reported every edge for the current iteration.
    pub fn is_complete(&self) -> bool {
        (0..self.pending.len()).all(|w| self.has_all(w))
    }

    /// The workers still owing reports for the current iteration.
    pub fn missing(&self) -> Vec<usize> {
        (0..self.pending.len()).filter(|&w| !self.has_all(w)).collect()
    }

    /// Takes the current iteration's reports and advances the barrier.
    ///
    /// Must only be called once `is_complete` holds.
    ///
    /// # Errors
    /// `RunError::Divergence` if any worker reported a non-finite max-delta.
    pub fn release(&mut self) -> Result<Round, RunError> {
        debug_assert!(self.is_complete());

        let iteration = self.iteration;
        let mut global_delta = 0.0;
        let mut reports = Vec::with_capacity(self.pending.len());

        for (worker, queue) in self.pending.iter_mut().enumerate() {
            let batch = queue.remove(&iteration).unwrap_or_default();

            for report in &batch {
                if !report.max_delta.is_finite() {
                    return Err(RunError::Divergence { worker, iteration });
                }

                global_delta = stencil::max_delta(global_delta, report.max_delta);
            }

            reports.push(batch);
        }

        self.iteration += 1;
        Ok(Round {
            iteration,
            reports,
            global_delta,
        })
    }
}
