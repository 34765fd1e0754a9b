use std::time::{Duration, Instant};

use comms::WireSender;
use heat::{Partition, RowRange};
use log::debug;
use tokio::net::tcp::OwnedWriteHalf;

pub(crate) type NetTx = WireSender<OwnedWriteHalf>;

/// Lifecycle of a run as seen by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Planning,
    AwaitingConnections,
    Iterating,
    Converged,
    Aborted,
    Done,
}

/// Lifecycle of a single worker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Connected,
    Ready,
    Iterating,
    Converged,
    Failed,
    Closed,
}

/// The coordinator's view of one connected worker.
pub struct WorkerHandle {
    pub index: usize,
    /// Identity announced in the worker's hello.
    pub name: String,
    pub tx: NetTx,
    pub rows: RowRange,
    pub prev: Option<usize>,
    pub next: Option<usize>,
    pub last_iteration: Option<u32>,
    pub last_delta: f64,
    pub state: WorkerState,
}

impl WorkerHandle {
    pub fn new(name: String, tx: NetTx, part: &Partition) -> Self {
        Self {
            index: part.index,
            name,
            tx,
            rows: part.rows,
            prev: part.prev,
            next: part.next,
            last_iteration: None,
            last_delta: f64::INFINITY,
            state: WorkerState::Connected,
        }
    }

    /// Whether messages can still be sent to this worker.
    pub fn is_live(&self) -> bool {
        !matches!(self.state, WorkerState::Failed | WorkerState::Closed)
    }
}

/// Mutable state of a single run, owned by the control loop.
pub struct RunState {
    pub phase: Phase,
    /// Index of the iteration being waited on.
    pub iteration: u32,
    pub epsilon: f64,
    pub workers: Vec<WorkerHandle>,
    pub last_delta: f64,
    pub history: Vec<f64>,
    pub converged: bool,
    /// Set when the first partition is handed out.
    pub started: Option<Instant>,
    /// Set when the last result arrives or the run aborts.
    pub elapsed: Option<Duration>,
}

impl RunState {
    pub fn new(epsilon: f64, workers: usize) -> Self {
        Self {
            phase: Phase::Planning,
            iteration: 0,
            epsilon,
            workers: Vec::with_capacity(workers),
            last_delta: f64::INFINITY,
            history: Vec::new(),
            converged: false,
            started: None,
            elapsed: None,
        }
    }

    pub fn advance(&mut self, phase: Phase) {
        debug!("run phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Starts the wall clock, later calls are no-ops.
    pub fn start_clock(&mut self) {
        self.started.get_or_insert_with(Instant::now);
    }

    /// Stops the wall clock, later calls are no-ops.
    pub fn stop_clock(&mut self) {
        if self.elapsed.is_none() {
            self.elapsed = Some(self.started.map(|t| t.elapsed()).unwrap_or_default());
        }
    }

    /// Records the global max-delta of a finished iteration.
    pub fn complete_iteration(&mut self, global_delta: f64) {
        self.last_delta = global_delta;
        self.history.push(global_delta);
        self.iteration += 1;
    }

    /// The last completed iteration's residual, `NaN` if none completed.
    pub fn residual(&self) -> f64 {
        self.history.last().copied().unwrap_or(f64::NAN)
    }
}
