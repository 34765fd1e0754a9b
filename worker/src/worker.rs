use std::{io, time::Instant};

use comms::{
    WireReceiver, WireSender,
    msg::{Edge, Msg, Outcome},
};
use log::{debug, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task,
};

use crate::{
    block::Block,
    error::{Result, WorkerErr},
    metrics::WorkerMetrics,
};

/// How a worker's participation in a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The coordinator declared convergence and received this worker's rows.
    Converged { iterations: u32 },
    /// The coordinator aborted the run at `iteration`.
    Aborted { iteration: u32 },
}

/// The result of a finished worker run.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub outcome: WorkerOutcome,
    pub metrics: WorkerMetrics,
}

/// Owns one partition of the grid and relaxes it in lockstep with its peers.
pub struct Worker {
    name: String,
    metrics: WorkerMetrics,
}

impl Worker {
    /// Creates a new worker.
    ///
    /// # Arguments
    /// * `name` - The identity announced to the coordinator.
    ///
    /// # Returns
    /// A new worker instance.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metrics: WorkerMetrics::default(),
        }
    }

    /// Runs the whole worker protocol over the coordinator channel.
    ///
    /// Announces itself, waits for its partition and then iterates until the
    /// coordinator decides to converge or abort.
    ///
    /// # Args
    /// * `rx` - Receiving end of the coordinator channel.
    /// * `tx` - Sending end of the coordinator channel.
    ///
    /// # Returns
    /// The outcome of the run and where the time went.
    ///
    /// # Errors
    /// Returns `WorkerErr` on I/O failures or protocol violations.
    pub async fn run<R, W>(
        mut self,
        mut rx: WireReceiver<R>,
        mut tx: WireSender<W>,
    ) -> Result<WorkerReport>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let hello = Msg::Hello {
            name: self.name.clone(),
        };
        tx.send(&hello).await?;

        let spec = match rx.recv().await? {
            Msg::Init(spec) => spec,
            other => {
                return Err(WorkerErr::UnexpectedMessage {
                    iteration: 0,
                    got: other.name(),
                });
            }
        };

        let mut block = Block::from_init(&spec)?;
        info!(
            worker = spec.worker,
            workers = spec.workers,
            row_start = spec.row_start,
            row_end = spec.row_end;
            "partition assigned"
        );

        let mut iteration = 0;
        loop {
            let start = Instant::now();

            // The sweep is CPU-bound, the block is moved in and out of the blocking pool.
            let (relaxed, delta) = task::spawn_blocking(move || {
                let delta = block.relax();
                (block, delta)
            })
            .await
            .map_err(|e| io::Error::other(format!("relaxation task failed: {e}")))?;
            block = relaxed;

            let exchange = Instant::now();
            self.metrics.compute_time += exchange - start;

            for edge in block.boundary_edges() {
                let msg = Msg::Boundary {
                    iteration,
                    edge,
                    row: block.edge_row(edge),
                    max_delta: delta,
                };
                tx.send(&msg).await?;
            }

            let outcome = await_decision(&mut rx, &mut block, iteration).await?;
            self.metrics.exchange_time += exchange.elapsed();
            self.metrics.bump_iteration();
            debug!(iteration = iteration, delta = delta; "iteration done");

            match outcome {
                Outcome::Continue => iteration += 1,
                Outcome::Converge => {
                    let msg = Msg::Result {
                        iteration,
                        rows: block.owned_values(),
                    };
                    tx.send(&msg).await?;

                    if await_terminate(&mut rx, iteration).await? == Outcome::Abort {
                        warn!(iteration = iteration; "run aborted after the results were sent");
                        return Ok(self.report(WorkerOutcome::Aborted { iteration }));
                    }

                    info!(iterations = iteration + 1; "converged, results delivered");
                    let outcome = WorkerOutcome::Converged {
                        iterations: iteration + 1,
                    };
                    return Ok(self.report(outcome));
                }
                Outcome::Abort => {
                    warn!(iteration = iteration; "run aborted by the coordinator");
                    return Ok(self.report(WorkerOutcome::Aborted { iteration }));
                }
            }
        }
    }

    fn report(self, outcome: WorkerOutcome) -> WorkerReport {
        WorkerReport {
            outcome,
            metrics: self.metrics,
        }
    }
}

/// Blocks until the decision for `iteration` arrives, staging ghost rows meanwhile.
///
/// Staged ghosts only replace the block's ghost rows on a `continue` decision,
/// and only once every expected ghost is present.
async fn await_decision<R>(rx: &mut WireReceiver<R>, block: &mut Block, iteration: u32) -> Result<Outcome>
where
    R: AsyncRead + Unpin,
{
    let mut top = None;
    let mut bottom = None;

    loop {
        match rx.recv().await? {
            // An abort may be broadcast at any point of an iteration.
            Msg::Decision {
                outcome: Outcome::Abort,
                ..
            }
            | Msg::Terminate => return Ok(Outcome::Abort),
            Msg::Ghost { iteration: got, .. } | Msg::Decision { iteration: got, .. } if got != iteration => {
                return Err(WorkerErr::IterationMismatch {
                    expected: iteration,
                    got,
                });
            }
            Msg::Ghost { edge, row, .. } => {
                if !block.has_ghost(edge) {
                    return Err(WorkerErr::UnexpectedMessage {
                        iteration,
                        got: "ghost for a missing neighbor",
                    });
                }

                if row.len() != block.width() {
                    return Err(WorkerErr::RowLengthMismatch {
                        iteration,
                        got: row.len(),
                        expected: block.width(),
                    });
                }

                let slot = if edge == Edge::Top { &mut top } else { &mut bottom };
                if slot.replace(row).is_some() {
                    return Err(WorkerErr::UnexpectedMessage {
                        iteration,
                        got: "duplicate ghost",
                    });
                }
            }
            Msg::Decision {
                outcome: Outcome::Continue,
                ..
            } => {
                for (edge, staged) in [(Edge::Top, top.take()), (Edge::Bottom, bottom.take())] {
                    match staged {
                        Some(row) => block.install_ghost(edge, &row),
                        None if block.has_ghost(edge) => {
                            return Err(WorkerErr::MissingGhost { iteration, edge });
                        }
                        None => {}
                    }
                }

                return Ok(Outcome::Continue);
            }
            Msg::Decision { outcome, .. } => return Ok(outcome),
            other => {
                return Err(WorkerErr::UnexpectedMessage {
                    iteration,
                    got: other.name(),
                });
            }
        }
    }
}

/// Waits for the coordinator to release this worker after its results were sent.
///
/// The coordinator may still abort the run if another worker fails while the
/// results are being gathered.
async fn await_terminate<R>(rx: &mut WireReceiver<R>, iteration: u32) -> Result<Outcome>
where
    R: AsyncRead + Unpin,
{
    match rx.recv().await {
        Ok(Msg::Terminate) => Ok(Outcome::Converge),
        Ok(Msg::Decision {
            outcome: Outcome::Abort,
            ..
        }) => Ok(Outcome::Abort),
        Ok(other) => Err(WorkerErr::UnexpectedMessage {
            iteration,
            got: other.name(),
        }),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            warn!("coordinator closed the connection without terminate");
            Ok(Outcome::Converge)
        }
        Err(e) => Err(e.into()),
    }
}
