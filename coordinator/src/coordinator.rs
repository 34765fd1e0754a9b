use std::{io, net::SocketAddr, time::Duration};

use comms::msg::{Edge, InitSpec, Msg, Outcome};
use futures::future;
use heat::{ConfigError, Grid, Partition, Relaxation};
use log::{debug, error, info, warn};
use ndarray::{ArrayView2, s};
use tokio::{
    net::{TcpListener, ToSocketAddrs},
    sync::mpsc,
    task::JoinSet,
    time::{self, Instant},
};

use crate::{
    RunConfig, RunError,
    inbox::{self, Inbound},
    record::{RunRecord, RunReport, Strategy},
    state::{Phase, RunState, WorkerHandle, WorkerState},
    sync::{self, Report, Round, Synchronizer},
};

const INBOX_CAPACITY: usize = 64;

/// Drives one distributed run: hands out partitions, runs the barrier,
/// relays ghost rows and gathers the final grid.
pub struct Coordinator {
    listener: TcpListener,
    config: RunConfig,
    partitions: Vec<Partition>,
}

impl Coordinator {
    /// Validates `config`, computes the partition plan and binds the listener.
    ///
    /// # Arguments
    /// * `addr` - Where to listen for workers, port 0 picks an ephemeral one.
    /// * `config` - The run configuration.
    ///
    /// # Errors
    /// `RunError::Config` if the configuration is invalid, `RunError::Io` if
    /// the listener can't be bound.
    pub async fn bind<A: ToSocketAddrs>(addr: A, config: RunConfig) -> Result<Self, RunError> {
        let partitions = config.plan()?;
        let listener = TcpListener::bind(addr).await?;

        info!(
            workers = partitions.len(),
            height = config.height,
            width = config.width;
            "run planned"
        );

        Ok(Self {
            listener,
            config,
            partitions,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs the whole protocol until convergence or the first failure.
    ///
    /// Never returns early with an error, every failure is reported through
    /// the returned `RunReport` after the remaining workers were told to abort.
    ///
    /// # Arguments
    /// * `initial` - The starting grid, must match the configured dimensions.
    pub async fn run(self, initial: &Grid) -> RunReport {
        let Self {
            listener,
            config,
            partitions,
        } = self;

        let mut run = Run::new(config, partitions);
        let result = run.drive(&listener, initial).await;
        run.finish(result).await
    }
}

/// The control loop of a single run, the only owner of every write half.
struct Run {
    config: RunConfig,
    relax: Relaxation,
    partitions: Vec<Partition>,
    state: RunState,
    sync: Synchronizer,
    readers: JoinSet<()>,
    inbox_tx: mpsc::Sender<Inbound>,
    inbox: mpsc::Receiver<Inbound>,
}

impl Run {
    fn new(config: RunConfig, partitions: Vec<Partition>) -> Self {
        let (inbox_tx, inbox) = mpsc::channel(INBOX_CAPACITY);

        Self {
            relax: config.relaxation(),
            state: RunState::new(config.epsilon, partitions.len()),
            sync: Synchronizer::new(&partitions, config.width),
            config,
            partitions,
            readers: JoinSet::new(),
            inbox_tx,
            inbox,
        }
    }

    async fn drive(&mut self, listener: &TcpListener, initial: &Grid) -> Result<Grid, RunError> {
        let expected = (self.config.height, self.config.width);
        if initial.dim() != expected {
            let got = initial.dim();
            return Err(ConfigError::GridShape { expected, got }.into());
        }

        self.state.advance(Phase::AwaitingConnections);
        for i in 0..self.partitions.len() {
            let part = self.partitions[i];
            self.admit(listener, part, initial).await?;
        }

        self.state.advance(Phase::Iterating);
        loop {
            let round = self.barrier().await?;
            let (iteration, global_delta) = (round.iteration, round.global_delta);
            let outcome = sync::decide(&self.relax, iteration, global_delta);

            self.state.complete_iteration(global_delta);
            debug!(iteration = iteration, delta = global_delta; "barrier released");

            let decision = Msg::Decision { iteration, outcome };
            if outcome == Outcome::Continue {
                self.relay(round).await?;
                self.broadcast(&decision).await?;
                continue;
            }

            self.broadcast(&decision).await?;
            self.state.converged = true;
            self.state.advance(Phase::Converged);
            info!(iterations = iteration + 1, residual = global_delta; "converged");

            return self.collect(iteration).await;
        }
    }

    /// Accepts the connection for `part`, reads its hello and sends its assignment.
    async fn admit(&mut self, listener: &TcpListener, part: Partition, initial: &Grid) -> Result<(), RunError> {
        let index = part.index;
        let limit = self.config.accept_timeout();

        let (stream, peer) = time::timeout(limit, listener.accept())
            .await
            .map_err(|_| RunError::connection(index, format!("no connection within {limit:?}")))??;

        stream
            .set_nodelay(true)
            .map_err(|e| RunError::connection(index, e))?;
        let (rx, tx) = stream.into_split();
        let (mut rx, tx) = comms::channel(rx, tx);

        let name = match time::timeout(limit, rx.recv()).await {
            Ok(Ok(Msg::Hello { name })) => name,
            Ok(Ok(other)) => {
                let detail = format!("expected hello, got {}", other.name());
                return Err(RunError::protocol(index, detail));
            }
            Ok(Err(e)) => return Err(RunError::from_recv(index, e)),
            Err(_) => return Err(RunError::connection(index, format!("no hello within {limit:?}"))),
        };

        info!(worker = index; "worker {name} connected from {peer}");

        let mut handle = WorkerHandle::new(name, tx, &part);
        let init = Msg::Init(init_spec(&part, initial, &self.config, self.partitions.len()));

        // The first assignment starts the run.
        self.state.start_clock();
        send(&mut handle, &init, limit).await?;
        handle.state = WorkerState::Ready;

        self.state.workers.push(handle);
        inbox::spawn_reader(&mut self.readers, index, rx, self.inbox_tx.clone());
        Ok(())
    }

    /// Waits until every worker reported every edge for the current iteration.
    async fn barrier(&mut self) -> Result<Round, RunError> {
        let deadline = Instant::now() + self.config.response_timeout();

        while !self.sync.is_complete() {
            let inbound = match time::timeout_at(deadline, self.inbox.recv()).await {
                Ok(Some(inbound)) => inbound,
                Ok(None) => return Err(io::Error::other("worker inbox closed").into()),
                Err(_) => {
                    let missing = self.sync.missing();
                    debug!(iteration = self.sync.iteration(); "barrier timed out waiting on {missing:?}");

                    let worker = missing.first().copied().unwrap_or_default();
                    return Err(self.timed_out(worker));
                }
            };

            match inbound {
                Inbound::Msg {
                    worker,
                    msg:
                        Msg::Boundary {
                            iteration,
                            edge,
                            row,
                            max_delta,
                        },
                } => {
                    let handle = &mut self.state.workers[worker];
                    handle.state = WorkerState::Iterating;
                    handle.last_iteration = Some(iteration);
                    handle.last_delta = max_delta;

                    let report = Report {
                        edge,
                        row,
                        max_delta,
                    };
                    self.sync.offer(worker, iteration, report)?;
                }
                other => return Err(self.unexpected(other)),
            }
        }

        self.sync.release()
    }

    /// Forwards every boundary row of `round` to the neighbor that keeps it as a ghost.
    async fn relay(&mut self, round: Round) -> Result<(), RunError> {
        let iteration = round.iteration;
        let limit = self.config.response_timeout();

        for (worker, reports) in round.reports.into_iter().enumerate() {
            let (prev, next) = {
                let handle = &self.state.workers[worker];
                (handle.prev, handle.next)
            };

            for Report { edge, row, .. } in reports {
                let (target, edge) = match edge {
                    Edge::Top => (prev, Edge::Bottom),
                    Edge::Bottom => (next, Edge::Top),
                    Edge::Solo => continue,
                };

                if let Some(target) = target {
                    let ghost = Msg::Ghost {
                        iteration,
                        edge,
                        row,
                    };
                    send(&mut self.state.workers[target], &ghost, limit).await?;
                }
            }
        }

        Ok(())
    }

    async fn broadcast(&mut self, msg: &Msg) -> Result<(), RunError> {
        let limit = self.config.response_timeout();
        let sends = self
            .state
            .workers
            .iter_mut()
            .filter(|h| h.is_live())
            .map(|h| send(h, msg, limit));

        future::try_join_all(sends).await?;
        Ok(())
    }

    /// Gathers every worker's final rows into the global grid.
    async fn collect(&mut self, iteration: u32) -> Result<Grid, RunError> {
        let width = self.config.width;
        let mut grid = Grid::zeros((self.config.height, width));
        let mut received = vec![false; self.partitions.len()];
        let deadline = Instant::now() + self.config.response_timeout();

        while let Some(missing) = received.iter().position(|done| !done) {
            let inbound = match time::timeout_at(deadline, self.inbox.recv()).await {
                Ok(Some(inbound)) => inbound,
                Ok(None) => return Err(io::Error::other("worker inbox closed").into()),
                Err(_) => return Err(self.timed_out(missing)),
            };

            let (worker, got, rows) = match inbound {
                Inbound::Msg {
                    worker,
                    msg: Msg::Result { iteration, rows },
                } => (worker, iteration, rows),
                other => return Err(self.unexpected(other)),
            };

            if got != iteration {
                let detail = format!("result for iteration {got}, expected {iteration}");
                return Err(RunError::protocol(worker, detail));
            }

            if received[worker] {
                return Err(RunError::protocol(worker, "duplicate result"));
            }

            let handle = &mut self.state.workers[worker];
            let range = handle.rows;
            let block = ArrayView2::from_shape((range.len(), width), &rows[..]).map_err(|_| {
                let detail = format!("result of {} values, expected {}", rows.len(), range.len() * width);
                RunError::protocol(worker, detail)
            })?;

            grid.slice_mut(s![range.as_range(), ..]).assign(&block);
            handle.state = WorkerState::Converged;
            received[worker] = true;
        }

        // The clock stops at the last result.
        self.state.stop_clock();
        Ok(grid)
    }

    fn unexpected(&self, inbound: Inbound) -> RunError {
        match inbound {
            Inbound::Msg { worker, msg } => {
                let detail = format!("unexpected {} while {:?}", msg.name(), self.state.phase);
                RunError::protocol(worker, detail)
            }
            Inbound::Lost { worker, error } => RunError::from_recv(worker, error),
        }
    }

    fn timed_out(&self, worker: usize) -> RunError {
        let limit = self.config.response_timeout();
        let detail = match self.state.workers.get(worker) {
            Some(handle) => format!(
                "{} silent for {limit:?}, last reported iteration {:?} with max-delta {}",
                handle.name, handle.last_iteration, handle.last_delta
            ),
            None => format!("silent for {limit:?}"),
        };

        RunError::connection(worker, detail)
    }

    /// Tells every admitted worker the run is over, failures are only logged.
    async fn abort(&mut self, cause: &RunError) {
        self.state.advance(Phase::Aborted);
        self.state.stop_clock();

        let msg = Msg::Decision {
            iteration: self.state.iteration,
            outcome: Outcome::Abort,
        };
        let limit = self.config.response_timeout();
        // The faulty worker is told too, its connection may still be usable.
        let sends = self.state.workers.iter_mut().map(|h| send(h, &msg, limit));

        for res in future::join_all(sends).await {
            if let Err(e) = res {
                debug!("abort not delivered: {e}");
            }
        }

        if let Some(handle) = cause.worker().and_then(|w| self.state.workers.get_mut(w)) {
            handle.state = WorkerState::Failed;
        }
    }

    async fn finish(mut self, result: Result<Grid, RunError>) -> RunReport {
        let (grid, failure) = match result {
            Ok(grid) => {
                if let Err(e) = self.broadcast(&Msg::Terminate).await {
                    warn!("failed to release every worker: {e}");
                }

                (Some(grid), None)
            }
            Err(e) => {
                error!("run aborted: {e}");
                self.abort(&e).await;
                (None, Some(e))
            }
        };

        for handle in &mut self.state.workers {
            if handle.is_live() {
                handle.state = WorkerState::Closed;
            }
        }

        self.state.advance(Phase::Done);
        self.readers.shutdown().await;

        let elapsed = self.state.elapsed.unwrap_or(Duration::ZERO);
        let record = RunRecord {
            label: self.config.label.clone(),
            strategy: Strategy::Distributed,
            height: self.config.height,
            width: self.config.width,
            workers: self.partitions.len(),
            epsilon: self.state.epsilon,
            iterations: self.state.history.len() as u32,
            elapsed_ms: elapsed.as_secs_f64() * 1e3,
            success: failure.is_none() && self.state.converged,
            residual: self.state.residual(),
            speedup: None,
        };

        RunReport {
            record,
            grid,
            history: self.state.history,
            failure,
        }
    }
}

/// Sends `msg` to one worker, giving up after `limit`.
async fn send(handle: &mut WorkerHandle, msg: &Msg, limit: Duration) -> Result<(), RunError> {
    let index = handle.index;

    match time::timeout(limit, handle.tx.send(msg)).await {
        Ok(res) => res.map_err(|e| RunError::connection(index, e)),
        Err(_) => {
            let detail = format!("{} not sent within {limit:?}", msg.name());
            Err(RunError::connection(index, detail))
        }
    }
}

/// Builds the assignment of `part`: its rows plus the ghost rows around them.
fn init_spec(part: &Partition, initial: &Grid, config: &RunConfig, workers: usize) -> InitSpec {
    let has_prev = part.prev.is_some();
    let has_next = part.next.is_some();
    let lo = part.rows.start - usize::from(has_prev);
    let hi = part.rows.end + usize::from(has_next);

    InitSpec {
        worker: part.index as u32,
        workers: workers as u32,
        row_start: part.rows.start as u32,
        row_end: part.rows.end as u32,
        width: config.width as u32,
        epsilon: config.epsilon,
        alpha: config.alpha,
        has_prev,
        has_next,
        rows: initial.slice(s![lo..hi, ..]).iter().copied().collect(),
    }
}
