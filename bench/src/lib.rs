//! Runs the three execution strategies over the same problems and checks each
//! result against the sequential grid.

use std::{
    fs::File,
    future::Future,
    io,
    io::BufReader,
    path::Path,
    time::{Duration, Instant},
};

use coordinator::{Coordinator, RunConfig, RunError, RunRecord, Strategy};
use heat::{ConfigError, DEFAULT_ALPHA, Grid, InitialCondition, Relaxation, Solution, parallel, sequential};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::{task, time};

/// What to compare and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub label: String,
    /// Grid shapes to run every strategy on, as `[height, width]`.
    pub sizes: Vec<(usize, usize)>,
    pub epsilon: f64,
    pub alpha: f64,
    pub max_iterations: u32,
    /// Pool sizes to run the shared-memory baseline with.
    pub threads: Vec<usize>,
    /// Worker counts to run the distributed strategy with.
    pub workers: Vec<usize>,
    /// Largest cell difference against the sequential grid still deemed correct.
    pub tolerance: f64,
    pub response_timeout_ms: u64,
    /// Longest a single strategy run may take before it's recorded as failed.
    pub run_timeout_ms: u64,
    pub initial: InitialCondition,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            label: "bench".to_string(),
            sizes: vec![(64, 64), (128, 128)],
            epsilon: 1e-3,
            alpha: DEFAULT_ALPHA,
            max_iterations: 10_000,
            threads: vec![2, 4],
            workers: vec![1, 2, 4],
            tolerance: 1e-3,
            response_timeout_ms: 10_000,
            run_timeout_ms: 60_000,
            initial: InitialCondition::default(),
        }
    }
}

impl BenchConfig {
    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        serde_json::from_reader(reader).map_err(io::Error::from)
    }

    pub fn relaxation(&self) -> Relaxation {
        Relaxation {
            alpha: self.alpha,
            epsilon: self.epsilon,
            max_iterations: self.max_iterations,
        }
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    fn run_config(&self, (height, width): (usize, usize), workers: usize) -> RunConfig {
        RunConfig {
            label: self.label.clone(),
            height,
            width,
            workers,
            epsilon: self.epsilon,
            alpha: self.alpha,
            max_iterations: self.max_iterations,
            response_timeout_ms: self.response_timeout_ms,
            initial: self.initial,
            ..RunConfig::default()
        }
    }

    fn record(&self, strategy: Strategy, workers: usize, solution: &Solution, elapsed_ms: f64) -> RunRecord {
        let (height, width) = solution.grid.dim();

        RunRecord {
            label: self.label.clone(),
            strategy,
            height,
            width,
            workers,
            epsilon: self.epsilon,
            iterations: solution.iterations,
            elapsed_ms,
            success: true,
            residual: solution.residual,
            speedup: None,
        }
    }

    /// The record of a run cut short by the time limit.
    fn timed_out(&self, strategy: Strategy, (height, width): (usize, usize), workers: usize) -> RunRecord {
        RunRecord {
            label: self.label.clone(),
            strategy,
            height,
            width,
            workers,
            epsilon: self.epsilon,
            iterations: 0,
            elapsed_ms: self.run_timeout().as_secs_f64() * 1e3,
            success: false,
            residual: f64::NAN,
            speedup: None,
        }
    }
}

/// A validated benchmark ready to run.
pub struct Bench {
    config: BenchConfig,
    /// One starting grid per configured size.
    initials: Vec<Grid>,
}

impl Bench {
    /// Validates `config` and builds the initial grid of every size.
    pub fn new(config: BenchConfig) -> Result<Self, ConfigError> {
        config.relaxation().validate()?;

        let initials = config
            .sizes
            .iter()
            .map(|&(height, width)| config.initial.build(height, width))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { config, initials })
    }

    /// Runs the single-threaded baseline.
    ///
    /// # Returns
    /// Its record and the reference grid for every other strategy.
    pub async fn sequential(&self, initial: &Grid) -> Result<(RunRecord, Grid), RunError> {
        let initial = initial.clone();
        let relax = self.config.relaxation();

        let (solution, elapsed_ms) = task::spawn_blocking(move || {
            let start = Instant::now();
            let solution = sequential::solve(&initial, &relax);
            (solution, start.elapsed().as_secs_f64() * 1e3)
        })
        .await
        .map_err(io::Error::other)?;

        let record = self.config.record(Strategy::Sequential, 1, &solution, elapsed_ms);
        Ok((record, solution.grid))
    }

    /// Runs the shared-memory baseline on `threads` threads.
    pub async fn parallel(&self, initial: &Grid, threads: usize, reference: &Grid) -> Result<RunRecord, RunError> {
        let initial = initial.clone();
        let relax = self.config.relaxation();

        let (solution, elapsed_ms) = task::spawn_blocking(move || {
            let start = Instant::now();
            parallel::solve(&initial, &relax, threads).map(|s| (s, start.elapsed().as_secs_f64() * 1e3))
        })
        .await
        .map_err(io::Error::other)??;

        let mut record = self.config.record(Strategy::Parallel, threads, &solution, elapsed_ms);
        record.success = self.matches(&solution.grid, reference);
        Ok(record)
    }

    /// Runs the distributed strategy with `workers` in-process workers over loopback TCP.
    pub async fn distributed(&self, initial: &Grid, workers: usize, reference: &Grid) -> Result<RunRecord, RunError> {
        let config = self.config.run_config(initial.dim(), workers);
        let coordinator = Coordinator::bind("127.0.0.1:0", config).await?;
        let addr = coordinator.local_addr()?;

        let handles: Vec<_> = (0..workers)
            .map(|i| tokio::spawn(worker::connect(addr, format!("bench-{i}"))))
            .collect();

        let mut report = coordinator.run(initial).await;

        for handle in handles {
            match handle.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("worker failed: {e}"),
                Err(e) => warn!("worker task panicked: {e}"),
            }
        }

        if let Some(e) = &report.failure {
            warn!(workers = workers; "distributed run failed: {e}");
        }

        if let Some(grid) = &report.grid {
            report.record.success &= self.matches(grid, reference);
        }

        Ok(report.record)
    }

    /// Runs every configured strategy on every size, handing each record to
    /// `emit` as soon as it's ready.
    ///
    /// A sequential baseline that runs out of time leaves nothing to compare
    /// against, so the other strategies are skipped for that size.
    pub async fn run_all(&self, mut emit: impl FnMut(&RunRecord)) -> Result<Vec<RunRecord>, RunError> {
        let mut records = Vec::new();

        for initial in &self.initials {
            let shape = initial.dim();

            let (record, reference) = match time::timeout(self.config.run_timeout(), self.sequential(initial)).await {
                Ok(res) => {
                    let (record, reference) = res?;
                    (record, Some(reference))
                }
                Err(_) => (self.config.timed_out(Strategy::Sequential, shape, 1), None),
            };

            let baseline_ms = record.elapsed_ms;
            emit(&record);
            records.push(record);

            let Some(reference) = reference else {
                warn!(height = shape.0, width = shape.1; "sequential baseline timed out, size skipped");
                continue;
            };

            for &threads in &self.config.threads {
                let run = self.parallel(initial, threads, &reference);
                let record = self.bounded(Strategy::Parallel, shape, threads, baseline_ms, run).await?;
                emit(&record);
                records.push(record);
            }

            for &workers in &self.config.workers {
                let run = self.distributed(initial, workers, &reference);
                let record = self.bounded(Strategy::Distributed, shape, workers, baseline_ms, run).await?;
                emit(&record);
                records.push(record);
            }
        }

        info!(runs = records.len(); "benchmark finished");
        Ok(records)
    }

    /// Runs `run` within the time limit and fills in its speedup over the baseline.
    async fn bounded(
        &self,
        strategy: Strategy,
        shape: (usize, usize),
        workers: usize,
        baseline_ms: f64,
        run: impl Future<Output = Result<RunRecord, RunError>>,
    ) -> Result<RunRecord, RunError> {
        let mut record = match time::timeout(self.config.run_timeout(), run).await {
            Ok(res) => res?,
            Err(_) => {
                warn!(workers = workers; "{strategy:?} run timed out");
                return Ok(self.config.timed_out(strategy, shape, workers));
            }
        };

        if record.success && record.elapsed_ms > 0.0 {
            record.speedup = Some(baseline_ms / record.elapsed_ms);
        }

        Ok(record)
    }

    fn matches(&self, grid: &Grid, reference: &Grid) -> bool {
        let diff = heat::max_abs_diff(grid, reference);
        if diff > self.config.tolerance {
            warn!("result differs from the sequential grid by {diff}");
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_strategy_agrees_on_every_size() {
        let config = BenchConfig {
            sizes: vec![(10, 10), (12, 7)],
            threads: vec![2],
            workers: vec![1, 3],
            ..BenchConfig::default()
        };
        let bench = Bench::new(config).unwrap();

        let mut emitted = 0;
        let records = bench.run_all(|_| emitted += 1).await.unwrap();

        assert_eq!(emitted, 8);
        let strategies: Vec<_> = records.iter().take(4).map(|r| r.strategy).collect();
        assert_eq!(
            strategies,
            [
                Strategy::Sequential,
                Strategy::Parallel,
                Strategy::Distributed,
                Strategy::Distributed
            ]
        );

        for (size, runs) in [(10, 10), (12, 7)].into_iter().zip(records.chunks(4)) {
            let baseline = &runs[0];
            assert_eq!(baseline.speedup, None);

            for record in runs {
                assert!(record.success, "{record:?}");
                assert_eq!((record.height, record.width), size);
                assert_eq!(record.iterations, baseline.iterations);
            }

            for record in &runs[1..] {
                let speedup = record.speedup.unwrap();
                assert!(speedup.is_finite() && speedup > 0.0, "{record:?}");
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timed_out_baseline_skips_its_size() {
        let config = BenchConfig {
            sizes: vec![(128, 128)],
            epsilon: 1e-12,
            max_iterations: 2_000,
            threads: vec![2],
            workers: vec![1],
            run_timeout_ms: 1,
            ..BenchConfig::default()
        };
        let bench = Bench::new(config).unwrap();

        let records = bench.run_all(|_| {}).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].strategy, Strategy::Sequential);
        assert!(!records[0].success);
        assert_eq!(records[0].iterations, 0);
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = BenchConfig {
            epsilon: 0.0,
            ..BenchConfig::default()
        };
        assert!(Bench::new(config).is_err());

        let config = BenchConfig {
            sizes: vec![(8, 8), (0, 8)],
            ..BenchConfig::default()
        };
        assert!(matches!(Bench::new(config), Err(ConfigError::EmptyGrid { .. })));
    }
}
