use std::time::Duration;

/// Where a worker spent its wall-clock time.
#[derive(Debug, Default, Clone)]
pub struct WorkerMetrics {
    /// Time spent relaxing the local block.
    pub compute_time: Duration,
    /// Time spent sending boundaries and blocked on ghosts and decisions.
    pub exchange_time: Duration,
    pub iterations: u32,
}

impl WorkerMetrics {
    #[inline]
    pub fn bump_iteration(&mut self) {
        self.iterations += 1;
    }
}
