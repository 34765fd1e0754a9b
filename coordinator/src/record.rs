use serde::{Deserialize, Serialize};

use heat::Grid;

use crate::RunError;

/// Which execution strategy produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Sequential,
    Parallel,
    Distributed,
}

/// One line of benchmark output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub label: String,
    pub strategy: Strategy,
    pub height: usize,
    pub width: usize,
    /// Workers for distributed runs, threads for parallel ones, 1 otherwise.
    pub workers: usize,
    pub epsilon: f64,
    pub iterations: u32,
    pub elapsed_ms: f64,
    /// Whether the run completed and its grid is trustworthy.
    pub success: bool,
    /// Global max-delta of the last completed iteration.
    pub residual: f64,
    /// Sequential elapsed time over this run's, only set by the benchmark driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speedup: Option<f64>,
}

impl RunRecord {
    /// Renders the record as a single JSON line.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// What a distributed run hands back once it's over, successful or not.
#[derive(Debug)]
pub struct RunReport {
    pub record: RunRecord,
    /// The reassembled grid, only present when the run converged.
    pub grid: Option<Grid>,
    /// Global max-delta of every completed iteration, in order.
    pub history: Vec<f64>,
    pub failure: Option<RunError>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.record.success
    }
}
