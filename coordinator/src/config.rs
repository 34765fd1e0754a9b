use std::{fs::File, io, io::BufReader, path::Path, time::Duration};

use heat::{ConfigError, DEFAULT_ALPHA, InitialCondition, Partition, Relaxation};
use serde::{Deserialize, Serialize};

/// Everything a distributed run needs to know up front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Free-form tag copied into the run record.
    pub label: String,
    pub height: usize,
    pub width: usize,
    /// Amount of workers to wait for, one partition each.
    pub workers: usize,
    pub epsilon: f64,
    pub alpha: f64,
    pub max_iterations: u32,
    /// How long to wait for each worker to connect and say hello.
    pub accept_timeout_ms: u64,
    /// How long to wait for any expected worker message once iterating.
    pub response_timeout_ms: u64,
    pub initial: InitialCondition,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            label: "heat".to_string(),
            height: 64,
            width: 64,
            workers: 2,
            epsilon: 1e-3,
            alpha: DEFAULT_ALPHA,
            max_iterations: 10_000,
            accept_timeout_ms: 10_000,
            response_timeout_ms: 10_000,
            initial: InitialCondition::default(),
        }
    }
}

impl RunConfig {
    /// Loads a config from a JSON file, missing fields take their defaults.
    ///
    /// # Errors
    /// An `io::Error` if the file can't be read or isn't a valid config.
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

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Checks every parameter and computes the partition plan.
    ///
    /// # Returns
    /// One partition per worker, in worker order.
    pub fn plan(&self) -> Result<Vec<Partition>, ConfigError> {
        if self.height == 0 || self.width == 0 {
            return Err(ConfigError::EmptyGrid {
                height: self.height,
                width: self.width,
            });
        }

        self.relaxation().validate()?;

        for (name, ms) in [
            ("accept_timeout_ms", self.accept_timeout_ms),
            ("response_timeout_ms", self.response_timeout_ms),
        ] {
            if ms == 0 {
                return Err(ConfigError::InvalidParameter { name, value: 0.0 });
            }
        }

        heat::partition(self.height, self.workers)
    }
}
