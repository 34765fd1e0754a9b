use std::{error::Error, fmt};

/// Invalid run parameters, detected before any work starts.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A partition plan was requested for zero workers.
    NoWorkers,
    /// More workers than rows, some partition would own nothing.
    TooManyWorkers { workers: usize, height: usize },
    /// The grid has no rows or no columns.
    EmptyGrid { height: usize, width: usize },
    /// A numeric parameter is out of its valid range.
    InvalidParameter { name: &'static str, value: f64 },
    /// A supplied grid doesn't have the configured dimensions.
    GridShape {
        expected: (usize, usize),
        got: (usize, usize),
    },
    /// The shared-memory pool could not be created.
    ThreadPool(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoWorkers => write!(f, "at least one worker is required"),
            ConfigError::TooManyWorkers { workers, height } => write!(
                f,
                "cannot split {height} rows across {workers} workers, each must own at least one row"
            ),
            ConfigError::EmptyGrid { height, width } => {
                write!(f, "grid must not be empty, got {height}x{width}")
            }
            ConfigError::InvalidParameter { name, value } => {
                write!(f, "invalid value for {name}: {value}")
            }
            ConfigError::GridShape { expected, got } => write!(
                f,
                "grid is {}x{}, the run is configured for {}x{}",
                got.0, got.1, expected.0, expected.1
            ),
            ConfigError::ThreadPool(e) => write!(f, "failed to build thread pool: {e}"),
        }
    }
}

impl Error for ConfigError {}
