use std::{fmt, io};

use heat::ConfigError;

/// All the ways a run can fail.
#[derive(Debug)]
pub enum RunError {
    /// Invalid configuration, the run never started.
    Config(ConfigError),
    /// A worker sent a malformed or unexpected message.
    Protocol { worker: usize, detail: String },
    /// A worker disconnected or didn't answer in time.
    Connection { worker: usize, detail: String },
    /// A worker reported a non-finite max-delta.
    Divergence { worker: usize, iteration: u32 },
    /// The listener itself failed.
    Io(io::Error),
}

impl RunError {
    /// Classifies a failed receive from `worker`.
    ///
    /// Malformed frames are protocol errors, everything else means the
    /// connection is gone.
    pub fn from_recv(worker: usize, e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::InvalidData => Self::Protocol {
                worker,
                detail: e.to_string(),
            },
            _ => Self::connection(worker, e),
        }
    }

    pub fn connection(worker: usize, detail: impl fmt::Display) -> Self {
        Self::Connection {
            worker,
            detail: detail.to_string(),
        }
    }

    pub fn protocol(worker: usize, detail: impl fmt::Display) -> Self {
        Self::Protocol {
            worker,
            detail: detail.to_string(),
        }
    }

    /// The worker at fault, if the failure is attributable to one.
    pub fn worker(&self) -> Option<usize> {
        match self {
            Self::Protocol { worker, .. }
            | Self::Connection { worker, .. }
            | Self::Divergence { worker, .. } => Some(*worker),
            Self::Config(_) | Self::Io(_) => None,
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid config: {e}"),
            Self::Protocol { worker, detail } => {
                write!(f, "protocol error from worker {worker}: {detail}")
            }
            Self::Connection { worker, detail } => {
                write!(f, "connection to worker {worker} failed: {detail}")
            }
            Self::Divergence { worker, iteration } => write!(
                f,
                "worker {worker} reported a non-finite max-delta at iteration {iteration}"
            ),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for RunError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<io::Error> for RunError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Boundary conversion for the binaries.
impl From<RunError> for io::Error {
    fn from(value: RunError) -> Self {
        match value {
            RunError::Io(e) => e,
            RunError::Config(e) => io::Error::new(io::ErrorKind::InvalidInput, e),
            other => io::Error::other(other),
        }
    }
}
