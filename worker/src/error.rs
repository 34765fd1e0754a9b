use std::{error::Error, fmt, io};

use comms::msg::Edge;

/// The worker module's result type.
pub type Result<T> = std::result::Result<T, WorkerErr>;

/// Worker runtime failures.
#[derive(Debug)]
pub enum WorkerErr {
    Io(io::Error),
    UnexpectedMessage {
        iteration: u32,
        got: &'static str,
    },
    IterationMismatch {
        expected: u32,
        got: u32,
    },
    RowLengthMismatch {
        iteration: u32,
        got: usize,
        expected: usize,
    },
    InvalidInit(String),
    MissingGhost {
        iteration: u32,
        edge: Edge,
    },
}

impl fmt::Display for WorkerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerErr::Io(e) => write!(f, "io error: {e}"),
            WorkerErr::UnexpectedMessage { iteration, got } => {
                write!(f, "unexpected message at iteration {iteration}: got {got}")
            }
            WorkerErr::IterationMismatch { expected, got } => {
                write!(f, "message for iteration {got} while at iteration {expected}")
            }
            WorkerErr::RowLengthMismatch {
                iteration,
                got,
                expected,
            } => write!(
                f,
                "row length mismatch at iteration {iteration}: got {got}, expected {expected}"
            ),
            WorkerErr::InvalidInit(detail) => write!(f, "invalid partition assignment: {detail}"),
            WorkerErr::MissingGhost { iteration, edge } => {
                write!(f, "continue decision at iteration {iteration} without the {edge:?} ghost row")
            }
        }
    }
}

impl Error for WorkerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WorkerErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WorkerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<WorkerErr> for io::Error {
    fn from(value: WorkerErr) -> Self {
        match value {
            WorkerErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
