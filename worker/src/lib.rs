pub mod block;
pub mod error;
pub mod metrics;
pub mod worker;

use log::info;
use tokio::net::{TcpStream, ToSocketAddrs};

pub use block::Block;
pub use error::WorkerErr;
pub use metrics::WorkerMetrics;
pub use worker::{Worker, WorkerOutcome, WorkerReport};

/// Connects to the coordinator at `addr` and runs a worker named `name` to completion.
///
/// # Errors
/// Returns `WorkerErr` if the connection can't be established or the run fails.
pub async fn connect<A>(addr: A, name: impl Into<String>) -> error::Result<WorkerReport>
where
    A: ToSocketAddrs,
{
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    info!("connected to coordinator at {}", stream.peer_addr()?);

    let (rx, tx) = stream.into_split();
    let (rx, tx) = comms::channel(rx, tx);
    Worker::new(name).run(rx, tx).await
}
