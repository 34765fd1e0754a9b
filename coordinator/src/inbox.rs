use std::io;

use comms::{WireReceiver, msg::Msg};
use log::debug;
use tokio::{net::tcp::OwnedReadHalf, sync::mpsc, task::JoinSet};

pub(crate) type NetRx = WireReceiver<OwnedReadHalf>;

/// Something that happened on a worker connection.
#[derive(Debug)]
pub enum Inbound {
    Msg { worker: usize, msg: Msg },
    /// The connection failed, no more messages will arrive from `worker`.
    Lost { worker: usize, error: io::Error },
}

/// Spawns a task that forwards every message from `worker` into `inbox`.
///
/// The task ends after the first receive error, or as soon as the inbox is closed.
///
/// # Arguments
/// * `tasks` - The set owning every reader task of the run.
/// * `worker` - The index of the worker on the other end.
/// * `rx` - The receiving half of the worker connection.
/// * `inbox` - The control loop's inbox.
pub fn spawn_reader(
    tasks: &mut JoinSet<()>,
    worker: usize,
    mut rx: NetRx,
    inbox: mpsc::Sender<Inbound>,
) {
    tasks.spawn(async move {
        loop {
            let inbound = match rx.recv().await {
                Ok(msg) => Inbound::Msg { worker, msg },
                Err(error) => Inbound::Lost { worker, error },
            };

            let lost = matches!(inbound, Inbound::Lost { .. });
            if inbox.send(inbound).await.is_err() || lost {
                break;
            }
        }

        debug!(worker = worker; "reader task finished");
    });
}
