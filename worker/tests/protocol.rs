use comms::{
    WireReceiver, WireSender,
    msg::{Edge, InitSpec, Msg, Outcome},
};
use heat::{DEFAULT_ALPHA, Grid, InitialCondition};
use ndarray::s;
use tokio::{
    io::{self, DuplexStream, ReadHalf, WriteHalf},
    task::JoinHandle,
};
use worker::{Worker, WorkerErr, WorkerOutcome, WorkerReport};

type Rx = WireReceiver<ReadHalf<DuplexStream>>;
type Tx = WireSender<WriteHalf<DuplexStream>>;

fn channel_pair() -> ((Rx, Tx), (Rx, Tx)) {
    let (stream1, stream2) = io::duplex(4096);
    let (rx1, tx1) = io::split(stream1);
    let (rx2, tx2) = io::split(stream2);
    let chan1 = comms::channel(rx1, tx1);
    let chan2 = comms::channel(rx2, tx2);
    (chan1, chan2)
}

fn init_for(grid: &Grid, start: usize, end: usize) -> InitSpec {
    let has_prev = start > 0;
    let has_next = end < grid.nrows();
    let lo = start - usize::from(has_prev);
    let hi = end + usize::from(has_next);

    InitSpec {
        worker: 0,
        workers: 1,
        row_start: start as u32,
        row_end: end as u32,
        width: grid.ncols() as u32,
        epsilon: 1e-3,
        alpha: DEFAULT_ALPHA,
        has_prev,
        has_next,
        rows: grid.slice(s![lo..hi, ..]).iter().copied().collect(),
    }
}

/// Spawns a worker and plays the coordinator's side up to the assignment.
async fn start(
    name: &str,
    grid: &Grid,
    start: usize,
    end: usize,
) -> io::Result<(Rx, Tx, JoinHandle<worker::error::Result<WorkerReport>>)> {
    let ((wrx, wtx), (mut rx, mut tx)) = channel_pair();
    let handle = tokio::spawn(Worker::new(name).run(wrx, wtx));

    let hello: Msg = rx.recv().await?;
    assert_eq!(
        hello,
        Msg::Hello {
            name: name.to_string()
        }
    );

    tx.send(&Msg::Init(init_for(grid, start, end))).await?;
    Ok((rx, tx, handle))
}

#[tokio::test]
async fn solo_worker_converges_and_delivers_its_rows() -> io::Result<()> {
    let grid = InitialCondition::default().build(3, 3).unwrap();
    let (mut rx, mut tx, handle) = start("solo", &grid, 0, 3).await?;

    let boundary: Msg = rx.recv().await?;
    assert_eq!(
        boundary,
        Msg::Boundary {
            iteration: 0,
            edge: Edge::Solo,
            row: Vec::new(),
            max_delta: 20.0,
        }
    );

    let decision = Msg::Decision {
        iteration: 0,
        outcome: Outcome::Converge,
    };
    tx.send(&decision).await?;

    let result: Msg = rx.recv().await?;
    assert_eq!(
        result,
        Msg::Result {
            iteration: 0,
            rows: vec![100.0, 100.0, 100.0, 20.0, 40.0, 20.0, 20.0, 20.0, 20.0],
        }
    );

    tx.send(&Msg::Terminate).await?;

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.outcome, WorkerOutcome::Converged { iterations: 1 });
    assert_eq!(report.metrics.iterations, 1);
    Ok(())
}

#[tokio::test]
async fn relayed_ghost_feeds_the_next_iteration() -> io::Result<()> {
    let grid = InitialCondition::default().build(4, 3).unwrap();
    let (mut rx, mut tx, handle) = start("bottom", &grid, 2, 4).await?;

    let boundary: Msg = rx.recv().await?;
    assert_eq!(
        boundary,
        Msg::Boundary {
            iteration: 0,
            edge: Edge::Top,
            row: vec![20.0; 3],
            max_delta: 0.0,
        }
    );

    let ghost = Msg::Ghost {
        iteration: 0,
        edge: Edge::Top,
        row: vec![0.0, 60.0, 0.0],
    };
    tx.send(&ghost).await?;
    let decision = Msg::Decision {
        iteration: 0,
        outcome: Outcome::Continue,
    };
    tx.send(&decision).await?;

    let boundary: Msg = rx.recv().await?;
    assert_eq!(
        boundary,
        Msg::Boundary {
            iteration: 1,
            edge: Edge::Top,
            row: vec![20.0, 30.0, 20.0],
            max_delta: 10.0,
        }
    );

    let decision = Msg::Decision {
        iteration: 1,
        outcome: Outcome::Converge,
    };
    tx.send(&decision).await?;

    let Msg::Result { iteration, rows } = rx.recv().await? else {
        panic!("expected the final rows");
    };
    assert_eq!(iteration, 1);
    assert_eq!(rows, [20.0, 30.0, 20.0, 20.0, 20.0, 20.0]);

    // Dropping the connection instead of terminating is tolerated.
    drop(tx);
    drop(rx);

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.outcome, WorkerOutcome::Converged { iterations: 2 });
    Ok(())
}

#[tokio::test]
async fn abort_ends_the_run() -> io::Result<()> {
    let grid = InitialCondition::default().build(4, 3).unwrap();
    let (mut rx, mut tx, handle) = start("top", &grid, 0, 2).await?;

    let _: Msg = rx.recv().await?;
    let decision = Msg::Decision {
        iteration: 0,
        outcome: Outcome::Abort,
    };
    tx.send(&decision).await?;

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.outcome, WorkerOutcome::Aborted { iteration: 0 });
    Ok(())
}

#[tokio::test]
async fn abort_after_the_results_were_sent() -> io::Result<()> {
    let grid = InitialCondition::default().build(3, 3).unwrap();
    let (mut rx, mut tx, handle) = start("late", &grid, 0, 3).await?;

    let _: Msg = rx.recv().await?;
    let decision = Msg::Decision {
        iteration: 0,
        outcome: Outcome::Converge,
    };
    tx.send(&decision).await?;

    let result: Msg = rx.recv().await?;
    assert!(matches!(result, Msg::Result { iteration: 0, .. }));

    // Another participant failed while the results were being gathered.
    let decision = Msg::Decision {
        iteration: 0,
        outcome: Outcome::Abort,
    };
    tx.send(&decision).await?;

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.outcome, WorkerOutcome::Aborted { iteration: 0 });
    Ok(())
}

#[tokio::test]
async fn continue_without_the_ghost_is_an_error() -> io::Result<()> {
    let grid = InitialCondition::default().build(4, 3).unwrap();
    let (mut rx, mut tx, handle) = start("middle", &grid, 1, 3).await?;

    for _ in 0..2 {
        let _: Msg = rx.recv().await?;
    }

    let ghost = Msg::Ghost {
        iteration: 0,
        edge: Edge::Top,
        row: vec![1.0; 3],
    };
    tx.send(&ghost).await?;
    let decision = Msg::Decision {
        iteration: 0,
        outcome: Outcome::Continue,
    };
    tx.send(&decision).await?;

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        WorkerErr::MissingGhost {
            iteration: 0,
            edge: Edge::Bottom
        }
    ));
    Ok(())
}

#[tokio::test]
async fn ghost_for_another_iteration_is_rejected() -> io::Result<()> {
    let grid = InitialCondition::default().build(4, 3).unwrap();
    let (mut rx, mut tx, handle) = start("bottom", &grid, 2, 4).await?;

    let _: Msg = rx.recv().await?;
    let ghost = Msg::Ghost {
        iteration: 1,
        edge: Edge::Top,
        row: vec![1.0; 3],
    };
    tx.send(&ghost).await?;

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        WorkerErr::IterationMismatch {
            expected: 0,
            got: 1
        }
    ));
    Ok(())
}

#[tokio::test]
async fn short_ghost_row_is_rejected() -> io::Result<()> {
    let grid = InitialCondition::default().build(4, 3).unwrap();
    let (mut rx, mut tx, handle) = start("bottom", &grid, 2, 4).await?;

    let _: Msg = rx.recv().await?;
    let ghost = Msg::Ghost {
        iteration: 0,
        edge: Edge::Top,
        row: vec![1.0; 2],
    };
    tx.send(&ghost).await?;

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        WorkerErr::RowLengthMismatch {
            got: 2,
            expected: 3,
            ..
        }
    ));
    Ok(())
}

#[tokio::test]
async fn anything_but_init_after_hello_is_rejected() -> io::Result<()> {
    let ((wrx, wtx), (mut rx, mut tx)) = channel_pair();
    let handle = tokio::spawn(Worker::new("early").run(wrx, wtx));

    let _: Msg = rx.recv().await?;
    let decision = Msg::Decision {
        iteration: 0,
        outcome: Outcome::Continue,
    };
    tx.send(&decision).await?;

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        WorkerErr::UnexpectedMessage {
            got: "decision",
            ..
        }
    ));
    Ok(())
}
