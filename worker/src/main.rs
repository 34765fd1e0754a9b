use std::{env, io, process};

use log::{error, info};
use tokio::signal;

const DEFAULT_HOST: &str = "127.0.0.1";

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let addr = format!(
        "{}:{}",
        env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
        env::var("PORT").map_err(io::Error::other)?,
    );
    let name = env::var("WORKER_NAME").unwrap_or_else(|_| format!("worker-{}", process::id()));

    tokio::select! {
        ret = worker::connect(&addr, name) => {
            match ret {
                Ok(report) => info!(
                    iterations = report.metrics.iterations,
                    compute_ms = report.metrics.compute_time.as_millis() as u64,
                    exchange_ms = report.metrics.exchange_time.as_millis() as u64;
                    "finished with {:?}", report.outcome
                ),
                Err(e) => {
                    error!("worker failed: {e}");
                    return Err(e.into());
                }
            }
        }
        _ = signal::ctrl_c() => {
            info!("received SIGTERM");
        }
    }

    Ok(())
}
