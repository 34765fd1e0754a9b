use std::{env, io};

use coordinator::{Coordinator, RunConfig, RunError};
use log::info;
use tokio::signal;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "0";

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let addr = format!(
        "{}:{}",
        env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
        env::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string()),
    );

    let config = match env::var("HEAT_CONFIG") {
        Ok(path) => RunConfig::from_file(path)?,
        Err(_) => RunConfig::default(),
    };

    let initial = config
        .initial
        .build(config.height, config.width)
        .map_err(RunError::from)?;

    let coordinator = Coordinator::bind(&addr, config).await?;
    let workers = coordinator.config().workers;
    info!(workers = workers; "listening at {}", coordinator.local_addr()?);

    tokio::select! {
        report = coordinator.run(&initial) => {
            println!("{}", report.record.to_json_line().map_err(io::Error::from)?);

            if let Some(e) = report.failure {
                return Err(e.into());
            }
        }
        _ = signal::ctrl_c() => {
            info!("received SIGTERM");
        }
    }

    Ok(())
}
