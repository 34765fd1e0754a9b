use std::{env, io};

use bench::{Bench, BenchConfig};
use coordinator::RunError;
use log::{error, info};
use tokio::signal;

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let config = match env::var("HEAT_CONFIG") {
        Ok(path) => BenchConfig::from_file(path)?,
        Err(_) => BenchConfig::default(),
    };

    let bench = Bench::new(config).map_err(RunError::from)?;
    let emit = |record: &coordinator::RunRecord| match record.to_json_line() {
        Ok(line) => println!("{line}"),
        Err(e) => error!("failed to encode a record: {e}"),
    };

    tokio::select! {
        ret = bench.run_all(emit) => {
            ret?;
        }
        _ = signal::ctrl_c() => {
            info!("received SIGTERM");
        }
    }

    Ok(())
}
