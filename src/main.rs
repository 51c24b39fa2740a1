use anyhow::Context;
use met_dbload::cli::{args::Args, commands};
use std::process;
use tokio_util::sync::CancellationToken;

fn main() {
    let args = Args::parse_normalized();

    let runtime = match tokio::runtime::Runtime::new().context("failed to create async runtime") {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("Error [runtime]: {:#}", error);
            process::exit(1);
        }
    };

    let result = runtime.block_on(async {
        let cancellation_token = CancellationToken::new();

        let shutdown_signal = async {
            if tokio::signal::ctrl_c().await.is_err() {
                // no signal handler; never resolve so the load runs to completion
                std::future::pending::<()>().await;
            }
            cancellation_token.cancel();
        };

        tokio::select! {
            result = commands::run(args, cancellation_token.clone()) => result,
            _ = shutdown_signal => {
                eprintln!("\nReceived CTRL+C, rolling back...");
                Err(met_dbload::LoadError::cancelled("interrupted by user"))
            }
        }
    });

    match result {
        Ok(_stats) => process::exit(0),
        Err(error) => {
            eprintln!("Error [{}]: {}", error.category(), error);
            process::exit(1);
        }
    }
}
