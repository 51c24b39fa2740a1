//! Command implementations for the MET loader CLI
//!
//! Sets up logging, reads the load specification, connects to the database
//! and runs either the full load, the index-only pass or the long-form
//! export.

use crate::cli::args::Args;
use crate::config::LoadSpec;
use crate::error::{LoadError, Result};
use crate::models::LoadStats;
use crate::processor::LoadProcessor;
use crate::reformat::reformat_files;
use crate::store::MySqlDatabase;
use colored::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Main command runner
///
/// 1. Set up logging
/// 2. Read and validate the load specification
/// 3. Export, maintain indexes or load, as the arguments ask
pub async fn run(args: Args, cancel: CancellationToken) -> Result<LoadStats> {
    setup_logging(&args)?;
    debug!("Command line arguments: {:?}", args);
    args.validate()?;

    let spec = LoadSpec::from_file(&args.xmlfile)?;
    info!(
        "Loaded specification {} for database {}",
        args.xmlfile.display(),
        spec.connection.database
    );

    if let Some(dir) = &args.reformat {
        let exported = reformat_files(&spec, dir, cancel, args.show_progress()).await?;
        if args.show_progress() {
            println!("\n{}", "Long-form export".bright_green().bold());
            for file in &exported {
                println!(
                    "  {} {} rows -> {}",
                    format!("{}:", file.line_type).bright_cyan(),
                    file.rows.to_string().bright_white(),
                    file.path.display()
                );
            }
        }
        return Ok(LoadStats::default());
    }

    let db = MySqlDatabase::connect(&spec.connection).await?;
    let processor = LoadProcessor::new(db, spec)
        .with_tmpdir(args.tmpdir())
        .with_cancellation(cancel)
        .with_progress(args.show_progress());

    if args.index {
        let report = processor.process_indexes().await?;
        info!(
            "Index maintenance complete: {} done, {} skipped",
            report.applied, report.skipped
        );
        return Ok(LoadStats::default());
    }

    processor.process().await
}

/// Set up structured logging from `-loglevel`, unless `RUST_LOG` is set
fn setup_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.loglevel.directive();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("met_dbload={}", log_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_timer(fmt::time::uptime())
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|e| LoadError::configuration(format!("cannot initialize logging: {}", e)))?;

    debug!("Logging initialized at level: {}", log_level);
    Ok(())
}
