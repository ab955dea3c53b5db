#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the GeoNames batch import driver.

mod driver;

use clap::{Parser, Subcommand};

use crate::driver::DriverConfig;

#[derive(Parser)]
#[command(name = "geonames_import_cli", about = "GeoNames batch import driver")]
struct Cli {
    /// Base URL of the import API server
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full import: discover the dataset size via an offset-0 batch,
    /// then dispatch every remaining offset
    Full {
        /// Lines per batch
        #[arg(long, default_value = "50")]
        batch_size: u64,
        /// Batch requests issued concurrently per group
        #[arg(long, default_value = "5")]
        concurrent_requests: usize,
        /// Minimum population a city must have to be imported
        #[arg(long, default_value = "15000")]
        threshold: u64,
        /// Store the alternate-names column
        #[arg(long)]
        include_alternate_names: bool,
        /// Discard all previously imported cities and state before starting
        #[arg(long)]
        clean: bool,
    },
    /// Dispatch an explicit offset list: a single value, an inclusive
    /// range stepped by the batch size (`0-2000`), or a comma-separated
    /// list (`0,50,100`)
    Offsets {
        /// The offset specification
        offsets: String,
        /// Lines per batch
        #[arg(long, default_value = "50")]
        batch_size: u64,
        /// Batch requests issued concurrently per group
        #[arg(long, default_value = "5")]
        concurrent_requests: usize,
        /// Minimum population a city must have to be imported
        #[arg(long, default_value = "15000")]
        threshold: u64,
        /// Store the alternate-names column
        #[arg(long)]
        include_alternate_names: bool,
    },
    /// Re-dispatch the failed offsets recorded in the import state,
    /// sequentially
    Retry,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let server = cli.server.trim_end_matches('/').to_string();

    let client = reqwest::Client::builder()
        .user_agent("geonames-import/1.0 (https://github.com/BSteffaniak/geonames-import)")
        .build()?;

    match cli.command {
        Commands::Full {
            batch_size,
            concurrent_requests,
            threshold,
            include_alternate_names,
            clean,
        } => {
            let config = DriverConfig {
                server,
                batch_size,
                concurrent_requests,
                threshold,
                include_alternate_names,
            };
            driver::run_full(&client, &config, clean).await?;
        }
        Commands::Offsets {
            offsets,
            batch_size,
            concurrent_requests,
            threshold,
            include_alternate_names,
        } => {
            let config = DriverConfig {
                server,
                batch_size,
                concurrent_requests,
                threshold,
                include_alternate_names,
            };
            driver::run_manual(&client, &config, &offsets).await?;
        }
        Commands::Retry => {
            driver::run_retry(&client, &server).await?;
        }
    }

    Ok(())
}
