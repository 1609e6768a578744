mod cli;

use anyhow::{Context as _, Result};
use clap::Parser;
use flight_db::Loader;
use log::info;
use tracing_subscriber::EnvFilter;

use cli::Args;

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger if requested
    // the fmt subscriber also captures records emitted through the `log` facade
    if let Some(log_level) = args.log {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(log_level.to_string()))
            .init();
    }

    smol::block_on(run(&args))
}

async fn run(args: &Args) -> Result<()> {
    let loader = Loader::open(&args.db_path)
        .await
        .context("opening database")?;
    loader.ensure_schema().await.context("ensuring schema")?;

    let inserted = loader
        .load_rows_individually(&args.csv_path)
        .await
        .context("loading rows individually")?;
    info!("count" = inserted; "loaded flight listings row by row");

    let deleted = loader.clear_table().await.context("clearing table")?;
    info!("count" = deleted; "cleared previously loaded rows");

    let loaded = loader
        .load_rows_batched(&args.csv_path)
        .await
        .context("loading rows batched")?;
    info!("count" = loaded; "bulk loaded flight listings");

    loader.close();

    Ok(())
}
