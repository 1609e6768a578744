use std::path::PathBuf;

#[derive(Debug, Clone, Copy, derive_more::Display, clap::ValueEnum)]
#[display(rename_all = "snake_case")]
pub(crate) enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, clap::Parser)]
pub(crate) struct Args {
    /// Path to the database
    #[arg(short = 'p', long, default_value = "flights.db")]
    pub(crate) db_path: PathBuf,

    /// Path to the flight-listing CSV file
    #[arg(short, long, default_value = "flights.csv")]
    pub(crate) csv_path: PathBuf,

    /// Enable logging
    ///
    /// If this flag is set without an explicit level argument, defaults to "info".
    #[arg(short, long, value_name = "LEVEL", num_args = 0..=1, default_missing_value = "info")]
    pub(crate) log: Option<Level>,
}
