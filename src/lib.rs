pub mod analyze;
pub mod canonical;
pub mod classify;
pub mod cli;
pub mod data;
pub mod detect;
pub mod frame;
pub mod io_utils;
pub mod normalize;
pub mod pivot;
pub mod registry;
pub mod schema;
pub mod table;
pub mod variance;
pub mod variance_cmd;

use std::{env, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

use crate::cli::{Cli, Commands};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_variance", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Detect(args) => detect::execute(&args),
        Commands::Normalize(args) => normalize::execute(&args),
        Commands::Classify(args) => classify::execute(&args),
        Commands::Variance(args) => variance_cmd::execute(&args),
        Commands::Pivot(args) => pivot::execute(&args),
        Commands::Analyze(args) => analyze::execute(&args),
    }
}
