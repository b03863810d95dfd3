mod config;
mod manager;

use crate::manager::{Manager, Stage};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tabstat::synth::Dataset;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    #[arg(long)]
    work_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a sample dataset and a matching config.
    Generate {
        #[arg(long, value_enum)]
        dataset: Dataset,

        #[arg(long, default_value_t = 0)]
        seed: u64,
    },

    Clean,

    Describe,

    Decompose,

    Forecast,

    /// Run every configured stage.
    Run,

    /// Remove generated outputs.
    Purge,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let mgr = || Manager::new(&args.work_dir).context("failed to construct mgr");

    match args.command {
        Command::Generate { dataset, seed } => Manager::generate(&args.work_dir, dataset, seed)
            .context("failed to generate sample data")?,
        Command::Clean => mgr()?.run_stage(Stage::Clean)?,
        Command::Describe => mgr()?.run_stage(Stage::Describe)?,
        Command::Decompose => mgr()?.run_stage(Stage::Decompose)?,
        Command::Forecast => mgr()?.run_stage(Stage::Forecast)?,
        Command::Run => mgr()?.run_stage(Stage::All)?,
        Command::Purge => mgr()?.purge()?,
    }

    Ok(())
}
