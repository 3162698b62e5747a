//! Command-line parsing for the retrieval binary.
//!
//! Parsing and dispatch stay out of the numeric code; every subcommand takes
//! the TOML run file as its first argument.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::BestFitStat;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "retrieve", version, about = "Bayesian retrieval of high-resolution emission spectra")]
pub struct Cli {
    /// Log verbosity (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value_t = tracing::Level::INFO)]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sample the posterior, write samples plus the summary JSON, then export
    /// the best fit.
    Run(RunArgs),
    /// Evaluate the best-fit model from a finished run and export it.
    BestFit(BestFitArgs),
    /// List the registered parameters in cube order.
    Params(ConfigArgs),
    /// Evaluate the likelihood once at a uniform cube point.
    Evaluate(EvaluateArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ConfigArgs {
    /// TOML run file.
    #[arg(value_name = "RUN_FILE")]
    pub config: PathBuf,

    /// Override the output directory from the run file.
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: ConfigArgs,

    /// Number of live points.
    #[arg(long)]
    pub live_points: Option<usize>,

    /// Sampler seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Posterior statistic used for the best fit after sampling.
    #[arg(long, value_enum, default_value_t = BestFitStat::Median)]
    pub which: BestFitStat,
}

#[derive(Debug, Args, Clone)]
pub struct BestFitArgs {
    #[command(flatten)]
    pub common: ConfigArgs,

    /// Posterior statistic used as the best-fit point.
    #[arg(long, value_enum, default_value_t = BestFitStat::Median)]
    pub which: BestFitStat,
}

#[derive(Debug, Args, Clone)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub common: ConfigArgs,

    /// Unit-cube coordinate used for every free parameter.
    #[arg(long, default_value_t = 0.5)]
    pub cube: f64,
}
