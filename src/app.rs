//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the real main. It:
//! - parses CLI arguments
//! - installs the tracing subscriber
//! - loads the run file and observations
//! - dispatches to sampling, best-fit extraction, or inspection
//! - prints the terminal report

use clap::Parser;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::cli::{BestFitArgs, Cli, Command, ConfigArgs, EvaluateArgs, RunArgs};
use crate::error::AppError;
use crate::sampler::NestedSampler;

pub mod pipeline;

/// Entry point for the `retrieve` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_tracing(cli.log_level);

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::BestFit(args) => handle_best_fit(args),
        Command::Params(args) => handle_params(args),
        Command::Evaluate(args) => handle_evaluate(args),
    }
}

/// `RUST_LOG` wins over `--log-level` when set.
fn init_tracing(level: tracing::Level) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let (config, mut retrieval) = pipeline::prepare(&args.common.config, args.common.out_dir.as_deref())?;

    let mut sampler_config = config.sampler.clone();
    if let Some(n) = args.live_points {
        sampler_config.n_live = n;
    }
    if let Some(seed) = args.seed {
        sampler_config.seed = seed;
    }
    let mut sampler = NestedSampler::new(sampler_config)?;

    let summary = retrieval.run(&mut sampler)?;
    println!("{}", crate::report::format_posterior_summary(&summary));

    let best = retrieval.best_fit_from(&summary, args.which)?;
    println!("{}", crate::report::format_best_fit(&best));
    println!("Outputs written with prefix {}", retrieval.prefix());
    Ok(())
}

fn handle_best_fit(args: BestFitArgs) -> Result<(), AppError> {
    let (_, retrieval) = pipeline::prepare(&args.common.config, args.common.out_dir.as_deref())?;
    let best = retrieval.best_fit(args.which)?;
    println!("{}", crate::report::format_best_fit(&best));
    Ok(())
}

fn handle_params(args: ConfigArgs) -> Result<(), AppError> {
    let (_, retrieval) = pipeline::prepare(&args.config, args.out_dir.as_deref())?;
    println!("{}", crate::report::format_parameter_table(retrieval.store()?));
    Ok(())
}

fn handle_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    if !(0.0..=1.0).contains(&args.cube) {
        return Err(AppError::config(format!("--cube must lie in [0, 1], got {}.", args.cube)));
    }
    let (_, retrieval) = pipeline::prepare(&args.common.config, args.common.out_dir.as_deref())?;
    let n = retrieval.store()?.n_free();
    let mut point = vec![args.cube; n];
    retrieval.prior(&mut point)?;
    let evaluation = retrieval.evaluate(&point)?;
    println!("{}", crate::report::format_evaluation(&evaluation));
    Ok(())
}
