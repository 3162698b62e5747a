//! Classic nested sampling with constrained random-walk replacement.
//!
//! Each iteration retires the worst live point, credits it with the prior
//! mass shell `X_{i-1} - X_i` (with `X_i = e^{-i/N}`), and replaces it by a
//! random walk started from a surviving live point that only accepts moves
//! above the retired likelihood. All moves happen in the unit cube; physical
//! values are only produced through the problem's prior transform.

use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;

use crate::domain::SamplerConfig;
use crate::error::AppError;
use crate::sampler::{LikelihoodProblem, PosteriorSummary, Sampler, WeightedSample, summarize};

/// Iterations between progress log lines.
const PROGRESS_EVERY: usize = 500;

const INITIAL_STEP: f64 = 0.1;

#[derive(Debug, Clone)]
struct LivePoint {
    unit: Vec<f64>,
    params: Vec<f64>,
    log_l: f64,
}

#[derive(Debug, Clone)]
pub struct NestedSampler {
    config: SamplerConfig,
}

/// `ln(e^a + e^b)` without overflow.
fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let m = a.max(b);
    m + ((a - m).exp() + (b - m).exp()).ln()
}

impl NestedSampler {
    pub fn new(config: SamplerConfig) -> Result<Self, AppError> {
        if config.n_live < 2 {
            return Err(AppError::config("Nested sampling needs at least 2 live points."));
        }
        if !(config.sampling_efficiency > 0.0 && config.sampling_efficiency <= 1.0) {
            return Err(AppError::config(format!(
                "Sampling efficiency must be in (0, 1], got {}.",
                config.sampling_efficiency
            )));
        }
        Ok(Self { config })
    }

    /// Random-walk steps per replacement.
    pub fn walk_steps(&self) -> usize {
        (1.0 / self.config.sampling_efficiency).ceil() as usize
    }

    fn evaluate(problem: &dyn LikelihoodProblem, unit: Vec<f64>) -> Result<LivePoint, AppError> {
        let mut params = unit.clone();
        problem.prior(&mut params)?;
        let log_l = problem.loglike(&params)?;
        Ok(LivePoint { unit, params, log_l })
    }

    /// Constrained walk from `start`; returns the final point with the
    /// accepted and rejected move counts.
    fn walk(
        &self,
        problem: &dyn LikelihoodProblem,
        start: &LivePoint,
        threshold: f64,
        step: f64,
        rng: &mut StdRng,
    ) -> Result<(LivePoint, usize, usize), AppError> {
        let mut current = start.clone();
        let (mut accepted, mut rejected) = (0, 0);
        for _ in 0..self.walk_steps() {
            let proposal: Vec<f64> = current
                .unit
                .iter()
                .map(|u| u + step * rng.sample::<f64, _>(StandardNormal))
                .collect();
            if proposal.iter().any(|u| !(0.0..=1.0).contains(u)) {
                rejected += 1;
                continue;
            }
            let candidate = Self::evaluate(problem, proposal)?;
            if candidate.log_l > threshold {
                current = candidate;
                accepted += 1;
            } else {
                rejected += 1;
            }
        }
        Ok((current, accepted, rejected))
    }
}

impl Sampler for NestedSampler {
    fn run(&mut self, problem: &dyn LikelihoodProblem, prefix: &str) -> Result<PosteriorSummary, AppError> {
        let n_dims = problem.n_dims();
        if n_dims == 0 {
            return Err(AppError::config("No free parameters to sample."));
        }
        let n_live = self.config.n_live;
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        tracing::info!(n_live, n_dims, walk_steps = self.walk_steps(), "nested sampling started");

        let units: Vec<Vec<f64>> = (0..n_live)
            .map(|_| (0..n_dims).map(|_| rng.gen_range(0.0..1.0)).collect())
            .collect();
        let mut live: Vec<LivePoint> = units
            .into_par_iter()
            .map(|u| Self::evaluate(problem, u))
            .collect::<Result<_, AppError>>()?;

        let shrink = 1.0 / n_live as f64;
        let log_shell = (1.0 - (-shrink).exp()).ln();
        let mut log_x = 0.0;
        let mut log_z = f64::NEG_INFINITY;
        let mut info = 0.0;
        let mut step = INITIAL_STEP;
        let mut dead: Vec<WeightedSample> = Vec::new();
        let mut iterations = 0;

        while iterations < self.config.max_iterations {
            let (worst, _) = live
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.log_l.total_cmp(&b.1.log_l))
                .ok_or_else(|| AppError::internal("Live set is empty."))?;
            let threshold = live[worst].log_l;

            let log_weight = log_x + log_shell + threshold;
            let log_z_new = log_add_exp(log_z, log_weight);
            let carried = if log_z.is_finite() {
                (log_z - log_z_new).exp() * (info + log_z)
            } else {
                0.0
            };
            info = (log_weight - log_z_new).exp() * threshold + carried - log_z_new;
            log_z = log_z_new;
            dead.push(WeightedSample {
                params: live[worst].params.clone(),
                log_likelihood: threshold,
                log_weight,
            });

            let mut start = rng.gen_range(0..n_live - 1);
            if start >= worst {
                start += 1;
            }
            let (replacement, accepted, rejected) = self.walk(problem, &live[start], threshold, step, &mut rng)?;
            if accepted > rejected {
                step *= (1.0 / accepted as f64).exp();
            } else if accepted < rejected {
                step /= (1.0 / rejected as f64).exp();
            }
            step = step.min(1.0);
            live[worst] = replacement;

            log_x -= shrink;
            iterations += 1;

            let log_l_max = live.iter().map(|p| p.log_l).fold(f64::NEG_INFINITY, f64::max);
            let remaining = (1.0 + (log_l_max + log_x - log_z).exp()).ln();
            if iterations % PROGRESS_EVERY == 0 {
                tracing::info!(iterations, log_z, remaining, step, "nested sampling progress");
            }
            if remaining < self.config.evidence_tolerance {
                break;
            }
        }

        // Remaining live points share the last prior volume equally.
        let log_live_weight = log_x - (n_live as f64).ln();
        for p in live {
            let log_weight = log_live_weight + p.log_l;
            log_z = log_add_exp(log_z, log_weight);
            dead.push(WeightedSample {
                params: p.params,
                log_likelihood: p.log_l,
                log_weight,
            });
        }
        let log_z_err = (info.max(0.0) / n_live as f64).sqrt();
        tracing::info!(iterations, log_z, log_z_err, "nested sampling finished");

        let names = problem.parameter_names();
        let summary = summarize(&names, &dead, log_z, log_z_err, iterations)?;
        crate::io::write_samples_csv(&PathBuf::from(format!("{prefix}samples.csv")), &names, &dead, log_z)?;
        crate::io::write_summary_json(&PathBuf::from(format!("{prefix}stats.json")), &summary)?;
        Ok(summary)
    }
}
