//! Posterior summary statistics from weighted samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::BestFitStat;
use crate::error::AppError;

/// One posterior sample in physical units.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedSample {
    pub params: Vec<f64>,
    pub log_likelihood: f64,
    /// Unnormalized `ln(L · ΔX)`.
    pub log_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSummary {
    pub name: String,
    pub median: f64,
    pub mean: f64,
    pub sd: f64,
    /// Value at the maximum-likelihood sample.
    pub maximum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorSummary {
    pub created: DateTime<Utc>,
    pub log_evidence: f64,
    pub log_evidence_error: f64,
    pub max_log_likelihood: f64,
    pub n_samples: usize,
    pub n_iterations: usize,
    pub parameters: Vec<ParameterSummary>,
}

impl PosteriorSummary {
    /// Point used for the best-fit model, in cube order.
    pub fn point(&self, which: BestFitStat) -> Vec<f64> {
        self.parameters
            .iter()
            .map(|p| match which {
                BestFitStat::Median => p.median,
                BestFitStat::Maximum => p.maximum,
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }
}

/// Normalized posterior weights `exp(log_weight - ln Z)`.
pub fn normalized_weights(samples: &[WeightedSample], log_evidence: f64) -> Vec<f64> {
    let raw: Vec<f64> = samples.iter().map(|s| (s.log_weight - log_evidence).exp()).collect();
    let total: f64 = raw.iter().sum();
    if total > 0.0 {
        raw.into_iter().map(|w| w / total).collect()
    } else {
        raw
    }
}

/// Value where the cumulative weight first reaches `q`.
pub fn weighted_quantile(values: &[f64], weights: &[f64], q: f64) -> f64 {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let total: f64 = weights.iter().sum();
    let target = q * total;
    let mut acc = 0.0;
    for &i in &order {
        acc += weights[i];
        if acc >= target {
            return values[i];
        }
    }
    order.last().map_or(f64::NAN, |&i| values[i])
}

pub fn summarize(
    names: &[String],
    samples: &[WeightedSample],
    log_evidence: f64,
    log_evidence_error: f64,
    n_iterations: usize,
) -> Result<PosteriorSummary, AppError> {
    let best = samples
        .iter()
        .max_by(|a, b| a.log_likelihood.total_cmp(&b.log_likelihood))
        .ok_or_else(|| AppError::internal("Cannot summarize an empty posterior."))?;
    if let Some(bad) = samples.iter().find(|s| s.params.len() != names.len()) {
        return Err(AppError::internal(format!(
            "Sample has {} values for {} parameters.",
            bad.params.len(),
            names.len()
        )));
    }

    let weights = normalized_weights(samples, log_evidence);
    let parameters = names
        .iter()
        .enumerate()
        .map(|(k, name)| {
            let values: Vec<f64> = samples.iter().map(|s| s.params[k]).collect();
            let mean: f64 = values.iter().zip(&weights).map(|(v, w)| v * w).sum();
            let var: f64 = values
                .iter()
                .zip(&weights)
                .map(|(v, w)| w * (v - mean) * (v - mean))
                .sum();
            ParameterSummary {
                name: name.clone(),
                median: weighted_quantile(&values, &weights, 0.5),
                mean,
                sd: var.max(0.0).sqrt(),
                maximum: best.params[k],
            }
        })
        .collect();

    Ok(PosteriorSummary {
        created: Utc::now(),
        log_evidence,
        log_evidence_error,
        max_log_likelihood: best.log_likelihood,
        n_samples: samples.len(),
        n_iterations,
        parameters,
    })
}
