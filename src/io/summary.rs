//! Read/write the posterior summary JSON (`{prefix}stats.json`).
//!
//! The schema is [`PosteriorSummary`]; best-fit extraction reads it back
//! instead of re-running the sampler.

use std::fs::File;
use std::path::Path;

use crate::error::AppError;
use crate::sampler::PosteriorSummary;

pub fn write_summary_json(path: &Path, summary: &PosteriorSummary) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::data(format!("Failed to create summary JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, summary)
        .map_err(|e| AppError::data(format!("Failed to write summary JSON: {e}")))?;
    Ok(())
}

pub fn read_summary_json(path: &Path) -> Result<PosteriorSummary, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::data(format!("Failed to open summary JSON '{}': {e}", path.display())))?;
    serde_json::from_reader(file).map_err(|e| AppError::data(format!("Invalid summary JSON '{}': {e}", path.display())))
}
