//! CSV exports: posterior samples and the best-fit model.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::Observation;
use crate::error::AppError;
use crate::likelihood::InstrumentFit;
use crate::sampler::{WeightedSample, normalized_weights};

fn create(path: &Path, what: &str) -> Result<BufWriter<File>, AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::data(format!("Failed to create {what} '{}': {e}", path.display())))?;
    Ok(BufWriter::new(file))
}

/// `weight,log_likelihood,<parameters...>`, weights normalized to sum to 1.
pub fn write_samples_csv(
    path: &Path,
    names: &[String],
    samples: &[WeightedSample],
    log_evidence: f64,
) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(create(path, "samples CSV")?);
    let csv_err = |e: csv::Error| AppError::data(format!("Failed to write samples CSV: {e}"));

    let mut header = vec!["weight".to_string(), "log_likelihood".to_string()];
    header.extend(names.iter().cloned());
    writer.write_record(&header).map_err(csv_err)?;

    for (sample, weight) in samples.iter().zip(normalized_weights(samples, log_evidence)) {
        let mut row = Vec::with_capacity(sample.params.len() + 2);
        row.push(format!("{weight:e}"));
        row.push(format!("{}", sample.log_likelihood));
        row.extend(sample.params.iter().map(|v| v.to_string()));
        writer.write_record(&row).map_err(csv_err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::data(format!("Failed to write samples CSV: {e}")))?;
    Ok(())
}

/// Per-pixel best-fit model next to the data.
pub fn write_best_fit_csv(path: &Path, fits: &[InstrumentFit], observations: &[Observation]) -> Result<(), AppError> {
    let mut file = create(path, "best-fit CSV")?;
    let write_err = |e: std::io::Error| AppError::data(format!("Failed to write best-fit CSV: {e}"));

    writeln!(file, "instrument,chip,wavelength,data,error,model").map_err(write_err)?;
    for (inst, obs) in fits.iter().zip(observations) {
        for (chip, fit) in inst.chips.iter().enumerate() {
            for (i, model) in fit.model.iter().enumerate() {
                writeln!(
                    file,
                    "{},{},{:.6},{:e},{:e},{:e}",
                    inst.name, chip, obs.wlen[chip][i], obs.flux[chip][i], obs.err[chip][i], model
                )
                .map_err(write_err)?;
            }
        }
    }
    file.flush().map_err(write_err)?;
    Ok(())
}

/// Per-chip log-likelihood, flux scaling, and error inflation. Factors that
/// were not fitted are left empty.
pub fn write_chip_factors_csv(path: &Path, fits: &[InstrumentFit]) -> Result<(), AppError> {
    let mut file = create(path, "chip factors CSV")?;
    let write_err = |e: std::io::Error| AppError::data(format!("Failed to write chip factors CSV: {e}"));

    writeln!(file, "instrument,chip,log_likelihood,flux_scaling,err_inflation").map_err(write_err)?;
    for inst in fits {
        for (chip, fit) in inst.chips.iter().enumerate() {
            writeln!(
                file,
                "{},{},{},{},{}",
                inst.name,
                chip,
                fit.log_l,
                fit.flux_scaling.map(|v| v.to_string()).unwrap_or_default(),
                fit.err_inflation.map(|v| v.to_string()).unwrap_or_default(),
            )
            .map_err(write_err)?;
        }
    }
    file.flush().map_err(write_err)?;
    Ok(())
}
