//! Observation CSV ingest.
//!
//! Expected columns (header required, any order, case-insensitive):
//! `chip,wavelength,flux,err`. Rows are grouped by chip index, chips are
//! ordered by index and pixels by wavelength.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;

use crate::domain::Observation;
use crate::error::AppError;

const REQUIRED_COLUMNS: [&str; 4] = ["chip", "wavelength", "flux", "err"];

#[derive(Debug, Clone, Copy)]
struct Pixel {
    wlen: f64,
    flux: f64,
    err: f64,
}

/// Load one instrument's observation from a CSV file.
pub fn load_observation(path: &Path) -> Result<Observation, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::data(format!("Failed to open observation CSV '{}': {e}", path.display()))
    })?;
    read_observation(file, &path.display().to_string())
}

/// Parse observation CSV from any reader; `source` labels error messages.
pub fn read_observation<R: Read>(reader: R, source: &str) -> Result<Observation, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::data(format!("{source}: failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    for col in REQUIRED_COLUMNS {
        if !header_map.contains_key(col) {
            return Err(AppError::data(format!("{source}: missing required column '{col}'.")));
        }
    }

    let mut chips: BTreeMap<usize, Vec<Pixel>> = BTreeMap::new();
    for (idx, record) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        let record = record.map_err(|e| AppError::data(format!("{source}:{line}: {e}")))?;
        let (chip, pixel) =
            parse_row(&record, &header_map).map_err(|msg| AppError::data(format!("{source}:{line}: {msg}")))?;
        chips.entry(chip).or_default().push(pixel);
    }
    if chips.is_empty() {
        return Err(AppError::data(format!("{source}: no data rows.")));
    }

    let mut wlen = Vec::with_capacity(chips.len());
    let mut flux = Vec::with_capacity(chips.len());
    let mut err = Vec::with_capacity(chips.len());
    for (_, mut pixels) in chips {
        pixels.sort_by(|a, b| a.wlen.total_cmp(&b.wlen));
        wlen.push(pixels.iter().map(|p| p.wlen).collect());
        flux.push(pixels.iter().map(|p| p.flux).collect());
        err.push(pixels.iter().map(|p| p.err).collect());
    }

    tracing::debug!(source, chips = wlen.len(), "observation loaded");
    Observation::new(wlen, flux, err).map_err(|e| AppError::data(format!("{source}: {e}")))
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_ascii_lowercase(), i))
        .collect()
}

fn get_field<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Result<&'a str, String> {
    header_map
        .get(name)
        .and_then(|&i| record.get(i))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("missing value for '{name}'"))
}

fn parse_finite(record: &StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Result<f64, String> {
    let raw = get_field(record, header_map, name)?;
    let value: f64 = raw.parse().map_err(|_| format!("invalid {name} '{raw}'"))?;
    if !value.is_finite() {
        return Err(format!("non-finite {name} '{raw}'"));
    }
    Ok(value)
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<(usize, Pixel), String> {
    let raw_chip = get_field(record, header_map, "chip")?;
    let chip: usize = raw_chip.parse().map_err(|_| format!("invalid chip '{raw_chip}'"))?;
    let pixel = Pixel {
        wlen: parse_finite(record, header_map, "wavelength")?,
        flux: parse_finite(record, header_map, "flux")?,
        err: parse_finite(record, header_map, "err")?,
    };
    if pixel.err <= 0.0 {
        return Err(format!("non-positive err {}", pixel.err));
    }
    Ok((chip, pixel))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chips_and_pixels_are_ordered() {
        let csv = "chip,wavelength,flux,err\n\
                   1, 2001.0, 0.5, 0.1\n\
                   0, 2000.2, 1.2, 0.1\n\
                   0, 2000.1, 1.1, 0.1\n\
                   1, 2000.9, 0.4, 0.2\n";
        let obs = read_observation(csv.as_bytes(), "test").unwrap();
        assert_eq!(obs.n_chips(), 2);
        assert_eq!(obs.wlen[0], vec![2000.1, 2000.2]);
        assert_eq!(obs.flux[0], vec![1.1, 1.2]);
        assert_eq!(obs.err[1], vec![0.2, 0.1]);
    }

    #[test]
    fn columns_may_come_in_any_order() {
        let csv = "Err,Flux,Wavelength,Chip\n0.1,1.0,10.0,0\n0.1,1.0,11.0,0\n";
        let obs = read_observation(csv.as_bytes(), "test").unwrap();
        assert_eq!(obs.wlen[0], vec![10.0, 11.0]);
    }

    #[test]
    fn bad_rows_report_their_line() {
        let csv = "chip,wavelength,flux,err\n0,1.0,1.0,0.1\n0,2.0,1.0,0.0\n";
        let err = read_observation(csv.as_bytes(), "obs.csv").unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_DATA);
        assert!(err.message().starts_with("obs.csv:3:"), "{}", err.message());

        let csv = "chip,wavelength,flux,err\n0,1.0,NaN,0.1\n";
        assert!(read_observation(csv.as_bytes(), "obs.csv").is_err());
    }

    #[test]
    fn missing_column_is_rejected() {
        let csv = "chip,wavelength,flux\n0,1.0,1.0\n";
        let err = read_observation(csv.as_bytes(), "obs.csv").unwrap_err();
        assert!(err.message().contains("'err'"));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obs.csv");
        std::fs::write(&path, "chip,wavelength,flux,err\n0,1.0,1.0,0.1\n0,2.0,1.0,0.1\n").unwrap();
        let obs = load_observation(&path).unwrap();
        assert_eq!(obs.wlen_bins[0], vec![1.0, 1.0]);
    }
}
