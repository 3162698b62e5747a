//! Telluric grid directory loader.
//!
//! Layout:
//!
//! - `wave.dat`: one wavelength (nm) per line
//! - `h2o.csv`, `ch4.csv`: one row per (temperature, abundance) node,
//!   temperature-major, one transmission per wavelength
//! - `n2o.csv`, `co.csv`, `co2.csv`, `o3.csv`: a single row each
//!
//! All CSV files are headerless.

use std::fs::File;
use std::path::Path;

use crate::error::AppError;
use crate::models::{TelluricGrid, TelluricTables};

pub fn load_telluric_grid(dir: &Path) -> Result<TelluricGrid, AppError> {
    if !dir.is_dir() {
        return Err(AppError::config(format!(
            "Telluric grid directory '{}' does not exist.",
            dir.display()
        )));
    }
    let tables = TelluricTables {
        wave: read_column(&dir.join("wave.dat"))?,
        h2o: read_rows(&dir.join("h2o.csv"))?,
        ch4: read_rows(&dir.join("ch4.csv"))?,
        n2o: read_single_row(&dir.join("n2o.csv"))?,
        co: read_single_row(&dir.join("co.csv"))?,
        co2: read_single_row(&dir.join("co2.csv"))?,
        o3: read_single_row(&dir.join("o3.csv"))?,
    };
    tracing::info!(dir = %dir.display(), n_wave = tables.wave.len(), "telluric grid loaded");
    TelluricGrid::from_tables(tables)
}

fn read_column(path: &Path) -> Result<Vec<f64>, AppError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AppError::data(format!("Failed to read '{}': {e}", path.display())))?;
    text.lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'))
        .map(|(line, l)| {
            l.parse::<f64>()
                .map_err(|_| AppError::data(format!("{}:{line}: invalid number '{l}'", path.display())))
        })
        .collect()
}

fn read_rows(path: &Path) -> Result<Vec<Vec<f64>>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::data(format!("Failed to open '{}': {e}", path.display())))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let line = idx + 1;
        let record = record.map_err(|e| AppError::data(format!("{}:{line}: {e}", path.display())))?;
        let row = record
            .iter()
            .map(|field| {
                field.parse::<f64>().map_err(|_| {
                    AppError::data(format!("{}:{line}: invalid number '{field}'", path.display()))
                })
            })
            .collect::<Result<Vec<f64>, AppError>>()?;
        rows.push(row);
    }
    Ok(rows)
}

fn read_single_row(path: &Path) -> Result<Vec<f64>, AppError> {
    let mut rows = read_rows(path)?;
    if rows.len() != 1 {
        return Err(AppError::data(format!(
            "'{}' must hold exactly one row, found {}.",
            path.display(),
            rows.len()
        )));
    }
    Ok(rows.remove(0))
}
