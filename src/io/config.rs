//! Run-file loading with environment overrides.
//!
//! Overrides (from the process environment or a `.env` file):
//!
//! - `RETRIEVAL_TELLURIC_GRID`: telluric grid directory
//! - `RETRIEVAL_OUT_DIR`: output directory

use std::path::{Path, PathBuf};

use crate::domain::RetrievalConfig;
use crate::error::AppError;

pub const ENV_TELLURIC_GRID: &str = "RETRIEVAL_TELLURIC_GRID";
pub const ENV_OUT_DIR: &str = "RETRIEVAL_OUT_DIR";

/// Read the TOML run file, apply environment overrides, and resolve relative
/// data paths against the run file's directory.
pub fn load_config(path: &Path) -> Result<RetrievalConfig, AppError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AppError::config(format!("Failed to read run file '{}': {e}", path.display())))?;
    let mut config = parse_config(&text)
        .map_err(|e| AppError::config(format!("{}: {}", path.display(), e.message())))?;

    dotenvy::dotenv().ok();
    apply_overrides(
        &mut config,
        std::env::var(ENV_TELLURIC_GRID).ok(),
        std::env::var(ENV_OUT_DIR).ok(),
    );

    if let Some(base) = path.parent() {
        for inst in &mut config.instruments {
            inst.data = resolve(base, &inst.data);
        }
        if let Some(dir) = &config.telluric.grid_dir {
            config.telluric.grid_dir = Some(resolve(base, dir));
        }
    }
    Ok(config)
}

pub fn parse_config(text: &str) -> Result<RetrievalConfig, AppError> {
    let config: RetrievalConfig =
        toml::from_str(text).map_err(|e| AppError::config(format!("Invalid run file: {e}")))?;
    validate(&config)?;
    Ok(config)
}

fn resolve(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() { p.to_path_buf() } else { base.join(p) }
}

pub fn apply_overrides(config: &mut RetrievalConfig, telluric_grid: Option<String>, out_dir: Option<String>) {
    if let Some(dir) = telluric_grid.filter(|s| !s.is_empty()) {
        tracing::debug!(%dir, "telluric grid overridden from environment");
        config.telluric.grid_dir = Some(PathBuf::from(dir));
    }
    if let Some(dir) = out_dir.filter(|s| !s.is_empty()) {
        tracing::debug!(%dir, "output directory overridden from environment");
        config.out_dir = PathBuf::from(dir);
    }
}

fn validate(config: &RetrievalConfig) -> Result<(), AppError> {
    if config.name.trim().is_empty() {
        return Err(AppError::config("Retrieval name must not be empty."));
    }
    if config.instruments.is_empty() {
        return Err(AppError::config("At least one [[instrument]] is required."));
    }
    let mut seen = std::collections::HashSet::new();
    for inst in &config.instruments {
        if !seen.insert(inst.name.as_str()) {
            return Err(AppError::config(format!("Instrument '{}' listed twice.", inst.name)));
        }
    }
    if config.temperature.n_knots < 2 {
        return Err(AppError::config("Temperature profile needs at least 2 knots."));
    }
    let (lo, hi) = config.temperature.t0_prior;
    if !(lo > 0.0 && hi > lo) {
        return Err(AppError::config(format!("Invalid t0_prior [{lo}, {hi}].")));
    }
    if config.opacity.lbl_opacity_sampling == 0 {
        return Err(AppError::config("lbl_opacity_sampling must be at least 1."));
    }
    if config.pressure.n_layers < config.temperature.n_knots {
        return Err(AppError::config("Pressure grid has fewer layers than temperature knots."));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
name = "2M0355"
line_species = ["H2O_main_iso", "CO_main_iso"]

[temperature]
n_knots = 5
t0_prior = [1000.0, 5000.0]

[[instrument]]
name = "crires"
data = "obs/crires.csv"
"#;

    #[test]
    fn minimal_file_gets_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.pressure.n_layers, 50);
        assert_eq!(config.fit.poly, 1);
        assert!(config.fit.scaling);
        assert!(!config.fit.telluric);
        assert_eq!(config.instruments[0].detector_bin(), 3);
        assert_eq!(config.sampler.n_live, 500);
        assert_eq!(config.system.limb, 0.5);
        assert_eq!(config.opacity, crate::domain::OpacityConfig::default());
        assert_eq!(config.opacity.continuum_opacities, ["H2-H2", "H2-He"]);
        assert!(!config.opacity.scattering_emission());
    }

    #[test]
    fn opacity_section_is_read() {
        let text = format!(
            "{MINIMAL}\n[opacity]\nmode = \"c-k\"\ncloud_species = [\"MgSiO3(c)_cd\"]\nlbl_opacity_sampling = 3\n"
        );
        let config = parse_config(&text).unwrap();
        assert_eq!(config.opacity.mode, crate::domain::OpacityMode::CorrelatedK);
        assert_eq!(config.opacity.lbl_opacity_sampling, 3);
        assert_eq!(config.opacity.rayleigh_species, ["H2", "He"]);
        assert!(config.opacity.scattering_emission());

        let zero = text.replace("lbl_opacity_sampling = 3", "lbl_opacity_sampling = 0");
        assert_eq!(parse_config(&zero).unwrap_err().exit_code(), crate::error::EXIT_CONFIG);
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = parse_config(MINIMAL).unwrap();
        apply_overrides(&mut config, Some("/grids/tellu".to_string()), Some(String::new()));
        assert_eq!(config.telluric.grid_dir, Some(PathBuf::from("/grids/tellu")));
        assert_eq!(config.out_dir, PathBuf::from("out"));
    }

    #[test]
    fn relative_paths_follow_the_run_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.instruments[0].data, dir.path().join("obs/crires.csv"));
    }

    #[test]
    fn single_knot_is_rejected() {
        let text = MINIMAL.replace("n_knots = 5", "n_knots = 1");
        let err = parse_config(&text).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
    }
}
