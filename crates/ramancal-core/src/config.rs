use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{ResidualNorm, WeightMode};
use crate::independence::{
    DEFAULT_HIGH_TEMPERATURE, DEFAULT_LOW_TEMPERATURE, DEFAULT_TOLERANCE,
    DEFAULT_UP_WEIGHT_FACTOR,
};
use crate::model::{PolynomialDegree, DEFAULT_COEFFICIENT_SCALES};
use crate::optimize::{DEFAULT_F_TOLERANCE, DEFAULT_X_TOLERANCE};

/// Top-level run description, loaded from JSON. One file describes every
/// per-degree fit over a shared set of species tables.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// Per-order coefficient scale constants.
    #[serde(default = "default_scales")]
    pub scales: [f64; 5],
    /// Optional wavenumber the polynomial is centered on.
    #[serde(default)]
    pub spectral_center: Option<f64>,
    #[serde(default)]
    pub norm: ResidualNorm,
    #[serde(default)]
    pub weights: WeightConfig,
    pub temperature: TemperatureConfig,
    /// Present enables temperature-independence up-weighting.
    #[serde(default)]
    pub independence: Option<IndependenceConfig>,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    pub fits: Vec<FitConfig>,
    pub species: Vec<SpeciesConfig>,
    #[serde(default)]
    pub references: Vec<ReferenceConfig>,
    pub axis: AxisConfig,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightConfig {
    #[serde(default)]
    pub mode: WeightMode,
    #[serde(default)]
    pub anti_diagonal_factor: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum TemperatureConfig {
    /// Temperature joins the parameter vector, seeded at `initial`.
    Fitted { initial: f64 },
    /// Temperature is held at `value`; only coefficients are searched.
    Fixed { value: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndependenceConfig {
    #[serde(default = "default_low_temperature")]
    pub low_temperature: f64,
    #[serde(default = "default_high_temperature")]
    pub high_temperature: f64,
    #[serde(default = "default_independence_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_up_weight_factor")]
    pub up_weight_factor: f64,
}

impl Default for IndependenceConfig {
    fn default() -> Self {
        Self {
            low_temperature: DEFAULT_LOW_TEMPERATURE,
            high_temperature: DEFAULT_HIGH_TEMPERATURE,
            tolerance: DEFAULT_TOLERANCE,
            up_weight_factor: DEFAULT_UP_WEIGHT_FACTOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerConfig {
    #[serde(default = "default_x_tolerance")]
    pub x_tolerance: f64,
    #[serde(default = "default_f_tolerance")]
    pub f_tolerance: f64,
    #[serde(default)]
    pub max_iterations: Option<usize>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            x_tolerance: DEFAULT_X_TOLERANCE,
            f_tolerance: DEFAULT_F_TOLERANCE,
            max_iterations: None,
        }
    }
}

/// One fit to run: polynomial degree plus the seed coefficients.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FitConfig {
    pub degree: PolynomialDegree,
    pub initial_coefficients: Vec<f64>,
    /// Per-fit iteration cap; overrides `optimizer.maxIterations`.
    #[serde(default)]
    pub max_iterations: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesConfig {
    pub name: String,
    /// Path to the experimental band-area table.
    pub experimental: PathBuf,
    pub theoretical: TheoreticalConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TheoreticalConfig {
    /// One precomputed line table, temperature invariant.
    Fixed { table: PathBuf },
    /// Line tables precomputed on a temperature grid, interpolated at the
    /// trial temperature. `temperatures` and `tables` are index aligned.
    Grid {
        temperatures: Vec<f64>,
        tables: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceConfig {
    pub name: String,
    #[serde(default = "default_reference_scale")]
    pub scale: f64,
    pub records: Vec<ReferenceRecordConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceRecordConfig {
    pub ratio: f64,
    pub numerator_position: f64,
    pub denominator_position: f64,
    #[serde(default = "default_reference_confidence")]
    pub confidence: f64,
}

/// Instrument wavenumber axis the correction curve is sampled over:
/// either generated inclusive of both ends, or loaded from a one-column
/// table written by the acquisition software.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum AxisConfig {
    Table { table: PathBuf },
    Linear { start: f64, end: f64, count: usize },
}

fn default_scales() -> [f64; 5] {
    DEFAULT_COEFFICIENT_SCALES
}

fn default_low_temperature() -> f64 {
    DEFAULT_LOW_TEMPERATURE
}

fn default_high_temperature() -> f64 {
    DEFAULT_HIGH_TEMPERATURE
}

fn default_independence_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

fn default_up_weight_factor() -> f64 {
    DEFAULT_UP_WEIGHT_FACTOR
}

fn default_x_tolerance() -> f64 {
    DEFAULT_X_TOLERANCE
}

fn default_f_tolerance() -> f64 {
    DEFAULT_F_TOLERANCE
}

fn default_reference_scale() -> f64 {
    1.0
}

fn default_reference_confidence() -> f64 {
    1.0
}

#[derive(Debug, thiserror::Error)]
pub enum RunConfigError {
    #[error("failed to read run config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse run config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("run config '{}': {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

pub fn load_run_config(config_path: impl AsRef<Path>) -> Result<RunConfig, RunConfigError> {
    let config_path = config_path.as_ref();
    let source = fs::read_to_string(config_path).map_err(|source| RunConfigError::Read {
        path: config_path.to_path_buf(),
        source,
    })?;
    let config: RunConfig =
        serde_json::from_str(&source).map_err(|source| RunConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })?;
    validate_run_config(&config, config_path)?;
    Ok(config)
}

fn validate_run_config(config: &RunConfig, path: &Path) -> Result<(), RunConfigError> {
    let invalid = |message: String| RunConfigError::Invalid {
        path: path.to_path_buf(),
        message,
    };

    if config.fits.is_empty() {
        return Err(invalid("at least one fit entry is required".to_string()));
    }
    for fit in &config.fits {
        let expected = fit.degree.coefficient_count();
        if fit.initial_coefficients.len() != expected {
            return Err(invalid(format!(
                "{} fit lists {} initial coefficients, expected {}",
                fit.degree,
                fit.initial_coefficients.len(),
                expected
            )));
        }
    }
    if config.species.is_empty() {
        return Err(invalid("at least one species entry is required".to_string()));
    }
    for species in &config.species {
        if let TheoreticalConfig::Grid {
            temperatures,
            tables,
        } = &species.theoretical
        {
            if temperatures.len() != tables.len() {
                return Err(invalid(format!(
                    "species '{}' grid lists {} temperatures but {} tables",
                    species.name,
                    temperatures.len(),
                    tables.len()
                )));
            }
        }
    }
    if let AxisConfig::Linear { start, end, count } = &config.axis {
        if *count < 2 || end <= start {
            return Err(invalid(format!(
                "axis must run forward with at least 2 samples, got start={start} end={end} count={count}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{load_run_config, RunConfigError, TemperatureConfig, TheoreticalConfig};
    use crate::domain::{ResidualNorm, WeightMode};
    use crate::model::{PolynomialDegree, DEFAULT_COEFFICIENT_SCALES};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_config(temp: &TempDir, content: &str) -> PathBuf {
        let path = temp.path().join("run.json");
        fs::write(&path, content).expect("config written");
        path
    }

    const MINIMAL: &str = r#"{
        "temperature": { "mode": "fitted", "initial": 298.0 },
        "fits": [
            { "degree": "linear", "initialCoefficients": [-1.045] },
            { "degree": "quadratic", "initialCoefficients": [-0.931, -0.242] }
        ],
        "species": [
            {
                "name": "H2",
                "experimental": "data/h2_areas.txt",
                "theoretical": { "fixed": { "table": "data/h2_lines.txt" } }
            }
        ],
        "axis": { "start": 200.0, "end": 4000.0, "count": 3801 },
        "outputDir": "out"
    }"#;

    #[test]
    fn minimal_config_fills_every_default() {
        let temp = TempDir::new().expect("tempdir");
        let path = write_config(&temp, MINIMAL);
        let config = load_run_config(&path).expect("config");

        assert_eq!(config.scales, DEFAULT_COEFFICIENT_SCALES);
        assert_eq!(config.spectral_center, None);
        assert_eq!(config.norm, ResidualNorm::Absolute);
        assert_eq!(config.weights.mode, WeightMode::Propagated);
        assert_eq!(config.weights.anti_diagonal_factor, None);
        assert!(config.independence.is_none());
        assert_eq!(config.optimizer.x_tolerance, 1.0e-9);
        assert_eq!(config.optimizer.f_tolerance, 1.0e-9);
        assert_eq!(config.optimizer.max_iterations, None);
        assert_eq!(config.fits[1].degree, PolynomialDegree::Quadratic);
        assert_eq!(config.fits[1].max_iterations, None);
        assert_eq!(
            config.temperature,
            TemperatureConfig::Fitted { initial: 298.0 }
        );
        assert!(config.references.is_empty());
        assert!(matches!(
            config.species[0].theoretical,
            TheoreticalConfig::Fixed { .. }
        ));
    }

    #[test]
    fn full_config_round_trips_through_serde() {
        let temp = TempDir::new().expect("tempdir");
        let path = write_config(
            &temp,
            r#"{
                "scales": [1.0e3, 1.0e6, 1.0e9, 1.0e12, 1.0e15],
                "spectralCenter": 3316.3,
                "norm": "squared",
                "weights": { "mode": "uniform", "antiDiagonalFactor": 5.0 },
                "temperature": { "mode": "fixed", "value": 298.0 },
                "independence": { "upWeightFactor": 7.0 },
                "optimizer": { "maxIterations": 2500 },
                "fits": [
                    { "degree": "cubic", "initialCoefficients": [-0.9, -0.2, 0.01], "maxIterations": 1500 }
                ],
                "species": [
                    {
                        "name": "D2",
                        "experimental": "data/d2_areas.txt",
                        "theoretical": {
                            "grid": {
                                "temperatures": [298.0, 600.0, 1000.0],
                                "tables": ["d2_298.txt", "d2_600.txt", "d2_1000.txt"]
                            }
                        }
                    }
                ],
                "references": [
                    {
                        "name": "O2",
                        "scale": 0.5,
                        "records": [
                            { "ratio": 1.2, "numeratorPosition": 400.0, "denominatorPosition": 800.0 }
                        ]
                    }
                ],
                "axis": { "start": 200.0, "end": 4000.0, "count": 3801 },
                "outputDir": "out"
            }"#,
        );
        let config = load_run_config(&path).expect("config");
        assert_eq!(config.spectral_center, Some(3316.3));
        assert_eq!(config.norm, ResidualNorm::Squared);
        assert_eq!(config.weights.anti_diagonal_factor, Some(5.0));
        let independence = config.independence.expect("independence");
        assert_eq!(independence.up_weight_factor, 7.0);
        assert_eq!(independence.low_temperature, 298.0);
        assert_eq!(config.optimizer.max_iterations, Some(2500));
        assert_eq!(config.fits[0].max_iterations, Some(1500));
        assert_eq!(config.references[0].records[0].confidence, 1.0);
    }

    #[test]
    fn coefficient_count_mismatch_is_rejected_at_load() {
        let temp = TempDir::new().expect("tempdir");
        let path = write_config(
            &temp,
            &MINIMAL.replace("[-1.045]", "[-1.045, 0.3]"),
        );
        let error = load_run_config(&path).expect_err("mismatch");
        assert!(matches!(error, RunConfigError::Invalid { .. }));
        assert!(error.to_string().contains("linear"));
    }

    #[test]
    fn missing_file_and_bad_json_map_to_distinct_errors() {
        let temp = TempDir::new().expect("tempdir");
        let error = load_run_config(temp.path().join("absent.json")).expect_err("missing");
        assert!(matches!(error, RunConfigError::Read { .. }));

        let path = write_config(&temp, "{ not json");
        let error = load_run_config(&path).expect_err("parse");
        assert!(matches!(error, RunConfigError::Parse { .. }));
    }

    #[test]
    fn degenerate_axis_is_rejected() {
        let temp = TempDir::new().expect("tempdir");
        let path = write_config(
            &temp,
            &MINIMAL.replace(
                r#""start": 200.0, "end": 4000.0, "count": 3801"#,
                r#""start": 4000.0, "end": 200.0, "count": 3801"#,
            ),
        );
        let error = load_run_config(&path).expect_err("axis");
        assert!(matches!(error, RunConfigError::Invalid { .. }));
    }
}
