use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{
    AxisConfig, FitConfig, ReferenceConfig, RunConfig, SpeciesConfig, TemperatureConfig,
    TheoreticalConfig,
};
use crate::curve::CorrectionCurve;
use crate::domain::{
    BandTable, CalResult, CalibrationError, LineTable, ReferenceDataset, ReferenceRecord,
};
use crate::model::{PolynomialDegree, SensitivityModel};
use crate::objective::{FitProblem, ObjectiveSettings, SpeciesDataset, TemperatureMode};
use crate::optimize::{minimize, NelderMeadOptions};
use crate::spectra::{FixedTableSource, TemperatureGridSource};
use crate::support::serialization::write_text_artifact;
use crate::support::tables::{read_band_table, read_line_table, read_numeric_table};

pub const FIT_REPORT_NAME: &str = "fit_report.json";

/// Species tables loaded from disk once and reused across per-degree fits.
pub struct LoadedSpecies {
    name: String,
    experimental: BandTable,
    theoretical: LoadedTheoretical,
}

enum LoadedTheoretical {
    Fixed(LineTable),
    Grid(Vec<f64>, Vec<LineTable>),
}

impl LoadedSpecies {
    fn dataset(&self) -> CalResult<SpeciesDataset> {
        let source: Box<dyn crate::spectra::LineIntensitySource> = match &self.theoretical {
            LoadedTheoretical::Fixed(table) => Box::new(FixedTableSource::new(table.clone())?),
            LoadedTheoretical::Grid(temperatures, tables) => Box::new(
                TemperatureGridSource::new(temperatures.clone(), tables.clone())?,
            ),
        };
        Ok(SpeciesDataset {
            name: self.name.clone(),
            experimental: self.experimental.clone(),
            source,
        })
    }
}

pub fn load_species(base_dir: &Path, config: &SpeciesConfig) -> CalResult<LoadedSpecies> {
    let experimental = read_band_table(&resolve(base_dir, &config.experimental))?;
    let theoretical = match &config.theoretical {
        TheoreticalConfig::Fixed { table } => {
            LoadedTheoretical::Fixed(read_line_table(&resolve(base_dir, table))?)
        }
        TheoreticalConfig::Grid {
            temperatures,
            tables,
        } => {
            let mut nodes = Vec::with_capacity(tables.len());
            for table in tables {
                nodes.push(read_line_table(&resolve(base_dir, table))?);
            }
            LoadedTheoretical::Grid(temperatures.clone(), nodes)
        }
    };
    Ok(LoadedSpecies {
        name: config.name.clone(),
        experimental,
        theoretical,
    })
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn reference_dataset(config: &ReferenceConfig) -> ReferenceDataset {
    ReferenceDataset {
        name: config.name.clone(),
        scale: config.scale,
        records: config
            .records
            .iter()
            .map(|record| ReferenceRecord {
                ratio: record.ratio,
                numerator_position: record.numerator_position,
                denominator_position: record.denominator_position,
                confidence: record.confidence,
            })
            .collect(),
    }
}

/// Instrument axis the correction curve is sampled over: generated
/// inclusive of both ends, or the single column of an axis table.
pub fn load_axis(base_dir: &Path, axis: &AxisConfig) -> CalResult<Vec<f64>> {
    match axis {
        AxisConfig::Linear { start, end, count } => {
            if *count < 2 {
                return Err(CalibrationError::input_validation(
                    "INPUT.AXIS_COUNT",
                    format!("generated axis needs at least 2 samples, got {count}"),
                ));
            }
            let step = (end - start) / ((count - 1) as f64);
            let mut samples = Vec::with_capacity(*count);
            for index in 0..*count {
                samples.push(start + step * (index as f64));
            }
            if let Some(last) = samples.last_mut() {
                *last = *end;
            }
            Ok(samples)
        }
        AxisConfig::Table { table } => {
            let path = resolve(base_dir, table);
            let table = read_numeric_table(&path)?;
            if table.column_count() != 1 {
                return Err(CalibrationError::input_validation(
                    "INPUT.TABLE_SHAPE",
                    format!(
                        "{}: axis table must have exactly 1 column, found {}",
                        path.display(),
                        table.column_count()
                    ),
                ));
            }
            Ok(table.column(0))
        }
    }
}

fn objective_settings(config: &RunConfig) -> ObjectiveSettings {
    let temperature = match config.temperature {
        TemperatureConfig::Fitted { initial } => TemperatureMode::Fitted { initial },
        TemperatureConfig::Fixed { value } => TemperatureMode::Fixed { value },
    };
    ObjectiveSettings {
        norm: config.norm,
        weight_mode: config.weights.mode,
        anti_diagonal_factor: config.weights.anti_diagonal_factor,
        independence: config.independence.map(|independence| {
            crate::independence::IndependenceSettings {
                low_temperature: independence.low_temperature,
                high_temperature: independence.high_temperature,
                tolerance: independence.tolerance,
                up_weight_factor: independence.up_weight_factor,
            }
        }),
        temperature,
    }
}

/// Assemble the residual problem for one configured fit, loading every
/// species table. `run_calibration` shares one load across fits; this
/// entry point is for callers validating a single degree.
pub fn build_problem(
    config: &RunConfig,
    fit: &FitConfig,
    base_dir: &Path,
) -> CalResult<FitProblem> {
    let loaded: Vec<LoadedSpecies> = config
        .species
        .iter()
        .map(|species| load_species(base_dir, species))
        .collect::<CalResult<_>>()?;
    let references = config.references.iter().map(reference_dataset).collect();
    problem_from_loaded(config, fit, &loaded, references)
}

fn problem_from_loaded(
    config: &RunConfig,
    fit: &FitConfig,
    loaded: &[LoadedSpecies],
    references: Vec<ReferenceDataset>,
) -> CalResult<FitProblem> {
    let model = SensitivityModel::new(fit.degree, config.scales, config.spectral_center);
    let datasets = loaded
        .iter()
        .map(LoadedSpecies::dataset)
        .collect::<CalResult<_>>()?;
    FitProblem::new(model, objective_settings(config), datasets, references)
}

/// Outcome of one per-degree fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DegreeFitReport {
    pub degree: PolynomialDegree,
    pub coefficients: Vec<f64>,
    /// Fitted temperature, absent in fixed-temperature runs.
    pub temperature: Option<f64>,
    pub initial_objective: f64,
    pub final_objective: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub converged: bool,
    pub curve_artifact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationReport {
    pub fits: Vec<DegreeFitReport>,
}

impl CalibrationReport {
    /// The converged fit with the lowest final objective, if any converged.
    pub fn best_fit(&self) -> Option<&DegreeFitReport> {
        self.fits
            .iter()
            .filter(|fit| fit.converged)
            .min_by(|left, right| left.final_objective.total_cmp(&right.final_objective))
    }
}

/// Run every configured per-degree fit and emit the correction curves and
/// the JSON fit report under the configured output directory.
pub fn run_calibration(config: &RunConfig, base_dir: &Path) -> CalResult<CalibrationReport> {
    let loaded: Vec<LoadedSpecies> = config
        .species
        .iter()
        .map(|species| load_species(base_dir, species))
        .collect::<CalResult<_>>()?;
    let references: Vec<ReferenceDataset> =
        config.references.iter().map(reference_dataset).collect();
    let settings = objective_settings(config);
    let axis = load_axis(base_dir, &config.axis)?;

    let output_dir = resolve(base_dir, &config.output_dir);
    fs::create_dir_all(&output_dir).map_err(|source| {
        CalibrationError::io_system(
            "IO.OUTPUT_DIR",
            format!("failed to create {}: {source}", output_dir.display()),
        )
    })?;

    let mut fits = Vec::with_capacity(config.fits.len());
    for fit in &config.fits {
        let problem = problem_from_loaded(config, fit, &loaded, references.clone())?;

        let initial = problem.initial_parameters(&fit.initial_coefficients)?;
        let initial_objective = problem.objective(&initial)?;
        let options = NelderMeadOptions {
            x_tolerance: config.optimizer.x_tolerance,
            f_tolerance: config.optimizer.f_tolerance,
            // each degree may carry its own cap
            max_iterations: fit.max_iterations.or(config.optimizer.max_iterations),
        };
        let outcome = minimize(|parameters| problem.objective(parameters), &initial, &options)?;

        let (temperature, coefficients) = match settings.temperature {
            TemperatureMode::Fitted { .. } => {
                (Some(outcome.parameters[0]), outcome.parameters[1..].to_vec())
            }
            TemperatureMode::Fixed { .. } => (None, outcome.parameters.clone()),
        };

        let curve = CorrectionCurve::from_fit(problem.model(), &axis, &coefficients)?;
        curve.write(&output_dir.join(curve.artifact_name()))?;

        fits.push(DegreeFitReport {
            degree: fit.degree,
            coefficients,
            temperature,
            initial_objective,
            final_objective: outcome.objective,
            iterations: outcome.iterations,
            evaluations: outcome.evaluations,
            converged: outcome.converged,
            curve_artifact: curve.artifact_name(),
        });
    }

    let report = CalibrationReport { fits };
    let rendered = serde_json::to_string_pretty(&report).map_err(|source| {
        CalibrationError::internal(
            "SYS.REPORT_SERIALIZE",
            format!("failed to serialize fit report: {source}"),
        )
    })?;
    write_text_artifact(&output_dir.join(FIT_REPORT_NAME), &rendered).map_err(|source| {
        CalibrationError::io_system(
            "IO.REPORT_WRITE",
            format!("failed to write fit report: {source}"),
        )
    })?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::{load_axis, run_calibration, FIT_REPORT_NAME};
    use crate::config::{load_run_config, AxisConfig};
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn write_fixture(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).expect("fixture written");
    }

    #[test]
    fn generated_axis_is_inclusive_of_both_ends() {
        let axis = AxisConfig::Linear {
            start: 200.0,
            end: 4000.0,
            count: 20,
        };
        let samples = load_axis(Path::new("."), &axis).expect("samples");
        assert_eq!(samples.len(), 20);
        assert_eq!(samples[0], 200.0);
        assert_eq!(samples[19], 4000.0);
        assert!(samples.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn single_sample_axis_is_rejected() {
        let axis = AxisConfig::Linear {
            start: 200.0,
            end: 4000.0,
            count: 1,
        };
        let error = load_axis(Path::new("."), &axis).expect_err("degenerate axis");
        assert_eq!(error.code(), "INPUT.AXIS_COUNT");
    }

    #[test]
    fn axis_table_is_read_as_a_single_column() {
        let temp = TempDir::new().expect("tempdir");
        write_fixture(temp.path(), "axis.txt", "# wavenumber\n200.0\n210.0\n220.0\n");
        let axis = AxisConfig::Table {
            table: PathBuf::from("axis.txt"),
        };
        let samples = load_axis(temp.path(), &axis).expect("samples");
        assert_eq!(samples, vec![200.0, 210.0, 220.0]);

        write_fixture(temp.path(), "wide.txt", "200.0 1.0\n");
        let wide = AxisConfig::Table {
            table: PathBuf::from("wide.txt"),
        };
        let error = load_axis(temp.path(), &wide).expect_err("wide axis");
        assert_eq!(error.code(), "INPUT.TABLE_SHAPE");
    }

    #[test]
    fn flat_response_run_recovers_near_zero_coefficients() {
        let temp = TempDir::new().expect("tempdir");
        // experimental areas equal theoretical intensities, so the true
        // correction is the constant 1 and c1 must come out ~0
        write_fixture(temp.path(), "areas.txt", "1.0 0.01\n2.0 0.02\n3.0 0.03\n4.0 0.04\n");
        write_fixture(
            temp.path(),
            "lines.txt",
            "300.0 1.0\n500.0 2.0\n700.0 3.0\n900.0 4.0\n",
        );
        write_fixture(
            temp.path(),
            "run.json",
            r#"{
                "temperature": { "mode": "fixed", "value": 298.0 },
                "fits": [ { "degree": "linear", "initialCoefficients": [-0.5] } ],
                "species": [
                    {
                        "name": "H2",
                        "experimental": "areas.txt",
                        "theoretical": { "fixed": { "table": "lines.txt" } }
                    }
                ],
                "axis": { "start": 200.0, "end": 1000.0, "count": 5 },
                "outputDir": "out"
            }"#,
        );

        let config = load_run_config(temp.path().join("run.json")).expect("config");
        let report = run_calibration(&config, temp.path()).expect("report");

        assert_eq!(report.fits.len(), 1);
        let fit = &report.fits[0];
        assert!(fit.converged);
        assert!(fit.initial_objective > fit.final_objective);
        assert!(
            fit.coefficients[0].abs() < 1.0e-3,
            "c1 was {}",
            fit.coefficients[0]
        );
        assert_eq!(fit.temperature, None);
        assert!(fit.final_objective < 1.0e-8);
        assert_eq!(report.best_fit().expect("best").degree, fit.degree);

        let curve = fs::read_to_string(temp.path().join("out/corrn_curve_1.txt"))
            .expect("curve artifact");
        assert!(curve.starts_with("corrn_curve_1\n"));
        assert_eq!(curve.lines().count(), 6);

        let rendered =
            fs::read_to_string(temp.path().join("out").join(FIT_REPORT_NAME)).expect("report");
        assert!(rendered.contains("\"degree\": \"linear\""));
        assert!(rendered.contains("\"converged\": true"));
    }

    #[test]
    fn per_fit_iteration_cap_overrides_the_optimizer_default() {
        let temp = TempDir::new().expect("tempdir");
        write_fixture(temp.path(), "areas.txt", "1.0 0.01\n2.0 0.02\n3.0 0.03\n4.0 0.04\n");
        write_fixture(
            temp.path(),
            "lines.txt",
            "300.0 1.0\n500.0 2.0\n700.0 3.0\n900.0 4.0\n",
        );
        // same degree and seed twice; only the first carries a tiny cap
        write_fixture(
            temp.path(),
            "run.json",
            r#"{
                "temperature": { "mode": "fixed", "value": 298.0 },
                "fits": [
                    { "degree": "linear", "initialCoefficients": [-0.5], "maxIterations": 2 },
                    { "degree": "linear", "initialCoefficients": [-0.5] }
                ],
                "species": [
                    {
                        "name": "H2",
                        "experimental": "areas.txt",
                        "theoretical": { "fixed": { "table": "lines.txt" } }
                    }
                ],
                "axis": { "start": 200.0, "end": 1000.0, "count": 5 },
                "outputDir": "out"
            }"#,
        );

        let config = load_run_config(temp.path().join("run.json")).expect("config");
        let report = run_calibration(&config, temp.path()).expect("report");

        let capped = &report.fits[0];
        assert!(!capped.converged);
        assert!(capped.iterations <= 2);
        let uncapped = &report.fits[1];
        assert!(uncapped.converged);
        assert!(uncapped.iterations > capped.iterations);
    }

    #[test]
    fn missing_species_table_aborts_the_run() {
        let temp = TempDir::new().expect("tempdir");
        write_fixture(
            temp.path(),
            "run.json",
            r#"{
                "temperature": { "mode": "fixed", "value": 298.0 },
                "fits": [ { "degree": "linear", "initialCoefficients": [0.0] } ],
                "species": [
                    {
                        "name": "H2",
                        "experimental": "absent.txt",
                        "theoretical": { "fixed": { "table": "lines.txt" } }
                    }
                ],
                "axis": { "start": 200.0, "end": 1000.0, "count": 5 },
                "outputDir": "out"
            }"#,
        );
        let config = load_run_config(temp.path().join("run.json")).expect("config");
        let error = run_calibration(&config, temp.path()).expect_err("missing table");
        assert_eq!(error.code(), "IO.TABLE_READ");
    }
}
