use super::CliError;
use anyhow::Context;
use ramancal_core::config::{load_run_config, RunConfig, RunConfigError};
use ramancal_core::domain::CalibrationError;
use ramancal_core::driver::{build_problem, load_species, run_calibration, CalibrationReport};
use std::io::Write;
use std::path::Path;
use tracing::info;

pub(super) fn run_fit_command(config_path: &Path, base_dir: &Path) -> Result<i32, CliError> {
    let config = load_config(config_path)?;
    info!(
        fits = config.fits.len(),
        species = config.species.len(),
        "starting calibration run"
    );
    let report = run_calibration(&config, base_dir).map_err(CliError::Compute)?;
    for fit in &report.fits {
        info!(
            degree = %fit.degree,
            converged = fit.converged,
            iterations = fit.iterations,
            objective = fit.final_objective,
            "fit finished"
        );
    }
    std::io::stdout()
        .write_all(render_human_summary(&report).as_bytes())
        .context("writing fit summary")?;
    let all_converged = report.fits.iter().all(|fit| fit.converged);
    Ok(if all_converged { 0 } else { 1 })
}

pub(super) fn run_validate_command(config_path: &Path, base_dir: &Path) -> Result<i32, CliError> {
    let config = load_config(config_path)?;
    for species in &config.species {
        load_species(base_dir, species).map_err(CliError::Compute)?;
        info!(name = %species.name, "species tables load cleanly");
    }
    // run the per-degree pre-flight checks without optimizing anything
    for fit in &config.fits {
        let problem = build_problem(&config, fit, base_dir).map_err(CliError::Compute)?;
        let initial = problem
            .initial_parameters(&fit.initial_coefficients)
            .map_err(CliError::Compute)?;
        let objective = problem.objective(&initial).map_err(CliError::Compute)?;
        info!(degree = %fit.degree, objective, "initial objective evaluates");
    }
    println!(
        "run config OK: {} fit(s), {} species, {} reference dataset(s)",
        config.fits.len(),
        config.species.len(),
        config.references.len()
    );
    Ok(0)
}

fn load_config(config_path: &Path) -> Result<RunConfig, CliError> {
    load_run_config(config_path).map_err(|error| {
        let diagnostic = match &error {
            RunConfigError::Read { .. } => {
                CalibrationError::io_system("IO.RUN_CONFIG", error.to_string())
            }
            RunConfigError::Parse { .. } | RunConfigError::Invalid { .. } => {
                CalibrationError::input_validation("INPUT.RUN_CONFIG", error.to_string())
            }
        };
        CliError::Compute(diagnostic)
    })
}

pub(super) fn render_human_summary(report: &CalibrationReport) -> String {
    let mut summary = String::new();
    summary.push_str("degree      T[K]      objective        iters  status\n");
    for fit in &report.fits {
        let temperature = match fit.temperature {
            Some(value) => format!("{value:9.2}"),
            None => format!("{:>9}", "fixed"),
        };
        summary.push_str(&format!(
            "{:<10}{}  {:14.6e}  {:>6}  {}\n",
            fit.degree.to_string(),
            temperature,
            fit.final_objective,
            fit.iterations,
            if fit.converged { "converged" } else { "max-iter" }
        ));
    }
    if let Some(best) = report.best_fit() {
        summary.push_str(&format!(
            "best fit: {} (objective {:.6e}, {})\n",
            best.degree, best.final_objective, best.curve_artifact
        ));
    }
    summary
}
