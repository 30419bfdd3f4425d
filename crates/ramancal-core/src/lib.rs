//! Wavelength-sensitivity calibration for Raman spectrometers.
//!
//! Fits a polynomial model of the instrument's relative spectral response
//! to pairwise band-intensity ratios, comparing measured band areas against
//! theoretical line strengths so that no calibrated reference lamp is
//! needed. The scalar cost is minimized per polynomial degree with a
//! derivative-free simplex search, and each fit emits a correction curve
//! sampled over the instrument axis.

pub mod config;
pub mod curve;
pub mod domain;
pub mod driver;
pub mod independence;
pub mod matrices;
pub mod model;
pub mod objective;
pub mod optimize;
pub mod spectra;
pub mod support;

pub use config::{load_run_config, RunConfig, RunConfigError};
pub use curve::CorrectionCurve;
pub use domain::{
    BandRecord, BandTable, CalResult, CalibrationError, CalibrationErrorCategory, LineTable,
    ReferenceDataset, ReferenceRecord, ResidualNorm, SpectralLine, WeightMode,
};
pub use driver::{build_problem, load_axis, load_species, run_calibration, CalibrationReport, DegreeFitReport};
pub use model::{PolynomialDegree, SensitivityModel, DEFAULT_COEFFICIENT_SCALES};
pub use objective::{FitProblem, ObjectiveSettings, SpeciesDataset, TemperatureMode};
pub use optimize::{minimize, NelderMeadOptions, OptimizationOutcome};
pub use spectra::{FixedTableSource, LineIntensitySource, TemperatureGridSource};
