use faer::Mat;

use crate::domain::{
    BandTable, CalResult, CalibrationError, ReferenceDataset, ResidualNorm, WeightMode,
};
use crate::independence::{temperature_independent_pairs, IndependenceSettings};
use crate::matrices::{
    elementwise_ratio, mask_upper, ratio_matrix, scale_anti_diagonal, weight_matrix,
};
use crate::model::SensitivityModel;
use crate::spectra::LineIntensitySource;

/// Whether the leading parameter slot is a fitted temperature or the
/// temperature is held constant and only coefficients are searched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemperatureMode {
    Fitted { initial: f64 },
    Fixed { value: f64 },
}

impl TemperatureMode {
    pub const fn fitted_slot(self) -> usize {
        match self {
            Self::Fitted { .. } => 1,
            Self::Fixed { .. } => 0,
        }
    }
}

/// Everything that shapes the scalar cost apart from the model itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveSettings {
    pub norm: ResidualNorm,
    pub weight_mode: WeightMode,
    /// Anti-diagonal weight boost factor; `None` leaves weights untouched.
    pub anti_diagonal_factor: Option<f64>,
    /// Temperature-independence up-weighting; `None` disables the pass.
    pub independence: Option<IndependenceSettings>,
    pub temperature: TemperatureMode,
}

impl ObjectiveSettings {
    pub fn fixed_temperature(value: f64) -> Self {
        Self {
            norm: ResidualNorm::default(),
            weight_mode: WeightMode::default(),
            anti_diagonal_factor: None,
            independence: None,
            temperature: TemperatureMode::Fixed { value },
        }
    }

    pub fn fitted_temperature(initial: f64) -> Self {
        Self {
            temperature: TemperatureMode::Fitted { initial },
            ..Self::fixed_temperature(0.0)
        }
    }
}

/// One tracked species/branch: its measured band areas and the collaborator
/// producing the matching theoretical table per trial temperature.
pub struct SpeciesDataset {
    pub name: String,
    pub experimental: BandTable,
    pub source: Box<dyn LineIntensitySource>,
}

struct PreparedSpecies {
    name: String,
    source: Box<dyn LineIntensitySource>,
    /// Masked experimental pairwise ratio matrix; fixed across evaluations.
    experimental_ratio: Mat<f64>,
    weights: Mat<f64>,
    independent_pairs: Vec<(usize, usize)>,
}

/// The pairwise-ratio residual problem for one polynomial degree. Holds all
/// per-species matrices that do not depend on the trial parameters, so each
/// objective evaluation rebuilds only what the trial temperature changes.
pub struct FitProblem {
    model: SensitivityModel,
    settings: ObjectiveSettings,
    species: Vec<PreparedSpecies>,
    references: Vec<ReferenceDataset>,
}

impl FitProblem {
    /// Pre-flight validation and preparation. Dimension mismatches and
    /// non-positive band areas abort here, before any optimization starts.
    pub fn new(
        model: SensitivityModel,
        settings: ObjectiveSettings,
        species: Vec<SpeciesDataset>,
        references: Vec<ReferenceDataset>,
    ) -> CalResult<Self> {
        if species.is_empty() {
            return Err(CalibrationError::input_validation(
                "INPUT.NO_SPECIES",
                "at least one species dataset is required",
            ));
        }

        let mut prepared = Vec::with_capacity(species.len());
        for dataset in species {
            prepared.push(prepare_species(dataset, &settings)?);
        }

        for reference in &references {
            for (index, record) in reference.records.iter().enumerate() {
                if !record.ratio.is_finite() || record.ratio <= 0.0 {
                    return Err(CalibrationError::input_validation(
                        "INPUT.REFERENCE_RATIO",
                        format!(
                            "reference '{}' record {} has non-positive ratio {}",
                            reference.name, index, record.ratio
                        ),
                    ));
                }
            }
        }

        Ok(Self {
            model,
            settings,
            species: prepared,
            references,
        })
    }

    pub fn model(&self) -> &SensitivityModel {
        &self.model
    }

    pub fn settings(&self) -> &ObjectiveSettings {
        &self.settings
    }

    /// Length of the parameter vector this problem expects.
    pub fn parameter_count(&self) -> usize {
        self.settings.temperature.fitted_slot() + self.model.degree().coefficient_count()
    }

    /// Assemble the full parameter vector from per-degree initial
    /// coefficients, prepending the initial temperature when it is fitted.
    pub fn initial_parameters(&self, coefficients: &[f64]) -> CalResult<Vec<f64>> {
        if coefficients.len() != self.model.degree().coefficient_count() {
            return Err(CalibrationError::input_validation(
                "INPUT.INITIAL_GUESS",
                format!(
                    "{} fit needs {} initial coefficients, got {}",
                    self.model.degree(),
                    self.model.degree().coefficient_count(),
                    coefficients.len()
                ),
            ));
        }
        let mut parameters = Vec::with_capacity(self.parameter_count());
        if let TemperatureMode::Fitted { initial } = self.settings.temperature {
            parameters.push(initial);
        }
        parameters.extend_from_slice(coefficients);
        Ok(parameters)
    }

    /// The scalar cost. Pure and deterministic for a given parameter
    /// vector: every theoretical table is rebuilt from the trial
    /// temperature on every call, by design.
    pub fn objective(&self, parameters: &[f64]) -> CalResult<f64> {
        if parameters.len() != self.parameter_count() {
            return Err(CalibrationError::computation(
                "RUN.PARAMETER_SHAPE",
                format!(
                    "objective expects {} parameters, got {}",
                    self.parameter_count(),
                    parameters.len()
                ),
            ));
        }

        let (temperature, coefficients) = match self.settings.temperature {
            TemperatureMode::Fitted { .. } => (parameters[0], &parameters[1..]),
            TemperatureMode::Fixed { value } => (value, parameters),
        };

        let mut total = 0.0;
        for species in &self.species {
            total += self.species_residual(species, temperature, coefficients)?;
        }
        for reference in &self.references {
            total += self.reference_residual(reference, coefficients)?;
        }
        Ok(total)
    }

    fn species_residual(
        &self,
        species: &PreparedSpecies,
        temperature: f64,
        coefficients: &[f64],
    ) -> CalResult<f64> {
        let theoretical = species.source.line_table(temperature)?;
        let theoretical_ratio = ratio_matrix(&theoretical.intensities()).map_err(|source| {
            CalibrationError::computation(
                "RUN.THEORETICAL_RATIO",
                format!("species '{}': {}", species.name, source),
            )
        })?;
        let theoretical_ratio = mask_upper(&theoretical_ratio);

        let intensity_ratio = elementwise_ratio(&species.experimental_ratio, &theoretical_ratio)
            .map_err(|source| {
                CalibrationError::internal(
                    "SYS.RATIO_SHAPE",
                    format!("species '{}': {}", species.name, source),
                )
            })?;

        let model_ratio = self
            .model
            .ratio_matrix(&theoretical.positions(), coefficients)
            .map_err(|source| {
                CalibrationError::computation(
                    "RUN.MODEL_RATIO",
                    format!("species '{}': {}", species.name, source),
                )
            })?;

        let n = intensity_ratio.nrows();
        let mut residual = Mat::<f64>::zeros(n, n);
        for i in 0..n {
            for j in 0..i {
                residual[(i, j)] = species.weights[(i, j)]
                    * (intensity_ratio[(i, j)] - model_ratio[(i, j)]);
            }
        }

        if let Some(independence) = &self.settings.independence {
            for &(i, j) in &species.independent_pairs {
                residual[(i, j)] *= independence.up_weight_factor;
            }
        }

        let mut sum = 0.0;
        for i in 0..n {
            for j in 0..i {
                let value = residual[(i, j)];
                sum += match self.settings.norm {
                    ResidualNorm::Absolute => value.abs(),
                    ResidualNorm::Squared => value * value,
                };
            }
        }
        Ok(sum)
    }

    /// Reference-gas rows always contribute squared terms, scaled by the
    /// per-record confidence and the per-dataset scale.
    fn reference_residual(
        &self,
        reference: &ReferenceDataset,
        coefficients: &[f64],
    ) -> CalResult<f64> {
        let mut sum = 0.0;
        for record in &reference.records {
            let model_ratio = self
                .model
                .ratio(
                    record.numerator_position,
                    record.denominator_position,
                    coefficients,
                )
                .map_err(|source| {
                    CalibrationError::computation(
                        "RUN.MODEL_RATIO",
                        format!("reference '{}': {}", reference.name, source),
                    )
                })?;
            let deviation = record.ratio - model_ratio;
            sum += record.confidence * reference.scale * deviation * deviation;
        }
        Ok(sum)
    }
}

fn prepare_species(
    dataset: SpeciesDataset,
    settings: &ObjectiveSettings,
) -> CalResult<PreparedSpecies> {
    let SpeciesDataset {
        name,
        experimental,
        source,
    } = dataset;

    if experimental.is_empty() {
        return Err(CalibrationError::input_validation(
            "INPUT.EMPTY_TABLE",
            format!("species '{name}' has an empty experimental table"),
        ));
    }
    if source.line_count() != experimental.len() {
        return Err(CalibrationError::input_validation(
            "INPUT.SPECIES_ALIGNMENT",
            format!(
                "species '{}' has {} experimental lines but {} theoretical lines",
                name,
                experimental.len(),
                source.line_count()
            ),
        ));
    }

    let areas = experimental.band_areas();
    let experimental_ratio = ratio_matrix(&areas).map_err(|error| {
        CalibrationError::input_validation(
            "INPUT.BAND_AREA",
            format!("species '{name}': {error}"),
        )
    })?;
    let experimental_ratio = mask_upper(&experimental_ratio);

    let n = experimental.len();
    let weights = match settings.weight_mode {
        WeightMode::Uniform => Mat::from_fn(n, n, |_, _| 1.0),
        WeightMode::Propagated => {
            let uncertainties: Vec<f64> = experimental
                .records
                .iter()
                .map(|record| record.uncertainty)
                .collect();
            let weights = weight_matrix(&areas, &uncertainties).map_err(|error| {
                CalibrationError::input_validation(
                    "INPUT.BAND_AREA",
                    format!("species '{name}': {error}"),
                )
            })?;
            // an all-zero weight matrix would make every trial score 0 and
            // the fit would "converge" to whatever the seed was
            let all_zero = (0..n).all(|i| (0..i).all(|j| weights[(i, j)] == 0.0));
            if all_zero {
                return Err(CalibrationError::input_validation(
                    "INPUT.ZERO_WEIGHTS",
                    format!(
                        "species '{name}' propagates all-zero weights (every uncertainty is 0); \
                         supply uncertainties or switch to uniform weights"
                    ),
                ));
            }
            weights
        }
    };
    let weights = match settings.anti_diagonal_factor {
        Some(factor) => scale_anti_diagonal(&weights, factor),
        None => weights,
    };

    let independent_pairs = match &settings.independence {
        Some(independence) => temperature_independent_pairs(source.as_ref(), independence)?,
        None => Vec::new(),
    };

    Ok(PreparedSpecies {
        name,
        source,
        experimental_ratio,
        weights,
        independent_pairs,
    })
}
