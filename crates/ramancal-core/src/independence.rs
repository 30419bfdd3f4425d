use crate::domain::{CalResult, CalibrationError};
use crate::matrices::{mask_upper, ratio_matrix};
use crate::spectra::LineIntensitySource;

pub const DEFAULT_LOW_TEMPERATURE: f64 = 298.0;
pub const DEFAULT_HIGH_TEMPERATURE: f64 = 1000.0;
pub const DEFAULT_TOLERANCE: f64 = 1.0e-10;
pub const DEFAULT_UP_WEIGHT_FACTOR: f64 = 5.0;

/// Reference temperatures and tolerance for the independence test, plus
/// the factor applied to residuals at independent pairs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndependenceSettings {
    pub low_temperature: f64,
    pub high_temperature: f64,
    pub tolerance: f64,
    pub up_weight_factor: f64,
}

impl Default for IndependenceSettings {
    fn default() -> Self {
        Self {
            low_temperature: DEFAULT_LOW_TEMPERATURE,
            high_temperature: DEFAULT_HIGH_TEMPERATURE,
            tolerance: DEFAULT_TOLERANCE,
            up_weight_factor: DEFAULT_UP_WEIGHT_FACTOR,
        }
    }
}

/// Strict-lower-triangle index pairs whose theoretical intensity ratio does
/// not move between the two reference temperatures. Residuals at these
/// pairs reflect instrument response rather than temperature mismatch, so
/// the objective up-weights them.
pub fn temperature_independent_pairs(
    source: &dyn LineIntensitySource,
    settings: &IndependenceSettings,
) -> CalResult<Vec<(usize, usize)>> {
    let low = source.line_table(settings.low_temperature)?;
    let high = source.line_table(settings.high_temperature)?;
    if low.len() != high.len() {
        return Err(CalibrationError::computation(
            "RUN.SOURCE_ALIGNMENT",
            format!(
                "line source returned {} lines at {} K but {} lines at {} K",
                low.len(),
                settings.low_temperature,
                high.len(),
                settings.high_temperature
            ),
        ));
    }

    let ratio_low = ratio_matrix(&low.intensities()).map_err(|source| {
        CalibrationError::computation("RUN.INDEPENDENCE_RATIO", source.to_string())
    })?;
    let ratio_high = ratio_matrix(&high.intensities()).map_err(|source| {
        CalibrationError::computation("RUN.INDEPENDENCE_RATIO", source.to_string())
    })?;

    let low_masked = mask_upper(&ratio_low);
    let high_masked = mask_upper(&ratio_high);

    let mut pairs = Vec::new();
    for i in 0..low_masked.nrows() {
        for j in 0..i {
            if (low_masked[(i, j)] - high_masked[(i, j)]).abs() < settings.tolerance {
                pairs.push((i, j));
            }
        }
    }
    Ok(pairs)
}
