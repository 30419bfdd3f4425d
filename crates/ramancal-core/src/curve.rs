use std::path::Path;

use crate::domain::{CalResult, CalibrationError};
use crate::model::{PolynomialDegree, SensitivityModel};
use crate::support::serialization::write_text_artifact;

/// Decimal places in emitted curve samples.
const CURVE_PRECISION: usize = 8;

/// Fitted correction curve sampled over the instrument wavenumber axis,
/// ready to be written as a plain text column.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionCurve {
    degree: PolynomialDegree,
    samples: Vec<f64>,
}

impl CorrectionCurve {
    pub fn from_fit(
        model: &SensitivityModel,
        axis: &[f64],
        coefficients: &[f64],
    ) -> CalResult<Self> {
        if axis.is_empty() {
            return Err(CalibrationError::input_validation(
                "INPUT.CURVE_AXIS",
                "correction-curve axis is empty",
            ));
        }
        for (index, &position) in axis.iter().enumerate() {
            if !position.is_finite() {
                return Err(CalibrationError::input_validation(
                    "INPUT.CURVE_AXIS",
                    format!("axis sample {index} is not finite: {position}"),
                ));
            }
        }
        let samples = model.correction_curve(axis, coefficients).map_err(|source| {
            CalibrationError::computation("RUN.CURVE_SAMPLE", source.to_string())
        })?;
        Ok(Self {
            degree: model.degree(),
            samples,
        })
    }

    pub fn degree(&self) -> PolynomialDegree {
        self.degree
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// File stem the curve is emitted under, keyed by polynomial degree.
    pub fn artifact_name(&self) -> String {
        format!("corrn_curve_{}.txt", self.degree.coefficient_count())
    }

    /// Header line plus one fixed-precision sample per axis point.
    pub fn render(&self) -> String {
        let mut content =
            String::with_capacity((self.samples.len() + 1) * (CURVE_PRECISION + 6));
        content.push_str(&format!(
            "corrn_curve_{}\n",
            self.degree.coefficient_count()
        ));
        for sample in &self.samples {
            content.push_str(&format!("{sample:.precision$}\n", precision = CURVE_PRECISION));
        }
        content
    }

    pub fn write(&self, path: &Path) -> CalResult<()> {
        write_text_artifact(path, &self.render()).map_err(|source| {
            CalibrationError::io_system(
                "IO.CURVE_WRITE",
                format!("failed to write {}: {source}", path.display()),
            )
        })
    }
}
