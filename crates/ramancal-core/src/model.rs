use faer::Mat;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Per-order scale constants dividing the raw coefficients before use.
/// Physical slopes are far below 1 while the searched coefficients stay
/// O(1), which keeps the simplex search well conditioned.
pub const DEFAULT_COEFFICIENT_SCALES: [f64; 5] = [1.0e4, 1.0e7, 1.0e9, 1.0e12, 1.0e14];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolynomialDegree {
    Linear,
    Quadratic,
    Cubic,
    Quartic,
    Quintic,
}

impl PolynomialDegree {
    pub const ALL: [Self; 5] = [
        Self::Linear,
        Self::Quadratic,
        Self::Cubic,
        Self::Quartic,
        Self::Quintic,
    ];

    /// Number of polynomial coefficients beyond the constant term.
    pub const fn coefficient_count(self) -> usize {
        match self {
            Self::Linear => 1,
            Self::Quadratic => 2,
            Self::Cubic => 3,
            Self::Quartic => 4,
            Self::Quintic => 5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Quadratic => "quadratic",
            Self::Cubic => "cubic",
            Self::Quartic => "quartic",
            Self::Quintic => "quintic",
        }
    }
}

impl Display for PolynomialDegree {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("{degree} model needs {expected} coefficients, got {actual}")]
    CoefficientCountMismatch {
        degree: PolynomialDegree,
        expected: usize,
        actual: usize,
    },
    #[error("model polynomial is non-positive ({value}) at position {position}")]
    NonPositiveResponse { position: f64, value: f64 },
}

/// Polynomial model of the instrument's relative spectral response:
/// `P(v) = 1 + sum_k (c_k / scale_k) * (v - center)^k`, degree 1..5.
///
/// The observable used in fitting is always the ratio `P(v1) / P(v2)`;
/// the absolute curve only appears when the fitted correction is emitted
/// over the instrument axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensitivityModel {
    degree: PolynomialDegree,
    scales: [f64; 5],
    center: f64,
}

impl SensitivityModel {
    pub fn new(degree: PolynomialDegree, scales: [f64; 5], center: Option<f64>) -> Self {
        Self {
            degree,
            scales,
            center: center.unwrap_or(0.0),
        }
    }

    pub fn with_default_scales(degree: PolynomialDegree, center: Option<f64>) -> Self {
        Self::new(degree, DEFAULT_COEFFICIENT_SCALES, center)
    }

    pub fn degree(&self) -> PolynomialDegree {
        self.degree
    }

    pub fn center(&self) -> f64 {
        self.center
    }

    fn check_coefficients(&self, coefficients: &[f64]) -> Result<(), ModelError> {
        let expected = self.degree.coefficient_count();
        if coefficients.len() != expected {
            return Err(ModelError::CoefficientCountMismatch {
                degree: self.degree,
                expected,
                actual: coefficients.len(),
            });
        }
        Ok(())
    }

    /// Evaluate `P(v)` for a degree-consistent coefficient slice.
    pub fn evaluate(&self, position: f64, coefficients: &[f64]) -> Result<f64, ModelError> {
        self.check_coefficients(coefficients)?;
        Ok(self.evaluate_unchecked(position, coefficients))
    }

    fn evaluate_unchecked(&self, position: f64, coefficients: &[f64]) -> f64 {
        let x = position - self.center;
        let mut power = 1.0;
        let mut value = 1.0;
        for (coefficient, scale) in coefficients.iter().zip(self.scales.iter()) {
            power *= x;
            value += coefficient / scale * power;
        }
        value
    }

    /// Sensitivity ratio `P(v1) / P(v2)` for one pair of band positions.
    pub fn ratio(&self, v1: f64, v2: f64, coefficients: &[f64]) -> Result<f64, ModelError> {
        self.check_coefficients(coefficients)?;
        let numerator = self.evaluate_unchecked(v1, coefficients);
        let denominator = self.evaluate_unchecked(v2, coefficients);
        if denominator <= 0.0 {
            return Err(ModelError::NonPositiveResponse {
                position: v2,
                value: denominator,
            });
        }
        Ok(numerator / denominator)
    }

    /// Square matrix of pairwise model ratios over a position column:
    /// `entry(i, j) = P(v_i) / P(v_j)`, matching the intensity-ratio
    /// convention so residuals cancel when the model is exact.
    pub fn ratio_matrix(
        &self,
        positions: &[f64],
        coefficients: &[f64],
    ) -> Result<Mat<f64>, ModelError> {
        self.check_coefficients(coefficients)?;
        let mut responses = Vec::with_capacity(positions.len());
        for &position in positions {
            let value = self.evaluate_unchecked(position, coefficients);
            if value <= 0.0 {
                return Err(ModelError::NonPositiveResponse { position, value });
            }
            responses.push(value);
        }

        let n = responses.len();
        Ok(Mat::from_fn(n, n, |i, j| responses[i] / responses[j]))
    }

    /// Absolute correction curve `P(v)` sampled over the instrument axis.
    pub fn correction_curve(
        &self,
        axis: &[f64],
        coefficients: &[f64],
    ) -> Result<Vec<f64>, ModelError> {
        self.check_coefficients(coefficients)?;
        Ok(axis
            .iter()
            .map(|&position| self.evaluate_unchecked(position, coefficients))
            .collect())
    }
}
