use faer::Mat;

/// Errors raised while building pairwise ratio or weight matrices.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatrixError {
    #[error("ratio matrix requires at least one line, got an empty table")]
    EmptyTable,
    #[error("band intensity must be > 0, record {index} has {value}")]
    NonPositiveIntensity { index: usize, value: f64 },
    #[error("band uncertainty must be >= 0, record {index} has {value}")]
    NegativeUncertainty { index: usize, value: f64 },
    #[error("elementwise division requires equal shapes, got {left}x{left} and {right}x{right}")]
    ShapeMismatch { left: usize, right: usize },
}

/// Square matrix of pairwise ratios: `entry(i, j) = values[i] / values[j]`.
/// Every intensity must be strictly positive for the ratios (and the
/// log-space error propagation built on them) to be defined.
pub fn ratio_matrix(values: &[f64]) -> Result<Mat<f64>, MatrixError> {
    if values.is_empty() {
        return Err(MatrixError::EmptyTable);
    }
    for (index, value) in values.iter().copied().enumerate() {
        if !value.is_finite() || value <= 0.0 {
            return Err(MatrixError::NonPositiveIntensity { index, value });
        }
    }

    let n = values.len();
    Ok(Mat::from_fn(n, n, |i, j| values[i] / values[j]))
}

/// Zero the diagonal and the upper triangle, keeping only the strict lower
/// triangle (`i > j`). Ratio matrices are reciprocal across the diagonal,
/// so the upper half would double-count every physical pair. Idempotent.
pub fn mask_upper(matrix: &Mat<f64>) -> Mat<f64> {
    Mat::from_fn(matrix.nrows(), matrix.ncols(), |i, j| {
        if i > j { matrix[(i, j)] } else { 0.0 }
    })
}

/// First-order error propagation of per-line uncertainty into a pairwise
/// weight: `w(i, j) = (a_i / a_j) * sqrt((s_i/a_i)^2 + (s_j/a_j)^2)`,
/// returned as absolute values.
pub fn weight_matrix(areas: &[f64], uncertainties: &[f64]) -> Result<Mat<f64>, MatrixError> {
    if areas.is_empty() {
        return Err(MatrixError::EmptyTable);
    }
    for (index, area) in areas.iter().copied().enumerate() {
        if !area.is_finite() || area <= 0.0 {
            return Err(MatrixError::NonPositiveIntensity { index, value: area });
        }
    }
    for (index, sigma) in uncertainties.iter().copied().enumerate() {
        if !sigma.is_finite() || sigma < 0.0 {
            return Err(MatrixError::NegativeUncertainty {
                index,
                value: sigma,
            });
        }
    }

    let n = areas.len();
    Ok(Mat::from_fn(n, n, |i, j| {
        let relative_i = uncertainties[i] / areas[i];
        let relative_j = uncertainties[j] / areas[j];
        let ratio = areas[i] / areas[j];
        (ratio * (relative_i * relative_i + relative_j * relative_j).sqrt()).abs()
    }))
}

/// Damping threshold relative to the matrix maximum, and the divisor
/// applied to entries above it.
const DOMINANT_ENTRY_FRACTION: f64 = 0.40;
const DOMINANT_ENTRY_DIVISOR: f64 = 200.0;

/// Up-weight the anti-diagonal (`i + j = n - 1`) by `factor` and damp
/// dominant entries (above 40% of the matrix maximum) by 1/200. Used to
/// de-emphasize ratios between the most widely separated lines while
/// keeping the mid-span pairs influential.
pub fn scale_anti_diagonal(matrix: &Mat<f64>, factor: f64) -> Mat<f64> {
    let n = matrix.nrows();
    let mut max_value = f64::NEG_INFINITY;
    for i in 0..n {
        for j in 0..matrix.ncols() {
            max_value = max_value.max(matrix[(i, j)]);
        }
    }
    let threshold = DOMINANT_ENTRY_FRACTION * max_value;

    Mat::from_fn(n, matrix.ncols(), |i, j| {
        let mut value = matrix[(i, j)];
        if value > threshold {
            value /= DOMINANT_ENTRY_DIVISOR;
        }
        if i + j == n - 1 {
            value *= factor;
        }
        value
    })
}

/// Elementwise `numerator / denominator`. Masked-out entries (0 in both)
/// stay 0 rather than becoming NaN.
pub fn elementwise_ratio(
    numerator: &Mat<f64>,
    denominator: &Mat<f64>,
) -> Result<Mat<f64>, MatrixError> {
    if numerator.nrows() != denominator.nrows() || numerator.ncols() != denominator.ncols() {
        return Err(MatrixError::ShapeMismatch {
            left: numerator.nrows(),
            right: denominator.nrows(),
        });
    }

    Ok(Mat::from_fn(numerator.nrows(), numerator.ncols(), |i, j| {
        let denom = denominator[(i, j)];
        if denom == 0.0 {
            0.0
        } else {
            numerator[(i, j)] / denom
        }
    }))
}
