use crate::domain::{CalResult, CalibrationError};

pub const DEFAULT_X_TOLERANCE: f64 = 1.0e-9;
pub const DEFAULT_F_TOLERANCE: f64 = 1.0e-9;

/// Iterations granted per parameter when no explicit cap is configured.
const DEFAULT_ITERATIONS_PER_PARAMETER: usize = 200;

/// Initial simplex displacement, relative for non-zero components and
/// absolute for zero components.
const NONZERO_DISPLACEMENT: f64 = 0.05;
const ZERO_DISPLACEMENT: f64 = 0.00025;

/// Standard simplex move coefficients.
const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptimizerOptionsError {
    #[error("tolerance '{field}' must be finite and > 0, got {value}")]
    InvalidTolerance { field: &'static str, value: f64 },
    #[error("iteration cap must be > 0")]
    ZeroIterationCap,
}

/// Nelder–Mead termination settings: absolute tolerance on vertex spread
/// and on objective spread, plus an iteration cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NelderMeadOptions {
    pub x_tolerance: f64,
    pub f_tolerance: f64,
    pub max_iterations: Option<usize>,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self {
            x_tolerance: DEFAULT_X_TOLERANCE,
            f_tolerance: DEFAULT_F_TOLERANCE,
            max_iterations: None,
        }
    }
}

impl NelderMeadOptions {
    pub fn validate(&self) -> Result<(), OptimizerOptionsError> {
        for (field, value) in [
            ("x_tolerance", self.x_tolerance),
            ("f_tolerance", self.f_tolerance),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(OptimizerOptionsError::InvalidTolerance { field, value });
            }
        }
        if self.max_iterations == Some(0) {
            return Err(OptimizerOptionsError::ZeroIterationCap);
        }
        Ok(())
    }

    fn iteration_cap(&self, dimension: usize) -> usize {
        self.max_iterations
            .unwrap_or(DEFAULT_ITERATIONS_PER_PARAMETER * dimension)
    }
}

/// Result of one simplex search. Hitting the iteration cap is reported via
/// `converged`, not as an error: the best point found is still returned and
/// callers may re-seed and rerun.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationOutcome {
    pub parameters: Vec<f64>,
    pub objective: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub converged: bool,
}

/// Derivative-free simplex minimization of `objective` from `initial`.
///
/// Termination matches the tight absolute-tolerance convention of the
/// calibration runs: the simplex must collapse below `x_tolerance` in
/// every coordinate and below `f_tolerance` in objective spread.
pub fn minimize<F>(
    mut objective: F,
    initial: &[f64],
    options: &NelderMeadOptions,
) -> CalResult<OptimizationOutcome>
where
    F: FnMut(&[f64]) -> CalResult<f64>,
{
    options.validate().map_err(|source| {
        CalibrationError::input_validation("INPUT.OPTIMIZER_OPTIONS", source.to_string())
    })?;
    let dimension = initial.len();
    if dimension == 0 {
        return Err(CalibrationError::input_validation(
            "INPUT.OPTIMIZER_GUESS",
            "initial parameter vector is empty",
        ));
    }
    for (index, value) in initial.iter().copied().enumerate() {
        if !value.is_finite() {
            return Err(CalibrationError::input_validation(
                "INPUT.OPTIMIZER_GUESS",
                format!("initial parameter {index} is not finite: {value}"),
            ));
        }
    }

    let mut evaluations = 0;
    let mut evaluate = |point: &[f64], evaluations: &mut usize| -> CalResult<f64> {
        *evaluations += 1;
        let value = objective(point)?;
        if value.is_nan() {
            return Err(CalibrationError::computation(
                "RUN.OBJECTIVE_NAN",
                "objective evaluated to NaN",
            ));
        }
        Ok(value)
    };

    // initial simplex: the guess plus one displaced vertex per coordinate
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(dimension + 1);
    simplex.push(initial.to_vec());
    for axis in 0..dimension {
        let mut vertex = initial.to_vec();
        if vertex[axis] != 0.0 {
            vertex[axis] *= 1.0 + NONZERO_DISPLACEMENT;
        } else {
            vertex[axis] = ZERO_DISPLACEMENT;
        }
        simplex.push(vertex);
    }

    let mut values = Vec::with_capacity(dimension + 1);
    for vertex in &simplex {
        values.push(evaluate(vertex, &mut evaluations)?);
    }

    let cap = options.iteration_cap(dimension);
    let mut iterations = 0;
    let mut converged = false;

    while iterations < cap {
        sort_simplex(&mut simplex, &mut values);

        if simplex_converged(&simplex, &values, options) {
            converged = true;
            break;
        }
        iterations += 1;

        let centroid = centroid_of_best(&simplex);
        let worst = dimension;

        let reflected = blend(&centroid, &simplex[worst], 1.0 + REFLECTION, -REFLECTION);
        let reflected_value = evaluate(&reflected, &mut evaluations)?;

        if reflected_value < values[0] {
            let expanded = blend(&centroid, &simplex[worst], 1.0 + EXPANSION, -EXPANSION);
            let expanded_value = evaluate(&expanded, &mut evaluations)?;
            if expanded_value < reflected_value {
                simplex[worst] = expanded;
                values[worst] = expanded_value;
            } else {
                simplex[worst] = reflected;
                values[worst] = reflected_value;
            }
            continue;
        }

        if reflected_value < values[worst - 1] {
            simplex[worst] = reflected;
            values[worst] = reflected_value;
            continue;
        }

        // contraction, outside or inside of the worst vertex
        let (contracted, against) = if reflected_value < values[worst] {
            (
                blend(
                    &centroid,
                    &simplex[worst],
                    1.0 + CONTRACTION * REFLECTION,
                    -CONTRACTION * REFLECTION,
                ),
                reflected_value,
            )
        } else {
            (
                blend(&centroid, &simplex[worst], 1.0 - CONTRACTION, CONTRACTION),
                values[worst],
            )
        };
        let contracted_value = evaluate(&contracted, &mut evaluations)?;
        if contracted_value < against {
            simplex[worst] = contracted;
            values[worst] = contracted_value;
            continue;
        }

        // shrink everything toward the best vertex
        let best = simplex[0].clone();
        for vertex_index in 1..=dimension {
            let shrunk = blend(&best, &simplex[vertex_index], 1.0 - SHRINK, SHRINK);
            values[vertex_index] = evaluate(&shrunk, &mut evaluations)?;
            simplex[vertex_index] = shrunk;
        }
    }

    sort_simplex(&mut simplex, &mut values);
    Ok(OptimizationOutcome {
        parameters: simplex.swap_remove(0),
        objective: values[0],
        iterations,
        evaluations,
        converged,
    })
}

fn sort_simplex(simplex: &mut [Vec<f64>], values: &mut [f64]) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&left, &right| values[left].total_cmp(&values[right]));

    let sorted_simplex: Vec<Vec<f64>> = order.iter().map(|&index| simplex[index].clone()).collect();
    let sorted_values: Vec<f64> = order.iter().map(|&index| values[index]).collect();
    for (slot, vertex) in sorted_simplex.into_iter().enumerate() {
        simplex[slot] = vertex;
    }
    values.copy_from_slice(&sorted_values);
}

fn centroid_of_best(simplex: &[Vec<f64>]) -> Vec<f64> {
    let dimension = simplex.len() - 1;
    let mut centroid = vec![0.0; dimension];
    for vertex in &simplex[..dimension] {
        for (total, &component) in centroid.iter_mut().zip(vertex) {
            *total += component;
        }
    }
    for total in &mut centroid {
        *total /= dimension as f64;
    }
    centroid
}

fn blend(first: &[f64], second: &[f64], first_weight: f64, second_weight: f64) -> Vec<f64> {
    first
        .iter()
        .zip(second)
        .map(|(&a, &b)| first_weight * a + second_weight * b)
        .collect()
}

fn simplex_converged(simplex: &[Vec<f64>], values: &[f64], options: &NelderMeadOptions) -> bool {
    let best = &simplex[0];
    let x_spread = simplex[1..]
        .iter()
        .flat_map(|vertex| {
            vertex
                .iter()
                .zip(best)
                .map(|(&component, &reference)| (component - reference).abs())
        })
        .fold(0.0_f64, f64::max);
    let f_spread = values[1..]
        .iter()
        .map(|&value| (value - values[0]).abs())
        .fold(0.0_f64, f64::max);

    x_spread <= options.x_tolerance && f_spread <= options.f_tolerance
}
