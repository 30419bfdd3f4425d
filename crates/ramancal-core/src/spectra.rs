use crate::domain::{CalResult, CalibrationError, LineTable, SpectralLine};

/// External collaborator producing the theoretical line table for a trial
/// temperature. Implementations must return the same physical lines in the
/// same order for every temperature, so index-aligned comparison with the
/// experimental table stays valid.
pub trait LineIntensitySource {
    /// Number of lines every produced table will have.
    fn line_count(&self) -> usize;

    /// Theoretical band table at the given temperature (kelvin).
    fn line_table(&self, temperature: f64) -> CalResult<LineTable>;
}

/// Temperature-invariant source backed by a single precomputed table.
/// Used for fixed-temperature calibration runs, where the theoretical
/// intensities were computed once at the measurement temperature.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedTableSource {
    table: LineTable,
}

impl FixedTableSource {
    pub fn new(table: LineTable) -> CalResult<Self> {
        if table.is_empty() {
            return Err(CalibrationError::input_validation(
                "INPUT.LINE_TABLE_EMPTY",
                "fixed theoretical table has no lines",
            ));
        }
        Ok(Self { table })
    }
}

impl LineIntensitySource for FixedTableSource {
    fn line_count(&self) -> usize {
        self.table.len()
    }

    fn line_table(&self, _temperature: f64) -> CalResult<LineTable> {
        Ok(self.table.clone())
    }
}

/// Source interpolating per-line intensities between tables precomputed at
/// a grid of temperatures. Positions are taken from the first node (they do
/// not move with temperature); intensities are interpolated linearly in T
/// and clamped to the grid ends.
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureGridSource {
    temperatures: Vec<f64>,
    nodes: Vec<LineTable>,
}

impl TemperatureGridSource {
    pub fn new(temperatures: Vec<f64>, nodes: Vec<LineTable>) -> CalResult<Self> {
        if temperatures.len() != nodes.len() {
            return Err(CalibrationError::input_validation(
                "INPUT.GRID_SHAPE",
                format!(
                    "temperature grid has {} nodes but {} tables",
                    temperatures.len(),
                    nodes.len()
                ),
            ));
        }
        if temperatures.len() < 2 {
            return Err(CalibrationError::input_validation(
                "INPUT.GRID_SHAPE",
                "temperature grid needs at least 2 nodes",
            ));
        }
        if !temperatures.windows(2).all(|pair| pair[0] < pair[1]) {
            return Err(CalibrationError::input_validation(
                "INPUT.GRID_ORDER",
                "temperature grid must be strictly increasing",
            ));
        }

        let line_count = nodes[0].len();
        if line_count == 0 {
            return Err(CalibrationError::input_validation(
                "INPUT.LINE_TABLE_EMPTY",
                "temperature grid tables have no lines",
            ));
        }
        for (index, node) in nodes.iter().enumerate() {
            if node.len() != line_count {
                return Err(CalibrationError::input_validation(
                    "INPUT.GRID_ALIGNMENT",
                    format!(
                        "grid node {} has {} lines, expected {}",
                        index,
                        node.len(),
                        line_count
                    ),
                ));
            }
        }

        Ok(Self {
            temperatures,
            nodes,
        })
    }
}

impl LineIntensitySource for TemperatureGridSource {
    fn line_count(&self) -> usize {
        self.nodes[0].len()
    }

    fn line_table(&self, temperature: f64) -> CalResult<LineTable> {
        if !temperature.is_finite() {
            return Err(CalibrationError::computation(
                "RUN.TRIAL_TEMPERATURE",
                format!("trial temperature is not finite: {temperature}"),
            ));
        }

        let last = self.temperatures.len() - 1;
        let (lower, upper, fraction) = if temperature <= self.temperatures[0] {
            (0, 0, 0.0)
        } else if temperature >= self.temperatures[last] {
            (last, last, 0.0)
        } else {
            let upper = self
                .temperatures
                .windows(2)
                .position(|pair| temperature <= pair[1])
                .map(|index| index + 1)
                .unwrap_or(last);
            let lower = upper - 1;
            let span = self.temperatures[upper] - self.temperatures[lower];
            (lower, upper, (temperature - self.temperatures[lower]) / span)
        };

        let lines = self.nodes[lower]
            .lines
            .iter()
            .zip(self.nodes[upper].lines.iter())
            .map(|(low, high)| {
                let intensity = low.intensity + fraction * (high.intensity - low.intensity);
                SpectralLine::new(low.position, intensity)
            })
            .collect();
        Ok(LineTable::new(lines))
    }
}
