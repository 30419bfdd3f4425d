pub mod errors;

pub use errors::{CalResult, CalibrationError, CalibrationErrorCategory};

use serde::{Deserialize, Serialize};

/// One measured spectral line: integrated band area and its absolute error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandRecord {
    pub band_area: f64,
    pub uncertainty: f64,
}

impl BandRecord {
    pub fn new(band_area: f64, uncertainty: f64) -> Self {
        Self {
            band_area,
            uncertainty,
        }
    }
}

/// Ordered experimental band-area table for one species/branch. Row order
/// must match the theoretical table's line order exactly.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BandTable {
    pub records: Vec<BandRecord>,
}

impl BandTable {
    pub fn new(records: Vec<BandRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn band_areas(&self) -> Vec<f64> {
        self.records.iter().map(|record| record.band_area).collect()
    }
}

/// One theoretically predicted line: band position (wavenumber) and
/// relative intensity at the temperature the table was built for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralLine {
    pub position: f64,
    pub intensity: f64,
}

impl SpectralLine {
    pub fn new(position: f64, intensity: f64) -> Self {
        Self {
            position,
            intensity,
        }
    }
}

/// Ordered theoretical line table for one species/branch at one temperature.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LineTable {
    pub lines: Vec<SpectralLine>,
}

impl LineTable {
    pub fn new(lines: Vec<SpectralLine>) -> Self {
        Self { lines }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn positions(&self) -> Vec<f64> {
        self.lines.iter().map(|line| line.position).collect()
    }

    pub fn intensities(&self) -> Vec<f64> {
        self.lines.iter().map(|line| line.intensity).collect()
    }
}

/// One auxiliary reference-gas row: a directly measured intensity ratio
/// between two known band positions, with its confidence weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceRecord {
    pub ratio: f64,
    pub numerator_position: f64,
    pub denominator_position: f64,
    pub confidence: f64,
}

/// Auxiliary reference dataset contributing squared residual terms, scaled
/// by a per-dataset confidence factor.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceDataset {
    pub name: String,
    pub scale: f64,
    pub records: Vec<ReferenceRecord>,
}

/// Norm used to aggregate masked residual entries into the scalar cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidualNorm {
    /// Sum of absolute values, robust against a few outlier band pairs.
    #[default]
    Absolute,
    /// Sum of squares.
    Squared,
}

/// Whether pairwise residuals are weighted by propagated uncertainty or
/// left unweighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightMode {
    #[default]
    Propagated,
    Uniform,
}
