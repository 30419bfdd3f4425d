use std::fs;
use std::path::Path;

use crate::domain::{
    BandRecord, BandTable, CalResult, CalibrationError, LineTable, SpectralLine,
};

/// Whitespace-delimited numeric table, as produced by the band-fitting
/// tools upstream of the calibration. Lines starting with `#` and blank
/// lines are skipped; every remaining row must have the same column count.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NumericTable {
    pub rows: Vec<Vec<f64>>,
}

impl NumericTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    pub fn column(&self, index: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row[index]).collect()
    }
}

pub fn read_numeric_table(path: &Path) -> CalResult<NumericTable> {
    let content = fs::read_to_string(path).map_err(|source| {
        CalibrationError::io_system(
            "IO.TABLE_READ",
            format!("failed to read {}: {source}", path.display()),
        )
    })?;
    parse_numeric_table(&content, path)
}

fn parse_numeric_table(content: &str, path: &Path) -> CalResult<NumericTable> {
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (line_number, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut row = Vec::new();
        for field in trimmed.split_whitespace() {
            let value: f64 = field.parse().map_err(|_| {
                CalibrationError::input_validation(
                    "INPUT.TABLE_PARSE",
                    format!(
                        "{}:{}: '{}' is not a number",
                        path.display(),
                        line_number + 1,
                        field
                    ),
                )
            })?;
            row.push(value);
        }
        if let Some(first) = rows.first() {
            if row.len() != first.len() {
                return Err(CalibrationError::input_validation(
                    "INPUT.TABLE_SHAPE",
                    format!(
                        "{}:{}: row has {} columns, expected {}",
                        path.display(),
                        line_number + 1,
                        row.len(),
                        first.len()
                    ),
                ));
            }
        }
        rows.push(row);
    }
    if rows.is_empty() {
        return Err(CalibrationError::input_validation(
            "INPUT.TABLE_EMPTY",
            format!("{} contains no data rows", path.display()),
        ));
    }
    Ok(NumericTable { rows })
}

/// Experimental band table: column 0 is the band area, column 1 its
/// absolute uncertainty. A single-column file gets zero uncertainties.
pub fn read_band_table(path: &Path) -> CalResult<BandTable> {
    let table = read_numeric_table(path)?;
    if table.column_count() > 2 {
        return Err(CalibrationError::input_validation(
            "INPUT.TABLE_SHAPE",
            format!(
                "{}: expected 1 or 2 columns (area, uncertainty), found {}",
                path.display(),
                table.column_count()
            ),
        ));
    }
    let records = table
        .rows
        .iter()
        .map(|row| BandRecord::new(row[0], row.get(1).copied().unwrap_or(0.0)))
        .collect();
    Ok(BandTable::new(records))
}

/// Theoretical line table: column 0 is the band position (wavenumber),
/// column 1 the relative intensity.
pub fn read_line_table(path: &Path) -> CalResult<LineTable> {
    let table = read_numeric_table(path)?;
    if table.column_count() != 2 {
        return Err(CalibrationError::input_validation(
            "INPUT.TABLE_SHAPE",
            format!(
                "{}: expected 2 columns (position, intensity), found {}",
                path.display(),
                table.column_count()
            ),
        ));
    }
    let lines = table
        .rows
        .iter()
        .map(|row| SpectralLine::new(row[0], row[1]))
        .collect();
    Ok(LineTable::new(lines))
}
