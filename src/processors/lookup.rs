//! Image-plane to point-cloud lookup tables.
//!
//! A [`LookupTable`] maps each (row, column) of the destaggered image plane
//! (where masks are drawn) to the index of the matching point in the
//! sensor's native, measurement-ordered cloud:
//!
//! ```text
//! index(r, c) = r * W + ((c - pixel_shift_by_row[r]) mod W)
//! ```
//!
//! Pixels whose measurement column lies outside the sensor's column window
//! never carry a return and map to [`NO_POINT`]. Tables depend only on
//! calibration and resolution, so one table can be built per sensor and
//! shared read-only across scans and threads.

use rayon::prelude::*;
use thiserror::Error;

use crate::core::metadata::CalibrationMetadata;
use crate::core::transforms::{make_xyz_lut, staggered_column, XyzLut};

/// Sentinel stored for pixels with no corresponding point.
pub const NO_POINT: u32 = u32::MAX;

/// Default metres per millimetre for the XYZ ray table.
pub const DEFAULT_RANGE_UNIT: f32 = 0.001;

/// Calibration inconsistent with the requested resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("calibration describes {beams} beams but {rows} rows were requested")]
    BeamCountMismatch { beams: usize, rows: usize },

    #[error("calibration has {altitudes} beam altitudes but {azimuths} beam azimuths")]
    AngleTableMismatch { altitudes: usize, azimuths: usize },

    #[error("calibration has {shifts} pixel shifts but {rows} rows were requested")]
    ShiftTableMismatch { shifts: usize, rows: usize },

    #[error("calibration frame has {expected} columns but {columns} were requested")]
    ColumnCountMismatch { expected: usize, columns: usize },

    #[error("column window [{start}, {end}] lies outside a {columns}-column frame")]
    InvalidColumnWindow {
        start: usize,
        end: usize,
        columns: usize,
    },

    #[error("resolution must have at least one column")]
    ZeroColumns,

    #[error("resolution of {rows}x{columns} exceeds the addressable point count")]
    TooLarge { rows: usize, columns: usize },
}

/// Cache key identifying a table: sensor model plus resolution.
///
/// The calibration fingerprint keeps apart sensors that share a model
/// name (or report none) but differ in stagger, window or beam angles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableKey {
    pub sensor_model: String,
    pub rows: usize,
    pub columns: usize,
    pub calibration: u64,
}

impl TableKey {
    pub fn new(calibration: &CalibrationMetadata, rows: usize, columns: usize) -> Self {
        Self {
            sensor_model: calibration.prod_line.clone(),
            rows,
            columns,
            calibration: calibration.fingerprint(),
        }
    }
}

/// Immutable mapping from image-plane pixels to native point indices.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupTable {
    key: TableKey,
    indices: Vec<u32>,
    xyz: XyzLut,
}

impl LookupTable {
    /// Build the table for a calibrated sensor at the given resolution.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when the calibration cannot describe a
    /// `rows` x `columns` scan, most commonly a beam count different from
    /// `rows`.
    pub fn build(
        calibration: &CalibrationMetadata,
        rows: usize,
        columns: usize,
    ) -> Result<Self, ConfigurationError> {
        Self::build_with_unit(calibration, rows, columns, DEFAULT_RANGE_UNIT)
    }

    /// Like [`LookupTable::build`] with an explicit metres-per-millimetre
    /// scale for the XYZ ray table.
    pub fn build_with_unit(
        calibration: &CalibrationMetadata,
        rows: usize,
        columns: usize,
        range_unit: f32,
    ) -> Result<Self, ConfigurationError> {
        validate(calibration, rows, columns)?;

        let indices: Vec<u32> = (0..rows)
            .into_par_iter()
            .flat_map_iter(|row| {
                let shift = calibration.shift_for_row(row);
                (0..columns).map(move |column| {
                    let measurement = staggered_column(column, shift, columns);
                    if calibration.column_in_window(measurement) {
                        (row * columns + measurement) as u32
                    } else {
                        NO_POINT
                    }
                })
            })
            .collect();

        let table = Self {
            key: TableKey::new(calibration, rows, columns),
            indices,
            xyz: make_xyz_lut(calibration, rows, columns, range_unit),
        };

        log::debug!(
            "Built {}x{} lookup table for {} ({} sentinel entries)",
            rows,
            columns,
            table.key.sensor_model,
            table.sentinel_count()
        );

        Ok(table)
    }

    /// Identity table for clouds already stored in image-plane order.
    ///
    /// # Panics
    ///
    /// Panics when `rows * columns` does not fit below [`NO_POINT`], the
    /// same bound [`LookupTable::build`] reports as
    /// [`ConfigurationError::TooLarge`].
    pub fn identity(rows: usize, columns: usize) -> Self {
        let len = rows
            .checked_mul(columns)
            .filter(|&n| n < NO_POINT as usize)
            .unwrap_or_else(|| panic!("identity table of {}x{} is too large", rows, columns));
        let calibration = CalibrationMetadata::uniform("identity", rows, columns, 0.0, 0.0);
        Self {
            key: TableKey::new(&calibration, rows, columns),
            indices: (0..len as u32).collect(),
            xyz: make_xyz_lut(&calibration, rows, columns, DEFAULT_RANGE_UNIT),
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.key.rows
    }

    #[inline]
    pub fn columns(&self) -> usize {
        self.key.columns
    }

    /// (rows, columns) the table was built for.
    #[inline]
    pub fn dims(&self) -> (usize, usize) {
        (self.key.rows, self.key.columns)
    }

    /// Number of entries, always rows x columns.
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Cache key for this table.
    #[inline]
    pub fn key(&self) -> &TableKey {
        &self.key
    }

    /// Native point index for (row, column).
    ///
    /// `None` for sentinel entries and out-of-range positions.
    #[inline]
    pub fn get(&self, row: usize, column: usize) -> Option<usize> {
        if row >= self.key.rows || column >= self.key.columns {
            return None;
        }
        self.at(row * self.key.columns + column)
    }

    /// Native point index for a row-major pixel offset.
    #[inline]
    pub fn at(&self, pixel: usize) -> Option<usize> {
        match self.indices.get(pixel) {
            Some(&NO_POINT) | None => None,
            Some(&index) => Some(index as usize),
        }
    }

    /// Raw entries in row-major order, [`NO_POINT`] for sentinels.
    #[inline]
    pub fn raw(&self) -> &[u32] {
        &self.indices
    }

    /// All entries as (row, column, index) in row-major order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize, Option<usize>)> + '_ {
        let columns = self.key.columns;
        (0..self.indices.len()).map(move |pixel| (pixel / columns, pixel % columns, self.at(pixel)))
    }

    /// Number of entries with a point.
    pub fn valid_count(&self) -> usize {
        self.indices.iter().filter(|&&i| i != NO_POINT).count()
    }

    /// Number of sentinel entries.
    pub fn sentinel_count(&self) -> usize {
        self.len() - self.valid_count()
    }

    /// XYZ ray table in native order.
    #[inline]
    pub fn xyz(&self) -> &XyzLut {
        &self.xyz
    }
}

fn validate(calibration: &CalibrationMetadata, rows: usize, columns: usize) -> Result<(), ConfigurationError> {
    if columns == 0 {
        return Err(ConfigurationError::ZeroColumns);
    }

    let beams = calibration.beam_count();
    if beams != rows {
        return Err(ConfigurationError::BeamCountMismatch { beams, rows });
    }

    let azimuths = calibration.beam_azimuth_angles.len();
    if azimuths != beams {
        return Err(ConfigurationError::AngleTableMismatch {
            altitudes: beams,
            azimuths,
        });
    }

    let shifts = calibration.pixel_shift_by_row.len();
    if shifts != 0 && shifts != rows {
        return Err(ConfigurationError::ShiftTableMismatch { shifts, rows });
    }

    if calibration.columns_per_frame != columns {
        return Err(ConfigurationError::ColumnCountMismatch {
            expected: calibration.columns_per_frame,
            columns,
        });
    }

    let (start, end) = calibration.column_window;
    if start >= columns || end >= columns {
        return Err(ConfigurationError::InvalidColumnWindow { start, end, columns });
    }

    // Indices are stored as u32 with u32::MAX reserved.
    if rows.checked_mul(columns).map_or(true, |n| n >= NO_POINT as usize) {
        return Err(ConfigurationError::TooLarge { rows, columns });
    }

    Ok(())
}
