//! Image-plane grids: range/reflectivity images and selection masks.
//!
//! Both grids are stored row-major with rows = beams and
//! columns = azimuth samples.

use thiserror::Error;

/// Errors raised when constructing an image-plane grid.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ImageError {
    #[error("grid of {rows}x{columns} needs {expected} values, got {actual}")]
    ValueCount {
        rows: usize,
        columns: usize,
        expected: usize,
        actual: usize,
    },
}

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, ImageError>;

fn check_len(rows: usize, columns: usize, actual: usize) -> Result<()> {
    let expected = rows * columns;
    if expected != actual {
        return Err(ImageError::ValueCount {
            rows,
            columns,
            expected,
            actual,
        });
    }
    Ok(())
}

/// A 2D grid of range or reflectivity values for one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeImage {
    rows: usize,
    columns: usize,
    values: Vec<f32>,
}

impl RangeImage {
    /// Creates a range image from row-major values.
    pub fn new(rows: usize, columns: usize, values: Vec<f32>) -> Result<Self> {
        check_len(rows, columns, values.len())?;
        Ok(Self {
            rows,
            columns,
            values,
        })
    }

    /// Creates a range image with every pixel set to zero (no return).
    pub fn zeros(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            values: vec![0.0; rows * columns],
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Value at (row, column), `None` when out of bounds.
    #[inline]
    pub fn get(&self, row: usize, column: usize) -> Option<f32> {
        if row < self.rows && column < self.columns {
            Some(self.values[row * self.columns + column])
        } else {
            None
        }
    }

    /// Row-major values.
    #[inline]
    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

/// Half-open pixel rectangle: rows `top..bottom`, columns `left..right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
}

impl BoundingBox {
    pub fn new(top: usize, left: usize, bottom: usize, right: usize) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }
}

/// A boolean selection over the image plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask2D {
    rows: usize,
    columns: usize,
    cells: Vec<bool>,
}

impl Mask2D {
    /// Creates an all-false mask.
    pub fn new(rows: usize, columns: usize) -> Self {
        Self::filled(rows, columns, false)
    }

    /// Creates a mask with every cell set to `value`.
    pub fn filled(rows: usize, columns: usize, value: bool) -> Self {
        Self {
            rows,
            columns,
            cells: vec![value; rows * columns],
        }
    }

    /// Creates a mask from row-major cells.
    pub fn from_cells(rows: usize, columns: usize, cells: Vec<bool>) -> Result<Self> {
        check_len(rows, columns, cells.len())?;
        Ok(Self {
            rows,
            columns,
            cells,
        })
    }

    /// Creates a mask selecting a bounding box, clipped to the grid.
    pub fn from_bbox(rows: usize, columns: usize, bbox: BoundingBox) -> Self {
        let mut mask = Self::new(rows, columns);
        let bottom = bbox.bottom.min(rows);
        let right = bbox.right.min(columns);
        for row in bbox.top.min(bottom)..bottom {
            let start = row * columns;
            mask.cells[start + bbox.left.min(right)..start + right].fill(true);
        }
        mask
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Whether (row, column) is selected. Out-of-bounds cells are unselected.
    #[inline]
    pub fn get(&self, row: usize, column: usize) -> bool {
        row < self.rows && column < self.columns && self.cells[row * self.columns + column]
    }

    /// Sets a cell; out-of-bounds writes are ignored.
    #[inline]
    pub fn set(&mut self, row: usize, column: usize, value: bool) {
        if row < self.rows && column < self.columns {
            self.cells[row * self.columns + column] = value;
        }
    }

    /// Row-major cells.
    #[inline]
    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    /// Number of selected cells.
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// Selected (row, column) positions in row-major order.
    pub fn selected(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let columns = self.columns;
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| **c)
            .map(move |(i, _)| (i / columns, i % columns))
    }

    /// True when every cell selected in `other` is selected here.
    pub fn contains(&self, other: &Mask2D) -> bool {
        self.rows == other.rows
            && self.columns == other.columns
            && self.cells.iter().zip(&other.cells).all(|(&a, &b)| a || !b)
    }
}
