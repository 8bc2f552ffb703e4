//! Numeric arrays paired with an explicit "missing" vector.
//!
//! Every numeric quantity in the engine (raw intensities, ratios, weights,
//! A/M values, normalized output) is a [`MaskedVec`]. Arithmetic helpers
//! propagate missingness: a result is missing whenever any operand is
//! missing or the operation itself is undefined (e.g. log of a non-positive
//! number). Statistics skip missing values.

use crate::error::{NormError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// A dense vector of `f64` with a co-indexed missing mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskedVec {
    values: Vec<f64>,
    missing: Vec<bool>,
}

impl MaskedVec {
    /// Create from values and a missing mask of equal length.
    pub fn new(values: Vec<f64>, missing: Vec<bool>) -> Result<Self> {
        if values.len() != missing.len() {
            return Err(NormError::InputShapeMismatch {
                what: "masked vector".to_string(),
                expected: values.len(),
                actual: missing.len(),
            });
        }
        // Missing slots never carry a stale number.
        let values = values
            .into_iter()
            .zip(missing.iter())
            .map(|(v, &m)| if m { 0.0 } else { v })
            .collect();
        Ok(Self { values, missing })
    }

    /// Create from plain values; non-finite entries become missing.
    pub fn from_values(values: Vec<f64>) -> Self {
        let missing: Vec<bool> = values.iter().map(|v| !v.is_finite()).collect();
        let values = values
            .into_iter()
            .map(|v| if v.is_finite() { v } else { 0.0 })
            .collect();
        Self { values, missing }
    }

    /// Create from optional values (`None` = missing).
    pub fn from_options(values: &[Option<f64>]) -> Self {
        Self {
            values: values.iter().map(|v| v.unwrap_or(0.0)).collect(),
            missing: values.iter().map(|v| v.is_none()).collect(),
        }
    }

    /// A vector of `n` missing values.
    pub fn missing_all(n: usize) -> Self {
        Self {
            values: vec![0.0; n],
            missing: vec![true; n],
        }
    }

    /// A vector of `n` copies of `value`.
    pub fn constant(n: usize, value: f64) -> Self {
        Self {
            values: vec![value; n],
            missing: vec![false; n],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `i`, or `None` if missing or out of bounds.
    #[inline]
    pub fn get(&self, i: usize) -> Option<f64> {
        match self.missing.get(i) {
            Some(false) => Some(self.values[i]),
            _ => None,
        }
    }

    #[inline]
    pub fn is_missing(&self, i: usize) -> bool {
        self.missing.get(i).copied().unwrap_or(true)
    }

    /// Set a present value; non-finite values are stored as missing.
    pub fn set(&mut self, i: usize, value: f64) {
        if value.is_finite() {
            self.values[i] = value;
            self.missing[i] = false;
        } else {
            self.set_missing(i);
        }
    }

    pub fn set_missing(&mut self, i: usize) {
        self.values[i] = 0.0;
        self.missing[i] = true;
    }

    /// Set `value` at every index in `indices`.
    pub fn put(&mut self, indices: &[usize], value: Option<f64>) {
        for &i in indices {
            match value {
                Some(v) => self.set(i, v),
                None => self.set_missing(i),
            }
        }
    }

    /// Raw value slice; missing slots hold 0.0.
    pub fn raw_values(&self) -> &[f64] {
        &self.values
    }

    /// The missing mask.
    pub fn missing_mask(&self) -> &[bool] {
        &self.missing
    }

    /// Number of present values.
    pub fn count_present(&self) -> usize {
        self.missing.iter().filter(|&&m| !m).count()
    }

    /// Iterate over `(index, value)` pairs of present entries.
    pub fn present(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.values
            .iter()
            .zip(self.missing.iter())
            .enumerate()
            .filter_map(|(i, (v, m))| if *m { None } else { Some((i, *v)) })
    }

    /// Present values in index order.
    pub fn compressed(&self) -> Vec<f64> {
        self.present().map(|(_, v)| v).collect()
    }

    /// Values with missing entries replaced by `fill`.
    pub fn filled(&self, fill: f64) -> Vec<f64> {
        self.values
            .iter()
            .zip(self.missing.iter())
            .map(|(&v, &m)| if m { fill } else { v })
            .collect()
    }

    /// As `Option`s.
    pub fn to_options(&self) -> Vec<Option<f64>> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }

    /// Select entries by index (out-of-range indices yield missing).
    pub fn take(&self, indices: &[usize]) -> Self {
        let opts: Vec<Option<f64>> = indices.iter().map(|&i| self.get(i)).collect();
        Self::from_options(&opts)
    }

    /// Copy with additional entries masked where `condition` is true.
    pub fn mask_where(&self, condition: &[bool]) -> Self {
        let mut out = self.clone();
        for (i, &c) in condition.iter().enumerate().take(out.len()) {
            if c {
                out.set_missing(i);
            }
        }
        out
    }

    /// Apply `f` to present values; `None` or non-finite results become missing.
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(f64) -> Option<f64>,
    {
        let opts: Vec<Option<f64>> = (0..self.len())
            .map(|i| self.get(i).and_then(&f).filter(|v| v.is_finite()))
            .collect();
        Self::from_options(&opts)
    }

    /// Combine elementwise with `other`; missing if either operand is missing.
    pub fn zip_with<F>(&self, other: &MaskedVec, f: F) -> Result<Self>
    where
        F: Fn(f64, f64) -> Option<f64>,
    {
        if self.len() != other.len() {
            return Err(NormError::InputShapeMismatch {
                what: "masked vector operands".to_string(),
                expected: self.len(),
                actual: other.len(),
            });
        }
        let opts: Vec<Option<f64>> = (0..self.len())
            .map(|i| match (self.get(i), other.get(i)) {
                (Some(a), Some(b)) => f(a, b).filter(|v| v.is_finite()),
                _ => None,
            })
            .collect();
        Ok(Self::from_options(&opts))
    }
}

/// A dense matrix of `f64` with a co-indexed missing mask.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedMatrix {
    data: DMatrix<f64>,
    missing: DMatrix<bool>,
}

impl MaskedMatrix {
    /// Create from data and mask of equal shape.
    pub fn new(data: DMatrix<f64>, missing: DMatrix<bool>) -> Result<Self> {
        if data.shape() != missing.shape() {
            return Err(NormError::InputShapeMismatch {
                what: "masked matrix".to_string(),
                expected: data.len(),
                actual: missing.len(),
            });
        }
        Ok(Self { data, missing })
    }

    /// A matrix with nothing missing; non-finite entries become missing.
    pub fn from_matrix(data: DMatrix<f64>) -> Self {
        let missing = data.map(|v| !v.is_finite());
        Self { data, missing }
    }

    /// Stack equally long columns side by side.
    pub fn from_columns(columns: &[MaskedVec]) -> Result<Self> {
        let nrows = columns.first().map(|c| c.len()).unwrap_or(0);
        for col in columns {
            if col.len() != nrows {
                return Err(NormError::InputShapeMismatch {
                    what: "matrix columns".to_string(),
                    expected: nrows,
                    actual: col.len(),
                });
            }
        }
        let ncols = columns.len();
        let data = DMatrix::from_fn(nrows, ncols, |i, j| columns[j].raw_values()[i]);
        let missing = DMatrix::from_fn(nrows, ncols, |i, j| columns[j].is_missing(i));
        Ok(Self { data, missing })
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.data.shape()
    }

    /// Value at `(row, col)`, or `None` if missing.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if self.missing[(row, col)] {
            None
        } else {
            Some(self.data[(row, col)])
        }
    }

    pub fn is_missing(&self, row: usize, col: usize) -> bool {
        self.missing[(row, col)]
    }

    /// Extract a row as a masked vector.
    pub fn row(&self, row: usize) -> MaskedVec {
        let opts: Vec<Option<f64>> = (0..self.ncols()).map(|j| self.get(row, j)).collect();
        MaskedVec::from_options(&opts)
    }

    /// Extract a column as a masked vector.
    pub fn column(&self, col: usize) -> MaskedVec {
        let opts: Vec<Option<f64>> = (0..self.nrows()).map(|i| self.get(i, col)).collect();
        MaskedVec::from_options(&opts)
    }

    /// Underlying data; missing slots hold arbitrary values.
    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    pub fn missing_mask(&self) -> &DMatrix<bool> {
        &self.missing
    }
}
