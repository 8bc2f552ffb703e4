//! Robust summary statistics that skip missing values.
//!
//! The slice functions operate on already-compressed data; the masked
//! variants drop missing entries first. Per-axis variants reduce a
//! [`MaskedMatrix`] to one value per row or per column.

use crate::data::{MaskedMatrix, MaskedVec};
use crate::error::{NormError, Result};
use serde::{Deserialize, Serialize};

/// Direction of an axis reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    /// Reduce down each column, yielding one value per column.
    PerColumn,
    /// Reduce across each row, yielding one value per row.
    PerRow,
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Percentile of finite values by linear interpolation between ranks.
///
/// With `n` values sorted ascending, the result interpolates between the
/// elements at `k = p·(n−1)` and `k+1`.
///
/// # Arguments
/// * `values` - Data; non-finite entries are ignored
/// * `p` - Fraction in [0, 1]
///
/// # Returns
/// `Ok(None)` when there is no finite value.
pub fn percentile_slice(values: &[f64], p: f64) -> Result<Option<f64>> {
    if !(0.0..=1.0).contains(&p) {
        return Err(NormError::InvalidParameter(format!(
            "percentile must be in [0, 1], got {}",
            p
        )));
    }
    let s = sorted(values);
    Ok(percentile_sorted(&s, p))
}

fn percentile_sorted(s: &[f64], p: f64) -> Option<f64> {
    match s.len() {
        0 => None,
        1 => Some(s[0]),
        n => {
            let k = p * (n - 1) as f64;
            let lo = k.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let d = k - lo as f64;
            Some(s[lo] + d * (s[hi] - s[lo]))
        }
    }
}

/// Median of finite values.
pub fn median_slice(values: &[f64]) -> Option<f64> {
    percentile_sorted(&sorted(values), 0.5)
}

/// Arithmetic mean of finite values.
pub fn mean_slice(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if finite.is_empty() {
        None
    } else {
        Some(finite.iter().sum::<f64>() / finite.len() as f64)
    }
}

/// Weighted mean; pairs with a non-finite value or non-positive weight are skipped.
pub fn weighted_mean_slice(values: &[f64], weights: &[f64]) -> Option<f64> {
    let (num, den) = values
        .iter()
        .zip(weights.iter())
        .filter(|(v, w)| v.is_finite() && w.is_finite() && **w > 0.0)
        .fold((0.0, 0.0), |(n, d), (v, w)| (n + v * w, d + w));
    if den > 0.0 {
        Some(num / den)
    } else {
        None
    }
}

/// Median absolute deviation: `median(|x − median(x)|)`.
pub fn mad_slice(values: &[f64]) -> Option<f64> {
    let med = median_slice(values)?;
    let dev: Vec<f64> = values
        .iter()
        .filter(|x| x.is_finite())
        .map(|x| (x - med).abs())
        .collect();
    median_slice(&dev)
}

/// Sample standard deviation (divisor `n − 1`).
pub fn std_slice(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if finite.len() < 2 {
        return None;
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    let ss: f64 = finite.iter().map(|x| (x - mean).powi(2)).sum();
    Some((ss / (finite.len() - 1) as f64).sqrt())
}

/// Median of the present values.
pub fn median(x: &MaskedVec) -> Option<f64> {
    median_slice(&x.compressed())
}

/// Percentile of the present values.
pub fn percentile(x: &MaskedVec, p: f64) -> Result<Option<f64>> {
    percentile_slice(&x.compressed(), p)
}

/// Mean of the present values.
pub fn mean(x: &MaskedVec) -> Option<f64> {
    mean_slice(&x.compressed())
}

/// Median absolute deviation of the present values.
pub fn mad(x: &MaskedVec) -> Option<f64> {
    mad_slice(&x.compressed())
}

/// Sample standard deviation of the present values.
pub fn std(x: &MaskedVec) -> Option<f64> {
    std_slice(&x.compressed())
}

fn reduce_axis<F>(m: &MaskedMatrix, axis: Axis, f: F) -> MaskedVec
where
    F: Fn(&MaskedVec) -> Option<f64>,
{
    let opts: Vec<Option<f64>> = match axis {
        Axis::PerColumn => (0..m.ncols()).map(|j| f(&m.column(j))).collect(),
        Axis::PerRow => (0..m.nrows()).map(|i| f(&m.row(i))).collect(),
    };
    MaskedVec::from_options(&opts)
}

/// Median along an axis; a lane with no present value yields missing.
pub fn median_axis(m: &MaskedMatrix, axis: Axis) -> MaskedVec {
    reduce_axis(m, axis, median)
}

/// Percentile along an axis.
pub fn percentile_axis(m: &MaskedMatrix, p: f64, axis: Axis) -> Result<MaskedVec> {
    if !(0.0..=1.0).contains(&p) {
        return Err(NormError::InvalidParameter(format!(
            "percentile must be in [0, 1], got {}",
            p
        )));
    }
    Ok(reduce_axis(m, axis, |lane| {
        percentile_sorted(&sorted(&lane.compressed()), p)
    }))
}

/// Mean along an axis.
pub fn mean_axis(m: &MaskedMatrix, axis: Axis) -> MaskedVec {
    reduce_axis(m, axis, mean)
}

/// Median absolute deviation along an axis.
pub fn mad_axis(m: &MaskedMatrix, axis: Axis) -> MaskedVec {
    reduce_axis(m, axis, mad)
}

/// Sample standard deviation along an axis.
pub fn std_axis(m: &MaskedMatrix, axis: Axis) -> MaskedVec {
    reduce_axis(m, axis, std)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    #[test]
    fn test_median_odd_even() {
        assert_eq!(median_slice(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median_slice(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median_slice(&[]), None);
    }

    #[test]
    fn test_percentile_interpolation() {
        let x = [10.0, 20.0, 30.0, 40.0, 50.0];
        // k = 0.1 * 4 = 0.4 -> 10 + 0.4 * 10
        assert_relative_eq!(percentile_slice(&x, 0.1).unwrap().unwrap(), 14.0);
        assert_relative_eq!(percentile_slice(&x, 1.0).unwrap().unwrap(), 50.0);
        assert_relative_eq!(percentile_slice(&x, 0.0).unwrap().unwrap(), 10.0);
        assert!(percentile_slice(&x, 1.5).is_err());
    }

    #[test]
    fn test_masked_median_skips_missing() {
        let x = MaskedVec::from_options(&[Some(1.0), None, Some(5.0), Some(3.0), None]);
        assert_eq!(median(&x), Some(3.0));
    }

    #[test]
    fn test_mad() {
        // median = 3, deviations = [2, 1, 0, 1, 6] -> median 1
        assert_eq!(mad_slice(&[1.0, 2.0, 3.0, 4.0, 9.0]), Some(1.0));
    }

    #[test]
    fn test_std_sample_divisor() {
        let s = std_slice(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_relative_eq!(s, (32.0f64 / 7.0).sqrt(), epsilon = 1e-12);
        assert_eq!(std_slice(&[1.0]), None);
    }

    #[test]
    fn test_weighted_mean() {
        assert_relative_eq!(
            weighted_mean_slice(&[1.0, 3.0, 100.0], &[1.0, 3.0, 0.0]).unwrap(),
            2.5
        );
        assert_eq!(weighted_mean_slice(&[1.0], &[0.0]), None);
    }

    #[test]
    fn test_axis_reductions() {
        let data = DMatrix::from_row_slice(3, 2, &[1.0, 10.0, 2.0, f64::NAN, 6.0, 30.0]);
        let m = MaskedMatrix::from_matrix(data);

        let col_med = median_axis(&m, Axis::PerColumn);
        assert_eq!(col_med.to_options(), vec![Some(2.0), Some(20.0)]);

        let row_mean = mean_axis(&m, Axis::PerRow);
        assert_eq!(row_mean.to_options(), vec![Some(5.5), Some(2.0), Some(18.0)]);

        let row_std = std_axis(&m, Axis::PerRow);
        assert!(row_std.is_missing(1));

        let p = percentile_axis(&m, 0.5, Axis::PerColumn).unwrap();
        assert_eq!(p, col_med);
    }
}
