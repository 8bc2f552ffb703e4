//! Index bookkeeping: boolean conditions, flat positions, triangular packing
//! and rank/permutation helpers.

use crate::data::{MaskedMatrix, MaskedVec};
use crate::error::{NormError, Result};
use nalgebra::DMatrix;

/// Indices where `condition` is true, in ascending order.
pub fn condition_to_indices(condition: &[bool]) -> Vec<usize> {
    condition
        .iter()
        .enumerate()
        .filter_map(|(i, &c)| if c { Some(i) } else { None })
        .collect()
}

/// Dense condition of length `n` that is true at each of `indices`.
///
/// Indices outside `0..n` are ignored.
pub fn indices_to_condition(indices: &[usize], n: usize) -> Vec<bool> {
    let mut cond = vec![false; n];
    for &i in indices {
        if i < n {
            cond[i] = true;
        }
    }
    cond
}

/// Convert a flat row-major offset into a multi-axis index for `shape`.
pub fn position_to_multi_index(position: usize, shape: &[usize]) -> Result<Vec<usize>> {
    let total: usize = shape.iter().product();
    if position >= total {
        return Err(NormError::InvalidParameter(format!(
            "position {} out of bounds for shape {:?}",
            position, shape
        )));
    }
    let mut rem = position;
    let mut index = vec![0; shape.len()];
    for (axis, &dim) in shape.iter().enumerate().rev() {
        index[axis] = rem % dim;
        rem /= dim;
    }
    Ok(index)
}

/// Convert a multi-axis index into a flat row-major offset for `shape`.
pub fn multi_index_to_position(index: &[usize], shape: &[usize]) -> Result<usize> {
    if index.len() != shape.len() {
        return Err(NormError::InputShapeMismatch {
            what: "multi-index rank".to_string(),
            expected: shape.len(),
            actual: index.len(),
        });
    }
    let mut position = 0;
    for (&i, &dim) in index.iter().zip(shape.iter()) {
        if i >= dim {
            return Err(NormError::InvalidParameter(format!(
                "index {:?} out of bounds for shape {:?}",
                index, shape
            )));
        }
        position = position * dim + i;
    }
    Ok(position)
}

/// Side length `n` such that `n(n−1)/2 == len`.
fn triangular_side(len: usize) -> Result<usize> {
    let n = ((2.0 * len as f64).sqrt()).ceil() as usize;
    let n = if len == 0 { 1 } else { n };
    if n * (n - 1) / 2 != len {
        return Err(NormError::InvalidParameter(format!(
            "length {} is not of the form n(n-1)/2",
            len
        )));
    }
    Ok(n)
}

/// Unpack a strictly-upper-triangular sequence into a square matrix.
///
/// `values` lists the elements above the diagonal in row-major order. The
/// lower triangle holds the transpose. Cells are marked missing on the
/// diagonal and in whichever triangle is not requested: `upper && lower`
/// gives a symmetric matrix, `upper` alone keeps only `i < j`, `lower`
/// alone keeps only `i > j`.
pub fn triangular_put(values: &MaskedVec, upper: bool, lower: bool) -> Result<MaskedMatrix> {
    let n = triangular_side(values.len())?;
    let mut data = DMatrix::zeros(n, n);
    let mut missing = DMatrix::from_element(n, n, true);
    let mut k = 0;
    for i in 0..n {
        for j in (i + 1)..n {
            if let Some(v) = values.get(k) {
                data[(i, j)] = v;
                data[(j, i)] = v;
                missing[(i, j)] = !upper;
                missing[(j, i)] = !lower;
            }
            k += 1;
        }
    }
    MaskedMatrix::new(data, missing)
}

/// Pack the strict upper (`upper = true`) or strict lower triangle of a
/// square matrix into a sequence, row-major.
pub fn triangular_get(m: &MaskedMatrix, upper: bool) -> Result<MaskedVec> {
    let (nrows, ncols) = m.shape();
    if nrows != ncols {
        return Err(NormError::InputShapeMismatch {
            what: "square matrix".to_string(),
            expected: nrows,
            actual: ncols,
        });
    }
    let mut out = Vec::with_capacity(nrows * nrows.saturating_sub(1) / 2);
    for i in 0..nrows {
        for j in 0..ncols {
            if (upper && i < j) || (!upper && i > j) {
                out.push(m.get(i, j));
            }
        }
    }
    Ok(MaskedVec::from_options(&out))
}

/// Indices that would sort `values` ascending; non-finite values sort last.
pub fn argsort(values: &[f64]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..values.len()).collect();
    idx.sort_by(|&a, &b| {
        let (x, y) = (values[a], values[b]);
        match (x.is_finite(), y.is_finite()) {
            (true, true) => x.total_cmp(&y),
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            (false, false) => a.cmp(&b),
        }
    });
    idx
}

/// 1-based ranks of the present values; missing values stay unranked.
///
/// With `inverse`, the largest value gets rank 1.
pub fn rank_data(values: &MaskedVec, inverse: bool) -> MaskedVec {
    let present: Vec<(usize, f64)> = values.present().collect();
    let keys: Vec<f64> = present.iter().map(|&(_, v)| v).collect();
    let order = argsort(&keys);
    let n = present.len();
    let mut ranks = MaskedVec::missing_all(values.len());
    for (r, &k) in order.iter().enumerate() {
        let rank = if inverse { n - r } else { r + 1 };
        ranks.set(present[k].0, rank as f64);
    }
    ranks
}

/// Inverse of a permutation of `0..n`.
pub fn permutation_inverse(perm: &[usize]) -> Result<Vec<usize>> {
    let n = perm.len();
    let mut inv = vec![usize::MAX; n];
    for (i, &p) in perm.iter().enumerate() {
        if p >= n || inv[p] != usize::MAX {
            return Err(NormError::InvalidParameter(
                "input is not a permutation of 0..n".to_string(),
            ));
        }
        inv[p] = i;
    }
    Ok(inv)
}
