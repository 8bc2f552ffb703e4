//! Weighted least-squares line fit.
//!
//! Solves `(WX)ᵀ(WX) β = (WX)ᵀ(Wy)` with `X = [1, x − x̄]` and
//! `W = diag(√w)`. The slope column is centred on the weighted mean of `x`,
//! so a degenerate design (all `x` equal) collapses cleanly to a constant
//! fit through the weighted mean of `y` once the pseudoinverse is used.

use crate::error::{NormError, Result};
use log::warn;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Relative singular-value cut-off used to declare the normal matrix singular.
const SINGULAR_TOLERANCE: f64 = 1e-10;

/// A fitted line `ŷ = intercept + slope · x`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WlsFit {
    /// Intercept at `x = 0`.
    pub intercept: f64,
    /// Slope.
    pub slope: f64,
    /// Number of points with positive weight.
    pub n_points: usize,
    /// Whether the normal equations were singular and the pseudoinverse was used.
    pub singular: bool,
}

impl WlsFit {
    /// Evaluate the line at `x`.
    #[inline]
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    /// Evaluate the line at every element of `xs`.
    pub fn predict_many(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.predict(x)).collect()
    }
}

/// Fit a weighted line without logging.
///
/// Points with a non-finite coordinate or a non-positive weight are ignored.
///
/// # Arguments
/// * `x` - Predictor values
/// * `y` - Response values
/// * `w` - Non-negative weights
///
/// # Returns
/// The fitted line, or `InsufficientData` if no point carries weight.
pub fn fit_wls(x: &[f64], y: &[f64], w: &[f64]) -> Result<WlsFit> {
    if x.len() != y.len() || x.len() != w.len() {
        return Err(NormError::InputShapeMismatch {
            what: "regression inputs".to_string(),
            expected: x.len(),
            actual: y.len().min(w.len()),
        });
    }

    let points: Vec<(f64, f64, f64)> = x
        .iter()
        .zip(y.iter())
        .zip(w.iter())
        .filter(|((xi, yi), wi)| xi.is_finite() && yi.is_finite() && wi.is_finite() && **wi > 0.0)
        .map(|((&xi, &yi), &wi)| (xi, yi, wi))
        .collect();

    if points.is_empty() {
        return Err(NormError::InsufficientData(
            "no positively weighted points for regression".to_string(),
        ));
    }

    let sum_w: f64 = points.iter().map(|p| p.2).sum();
    let x_bar = points.iter().map(|p| p.0 * p.2).sum::<f64>() / sum_w;

    let k = points.len();
    let wx = DMatrix::from_fn(k, 2, |i, j| {
        let (xi, _, wi) = points[i];
        let sw = wi.sqrt();
        if j == 0 {
            sw
        } else {
            sw * (xi - x_bar)
        }
    });
    let wy = DVector::from_iterator(k, points.iter().map(|&(_, yi, wi)| wi.sqrt() * yi));

    let xtx = wx.transpose() * &wx;
    let xty = wx.transpose() * &wy;

    let svd = xtx.clone().svd(true, true);
    let sv_max = svd.singular_values.max();
    let sv_min = svd.singular_values.min();
    if !(sv_max > 0.0) {
        return Err(NormError::Numerical(
            "normal matrix of weighted regression is zero".to_string(),
        ));
    }
    let tol = sv_max * SINGULAR_TOLERANCE;
    let singular = sv_min <= tol;

    let beta = match (singular, xtx.try_inverse()) {
        (false, Some(inv)) => inv * xty,
        _ => {
            let pinv = svd
                .pseudo_inverse(tol)
                .map_err(|e| NormError::Numerical(e.to_string()))?;
            pinv * xty
        }
    };

    let slope = beta[1];
    Ok(WlsFit {
        intercept: beta[0] - slope * x_bar,
        slope,
        n_points: k,
        singular,
    })
}

/// Weighted linear regression evaluated at `x_eval`.
///
/// A singular system is solved with the pseudoinverse and reported with a
/// warning; the returned flag tells the caller it happened.
pub fn linreg_wls(x: &[f64], y: &[f64], w: &[f64], x_eval: &[f64]) -> Result<(Vec<f64>, bool)> {
    let fit = fit_wls(x, y, w)?;
    if fit.singular {
        warn!(
            "singular weighted regression over {} points, using pseudoinverse",
            fit.n_points
        );
    }
    Ok((fit.predict_many(x_eval), fit.singular))
}
