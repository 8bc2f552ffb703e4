//! Weighted LOWESS (locally weighted scatterplot smoothing).
//!
//! For every evaluation point the `r = ⌈f·n⌉` nearest controls form a
//! window. Window members receive tricube weights by distance relative to
//! the farthest member, multiplied by the caller's per-control weight and
//! by the current robustness weight, and a weighted line is fitted through
//! them.
//!
//! Robustifying passes recompute the smooth at the controls themselves,
//! scale the residuals by six times their median absolute value and derive
//! bisquare weights, so points with large residuals lose influence.
//!
//! Evaluation points are visited in x order. Local lines are fitted only at
//! anchors spaced at most `delta` apart (a fraction of the control x range)
//! and points in between are linearly interpolated, so a pass costs one
//! sort plus `O(r)` per anchor.

use crate::error::{NormError, Result};
use crate::numeric::stats::median_slice;
use serde::{Deserialize, Serialize};

/// Residual scales below this fraction of the mean |y| end the robust loop.
const RESIDUAL_SCALE_FLOOR: f64 = 1e-7;

/// Relative spread below which a window is treated as a single x value.
const DEGENERATE_SPREAD: f64 = 1e-12;

/// Smoothing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LowessParams {
    /// Fraction of controls in each local window, in (0, 1].
    pub fraction: f64,
    /// Number of fitting passes (1 = no robustifying).
    pub iterations: usize,
    /// Anchor spacing as a fraction of the control x range; 0 fits every point.
    pub delta_fraction: f64,
}

impl Default for LowessParams {
    fn default() -> Self {
        Self {
            fraction: 0.6,
            iterations: 3,
            delta_fraction: 0.01,
        }
    }
}

impl LowessParams {
    /// Check the parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if !(self.fraction > 0.0 && self.fraction <= 1.0) {
            return Err(NormError::InvalidParameter(format!(
                "LOWESS fraction must be in (0, 1], got {}",
                self.fraction
            )));
        }
        if self.iterations == 0 {
            return Err(NormError::InvalidParameter(
                "LOWESS needs at least one iteration".to_string(),
            ));
        }
        if !(self.delta_fraction >= 0.0 && self.delta_fraction < 1.0) {
            return Err(NormError::InvalidParameter(format!(
                "LOWESS delta fraction must be in [0, 1), got {}",
                self.delta_fraction
            )));
        }
        Ok(())
    }
}

/// Controls sorted by x with their prior weights.
struct Controls {
    x: Vec<f64>,
    y: Vec<f64>,
    w: Vec<f64>,
    window: usize,
    delta: f64,
    fallback: f64,
}

impl Controls {
    fn new(xc: &[f64], yc: &[f64], wc: &[f64], params: &LowessParams) -> Result<Self> {
        let mut pts: Vec<(f64, f64, f64)> = xc
            .iter()
            .zip(yc.iter())
            .zip(wc.iter())
            .filter(|((x, y), w)| x.is_finite() && y.is_finite() && w.is_finite() && **w > 0.0)
            .map(|((&x, &y), &w)| (x, y, w))
            .collect();
        if pts.is_empty() {
            return Err(NormError::InsufficientData(
                "LOWESS needs at least one weighted control".to_string(),
            ));
        }
        pts.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = pts.len();
        let window = ((params.fraction * n as f64).ceil() as usize).clamp(1, n);
        let y: Vec<f64> = pts.iter().map(|p| p.1).collect();
        let fallback = median_slice(&y).unwrap_or(0.0);
        let range = pts[n - 1].0 - pts[0].0;

        Ok(Self {
            x: pts.iter().map(|p| p.0).collect(),
            y,
            w: pts.iter().map(|p| p.2).collect(),
            window,
            delta: params.delta_fraction * range,
            fallback,
        })
    }

    fn len(&self) -> usize {
        self.x.len()
    }

    /// Half-open index range of the `window` controls nearest to `x0`.
    ///
    /// The window start is the first `lo` whose left end is no farther from
    /// `x0` than the first control past its right end; on equal distances
    /// the left control wins.
    fn neighbours(&self, x0: f64) -> (usize, usize) {
        let r = self.window;
        let (mut lo, mut hi) = (0, self.len() - r);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if x0 - self.x[mid] <= self.x[mid + r] - x0 {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        (lo, lo + r)
    }

    /// Local weighted line evaluated at `x0`.
    ///
    /// Solved from the weighted sums of the window; a window without x
    /// spread yields its weighted mean.
    fn smooth_at(&self, x0: f64, robust: &[f64]) -> f64 {
        let (lo, hi) = self.neighbours(x0);
        let h = (x0 - self.x[lo]).abs().max((self.x[hi - 1] - x0).abs());

        let (mut sw, mut swx, mut swy, mut positive) = (0.0, 0.0, 0.0, 0usize);
        for j in lo..hi {
            let tri = if h > 0.0 {
                tricube((self.x[j] - x0).abs() / h)
            } else {
                1.0
            };
            let wj = tri * self.w[j] * robust[j];
            if wj > 0.0 {
                positive += 1;
                sw += wj;
                swx += wj * self.x[j];
                swy += wj * self.y[j];
            }
        }
        if positive < 2 {
            return self.fallback;
        }

        let (x_bar, y_bar) = (swx / sw, swy / sw);
        let (mut sxx, mut sxy) = (0.0, 0.0);
        for j in lo..hi {
            let tri = if h > 0.0 {
                tricube((self.x[j] - x0).abs() / h)
            } else {
                1.0
            };
            let wj = tri * self.w[j] * robust[j];
            if wj > 0.0 {
                let dx = self.x[j] - x_bar;
                sxx += wj * dx * dx;
                sxy += wj * dx * (self.y[j] - y_bar);
            }
        }

        let spread = h.max(x_bar.abs()).max(f64::MIN_POSITIVE);
        if sxx <= DEGENERATE_SPREAD * sw * spread * spread {
            return y_bar;
        }
        y_bar + sxy / sxx * (x0 - x_bar)
    }

    /// Smooth at x-sorted points, fitting anchors and interpolating between them.
    fn smooth_sorted(&self, xs: &[f64], robust: &[f64]) -> Vec<f64> {
        let n = xs.len();
        let mut out = vec![0.0; n];
        if n == 0 {
            return out;
        }
        out[0] = self.smooth_at(xs[0], robust);

        let mut last = 0;
        while last < n - 1 {
            // ties share the anchor value
            if xs[last + 1] == xs[last] {
                out[last + 1] = out[last];
                last += 1;
                continue;
            }
            let cutpoint = xs[last] + self.delta;
            let next = xs[last + 1..].partition_point(|&x| x <= cutpoint) + last + 1;
            let current = next.saturating_sub(1).max(last + 1).min(n - 1);

            out[current] = self.smooth_at(xs[current], robust);
            let span = xs[current] - xs[last];
            for i in last + 1..current {
                let t = (xs[i] - xs[last]) / span;
                out[i] = out[last] + t * (out[current] - out[last]);
            }
            last = current;
        }
        out
    }
}

#[inline]
fn tricube(u: f64) -> f64 {
    if u < 1.0 {
        let t = 1.0 - u * u * u;
        t * t * t
    } else {
        0.0
    }
}

#[inline]
fn bisquare(u: f64) -> f64 {
    if u.abs() < 1.0 {
        let t = 1.0 - u * u;
        t * t
    } else {
        0.0
    }
}

/// Weighted LOWESS smooth of `(xc, yc)` evaluated at `xe`.
///
/// # Arguments
/// * `xc`, `yc` - Control coordinates
/// * `wc` - Per-control weights; zero means "ignore"
/// * `xe` - Evaluation points; non-finite entries yield NaN
/// * `params` - Window fraction and iteration count
///
/// # Returns
/// One smoothed value per evaluation point, or `InsufficientData` when no
/// control carries weight.
pub fn lowess(
    xc: &[f64],
    yc: &[f64],
    wc: &[f64],
    xe: &[f64],
    params: &LowessParams,
) -> Result<Vec<f64>> {
    params.validate()?;
    if xc.len() != yc.len() || xc.len() != wc.len() {
        return Err(NormError::InputShapeMismatch {
            what: "LOWESS controls".to_string(),
            expected: xc.len(),
            actual: yc.len().min(wc.len()),
        });
    }

    let controls = Controls::new(xc, yc, wc, params)?;
    let n = controls.len();
    let mean_abs_y = controls.y.iter().map(|y| y.abs()).sum::<f64>() / n as f64;

    let mut robust = vec![1.0; n];
    let mut fitted: Vec<f64> = Vec::new();
    for pass in 0..params.iterations {
        if pass > 0 {
            let residuals: Vec<f64> = controls
                .y
                .iter()
                .zip(fitted.iter())
                .map(|(y, f)| y - f)
                .collect();
            let abs_res: Vec<f64> = residuals.iter().map(|r| r.abs()).collect();
            let scale = 6.0 * median_slice(&abs_res).unwrap_or(0.0);
            if scale <= RESIDUAL_SCALE_FLOOR * mean_abs_y || scale == 0.0 {
                break;
            }
            robust = residuals.iter().map(|r| bisquare(r / scale)).collect();
        }
        if pass + 1 < params.iterations {
            fitted = controls.smooth_sorted(&controls.x, &robust);
        }
    }

    let mut order: Vec<usize> = (0..xe.len()).filter(|&i| xe[i].is_finite()).collect();
    order.sort_by(|&a, &b| xe[a].total_cmp(&xe[b]));
    let xs: Vec<f64> = order.iter().map(|&i| xe[i]).collect();
    let smoothed = controls.smooth_sorted(&xs, &robust);

    let mut out = vec![f64::NAN; xe.len()];
    for (&i, v) in order.iter().zip(smoothed) {
        out[i] = v;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn noisy_line(n: usize) -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, &xi)| xi + if i % 2 == 0 { 0.1 } else { -0.1 })
            .collect();
        (x, y)
    }

    #[test]
    fn test_reproduces_line() {
        let x: Vec<f64> = (0..15).map(|i| i as f64 * 0.5).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v - 1.0).collect();
        let w = vec![1.0; x.len()];
        let xe = [0.0, 1.3, 3.7, 7.0, 9.0];
        let out = lowess(&x, &y, &w, &xe, &LowessParams::default()).unwrap();
        for (xv, yv) in xe.iter().zip(out) {
            assert_relative_eq!(yv, 2.0 * xv - 1.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_constant_response() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y = [0.7; 6];
        let out = lowess(&x, &y, &[1.0; 6], &[0.0, 3.5, 10.0], &LowessParams::default()).unwrap();
        for v in out {
            assert_relative_eq!(v, 0.7, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_robust_iterations_reject_outlier() {
        let (x, mut y) = noisy_line(41);
        y[10] = 15.0;
        let w = vec![1.0; x.len()];

        let plain = LowessParams { fraction: 0.5, iterations: 1, ..LowessParams::default() };
        let robust = LowessParams { fraction: 0.5, iterations: 3, ..LowessParams::default() };

        let pulled = lowess(&x, &y, &w, &[10.0], &plain).unwrap()[0];
        let resisted = lowess(&x, &y, &w, &[10.0], &robust).unwrap()[0];

        assert!(pulled > 10.3);
        assert!((resisted - 10.0).abs() < 0.15);
    }

    #[test]
    fn test_zero_weight_controls_ignored() {
        let (x, mut y) = noisy_line(12);
        y[5] = 50.0;
        let mut w = vec![1.0; 12];
        w[5] = 0.0;
        let params = LowessParams { fraction: 0.6, iterations: 1, ..LowessParams::default() };
        let out = lowess(&x, &y, &w, &[5.0], &params).unwrap()[0];
        assert!((out - 5.0).abs() < 0.2);
    }

    #[test]
    fn test_single_control_falls_back_to_median() {
        let out = lowess(&[2.0], &[0.4], &[1.0], &[0.0, 5.0], &LowessParams::default()).unwrap();
        assert_eq!(out, vec![0.4, 0.4]);
    }

    #[test]
    fn test_empty_input_is_insufficient() {
        let err = lowess(&[], &[], &[], &[1.0], &LowessParams::default());
        assert!(matches!(err, Err(NormError::InsufficientData(_))));
        let err = lowess(&[1.0], &[1.0], &[0.0], &[1.0], &LowessParams::default());
        assert!(matches!(err, Err(NormError::InsufficientData(_))));
    }

    #[test]
    fn test_invalid_params() {
        let bad = LowessParams { fraction: 0.0, ..LowessParams::default() };
        assert!(lowess(&[1.0, 2.0], &[1.0, 2.0], &[1.0, 1.0], &[1.0], &bad).is_err());
        let bad = LowessParams { iterations: 0, ..LowessParams::default() };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_non_finite_eval_point() {
        let out = lowess(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], &[1.0; 3], &[f64::NAN], &LowessParams::default()).unwrap();
        assert!(out[0].is_nan());
    }

    fn wavy(n: usize) -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..n).map(|i| i as f64 * 10.0 / n as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, &xi)| xi.sin() + if i % 3 == 0 { 0.05 } else { -0.025 })
            .collect();
        (x, y)
    }

    #[test]
    fn test_anchor_interpolation_tracks_exact_fit() {
        let (x, y) = wavy(600);
        let w = vec![1.0; x.len()];
        let exact = LowessParams { fraction: 0.3, delta_fraction: 0.0, ..LowessParams::default() };
        let anchored = LowessParams { fraction: 0.3, ..LowessParams::default() };

        let a = lowess(&x, &y, &w, &x, &exact).unwrap();
        let b = lowess(&x, &y, &w, &x, &anchored).unwrap();
        for (u, v) in a.iter().zip(b.iter()) {
            assert!((u - v).abs() < 5e-3);
        }
    }

    #[test]
    fn test_unsorted_and_tied_evaluation_points() {
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 0.5 * v + 2.0).collect();
        let xe = [12.0, 3.0, f64::NAN, 3.0, 0.25, 19.0];
        let out = lowess(&x, &y, &[1.0; 20], &xe, &LowessParams::default()).unwrap();
        for (xv, yv) in xe.iter().zip(out.iter()) {
            if xv.is_finite() {
                assert_relative_eq!(*yv, 0.5 * xv + 2.0, epsilon = 1e-8);
            } else {
                assert!(yv.is_nan());
            }
        }
        assert_eq!(out[1], out[3]);
    }

    #[test]
    fn test_window_without_spread_gives_weighted_mean() {
        let x = [1.0; 4];
        let y = [0.0, 1.0, 2.0, 5.0];
        let w = [1.0, 1.0, 1.0, 3.0];
        let params = LowessParams { fraction: 1.0, iterations: 1, ..LowessParams::default() };
        let out = lowess(&x, &y, &w, &[1.0], &params).unwrap();
        assert_relative_eq!(out[0], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_large_input_is_anchored() {
        let (x, y) = wavy(50_000);
        let w = vec![1.0; x.len()];
        let out = lowess(&x, &y, &w, &x, &LowessParams { fraction: 0.2, ..LowessParams::default() }).unwrap();
        assert_eq!(out.len(), x.len());
        assert!(out.iter().all(|v| v.is_finite()));
        assert!((out[25_000] - 5.0f64.sin()).abs() < 0.15);
    }

    #[test]
    fn test_invalid_delta() {
        let bad = LowessParams { delta_fraction: -0.1, ..LowessParams::default() };
        assert!(bad.validate().is_err());
    }
}
