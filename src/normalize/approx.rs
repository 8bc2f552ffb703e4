//! Curve dispatch: median, weighted line or weighted LOWESS.

use crate::error::{NormError, Result};
use crate::model::linreg_wls;
use crate::normalize::{ApproxFunction, NormParams};
use crate::numeric::{lowess, median_slice};

/// Curve values at the evaluation points.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveFit {
    pub values: Vec<f64>,
    /// The line fit needed the pseudoinverse.
    pub singular: bool,
}

/// Fit a curve through `(a_fit, m_fit)` weighted by `w_fit` and evaluate it at `a_eval`.
///
/// Points with zero or missing weight are ignored. When every fitted M is
/// equal the curve is that constant, whatever the function. Returns
/// `InsufficientData` when no point carries weight.
pub fn approximate(
    a_fit: &[f64],
    m_fit: &[f64],
    w_fit: &[f64],
    a_eval: &[f64],
    params: &NormParams,
) -> Result<CurveFit> {
    if a_fit.len() != m_fit.len() || a_fit.len() != w_fit.len() {
        return Err(NormError::InputShapeMismatch {
            what: "curve fit points".to_string(),
            expected: a_fit.len(),
            actual: m_fit.len().min(w_fit.len()),
        });
    }

    let (mut a, mut m, mut w) = (Vec::new(), Vec::new(), Vec::new());
    for i in 0..a_fit.len() {
        if w_fit[i] > 0.0 && a_fit[i].is_finite() && m_fit[i].is_finite() {
            a.push(a_fit[i]);
            m.push(m_fit[i]);
            w.push(w_fit[i]);
        }
    }
    let median = median_slice(&m)
        .ok_or_else(|| NormError::InsufficientData("no weighted fit points".to_string()))?;

    let constant = |v: f64| CurveFit {
        values: vec![v; a_eval.len()],
        singular: false,
    };

    let degenerate = m.iter().all(|&v| v == m[0]);
    if degenerate {
        return Ok(constant(m[0]));
    }

    match params.approx_function {
        ApproxFunction::Median => Ok(constant(median)),
        ApproxFunction::LinReg => {
            let (values, singular) = linreg_wls(&a, &m, &w, a_eval)?;
            Ok(CurveFit { values, singular })
        }
        ApproxFunction::Lowess => Ok(CurveFit {
            values: lowess(&a, &m, &w, a_eval, &params.lowess_params())?,
            singular: false,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params(f: ApproxFunction) -> NormParams {
        NormParams {
            approx_function: f,
            ..NormParams::default()
        }
    }

    #[test]
    fn test_median_curve() {
        let fit = approximate(
            &[1.0, 2.0, 3.0, 4.0],
            &[0.1, 0.5, 0.2, 9.0],
            &[1.0; 4],
            &[0.0, 10.0],
            &params(ApproxFunction::Median),
        )
        .unwrap();
        assert_relative_eq!(fit.values[0], 0.35, epsilon = 1e-12);
        assert_relative_eq!(fit.values[1], 0.35, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_weights_excluded() {
        let fit = approximate(
            &[1.0, 2.0, 3.0],
            &[0.0, 0.0, 5.0],
            &[1.0, 1.0, 0.0],
            &[2.0],
            &params(ApproxFunction::Lowess),
        )
        .unwrap();
        assert_eq!(fit.values, vec![0.0]);
    }

    #[test]
    fn test_constant_targets_for_every_function() {
        for f in [ApproxFunction::Median, ApproxFunction::LinReg, ApproxFunction::Lowess] {
            let fit = approximate(&[1.0, 5.0, 9.0], &[1.0; 3], &[1.0; 3], &[0.0, 4.0], &params(f)).unwrap();
            assert_eq!(fit.values, vec![1.0, 1.0]);
            assert!(!fit.singular);
        }
    }

    #[test]
    fn test_linreg_singular() {
        let fit = approximate(
            &[2.0; 4],
            &[1.0, 2.0, 3.0, 6.0],
            &[1.0; 4],
            &[0.0, 2.0, 5.0],
            &params(ApproxFunction::LinReg),
        )
        .unwrap();
        assert!(fit.singular);
        for v in fit.values {
            assert_relative_eq!(v, 3.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_linreg_line() {
        let fit = approximate(
            &[0.0, 1.0, 2.0, 3.0],
            &[1.0, 3.0, 5.0, 7.0],
            &[1.0; 4],
            &[4.0],
            &params(ApproxFunction::LinReg),
        )
        .unwrap();
        assert_relative_eq!(fit.values[0], 9.0, epsilon = 1e-9);
    }

    #[test]
    fn test_no_points() {
        let err = approximate(&[1.0], &[1.0], &[0.0], &[1.0], &params(ApproxFunction::Median));
        assert!(matches!(err, Err(NormError::InsufficientData(_))));
    }
}
