//! Normalization parameters.

use crate::error::{NormError, Result};
use crate::filter::FilterParams;
use crate::numeric::LowessParams;
use serde::{Deserialize, Serialize};

/// Which spots share a normalization curve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormRange {
    /// One curve for the whole array.
    Global,
    /// One curve per distinct secondary identifier.
    PerVarB,
    /// Per secondary identifier when the group has enough accepted controls,
    /// otherwise the global curve.
    #[default]
    Combined,
}

/// Curve family fitted through the controls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproxFunction {
    /// Constant equal to the median control M.
    Median,
    /// Weighted least-squares line.
    LinReg,
    /// Weighted LOWESS.
    #[default]
    Lowess,
}

/// Scale of reported M values. Curves are always fitted on log2 ratios.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YScale {
    #[default]
    Log,
    Linear,
}

impl YScale {
    /// Convert a log2 value to this scale.
    #[inline]
    pub fn from_log2(&self, value: f64) -> f64 {
        match self {
            Self::Log => value,
            Self::Linear => value.exp2(),
        }
    }
}

/// Curve fitting parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormParams {
    pub range: NormRange,
    /// Minimum accepted controls for a group to get its own curve.
    pub min_num_control_probes: usize,
    pub approx_function: ApproxFunction,
    /// LOWESS window as a percentage of the controls (1..=99).
    pub loess_window_pct: u32,
    /// LOWESS fitting passes (1..=10).
    pub loess_iter: u32,
    /// Fit ordinary probes as well, with `other_probe_weight`.
    pub include_non_control: bool,
    pub other_probe_weight: f64,
}

impl Default for NormParams {
    fn default() -> Self {
        Self {
            range: NormRange::Combined,
            min_num_control_probes: 2,
            approx_function: ApproxFunction::Lowess,
            loess_window_pct: 60,
            loess_iter: 3,
            include_non_control: false,
            other_probe_weight: 0.01,
        }
    }
}

impl NormParams {
    pub fn validate(&self) -> Result<()> {
        if !(1..=99).contains(&self.loess_window_pct) {
            return Err(NormError::InvalidParameter(format!(
                "loess_window_pct must be in 1..=99, got {}",
                self.loess_window_pct
            )));
        }
        if !(1..=10).contains(&self.loess_iter) {
            return Err(NormError::InvalidParameter(format!(
                "loess_iter must be in 1..=10, got {}",
                self.loess_iter
            )));
        }
        if !(0.0..=1.0).contains(&self.other_probe_weight) {
            return Err(NormError::InvalidParameter(format!(
                "other_probe_weight must be in [0, 1], got {}",
                self.other_probe_weight
            )));
        }
        if self.min_num_control_probes == 0 {
            return Err(NormError::InvalidParameter(
                "min_num_control_probes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn lowess_params(&self) -> LowessParams {
        LowessParams {
            fraction: self.loess_window_pct as f64 / 100.0,
            iterations: self.loess_iter as usize,
            ..LowessParams::default()
        }
    }

    /// Weight of an ordinary probe in the fit.
    pub fn effective_other_weight(&self) -> f64 {
        if self.include_non_control {
            self.other_probe_weight
        } else {
            0.0
        }
    }
}

/// Everything the engine needs to filter, fit and report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub subtract_background: bool,
    pub y_scale: YScale,
    pub filter: FilterParams,
    pub normalization: NormParams,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.filter.validate()?;
        self.normalization.validate()
    }
}
