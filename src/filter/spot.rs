//! Per-spot quality filters over raw foreground/background intensities.
//!
//! Four independent filters each produce a boolean reject vector; a spot is
//! filtered when any enabled filter rejects it. A missing input value makes
//! an enabled filter reject the spot.

use crate::data::{MaskedVec, RawIntensities};
use crate::error::{NormError, Result};
use crate::probe::WeightClass;
use serde::{Deserialize, Serialize};

/// A threshold that can be switched off without losing its value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterThreshold {
    pub enabled: bool,
    pub value: f64,
}

impl FilterThreshold {
    pub fn on(value: f64) -> Self {
        Self { enabled: true, value }
    }

    pub fn off(value: f64) -> Self {
        Self { enabled: false, value }
    }
}

/// Thresholds of the four spot filters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    /// Reject when background SD / signal exceeds this on either channel.
    pub max_cv: FilterThreshold,
    /// Reject when signal < ratio * background on either channel.
    pub min_intensity_ratio: FilterThreshold,
    /// Reject when the foreground exceeds this on either channel.
    pub max_fg_intensity: FilterThreshold,
    /// Reject when the background exceeds this on either channel.
    pub max_bg_intensity: FilterThreshold,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            max_cv: FilterThreshold::on(0.5),
            min_intensity_ratio: FilterThreshold::on(1.5),
            max_fg_intensity: FilterThreshold::on(60000.0),
            max_bg_intensity: FilterThreshold::off(400.0),
        }
    }
}

impl FilterParams {
    /// All filters disabled.
    pub fn none() -> Self {
        let d = Self::default();
        Self {
            max_cv: FilterThreshold::off(d.max_cv.value),
            min_intensity_ratio: FilterThreshold::off(d.min_intensity_ratio.value),
            max_fg_intensity: FilterThreshold::off(d.max_fg_intensity.value),
            max_bg_intensity: FilterThreshold::off(d.max_bg_intensity.value),
        }
    }

    pub fn threshold(&self, kind: FilterKind) -> FilterThreshold {
        match kind {
            FilterKind::MaxCv => self.max_cv,
            FilterKind::MinRatio => self.min_intensity_ratio,
            FilterKind::MaxFg => self.max_fg_intensity,
            FilterKind::MaxBg => self.max_bg_intensity,
        }
    }

    /// Thresholds must be finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        for kind in FilterKind::ALL {
            let t = self.threshold(kind);
            if !t.value.is_finite() || t.value < 0.0 {
                return Err(NormError::InvalidParameter(format!(
                    "{} threshold must be a non-negative number, got {}",
                    kind.name(),
                    t.value
                )));
            }
        }
        Ok(())
    }
}

/// Identifies one of the four filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterKind {
    MaxCv,
    MinRatio,
    MaxFg,
    MaxBg,
}

impl FilterKind {
    pub const ALL: [FilterKind; 4] = [Self::MaxCv, Self::MinRatio, Self::MaxFg, Self::MaxBg];

    pub fn name(&self) -> &'static str {
        match self {
            Self::MaxCv => "max_cv",
            Self::MinRatio => "min_intensity_ratio",
            Self::MaxFg => "max_fg_intensity",
            Self::MaxBg => "max_bg_intensity",
        }
    }
}

/// Reject vectors of all filters for one set of raw intensities.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterBank {
    max_cv: Vec<bool>,
    min_ratio: Vec<bool>,
    max_fg: Vec<bool>,
    max_bg: Vec<bool>,
    max_cv_available: bool,
}

/// Reject spot `i` when `rejects(channel, i)` holds for either channel.
fn reject_where<F>(sig: [&MaskedVec; 2], rejects: F) -> Vec<bool>
where
    F: Fn(usize, usize) -> bool,
{
    (0..sig[0].len())
        .map(|i| rejects(0, i) || rejects(1, i))
        .collect()
}

impl FilterBank {
    /// Evaluate every filter.
    ///
    /// `max_cv` needs both background SD columns; without them it rejects
    /// nothing and [`FilterBank::max_cv_available`] is false.
    pub fn evaluate(raw: &RawIntensities, params: &FilterParams) -> Self {
        let n = raw.len();
        let sig = [&raw.sig_smpl, &raw.sig_ref];
        let bg = [&raw.bg_smpl, &raw.bg_ref];

        let (max_cv, max_cv_available) = match (&raw.bg_smpl_sd, &raw.bg_ref_sd) {
            (Some(sd_s), Some(sd_r)) => {
                let mask = if params.max_cv.enabled {
                    let sd = [sd_s, sd_r];
                    let limit = params.max_cv.value;
                    reject_where(sig, |ch, i| match (sd[ch].get(i), sig[ch].get(i)) {
                        (Some(s), Some(f)) => {
                            let cv = s / f;
                            !cv.is_finite() || cv > limit
                        }
                        _ => true,
                    })
                } else {
                    vec![false; n]
                };
                (mask, true)
            }
            _ => (vec![false; n], false),
        };

        let min_ratio = if params.min_intensity_ratio.enabled {
            let k = params.min_intensity_ratio.value;
            reject_where(sig, |ch, i| match (sig[ch].get(i), bg[ch].get(i)) {
                (Some(s), Some(b)) => s < k * b,
                _ => true,
            })
        } else {
            vec![false; n]
        };

        let above = |channels: [&MaskedVec; 2], t: FilterThreshold| {
            if t.enabled {
                reject_where(channels, |ch, i| channels[ch].get(i).map_or(true, |v| v > t.value))
            } else {
                vec![false; n]
            }
        };
        let max_fg = above(sig, params.max_fg_intensity);
        let max_bg = above(bg, params.max_bg_intensity);

        Self {
            max_cv,
            min_ratio,
            max_fg,
            max_bg,
            max_cv_available,
        }
    }

    /// Reject vector of one filter.
    pub fn mask(&self, kind: FilterKind) -> &[bool] {
        match kind {
            FilterKind::MaxCv => &self.max_cv,
            FilterKind::MinRatio => &self.min_ratio,
            FilterKind::MaxFg => &self.max_fg,
            FilterKind::MaxBg => &self.max_bg,
        }
    }

    /// Union of all filters.
    pub fn combined(&self) -> Vec<bool> {
        (0..self.len())
            .map(|i| self.is_filtered(i))
            .collect()
    }

    #[inline]
    pub fn is_filtered(&self, i: usize) -> bool {
        self.max_cv[i] || self.min_ratio[i] || self.max_fg[i] || self.max_bg[i]
    }

    pub fn len(&self) -> usize {
        self.min_ratio.len()
    }

    pub fn is_empty(&self) -> bool {
        self.min_ratio.is_empty()
    }

    pub fn max_cv_available(&self) -> bool {
        self.max_cv_available
    }

    /// Count rejected controls and other probes per filter.
    ///
    /// # Arguments
    /// * `classes` - Weight class of every spot
    pub fn summary(&self, classes: &[WeightClass]) -> FilterSummary {
        let is_control = |i: usize| classes.get(i) == Some(&WeightClass::Normalization);
        let count = |mask: &[bool]| {
            let mut c = FilterCount::default();
            for (i, &rejected) in mask.iter().enumerate() {
                if rejected {
                    if is_control(i) {
                        c.controls += 1;
                    } else {
                        c.others += 1;
                    }
                }
            }
            c
        };

        let combined = self.combined();
        let total = count(&vec![true; self.len()]);
        let filtered = count(&combined);

        FilterSummary {
            max_cv: count(&self.max_cv),
            min_ratio: count(&self.min_ratio),
            max_fg: count(&self.max_fg),
            max_bg: count(&self.max_bg),
            controls_total: total.controls,
            controls_accepted: total.controls - filtered.controls,
            controls_filtered: filtered.controls,
            others_total: total.others,
            others_accepted: total.others - filtered.others,
            others_filtered: filtered.others,
        }
    }
}

/// Spots rejected by one filter, split by weight class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCount {
    pub controls: usize,
    pub others: usize,
}

/// Filter accounting over the whole array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSummary {
    pub max_cv: FilterCount,
    pub min_ratio: FilterCount,
    pub max_fg: FilterCount,
    pub max_bg: FilterCount,
    pub controls_total: usize,
    pub controls_accepted: usize,
    pub controls_filtered: usize,
    pub others_total: usize,
    pub others_accepted: usize,
    pub others_filtered: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawIntensities {
        RawIntensities::from_values(
            &[1000.0, 1000.0, 1000.0, 100.0, 1000.0, 70000.0],
            &[900.0, 900.0, 900.0, 900.0, 900.0, 900.0],
            &[100.0, 100.0, 100.0, 100.0, 500.0, 100.0],
            &[100.0, 100.0, 100.0, 100.0, 100.0, 100.0],
        )
        .unwrap()
    }

    #[test]
    fn test_default_filters() {
        let bank = FilterBank::evaluate(&raw(), &FilterParams::default());
        assert_eq!(bank.mask(FilterKind::MinRatio), &[false, false, false, true, false, false]);
        assert_eq!(bank.mask(FilterKind::MaxFg), &[false, false, false, false, false, true]);
        assert_eq!(bank.mask(FilterKind::MaxBg), &[false; 6]);
        assert_eq!(bank.mask(FilterKind::MaxCv), &[false; 6]);
        assert!(!bank.max_cv_available());
        assert_eq!(bank.combined(), vec![false, false, false, true, false, true]);
    }

    #[test]
    fn test_max_bg_when_enabled() {
        let mut params = FilterParams::default();
        params.max_bg_intensity.enabled = true;
        let bank = FilterBank::evaluate(&raw(), &params);
        assert!(bank.mask(FilterKind::MaxBg)[4]);
        assert!(bank.is_filtered(4));
    }

    #[test]
    fn test_disabled_filters_reject_nothing() {
        let bank = FilterBank::evaluate(&raw(), &FilterParams::none());
        assert!(bank.combined().iter().all(|&f| !f));
    }

    #[test]
    fn test_max_cv_with_sd_columns() {
        let raw = raw()
            .with_background_sd(
                MaskedVec::from_values(vec![10.0, 600.0, 10.0, 10.0, 10.0, 10.0]),
                MaskedVec::from_options(&[Some(10.0), Some(10.0), None, Some(10.0), Some(10.0), Some(10.0)]),
            )
            .unwrap();
        let bank = FilterBank::evaluate(&raw, &FilterParams::default());
        assert!(bank.max_cv_available());
        assert_eq!(bank.mask(FilterKind::MaxCv), &[false, true, true, false, false, false]);
    }

    #[test]
    fn test_missing_value_rejects() {
        let raw = RawIntensities::new(
            MaskedVec::from_options(&[Some(1000.0), None]),
            MaskedVec::from_values(vec![1000.0, 1000.0]),
            MaskedVec::from_values(vec![10.0, 10.0]),
            MaskedVec::from_values(vec![10.0, 10.0]),
            None,
            None,
        )
        .unwrap();
        let bank = FilterBank::evaluate(&raw, &FilterParams::default());
        assert_eq!(bank.mask(FilterKind::MinRatio), &[false, true]);
        assert_eq!(bank.mask(FilterKind::MaxFg), &[false, true]);
    }

    #[test]
    fn test_summary_counts() {
        let bank = FilterBank::evaluate(&raw(), &FilterParams::default());
        let classes = vec![
            WeightClass::Normalization,
            WeightClass::Normalization,
            WeightClass::Other,
            WeightClass::Normalization,
            WeightClass::Negative,
            WeightClass::Other,
        ];
        let summary = bank.summary(&classes);
        assert_eq!(summary.min_ratio, FilterCount { controls: 1, others: 0 });
        assert_eq!(summary.max_fg, FilterCount { controls: 0, others: 1 });
        assert_eq!(summary.controls_total, 3);
        assert_eq!(summary.controls_accepted, 2);
        assert_eq!(summary.others_total, 3);
        assert_eq!(summary.others_filtered, 1);
    }

    #[test]
    fn test_validate_rejects_negative() {
        let mut params = FilterParams::default();
        params.max_fg_intensity.value = -1.0;
        assert!(params.validate().is_err());
        assert!(FilterParams::default().validate().is_ok());
    }
}
