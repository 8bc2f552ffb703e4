//! The normalization engine.
//!
//! Owns the probe catalog, the raw intensities and the per-spot ratio and
//! weight arrays derived from the catalog. Filters and curves are computed
//! lazily: any change to data or parameters marks the curves dirty, and
//! the next request refits them.
//!
//! Internally every M value is kept as a log2 ratio. Normalized M is stored
//! without the control-ratio centering; centering and the output scale are
//! applied when values are requested.

use crate::data::{MaskedVec, Marker, RawIntensities};
use crate::error::{NormError, Result};
use crate::filter::{FilterBank, FilterKind, FilterParams, FilterSummary};
use crate::normalize::approx::approximate;
use crate::normalize::{
    CurveKey, CurveRegistry, CurveSummary, CurveZone, EngineConfig, NormParams, YScale,
};
use crate::probe::{ProbeCatalog, ProbeKey, WeightClass};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Readiness of the fitted curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveState {
    Dirty,
    Fitting,
    Clean,
}

/// A recoverable condition met while filtering or fitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// A filter needs columns that are absent; it rejects nothing.
    FilterUnavailable { filter: FilterKind, reason: String },
    /// The line fit was singular and solved with the pseudoinverse.
    SingularFit { curve: CurveKey },
    /// A curve had no usable fit point; its spots stay unnormalized.
    InsufficientData { curve: CurveKey, reason: String },
}

/// Two-color normalization state for one array.
#[derive(Debug, Clone)]
pub struct NormalizationEngine {
    catalog: ProbeCatalog,
    raw: RawIntensities,
    config: EngineConfig,
    ratio: MaskedVec,
    weight: MaskedVec,
    filters: Option<FilterBank>,
    state: CurveState,
    curve_at: MaskedVec,
    zones: Vec<Option<CurveZone>>,
    m_norm: MaskedVec,
    summaries: Vec<CurveSummary>,
    diagnostics: Vec<Diagnostic>,
}

impl NormalizationEngine {
    /// Create an engine over a catalog and its raw intensities.
    ///
    /// # Returns
    /// `InputShapeMismatch` when the catalog and the intensities cover a
    /// different number of spots; `InvalidParameter` for a bad config.
    pub fn new(catalog: ProbeCatalog, raw: RawIntensities, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        check_spots(&catalog, &raw)?;
        let n = raw.len();
        let mut engine = Self {
            catalog,
            raw,
            config,
            ratio: MaskedVec::missing_all(n),
            weight: MaskedVec::missing_all(n),
            filters: None,
            state: CurveState::Dirty,
            curve_at: MaskedVec::missing_all(n),
            zones: vec![None; n],
            m_norm: MaskedVec::missing_all(n),
            summaries: Vec::new(),
            diagnostics: Vec::new(),
        };
        engine.derive_probe_arrays();
        Ok(engine)
    }

    // ------------------------------------------------------------------
    // accessors

    pub fn catalog(&self) -> &ProbeCatalog {
        &self.catalog
    }

    pub fn raw(&self) -> &RawIntensities {
        &self.raw
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn n_spots(&self) -> usize {
        self.raw.len()
    }

    pub fn state(&self) -> CurveState {
        self.state
    }

    /// Expected ratio per spot; missing for non-controls.
    pub fn ratio(&self) -> &MaskedVec {
        &self.ratio
    }

    /// Fit weight per spot; missing for negative controls.
    pub fn weight(&self) -> &MaskedVec {
        &self.weight
    }

    /// Diagnostics of the last filter evaluation and curve fit.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    // ------------------------------------------------------------------
    // mutation

    fn invalidate(&mut self, reason: &str) {
        if self.state != CurveState::Dirty {
            debug!("normalization curves invalidated: {}", reason);
        }
        self.state = CurveState::Dirty;
    }

    fn invalidate_filters(&mut self, reason: &str) {
        self.filters = None;
        self.invalidate(reason);
    }

    /// Replace the raw intensities.
    pub fn set_raw_data(&mut self, raw: RawIntensities) -> Result<()> {
        check_spots(&self.catalog, &raw)?;
        self.raw = raw;
        self.invalidate_filters("raw data replaced");
        Ok(())
    }

    pub fn set_subtract_background(&mut self, subtract: bool) {
        if self.config.subtract_background != subtract {
            self.config.subtract_background = subtract;
            self.invalidate("background subtraction changed");
        }
    }

    pub fn set_filter_params(&mut self, params: FilterParams) -> Result<()> {
        params.validate()?;
        if self.config.filter != params {
            self.config.filter = params;
            self.invalidate_filters("filter parameters changed");
        }
        Ok(())
    }

    pub fn set_norm_params(&mut self, params: NormParams) -> Result<()> {
        params.validate()?;
        let old = self.config.normalization;
        if old == params {
            return Ok(());
        }
        self.config.normalization = params;
        if old.effective_other_weight() != params.effective_other_weight() {
            self.derive_probe_arrays();
        }
        self.invalidate("normalization parameters changed");
        Ok(())
    }

    /// Output scale only; the fit is unaffected.
    pub fn set_y_scale(&mut self, y_scale: YScale) {
        self.config.y_scale = y_scale;
    }

    pub fn set_config(&mut self, config: EngineConfig) -> Result<()> {
        config.validate()?;
        self.set_subtract_background(config.subtract_background);
        self.set_y_scale(config.y_scale);
        self.set_filter_params(config.filter)?;
        self.set_norm_params(config.normalization)
    }

    /// Set the ratio annotation of a probe.
    ///
    /// A positive number makes it a normalization control, `-` a negative
    /// control, anything else an ordinary probe.
    pub fn set_ratio(&mut self, key: &ProbeKey, expr: &str) -> Result<()> {
        if self.catalog.set_ratio(key, expr)? {
            self.derive_probe_arrays();
            self.invalidate("probe ratio changed");
        }
        Ok(())
    }

    pub fn assign_marker(&mut self, key: &ProbeKey, marker: Marker) -> Result<()> {
        self.catalog.assign_marker(key, marker)
    }

    pub fn set_alias(&mut self, key: &ProbeKey, alias: &str) -> Result<()> {
        self.catalog.set_alias(key, alias)
    }

    /// Rebuild `ratio` and `weight` from the catalog.
    fn derive_probe_arrays(&mut self) {
        let other_weight = self.config.normalization.effective_other_weight();
        for probe in self.catalog.iter() {
            let idx = probe.data_indices();
            let (ratio, weight) = match probe.weight_class() {
                WeightClass::Normalization => (probe.ratio().ratio(), Some(1.0)),
                WeightClass::Negative => (None, None),
                WeightClass::Other => (None, Some(other_weight)),
            };
            self.ratio.put(idx, ratio);
            self.weight.put(idx, weight);
        }
    }

    // ------------------------------------------------------------------
    // filters

    /// Filter bank for the current data, evaluated on first use.
    pub fn filter(&mut self) -> &FilterBank {
        let raw = &self.raw;
        let params = &self.config.filter;
        self.filters
            .get_or_insert_with(|| FilterBank::evaluate(raw, params))
    }

    /// Reject flag of every spot.
    pub fn filter_mask(&mut self) -> Vec<bool> {
        self.filter().combined()
    }

    pub fn filter_summary(&mut self) -> FilterSummary {
        let classes = self.catalog.spot_weight_classes();
        self.filter().summary(&classes)
    }

    // ------------------------------------------------------------------
    // A and M

    /// Net intensities of both channels; filtered spots are missing.
    pub fn net_intensities(&mut self) -> (MaskedVec, MaskedVec) {
        let filtered = self.filter_mask();
        let flag = if self.config.subtract_background { 1.0 } else { 0.0 };
        let net = |sig: &MaskedVec, bg: &MaskedVec| {
            let mut out = MaskedVec::missing_all(sig.len());
            for i in 0..sig.len() {
                if filtered[i] {
                    continue;
                }
                if let (Some(s), Some(b)) = (sig.get(i), bg.get(i)) {
                    out.set(i, s - b * flag);
                }
            }
            out
        };
        (
            net(&self.raw.sig_smpl, &self.raw.bg_smpl),
            net(&self.raw.sig_ref, &self.raw.bg_ref),
        )
    }

    /// Effective ratio: the control's ratio, 1 elsewhere.
    fn ratio_eff(&self, i: usize) -> f64 {
        self.ratio.get(i).unwrap_or(1.0)
    }

    /// log2 A and M on the spots selected by `row_mask` and not filtered.
    fn am_log2(&mut self, row_mask: &[bool], center: bool) -> (MaskedVec, MaskedVec) {
        let (net_s, net_r) = self.net_intensities();
        let n = self.n_spots();
        let mut a = MaskedVec::missing_all(n);
        let mut m = MaskedVec::missing_all(n);
        for i in 0..n {
            if !row_mask[i] {
                continue;
            }
            if let (Some(s), Some(r)) = (net_s.get(i), net_r.get(i)) {
                if s > 0.0 && r > 0.0 {
                    a.set(i, (s * r).sqrt().log2());
                    let ratio = if center { self.ratio_eff(i) } else { 1.0 };
                    m.set(i, (s / r / ratio).log2());
                }
            }
        }
        (a, m)
    }

    /// A and M on the spots selected by `row_mask`.
    ///
    /// Filtered spots and spots without positive net intensity on both
    /// channels are missing. With `center`, M is divided by the expected
    /// ratio of controls. M is reported on the configured y scale.
    pub fn compute_am(&mut self, row_mask: &[bool], center: bool) -> Result<(MaskedVec, MaskedVec)> {
        if row_mask.len() != self.n_spots() {
            return Err(NormError::InputShapeMismatch {
                what: "row mask".to_string(),
                expected: self.n_spots(),
                actual: row_mask.len(),
            });
        }
        let (a, m) = self.am_log2(row_mask, center);
        let scale = self.config.y_scale;
        Ok((a, m.map(|v| Some(scale.from_log2(v)))))
    }

    // ------------------------------------------------------------------
    // curves

    fn record(&mut self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::FilterUnavailable { filter, reason } => {
                warn!("filter {} unavailable: {}", filter.name(), reason)
            }
            Diagnostic::SingularFit { curve } => {
                warn!("{} curve: singular regression, fitted with the pseudoinverse", curve)
            }
            Diagnostic::InsufficientData { curve, reason } => {
                warn!("{} curve not fitted: {}", curve, reason)
            }
        }
        self.diagnostics.push(diagnostic);
    }

    /// Fit every normalization curve and normalize the adjusted spots.
    ///
    /// Does nothing when the curves are already clean.
    pub fn fit_normalization_curves(&mut self) -> Result<()> {
        if self.state == CurveState::Clean {
            return Ok(());
        }
        self.state = CurveState::Fitting;
        match self.fit_curves() {
            Ok(()) => {
                self.state = CurveState::Clean;
                Ok(())
            }
            Err(e) => {
                self.state = CurveState::Dirty;
                Err(e)
            }
        }
    }

    fn fit_curves(&mut self) -> Result<()> {
        let n = self.n_spots();
        self.diagnostics.clear();
        self.summaries.clear();
        self.curve_at = MaskedVec::missing_all(n);
        self.zones = vec![None; n];
        self.m_norm = MaskedVec::missing_all(n);

        if self.config.filter.max_cv.enabled && !self.raw.has_background_sd() {
            self.record(Diagnostic::FilterUnavailable {
                filter: FilterKind::MaxCv,
                reason: "background standard deviation columns are absent".to_string(),
            });
        }

        let filtered = self.filter_mask();
        let all = vec![true; n];
        let (a, m_centered) = self.am_log2(&all, true);
        let (_, m_raw) = self.am_log2(&all, false);
        let classes = self.catalog.spot_weight_classes();
        let params = self.config.normalization;

        let registry = CurveRegistry::resolve(
            params.range,
            &self.catalog,
            &filtered,
            params.min_num_control_probes,
        );

        for record in registry.iter() {
            let mut summary = CurveSummary {
                key: record.key.clone(),
                approx_function: params.approx_function,
                fitted: false,
                singular: false,
                controls_total: 0,
                controls_accepted: 0,
                others_total: 0,
                others_accepted: 0,
                fit_points: 0,
                adjusted_accepted: record.adjust_indices.iter().filter(|&&i| !filtered[i]).count(),
                a_range: None,
            };

            let (mut a_fit, mut m_fit, mut w_fit) = (Vec::new(), Vec::new(), Vec::new());
            for &i in &record.fit_indices {
                let control = classes[i] == WeightClass::Normalization;
                if control {
                    summary.controls_total += 1;
                } else {
                    summary.others_total += 1;
                }
                if filtered[i] {
                    continue;
                }
                if control {
                    summary.controls_accepted += 1;
                } else {
                    summary.others_accepted += 1;
                }
                if let (Some(ai), Some(mi), Some(wi)) = (a.get(i), m_centered.get(i), self.weight.get(i)) {
                    if wi > 0.0 {
                        a_fit.push(ai);
                        m_fit.push(mi);
                        w_fit.push(wi);
                    }
                }
            }
            summary.fit_points = a_fit.len();

            let targets: Vec<usize> = record
                .adjust_indices
                .iter()
                .copied()
                .filter(|&i| a.get(i).is_some() && m_raw.get(i).is_some())
                .collect();
            let a_eval: Vec<f64> = targets.iter().filter_map(|&i| a.get(i)).collect();

            let fit = match approximate(&a_fit, &m_fit, &w_fit, &a_eval, &params) {
                Ok(fit) => fit,
                Err(NormError::InsufficientData(reason)) => {
                    self.record(Diagnostic::InsufficientData {
                        curve: record.key.clone(),
                        reason,
                    });
                    self.summaries.push(summary);
                    continue;
                }
                Err(e) => return Err(e),
            };
            if fit.singular {
                self.record(Diagnostic::SingularFit {
                    curve: record.key.clone(),
                });
            }

            let a_min = a_fit.iter().copied().fold(f64::INFINITY, f64::min);
            let a_max = a_fit.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            for (&i, &value) in targets.iter().zip(fit.values.iter()) {
                if let (Some(ai), Some(mi)) = (a.get(i), m_raw.get(i)) {
                    self.curve_at.set(i, value);
                    self.m_norm.set(i, mi - value);
                    self.zones[i] = Some(CurveZone::classify(ai, a_min, a_max));
                }
            }

            summary.fitted = true;
            summary.singular = fit.singular;
            summary.a_range = Some((a_min, a_max));
            info!(
                "{} curve: {} fit points ({} accepted controls), {} spots adjusted",
                record.key,
                summary.fit_points,
                summary.controls_accepted,
                targets.len()
            );
            self.summaries.push(summary);
        }
        Ok(())
    }

    /// Normalized M per spot, centered on the expected control ratios and
    /// reported on the configured y scale.
    ///
    /// Missing where the spot is filtered or its curve is undefined.
    pub fn normalized_m(&mut self) -> Result<MaskedVec> {
        self.normalized(true)
    }

    /// Normalized M per spot without ratio centering: controls keep their
    /// expected ratio.
    pub fn normalized_m_uncentered(&mut self) -> Result<MaskedVec> {
        self.normalized(false)
    }

    fn normalized(&mut self, center: bool) -> Result<MaskedVec> {
        self.fit_normalization_curves()?;
        let scale = self.config.y_scale;
        let mut out = MaskedVec::missing_all(self.n_spots());
        for (i, v) in self.m_norm.present() {
            let v = if center { v - self.ratio_eff(i).log2() } else { v };
            out.set(i, scale.from_log2(v));
        }
        Ok(out)
    }

    /// Curve value (log2) at every adjusted spot.
    pub fn curve_at(&mut self) -> Result<&MaskedVec> {
        self.fit_normalization_curves()?;
        Ok(&self.curve_at)
    }

    /// Interpolated/extrapolated zone of every adjusted spot.
    pub fn zones(&mut self) -> Result<&[Option<CurveZone>]> {
        self.fit_normalization_curves()?;
        Ok(&self.zones)
    }

    /// Accounting of the fitted curves, in registry order.
    pub fn curve_summaries(&mut self) -> Result<&[CurveSummary]> {
        self.fit_normalization_curves()?;
        Ok(&self.summaries)
    }
}

fn check_spots(catalog: &ProbeCatalog, raw: &RawIntensities) -> Result<()> {
    raw.validate()?;
    if catalog.n_spots() != raw.len() {
        return Err(NormError::InputShapeMismatch {
            what: "raw intensities".to_string(),
            expected: catalog.n_spots(),
            actual: raw.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{ApproxFunction, NormRange};
    use approx::assert_relative_eq;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    fn no_filters() -> EngineConfig {
        EngineConfig {
            filter: FilterParams::none(),
            ..EngineConfig::default()
        }
    }

    fn engine(sig_s: &[f64], sig_r: &[f64], config: EngineConfig) -> NormalizationEngine {
        let n = sig_s.len();
        let catalog = ProbeCatalog::ingest(&ids("p", n), None).unwrap();
        let raw = RawIntensities::from_values(sig_s, sig_r, &vec![10.0; n], &vec![10.0; n]).unwrap();
        NormalizationEngine::new(catalog, raw, config).unwrap()
    }

    fn set_all_ratios(engine: &mut NormalizationEngine, expr: &str) {
        let keys: Vec<ProbeKey> = engine.catalog().iter().map(|p| p.key().clone()).collect();
        for key in keys {
            engine.set_ratio(&key, expr).unwrap();
        }
    }

    #[test]
    fn test_probe_arrays() {
        let mut e = engine(&[100.0; 3], &[100.0; 3], no_filters());
        e.set_ratio(&ProbeKey::from_a("p0"), "2").unwrap();
        e.set_ratio(&ProbeKey::from_a("p1"), "-").unwrap();

        assert_eq!(e.ratio().get(0), Some(2.0));
        assert!(e.ratio().is_missing(1));
        assert_eq!(e.weight().get(0), Some(1.0));
        assert!(e.weight().is_missing(1));
        assert_eq!(e.weight().get(2), Some(0.0));

        let mut params = NormParams::default();
        params.include_non_control = true;
        e.set_norm_params(params).unwrap();
        assert_eq!(e.weight().get(2), Some(0.01));
        assert!(e.weight().is_missing(1));
    }

    #[test]
    fn test_constant_shift_is_removed() {
        let sig_s = [200.0, 400.0, 800.0, 1600.0, 3200.0, 6400.0];
        let sig_r: Vec<f64> = sig_s.iter().map(|s| s / 2.0).collect();
        for f in [ApproxFunction::Median, ApproxFunction::LinReg, ApproxFunction::Lowess] {
            let mut config = no_filters();
            config.normalization.approx_function = f;
            let mut e = engine(&sig_s, &sig_r, config);
            set_all_ratios(&mut e, "1");

            let norm = e.normalized_m().unwrap();
            for i in 0..6 {
                assert_relative_eq!(norm.get(i).unwrap(), 0.0, epsilon = 1e-9);
                assert_relative_eq!(e.curve_at().unwrap().get(i).unwrap(), 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_compute_am() {
        let mut e = engine(&[400.0, 0.0], &[100.0, 100.0], no_filters());
        e.set_ratio(&ProbeKey::from_a("p0"), "2").unwrap();
        let (a, m) = e.compute_am(&[true, true], false).unwrap();
        assert_relative_eq!(a.get(0).unwrap(), 200.0f64.log2(), epsilon = 1e-12);
        assert_relative_eq!(m.get(0).unwrap(), 2.0, epsilon = 1e-12);
        assert!(a.is_missing(1));

        let (_, m) = e.compute_am(&[true, true], true).unwrap();
        assert_relative_eq!(m.get(0).unwrap(), 1.0, epsilon = 1e-12);

        e.set_y_scale(YScale::Linear);
        let (_, m) = e.compute_am(&[true, false], true).unwrap();
        assert_relative_eq!(m.get(0).unwrap(), 2.0, epsilon = 1e-12);

        assert!(e.compute_am(&[true], true).is_err());
    }

    #[test]
    fn test_background_subtraction() {
        let mut e = engine(&[110.0], &[60.0], no_filters());
        let (s, r) = e.net_intensities();
        assert_eq!((s.get(0), r.get(0)), (Some(110.0), Some(60.0)));

        e.set_subtract_background(true);
        let (s, r) = e.net_intensities();
        assert_eq!((s.get(0), r.get(0)), (Some(100.0), Some(50.0)));
    }

    #[test]
    fn test_no_controls_leaves_missing() {
        let mut e = engine(&[100.0, 200.0], &[100.0, 100.0], no_filters());
        let norm = e.normalized_m().unwrap();
        assert_eq!(norm.count_present(), 0);
        assert!(matches!(
            e.diagnostics(),
            [Diagnostic::InsufficientData { curve: CurveKey::Global, .. }]
        ));
        assert_eq!(e.state(), CurveState::Clean);
    }

    #[test]
    fn test_state_machine_and_idempotence() {
        let mut e = engine(&[100.0, 200.0, 300.0], &[100.0, 150.0, 120.0], no_filters());
        set_all_ratios(&mut e, "1");
        assert_eq!(e.state(), CurveState::Dirty);

        let first = e.normalized_m().unwrap();
        assert_eq!(e.state(), CurveState::Clean);
        e.fit_normalization_curves().unwrap();
        assert_eq!(e.normalized_m().unwrap(), first);

        e.set_subtract_background(false);
        assert_eq!(e.state(), CurveState::Clean);
        e.set_subtract_background(true);
        assert_eq!(e.state(), CurveState::Dirty);
    }

    #[test]
    fn test_max_cv_unavailable_diagnostic() {
        let mut config = no_filters();
        config.filter.max_cv.enabled = true;
        let mut e = engine(&[100.0, 200.0], &[100.0, 100.0], config);
        set_all_ratios(&mut e, "1");
        e.fit_normalization_curves().unwrap();
        assert!(e.diagnostics().iter().any(|d| matches!(
            d,
            Diagnostic::FilterUnavailable { filter: FilterKind::MaxCv, .. }
        )));
        assert_eq!(e.normalized_m().unwrap().count_present(), 2);
    }

    #[test]
    fn test_zones() {
        let sig_s = [100.0, 200.0, 400.0, 50.0, 5000.0];
        let sig_r = [100.0, 200.0, 400.0, 50.0, 5000.0];
        let mut config = no_filters();
        config.normalization.range = NormRange::Global;
        let mut e = engine(&sig_s, &sig_r, config);
        for i in 0..3 {
            e.set_ratio(&ProbeKey::from_a(format!("p{}", i)), "1").unwrap();
        }
        let zones = e.zones().unwrap().to_vec();
        assert_eq!(zones[1], Some(CurveZone::Interpolated));
        assert_eq!(zones[3], Some(CurveZone::ExtrapolatedLow));
        assert_eq!(zones[4], Some(CurveZone::ExtrapolatedHigh));
    }

    #[test]
    fn test_shape_mismatch_on_raw_data() {
        let mut e = engine(&[100.0, 200.0], &[100.0, 100.0], no_filters());
        let raw = RawIntensities::from_values(&[1.0], &[1.0], &[0.0], &[0.0]).unwrap();
        assert!(matches!(e.set_raw_data(raw), Err(NormError::InputShapeMismatch { .. })));
    }
}
