//! Normalization curve registry.
//!
//! Each record names the spots used to fit a curve and the spots adjusted
//! by it. Several groups may share one record (the global curve in
//! `Combined` mode), so records are extended rather than replaced.

use crate::normalize::{ApproxFunction, NormRange};
use crate::probe::{ProbeCatalog, ProbeKey, WeightClass};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Curve identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurveKey {
    Global,
    /// Curve of one secondary-identifier group.
    Group(String),
}

impl fmt::Display for CurveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Group(b) => write!(f, "group '{}'", b),
        }
    }
}

fn extend_unique<T: Clone + Eq + std::hash::Hash>(target: &mut Vec<T>, items: &[T]) {
    let mut seen: HashSet<T> = target.iter().cloned().collect();
    for item in items {
        if seen.insert(item.clone()) {
            target.push(item.clone());
        }
    }
}

/// Fit and adjustment sets of one curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormCurveData {
    pub key: CurveKey,
    pub fit_indices: Vec<usize>,
    pub adjust_indices: Vec<usize>,
    pub probes: Vec<ProbeKey>,
}

impl NormCurveData {
    fn extend(&mut self, fit: &[usize], adjust: &[usize], probes: &[ProbeKey]) {
        extend_unique(&mut self.fit_indices, fit);
        extend_unique(&mut self.adjust_indices, adjust);
        extend_unique(&mut self.probes, probes);
    }
}

/// Curve records in creation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurveRegistry {
    records: Vec<NormCurveData>,
}

impl CurveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, or extend the existing record with the same key.
    pub fn add(&mut self, key: CurveKey, fit: &[usize], adjust: &[usize], probes: &[ProbeKey]) {
        match self.records.iter_mut().find(|r| r.key == key) {
            Some(record) => record.extend(fit, adjust, probes),
            None => {
                let mut record = NormCurveData {
                    key,
                    fit_indices: Vec::new(),
                    adjust_indices: Vec::new(),
                    probes: Vec::new(),
                };
                record.extend(fit, adjust, probes);
                self.records.push(record);
            }
        }
    }

    pub fn get(&self, key: &CurveKey) -> Option<&NormCurveData> {
        self.records.iter().find(|r| &r.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NormCurveData> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Build the records for a normalization range.
    ///
    /// # Arguments
    /// * `range` - How spots are grouped into curves
    /// * `catalog` - Probe catalog providing the secondary-identifier groups
    /// * `filtered` - Reject flag of every spot
    /// * `min_controls` - Accepted controls a group needs for its own curve
    pub fn resolve(
        range: NormRange,
        catalog: &ProbeCatalog,
        filtered: &[bool],
        min_controls: usize,
    ) -> Self {
        let mut registry = Self::new();
        let all: Vec<usize> = (0..catalog.n_spots()).collect();

        if range == NormRange::Global {
            let probes: Vec<ProbeKey> = catalog.iter().map(|p| p.key().clone()).collect();
            registry.add(CurveKey::Global, &all, &all, &probes);
            return registry;
        }

        let classes = catalog.spot_weight_classes();
        for (b, spots) in catalog.groups_by_b() {
            let probes = catalog.probes_with_b(&b);
            let accepted_controls = spots
                .iter()
                .filter(|&&i| classes[i] == WeightClass::Normalization && !filtered[i])
                .count();
            if range == NormRange::Combined && accepted_controls < min_controls {
                registry.add(CurveKey::Global, &all, &spots, &probes);
            } else {
                registry.add(CurveKey::Group(b), &spots, &spots, &probes);
            }
        }
        registry
    }
}

/// Where an adjusted spot lies relative to the fitted A range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveZone {
    Interpolated,
    ExtrapolatedLow,
    ExtrapolatedHigh,
}

impl CurveZone {
    pub fn classify(a: f64, min: f64, max: f64) -> Self {
        if a < min {
            Self::ExtrapolatedLow
        } else if a > max {
            Self::ExtrapolatedHigh
        } else {
            Self::Interpolated
        }
    }
}

/// Accounting for one fitted curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveSummary {
    pub key: CurveKey,
    pub approx_function: ApproxFunction,
    /// False when no fit point was usable.
    pub fitted: bool,
    pub singular: bool,
    /// Controls in the fit set.
    pub controls_total: usize,
    /// Controls in the fit set that survive the filters.
    pub controls_accepted: usize,
    pub others_total: usize,
    pub others_accepted: usize,
    /// Points that carried weight in the fit.
    pub fit_points: usize,
    /// Unfiltered spots in the adjustment set.
    pub adjusted_accepted: usize,
    /// A range of the fit points.
    pub a_range: Option<(f64, f64)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ProbeCatalog {
        let a: Vec<String> = (0..10).map(|i| format!("p{}", i)).collect();
        let b: Vec<String> = (0..10)
            .map(|i| if i < 3 { "alpha" } else { "beta" }.to_string())
            .collect();
        let mut cat = ProbeCatalog::ingest(&a, Some(&b)).unwrap();
        cat.set_ratio(&ProbeKey::new("p0", "alpha"), "1").unwrap();
        for i in 3..8 {
            cat.set_ratio(&ProbeKey::new(format!("p{}", i), "beta"), "1").unwrap();
        }
        cat
    }

    #[test]
    fn test_add_extends_existing() {
        let mut reg = CurveRegistry::new();
        reg.add(CurveKey::Global, &[0, 1, 2], &[0], &[]);
        reg.add(CurveKey::Global, &[1, 2, 3], &[4], &[]);
        assert_eq!(reg.len(), 1);
        let rec = reg.get(&CurveKey::Global).unwrap();
        assert_eq!(rec.fit_indices, vec![0, 1, 2, 3]);
        assert_eq!(rec.adjust_indices, vec![0, 4]);
    }

    #[test]
    fn test_resolve_global() {
        let cat = catalog();
        let reg = CurveRegistry::resolve(NormRange::Global, &cat, &[false; 10], 2);
        assert_eq!(reg.len(), 1);
        let rec = reg.get(&CurveKey::Global).unwrap();
        assert_eq!(rec.adjust_indices.len(), 10);
        assert_eq!(rec.probes.len(), 10);
    }

    #[test]
    fn test_resolve_per_group() {
        let cat = catalog();
        let reg = CurveRegistry::resolve(NormRange::PerVarB, &cat, &[false; 10], 2);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get(&CurveKey::Group("alpha".into())).unwrap().fit_indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_resolve_combined_falls_back() {
        let cat = catalog();
        let reg = CurveRegistry::resolve(NormRange::Combined, &cat, &[false; 10], 2);
        assert_eq!(reg.len(), 2);

        let global = reg.get(&CurveKey::Global).unwrap();
        assert_eq!(global.fit_indices.len(), 10);
        assert_eq!(global.adjust_indices, vec![0, 1, 2]);

        let beta = reg.get(&CurveKey::Group("beta".into())).unwrap();
        assert_eq!(beta.adjust_indices, (3..10).collect::<Vec<_>>());
        assert!(reg.get(&CurveKey::Group("alpha".into())).is_none());
    }

    #[test]
    fn test_resolve_combined_counts_accepted_only() {
        let cat = catalog();
        let mut filtered = [false; 10];
        for f in filtered.iter_mut().take(7).skip(3) {
            *f = true;
        }
        let reg = CurveRegistry::resolve(NormRange::Combined, &cat, &filtered, 2);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(&CurveKey::Global).unwrap().adjust_indices.len(), 10);
    }

    #[test]
    fn test_zone() {
        assert_eq!(CurveZone::classify(0.5, 1.0, 2.0), CurveZone::ExtrapolatedLow);
        assert_eq!(CurveZone::classify(1.5, 1.0, 2.0), CurveZone::Interpolated);
        assert_eq!(CurveZone::classify(2.0, 1.0, 2.0), CurveZone::Interpolated);
        assert_eq!(CurveZone::classify(2.5, 1.0, 2.0), CurveZone::ExtrapolatedHigh);
    }
}
