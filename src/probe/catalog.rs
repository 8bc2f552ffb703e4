//! Catalog of probe sets keyed by `(a, b)`, with grouping views over spots.

use crate::data::{Marker, SpotTable};
use crate::error::{NormError, Result};
use crate::probe::{ProbeKey, ProbeSet, WeightClass};
use std::collections::HashMap;

/// All probe sets of one array, in order of first appearance.
///
/// Every spot belongs to exactly one probe set. Grouping by `a` alone or by
/// `b` alone is provided as views over the same index sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeCatalog {
    probes: Vec<ProbeSet>,
    index: HashMap<ProbeKey, usize>,
    spot_probe: Vec<usize>,
}

impl ProbeCatalog {
    /// Build the catalog from per-spot identifiers.
    ///
    /// # Arguments
    /// * `val_a` - Mandatory identifier of every spot
    /// * `val_b` - Optional secondary identifier, same length as `val_a`
    pub fn ingest(val_a: &[String], val_b: Option<&[String]>) -> Result<Self> {
        if let Some(b) = val_b {
            if b.len() != val_a.len() {
                return Err(NormError::InputShapeMismatch {
                    what: "secondary identifier column".to_string(),
                    expected: val_a.len(),
                    actual: b.len(),
                });
            }
        }

        let mut catalog = Self::default();
        for (spot, a) in val_a.iter().enumerate() {
            let b = val_b.map_or("", |b| b[spot].as_str());
            let key = ProbeKey::new(a.as_str(), b);
            let probe_idx = match catalog.index.get(&key).copied() {
                Some(idx) => idx,
                None => {
                    catalog.probes.push(ProbeSet::new(key.clone()));
                    catalog.index.insert(key, catalog.probes.len() - 1);
                    catalog.probes.len() - 1
                }
            };
            catalog.probes[probe_idx].add_spot(spot);
            catalog.spot_probe.push(probe_idx);
        }
        Ok(catalog)
    }

    /// Build the catalog from identifier columns of a spot table.
    pub fn from_table(table: &SpotTable, id_a: &str, id_b: Option<&str>) -> Result<Self> {
        let a = table.text_column(id_a)?;
        let b = id_b.map(|name| table.text_column(name)).transpose()?;
        Self::ingest(&a, b.as_deref())
    }

    /// Number of probe sets.
    #[inline]
    pub fn len(&self) -> usize {
        self.probes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Number of spots covered.
    #[inline]
    pub fn n_spots(&self) -> usize {
        self.spot_probe.len()
    }

    /// Probe sets in order of first appearance.
    pub fn iter(&self) -> impl Iterator<Item = &ProbeSet> {
        self.probes.iter()
    }

    pub fn probes(&self) -> &[ProbeSet] {
        &self.probes
    }

    pub fn get(&self, key: &ProbeKey) -> Option<&ProbeSet> {
        self.index.get(key).map(|&i| &self.probes[i])
    }

    fn get_mut(&mut self, key: &ProbeKey) -> Result<&mut ProbeSet> {
        match self.index.get(key) {
            Some(&i) => Ok(&mut self.probes[i]),
            None => Err(NormError::UnknownProbe(key.to_string())),
        }
    }

    /// Probe set owning a spot.
    pub fn probe_of_spot(&self, spot: usize) -> Option<&ProbeSet> {
        self.spot_probe.get(spot).map(|&i| &self.probes[i])
    }

    /// Weight class of every spot.
    pub fn spot_weight_classes(&self) -> Vec<WeightClass> {
        self.spot_probe
            .iter()
            .map(|&i| self.probes[i].weight_class())
            .collect()
    }

    /// Set the ratio annotation of a probe. Returns true when it changed.
    pub fn set_ratio(&mut self, key: &ProbeKey, expr: &str) -> Result<bool> {
        Ok(self.get_mut(key)?.set_ratio_expr(expr))
    }

    pub fn assign_marker(&mut self, key: &ProbeKey, marker: Marker) -> Result<()> {
        self.get_mut(key)?.marker = marker;
        Ok(())
    }

    pub fn set_alias(&mut self, key: &ProbeKey, alias: &str) -> Result<()> {
        self.get_mut(key)?.val_a_alias = alias.to_string();
        Ok(())
    }

    /// Keys whose `a` contains `a_sub` and whose `b` contains `b_sub`; when no
    /// probe matches both, keys whose `a` contains `a_sub`.
    pub fn keys_matching(&self, a_sub: &str, b_sub: &str) -> Vec<ProbeKey> {
        if a_sub.is_empty() {
            return Vec::new();
        }
        let by_a: Vec<&ProbeSet> = self
            .probes
            .iter()
            .filter(|p| p.val_a().contains(a_sub))
            .collect();
        let by_ab: Vec<ProbeKey> = if b_sub.is_empty() {
            Vec::new()
        } else {
            by_a.iter()
                .filter(|p| p.val_b().contains(b_sub))
                .map(|p| p.key().clone())
                .collect()
        };
        if by_ab.is_empty() {
            by_a.into_iter().map(|p| p.key().clone()).collect()
        } else {
            by_ab
        }
    }

    /// Spot indices per probe set (one group per distinct `(a, b)`).
    pub fn groups_by_ab(&self) -> Vec<Vec<usize>> {
        self.probes.iter().map(|p| p.data_indices().to_vec()).collect()
    }

    /// Spot indices per distinct `a`, in order of first appearance.
    pub fn groups_by_a(&self) -> Vec<(String, Vec<usize>)> {
        self.group_spots_by(|p| p.val_a())
    }

    /// Spot indices per distinct `b`, in order of first appearance.
    pub fn groups_by_b(&self) -> Vec<(String, Vec<usize>)> {
        self.group_spots_by(|p| p.val_b())
    }

    fn group_spots_by<F>(&self, label: F) -> Vec<(String, Vec<usize>)>
    where
        F: Fn(&ProbeSet) -> &str,
    {
        let mut order: Vec<(String, Vec<usize>)> = Vec::new();
        let mut position: HashMap<String, usize> = HashMap::new();
        for (spot, &probe_idx) in self.spot_probe.iter().enumerate() {
            let name = label(&self.probes[probe_idx]);
            match position.get(name) {
                Some(&g) => order[g].1.push(spot),
                None => {
                    position.insert(name.to_string(), order.len());
                    order.push((name.to_string(), vec![spot]));
                }
            }
        }
        order
    }

    /// Probe sets whose `b` equals `b`.
    pub fn probes_with_b(&self, b: &str) -> Vec<ProbeKey> {
        self.probes
            .iter()
            .filter(|p| p.val_b() == b)
            .map(|p| p.key().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn catalog() -> ProbeCatalog {
        let a = strings(&["g1", "g1", "g2", "g1", "g3"]);
        let b = strings(&["t", "t", "t", "u", "u"]);
        ProbeCatalog::ingest(&a, Some(&b)).unwrap()
    }

    #[test]
    fn test_ingest_groups_replicates() {
        let cat = catalog();
        assert_eq!(cat.len(), 4);
        assert_eq!(cat.n_spots(), 5);
        let g1t = cat.get(&ProbeKey::new("g1", "t")).unwrap();
        assert_eq!(g1t.data_indices(), &[0, 1]);
        assert_eq!(cat.probe_of_spot(3).unwrap().key(), &ProbeKey::new("g1", "u"));

        let mut covered: Vec<usize> = cat.iter().flat_map(|p| p.data_indices().to_vec()).collect();
        covered.sort();
        assert_eq!(covered, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_ingest_without_b() {
        let cat = ProbeCatalog::ingest(&strings(&["x", "y", "x"]), None).unwrap();
        assert_eq!(cat.len(), 2);
        assert_eq!(cat.get(&ProbeKey::from_a("x")).unwrap().data_indices(), &[0, 2]);
    }

    #[test]
    fn test_ingest_length_mismatch() {
        let err = ProbeCatalog::ingest(&strings(&["x", "y"]), Some(&strings(&["t"])));
        assert!(matches!(err, Err(NormError::InputShapeMismatch { .. })));
    }

    #[test]
    fn test_grouping_views() {
        let cat = catalog();
        assert_eq!(cat.groups_by_ab(), vec![vec![0, 1], vec![2], vec![3], vec![4]]);
        assert_eq!(
            cat.groups_by_a(),
            vec![
                ("g1".to_string(), vec![0, 1, 3]),
                ("g2".to_string(), vec![2]),
                ("g3".to_string(), vec![4]),
            ]
        );
        assert_eq!(
            cat.groups_by_b(),
            vec![("t".to_string(), vec![0, 1, 2]), ("u".to_string(), vec![3, 4])]
        );
    }

    #[test]
    fn test_set_ratio_and_weight_classes() {
        let mut cat = catalog();
        assert!(cat.set_ratio(&ProbeKey::new("g1", "t"), "2").unwrap());
        cat.set_ratio(&ProbeKey::new("g2", "t"), "-").unwrap();
        assert_eq!(
            cat.spot_weight_classes(),
            vec![
                WeightClass::Normalization,
                WeightClass::Normalization,
                WeightClass::Negative,
                WeightClass::Other,
                WeightClass::Other,
            ]
        );
        assert!(matches!(
            cat.set_ratio(&ProbeKey::new("nope", ""), "1"),
            Err(NormError::UnknownProbe(_))
        ));
    }

    #[test]
    fn test_keys_matching() {
        let cat = catalog();
        assert_eq!(cat.keys_matching("g1", "u"), vec![ProbeKey::new("g1", "u")]);
        assert_eq!(
            cat.keys_matching("g1", "zzz"),
            vec![ProbeKey::new("g1", "t"), ProbeKey::new("g1", "u")]
        );
        assert_eq!(cat.keys_matching("g", "u").len(), 2);
        assert!(cat.keys_matching("q", "").is_empty());
    }
}
