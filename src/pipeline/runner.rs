//! Normalization session: configuration, annotation and output assembly.

use crate::data::{
    ColumnMapping, MaskedVec, OutputTable, ProbeAnnotationTable, SpotTable,
};
use crate::error::{NormError, Result};
use crate::filter::{FilterParams, FilterSummary};
use crate::merge::{
    concat_text, count_per_group, merge_numeric, Grouping, MergeLevel, MergeParams,
};
use crate::normalize::{
    CurveSummary, Diagnostic, EngineConfig, NormParams, NormalizationEngine, YScale,
};
use crate::probe::{ProbeCatalog, ProbeKey};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

/// Optional output columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// `ID alias` column.
    pub id_alias: bool,
    /// Expected ratio of controls (`ratio`).
    pub control_ratio: bool,
    /// Fit weight (`weight`).
    pub weight: bool,
    /// `numProbes_all` and `numProbes_accepted`.
    pub num_probes: bool,
    /// `netSmpl` and `netRef`.
    pub net_intensities: bool,
    /// `A`.
    pub a: bool,
    /// `M_raw`.
    pub m_raw: bool,
    /// `M_normalized_centered`, plus `M_raw_centered` when `m_raw` is on.
    pub m_centered: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            id_alias: true,
            control_ratio: true,
            weight: true,
            num_probes: true,
            net_intensities: true,
            a: true,
            m_raw: true,
            m_centered: true,
        }
    }
}

impl OutputOptions {
    /// Only the identifiers and `M_normalized`.
    pub fn minimal() -> Self {
        Self {
            id_alias: false,
            control_ratio: false,
            weight: false,
            num_probes: false,
            net_intensities: false,
            a: false,
            m_raw: false,
            m_centered: false,
        }
    }
}

/// Complete configuration of a normalization run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub subtract_background: bool,
    pub y_scale: YScale,
    pub filter: FilterParams,
    pub normalization: NormParams,
    pub merge: MergeParams,
    pub output: OutputOptions,
}

impl NormalizeConfig {
    /// Load from YAML string. Missing fields keep their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(NormError::from)
    }

    pub fn validate(&self) -> Result<()> {
        self.engine_config().validate()
    }

    /// The part of the configuration the engine consumes.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            subtract_background: self.subtract_background,
            y_scale: self.y_scale,
            filter: self.filter,
            normalization: self.normalization,
        }
    }
}

/// An extra input column carried to the output.
#[derive(Debug, Clone)]
struct ExtraColumn {
    name: String,
    text: Vec<String>,
    numeric: Option<MaskedVec>,
}

/// Counts and diagnostics of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub n_spots: usize,
    pub n_probes: usize,
    pub normalized_spots: usize,
    pub filters: FilterSummary,
    pub curves: Vec<CurveSummary>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunSummary {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(NormError::from)
    }

    /// Human-readable report.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let f = &self.filters;
        let _ = writeln!(out, "Spots: {} in {} probes", self.n_spots, self.n_probes);
        let _ = writeln!(
            out,
            "Controls: {} accepted, {} filtered; others: {} accepted, {} filtered",
            f.controls_accepted, f.controls_filtered, f.others_accepted, f.others_filtered
        );
        for (name, c) in [
            ("max CV", f.max_cv),
            ("min intensity ratio", f.min_ratio),
            ("max FG intensity", f.max_fg),
            ("max BG intensity", f.max_bg),
        ] {
            let _ = writeln!(out, "  {:<20} controls {:>6}  others {:>6}", name, c.controls, c.others);
        }
        for c in &self.curves {
            let status = if c.fitted { "fitted" } else { "not fitted" };
            let _ = writeln!(
                out,
                "Curve {}: {} ({} fit points, {}/{} controls accepted, {} spots adjusted)",
                c.key, status, c.fit_points, c.controls_accepted, c.controls_total, c.adjusted_accepted
            );
        }
        let _ = writeln!(out, "Normalized spots: {}", self.normalized_spots);
        for d in &self.diagnostics {
            let _ = writeln!(out, "Warning: {:?}", d);
        }
        out
    }
}

/// Facade over the engine: build from a spot table, annotate probes,
/// normalize and assemble the output table.
#[derive(Debug, Clone)]
pub struct NormalizationSession {
    engine: NormalizationEngine,
    id_b_name: Option<String>,
    extra: Vec<ExtraColumn>,
    merge: MergeParams,
    output: OutputOptions,
}

impl NormalizationSession {
    /// Build a session from a spot table.
    ///
    /// # Arguments
    /// * `table` - Raw scan with one row per spot
    /// * `mapping` - Which columns hold identifiers and intensities
    /// * `config` - Filter, normalization, merge and output settings
    pub fn from_table(table: &SpotTable, mapping: &ColumnMapping, config: &NormalizeConfig) -> Result<Self> {
        config.validate()?;
        let raw = mapping.raw_intensities(table)?;
        let catalog = ProbeCatalog::from_table(table, &mapping.id_a, mapping.id_b.as_deref())?;
        info!(
            "loaded {} spots in {} probes",
            catalog.n_spots(),
            catalog.len()
        );

        let mut extra = Vec::with_capacity(mapping.others.len());
        for name in &mapping.others {
            let numeric = if table.is_numeric_column(name) {
                Some(table.numeric_column(name)?)
            } else {
                None
            };
            extra.push(ExtraColumn {
                name: name.clone(),
                text: table.text_column(name)?,
                numeric,
            });
        }

        Ok(Self {
            engine: NormalizationEngine::new(catalog, raw, config.engine_config())?,
            id_b_name: mapping.id_b.clone(),
            extra,
            merge: config.merge,
            output: config.output,
        })
    }

    pub fn engine(&self) -> &NormalizationEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut NormalizationEngine {
        &mut self.engine
    }

    pub fn merge_params(&self) -> &MergeParams {
        &self.merge
    }

    pub fn set_merge_params(&mut self, merge: MergeParams) {
        self.merge = merge;
    }

    pub fn set_output_options(&mut self, output: OutputOptions) {
        self.output = output;
    }

    /// Apply all settings of a configuration.
    pub fn set_config(&mut self, config: &NormalizeConfig) -> Result<()> {
        self.engine.set_config(config.engine_config())?;
        self.merge = config.merge;
        self.output = config.output;
        Ok(())
    }

    /// Apply ratio, marker and alias annotations.
    ///
    /// A row applies to the probe with the exact key, else to every probe
    /// whose identifiers contain the row's identifiers. Rows matching no
    /// probe make the whole table fail before anything is applied.
    ///
    /// # Returns
    /// The number of probe updates performed.
    pub fn apply_annotations(&mut self, annotations: &ProbeAnnotationTable) -> Result<usize> {
        let catalog = self.engine.catalog();
        let mut matched: Vec<Vec<ProbeKey>> = Vec::with_capacity(annotations.len());
        let mut unmatched = Vec::new();
        for row in annotations.rows() {
            let b = row.id_b.as_deref().unwrap_or("");
            let key = ProbeKey::new(row.id_a.as_str(), b);
            let keys = if catalog.get(&key).is_some() {
                vec![key.clone()]
            } else {
                catalog.keys_matching(&row.id_a, b)
            };
            if keys.is_empty() {
                unmatched.push(key.to_string());
            }
            matched.push(keys);
        }
        if !unmatched.is_empty() {
            warn!("annotation rows match no probe: {}", unmatched.join(", "));
            return Err(NormError::InputShapeMismatch {
                what: "annotation rows matching a probe".to_string(),
                expected: annotations.len(),
                actual: annotations.len() - unmatched.len(),
            });
        }

        let mut updates = 0;
        for (row, keys) in annotations.rows().iter().zip(matched) {
            for key in keys {
                self.engine.set_ratio(&key, &row.ratio)?;
                self.engine.assign_marker(&key, row.marker)?;
                if let Some(alias) = &row.id_a_alias {
                    self.engine.set_alias(&key, alias)?;
                }
                updates += 1;
            }
        }
        info!("applied {} annotation rows to {} probes", annotations.len(), updates);
        Ok(updates)
    }

    /// Current probe annotations, sorted by key.
    pub fn export_annotations(&self) -> ProbeAnnotationTable {
        ProbeAnnotationTable::from_catalog(self.engine.catalog())
    }

    /// Normalize and build the output table.
    ///
    /// # Returns
    /// `InsufficientData` when every spot is filtered out.
    pub fn run(&mut self) -> Result<OutputTable> {
        let filtered = self.engine.filter_mask();
        if !filtered.is_empty() && filtered.iter().all(|&f| f) {
            return Err(NormError::InsufficientData(
                "every spot is rejected by the filters".to_string(),
            ));
        }
        self.engine.fit_normalization_curves()?;

        let grouping = Grouping::new(self.merge.level, self.engine.catalog());
        let agg = self.merge.aggregator;
        let merge = |v: &MaskedVec| merge_numeric(v, &grouping, agg);
        let n = self.engine.n_spots();
        let all = vec![true; n];
        let mut table = OutputTable::new();

        let catalog = self.engine.catalog();
        let reps = grouping.representatives();
        let mut val_a = Vec::with_capacity(n);
        let mut val_b = Vec::with_capacity(n);
        let mut alias = Vec::with_capacity(n);
        for i in 0..n {
            match catalog.probe_of_spot(i) {
                Some(p) => {
                    val_a.push(p.val_a().to_string());
                    val_b.push(p.val_b().to_string());
                    alias.push(p.val_a_alias.clone());
                }
                None => {
                    val_a.push(String::new());
                    val_b.push(String::new());
                    alias.push(String::new());
                }
            }
        }

        table.push_text("ID", reps.iter().map(|&i| val_a[i].clone()).collect())?;
        if self.output.id_alias {
            table.push_text("ID alias", concat_text(&alias, &grouping, true))?;
        }
        if let Some(name) = &self.id_b_name {
            if self.merge.level != MergeLevel::ByA {
                table.push_text(name.as_str(), reps.iter().map(|&i| val_b[i].clone()).collect())?;
            }
        }

        let m_norm = self.engine.normalized_m_uncentered()?;
        table.push_numeric("M_normalized", merge(&m_norm))?;

        if self.output.control_ratio {
            table.push_numeric("ratio", merge(self.engine.ratio()))?;
        }
        if self.output.weight {
            table.push_numeric("weight", merge(self.engine.weight()))?;
        }
        if self.output.num_probes {
            let accepted: Vec<bool> = filtered.iter().map(|f| !f).collect();
            table.push_numeric("numProbes_all", count_per_group(&all, &grouping))?;
            table.push_numeric("numProbes_accepted", count_per_group(&accepted, &grouping))?;
        }
        if self.output.net_intensities {
            let (net_s, net_r) = self.engine.net_intensities();
            table.push_numeric("netSmpl", merge(&net_s))?;
            table.push_numeric("netRef", merge(&net_r))?;
        }
        if self.output.a || self.output.m_raw {
            let (a, m_raw) = self.engine.compute_am(&all, false)?;
            if self.output.a {
                table.push_numeric("A", merge(&a))?;
            }
            if self.output.m_raw {
                table.push_numeric("M_raw", merge(&m_raw))?;
                if self.output.m_centered {
                    let (_, m_centered) = self.engine.compute_am(&all, true)?;
                    table.push_numeric("M_raw_centered", merge(&m_centered))?;
                }
            }
        }
        if self.output.m_centered {
            let centered = self.engine.normalized_m()?;
            table.push_numeric("M_normalized_centered", merge(&centered))?;
        }

        for col in &self.extra {
            match (&col.numeric, self.merge.non_continuous.aggregator()) {
                (Some(values), Some(other_agg)) => {
                    table.push_numeric(col.name.as_str(), merge_numeric(values, &grouping, other_agg))?;
                }
                _ => {
                    table.push_text(
                        format!("{} list", col.name),
                        concat_text(&col.text, &grouping, self.merge.deduplicate),
                    )?;
                }
            }
        }

        info!(
            "wrote {} rows ({:?} merge) with {} columns",
            table.n_rows(),
            self.merge.level,
            table.n_cols()
        );
        Ok(table)
    }

    /// Filter and curve accounting for the current settings.
    pub fn summary(&mut self) -> Result<RunSummary> {
        let filters = self.engine.filter_summary();
        let curves = self.engine.curve_summaries()?.to_vec();
        let normalized_spots = self.engine.normalized_m()?.count_present();
        Ok(RunSummary {
            n_spots: self.engine.n_spots(),
            n_probes: self.engine.catalog().len(),
            normalized_spots,
            filters,
            curves,
            diagnostics: self.engine.diagnostics().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCAN: &str = "ID\tType\tSmpl raw med\tRef raw med\tSmpl background med\tRef background med\tNote\n\
c1\tctl\t2000\t1000\t50\t50\tx\n\
c2\tctl\t4000\t2000\t50\t50\ty\n\
c3\tctl\t8000\t4000\t50\t50\tx\n\
g1\tsmp\t3000\t1000\t50\t50\tx\n\
g1\tsmp\t6000\t2000\t50\t50\tz\n";

    fn session(config: &NormalizeConfig) -> NormalizationSession {
        let table = SpotTable::from_reader(SCAN.as_bytes()).unwrap();
        let mapping = ColumnMapping::detect(table.headers())
            .unwrap()
            .with_id_b("Type")
            .with_others(vec!["Note".to_string()]);
        NormalizationSession::from_table(&table, &mapping, config).unwrap()
    }

    fn annotations() -> ProbeAnnotationTable {
        ProbeAnnotationTable::from_reader("idA\tidB\tratio\nc\tctl\t1\n".as_bytes()).unwrap()
    }

    #[test]
    fn test_config_yaml_partial() {
        let config = NormalizeConfig::from_yaml(
            "subtract_background: true\nnormalization:\n  approx_function: median\nmerge:\n  level: none\n",
        )
        .unwrap();
        assert!(config.subtract_background);
        assert_eq!(config.merge.level, MergeLevel::None);
        assert_eq!(config.normalization.loess_window_pct, 60);
        assert!(config.filter.min_intensity_ratio.enabled);

        let back = NormalizeConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_config_validation() {
        let err = NormalizeConfig::from_yaml("normalization:\n  loess_iter: 11\n");
        assert!(matches!(err, Err(NormError::InvalidParameter(_))));
    }

    #[test]
    fn test_partial_key_annotation() {
        let mut s = session(&NormalizeConfig::default());
        let updates = s.apply_annotations(&annotations()).unwrap();
        assert_eq!(updates, 3);
        assert_eq!(s.engine().ratio().count_present(), 3);
    }

    #[test]
    fn test_unknown_annotation_is_fatal() {
        let mut s = session(&NormalizeConfig::default());
        let table = ProbeAnnotationTable::from_reader("idA\tratio\nc1\t2\nnope\t1\n".as_bytes()).unwrap();
        assert!(matches!(
            s.apply_annotations(&table),
            Err(NormError::InputShapeMismatch { expected: 2, actual: 1, .. })
        ));
        assert_eq!(s.engine().ratio().count_present(), 0);
    }

    #[test]
    fn test_run_merges_by_a() {
        let mut config = NormalizeConfig::default();
        config.normalization.approx_function = crate::normalize::ApproxFunction::Median;
        let mut s = session(&config);
        s.apply_annotations(&annotations()).unwrap();

        let out = s.run().unwrap();
        assert_eq!(out.n_rows(), 4);
        assert_eq!(out.text("ID").unwrap(), &["c1", "c2", "c3", "g1"]);
        assert!(out.column("Type").is_none());

        let m = out.numeric("M_normalized").unwrap();
        assert!((m.get(0).unwrap()).abs() < 1e-9);
        assert!((m.get(3).unwrap() - (1.5f64.log2())).abs() < 1e-9);
        assert_eq!(out.numeric("numProbes_all").unwrap().get(3), Some(2.0));
        assert_eq!(out.text("Note list").unwrap()[3], "x, z");
    }

    #[test]
    fn test_run_all_filtered() {
        let mut config = NormalizeConfig::default();
        config.filter.max_fg_intensity.value = 10.0;
        let mut s = session(&config);
        assert!(matches!(s.run(), Err(NormError::InsufficientData(_))));
    }

    #[test]
    fn test_summary() {
        let mut s = session(&NormalizeConfig::default());
        s.apply_annotations(&annotations()).unwrap();
        let summary = s.summary().unwrap();
        assert_eq!(summary.n_spots, 5);
        assert_eq!(summary.n_probes, 4);
        assert_eq!(summary.filters.controls_total, 3);
        assert!(summary.to_text().contains("Spots: 5 in 4 probes"));
        assert!(summary.to_json().unwrap().contains("\"n_probes\": 4"));
    }
}
