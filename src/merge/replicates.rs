//! Merge replicate spots into one output row per spot, probe set or `a` value.

use crate::data::MaskedVec;
use crate::numeric::{mean_slice, median_slice};
use crate::probe::ProbeCatalog;
use serde::{Deserialize, Serialize};

/// What one output row stands for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeLevel {
    /// One row per spot.
    None,
    /// One row per distinct `(a, b)`.
    ByAb,
    /// One row per distinct `a`.
    #[default]
    ByA,
}

/// Reduction of the numeric values of one group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregator {
    /// Mean of the present values.
    Mean,
    /// Median of the present values.
    #[default]
    Median,
    /// Masked average: mean of the present values, missing only when every
    /// member is missing.
    MaskedAverage,
}

impl Aggregator {
    /// Reduce one group; missing when nothing can be computed.
    pub fn reduce(&self, values: &MaskedVec, members: &[usize]) -> Option<f64> {
        match self {
            Self::Mean | Self::MaskedAverage => {
                let present: Vec<f64> = members.iter().filter_map(|&i| values.get(i)).collect();
                mean_slice(&present)
            }
            Self::Median => {
                let present: Vec<f64> = members.iter().filter_map(|&i| values.get(i)).collect();
                median_slice(&present)
            }
        }
    }
}

/// How extra input columns are merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtherColumnMerge {
    Mean,
    #[default]
    Median,
    /// Join the values as text.
    Concatenate,
}

impl OtherColumnMerge {
    /// Numeric aggregator, or `None` for concatenation.
    pub fn aggregator(&self) -> Option<Aggregator> {
        match self {
            Self::Mean => Some(Aggregator::Mean),
            Self::Median => Some(Aggregator::Median),
            Self::Concatenate => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeParams {
    pub level: MergeLevel,
    /// Aggregator for intensities and log-ratios.
    pub aggregator: Aggregator,
    /// Treatment of extra numeric columns; text columns are always joined.
    pub non_continuous: OtherColumnMerge,
    /// Drop repeated values when joining text.
    pub deduplicate: bool,
}

/// Spot indices of every output row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping {
    groups: Vec<Vec<usize>>,
}

impl Grouping {
    /// Grouping view of a catalog at a merge level.
    pub fn new(level: MergeLevel, catalog: &ProbeCatalog) -> Self {
        let groups = match level {
            MergeLevel::None => (0..catalog.n_spots()).map(|i| vec![i]).collect(),
            MergeLevel::ByAb => catalog.groups_by_ab(),
            MergeLevel::ByA => catalog.groups_by_a().into_iter().map(|(_, g)| g).collect(),
        };
        Self { groups }
    }

    pub fn from_groups(groups: Vec<Vec<usize>>) -> Self {
        Self { groups }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    /// First spot of every group.
    pub fn representatives(&self) -> Vec<usize> {
        self.groups.iter().filter_map(|g| g.first().copied()).collect()
    }
}

/// Merge a numeric per-spot vector into one value per group.
pub fn merge_numeric(values: &MaskedVec, grouping: &Grouping, aggregator: Aggregator) -> MaskedVec {
    let merged: Vec<Option<f64>> = grouping
        .groups()
        .iter()
        .map(|g| aggregator.reduce(values, g))
        .collect();
    MaskedVec::from_options(&merged)
}

/// Number of members per group for which `flag` holds.
pub fn count_per_group(flags: &[bool], grouping: &Grouping) -> MaskedVec {
    let counts: Vec<f64> = grouping
        .groups()
        .iter()
        .map(|g| g.iter().filter(|&&i| flags[i]).count() as f64)
        .collect();
    MaskedVec::from_values(counts)
}

/// Join the text of every group with `", "`, after sorting and optional
/// de-duplication.
pub fn concat_text(values: &[String], grouping: &Grouping, deduplicate: bool) -> Vec<String> {
    grouping
        .groups()
        .iter()
        .map(|g| {
            let mut parts: Vec<&str> = g.iter().map(|&i| values[i].as_str()).collect();
            parts.sort_unstable();
            if deduplicate {
                parts.dedup();
            }
            parts.join(", ")
        })
        .collect()
}
