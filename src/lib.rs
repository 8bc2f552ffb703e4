//! Two-Color Microarray Normalization Library
//!
//! This library normalizes two-channel (sample/reference) microarray scans
//! against control probes whose expected expression ratio is known.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Core data structures (MaskedVec, SpotTable, OutputTable, probe annotations)
//! - **probe**: Probe catalog grouping spots by identifier
//! - **filter**: Spot quality filters (CV, signal/background ratio, saturation)
//! - **numeric**: Robust statistics and LOWESS smoothing
//! - **model**: Weighted linear regression
//! - **normalize**: Curve registry, approximation and the normalization engine
//! - **merge**: Replicate merging
//! - **pipeline**: Configuration and end-to-end sessions
//!
//! # Example
//!
//! ```no_run
//! use twocolor_norm::prelude::*;
//!
//! // Load data
//! let table = SpotTable::from_tsv("scan.tsv").unwrap();
//! let mapping = ColumnMapping::detect(table.headers()).unwrap();
//! let config = NormalizeConfig::from_file("normalize.yaml").unwrap();
//!
//! // Annotate controls and normalize
//! let mut session = NormalizationSession::from_table(&table, &mapping, &config).unwrap();
//! session
//!     .apply_annotations(&ProbeAnnotationTable::from_tsv("probes.tsv").unwrap())
//!     .unwrap();
//! let output = session.run().unwrap();
//! output.to_tsv("normalized.tsv").unwrap();
//! ```

pub mod data;
pub mod error;
pub mod filter;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod numeric;
pub mod pipeline;
pub mod probe;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::data::{
        ColumnMapping, MaskedVec, Marker, OutputTable, ProbeAnnotation, ProbeAnnotationTable,
        RawIntensities, Rgb, SpotTable,
    };
    pub use crate::error::{NormError, Result};
    pub use crate::filter::{FilterBank, FilterKind, FilterParams, FilterSummary, FilterThreshold};
    pub use crate::merge::{Aggregator, MergeLevel, MergeParams, OtherColumnMerge};
    pub use crate::model::{fit_wls, linreg_wls, WlsFit};
    pub use crate::normalize::{
        approximate, ApproxFunction, CurveKey, CurveState, CurveSummary, CurveZone, Diagnostic,
        EngineConfig, NormParams, NormRange, NormalizationEngine, YScale,
    };
    pub use crate::numeric::{lowess, LowessParams};
    pub use crate::pipeline::{NormalizationSession, NormalizeConfig, OutputOptions, RunSummary};
    pub use crate::probe::{ProbeCatalog, ProbeKey, ProbeSet, RatioExpr, WeightClass};
}
