//! Intensity-dependent normalization of two-color arrays.
//!
//! - **config**: curve family, grouping range and LOWESS parameters
//! - **curve**: which spots fit and which spots are adjusted by each curve
//! - **approx**: median, weighted line or weighted LOWESS through the controls
//! - **engine**: per-array state, lazy filtering and curve fitting

pub mod approx;
pub mod config;
pub mod curve;
pub mod engine;

pub use approx::{approximate, CurveFit};
pub use config::{ApproxFunction, EngineConfig, NormParams, NormRange, YScale};
pub use curve::{CurveKey, CurveRegistry, CurveSummary, CurveZone, NormCurveData};
pub use engine::{CurveState, Diagnostic, NormalizationEngine};
