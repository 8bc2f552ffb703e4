//! Probe identities, ratio expressions and the probe catalog.

mod catalog;
mod probe_set;

pub use catalog::ProbeCatalog;
pub use probe_set::{ProbeKey, ProbeSet, RatioExpr, WeightClass};
