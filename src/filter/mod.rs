//! Spot quality filters.

pub mod spot;

pub use spot::{FilterBank, FilterCount, FilterKind, FilterParams, FilterSummary, FilterThreshold};
