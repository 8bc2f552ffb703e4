//! End-to-end normalization runs: configuration, probe annotation and output assembly.

mod runner;

pub use runner::{NormalizationSession, NormalizeConfig, OutputOptions, RunSummary};
