//! Error types for the twocolor-norm library.

use thiserror::Error;

/// Main error type for the library.
///
/// Only conditions that make a result meaningless are errors. Recoverable
/// numeric situations (a curve without controls, a singular regression, an
/// unavailable filter) are reported as [`crate::normalize::Diagnostic`]s.
#[derive(Error, Debug)]
pub enum NormError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid numeric value '{value}' at row {row}, column '{column}'")]
    Parse {
        value: String,
        row: usize,
        column: String,
    },

    #[error("Shape mismatch in {what}: expected {expected}, got {actual}")]
    InputShapeMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("Annotation refers to unknown probe: {0}")]
    UnknownProbe(String),

    #[error("Missing column '{0}'")]
    MissingColumn(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, NormError>;
