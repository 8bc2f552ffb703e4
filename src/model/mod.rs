//! Regression models used to fit normalization curves.

pub mod linreg;

pub use linreg::{fit_wls, linreg_wls, WlsFit};
