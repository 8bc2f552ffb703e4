//! Mask-aware numeric primitives.
//!
//! - **stats**: median, percentiles, MAD, standard deviation (flat and per axis)
//! - **index**: condition/index conversions, multi-indices, triangular packing, ranks
//! - **lowess**: weighted locally linear smoothing with robustifying iterations

pub mod index;
pub mod lowess;
pub mod stats;

pub use index::{
    argsort, condition_to_indices, indices_to_condition, multi_index_to_position,
    permutation_inverse, position_to_multi_index, rank_data, triangular_get, triangular_put,
};
pub use lowess::{lowess, LowessParams};
pub use stats::{
    mad, mad_axis, mad_slice, mean, mean_axis, mean_slice, median, median_axis, median_slice,
    percentile, percentile_axis, percentile_slice, std, std_axis, std_slice, weighted_mean_slice,
    Axis,
};
