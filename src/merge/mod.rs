//! Replicate merging.

pub mod replicates;

pub use replicates::{
    concat_text, count_per_group, merge_numeric, Aggregator, Grouping, MergeLevel, MergeParams,
    OtherColumnMerge,
};
