//! A logical probe and its replicate spots.

use crate::data::Marker;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a probe: mandatory `a` plus optional `b` (empty when absent).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProbeKey {
    pub a: String,
    pub b: String,
}

impl ProbeKey {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
        }
    }

    /// Key without a secondary identifier.
    pub fn from_a(a: impl Into<String>) -> Self {
        Self::new(a, "")
    }
}

impl fmt::Display for ProbeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.b.is_empty() {
            write!(f, "{}", self.a)
        } else {
            write!(f, "{} / {}", self.a, self.b)
        }
    }
}

/// Role of a probe in curve fitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeightClass {
    /// Known ratio; anchors the curve with weight 1.
    Normalization,
    /// No specific signal expected; never fitted.
    Negative,
    /// Sample probe; fitted only with the non-control weight.
    Other,
}

/// Parsed ratio annotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RatioExpr {
    /// Empty or unparsable text.
    Unknown,
    /// The literal `-`.
    Negative,
    /// A positive expected sample:reference ratio.
    Ratio(f64),
}

impl RatioExpr {
    /// Parse ratio text. Anything other than `-` or a positive finite number
    /// is `Unknown`.
    pub fn parse(expr: &str) -> Self {
        let expr = expr.trim();
        if expr == "-" {
            return Self::Negative;
        }
        match expr.parse::<f64>() {
            Ok(r) if r.is_finite() && r > 0.0 => Self::Ratio(r),
            _ => Self::Unknown,
        }
    }

    pub fn weight_class(&self) -> WeightClass {
        match self {
            Self::Ratio(_) => WeightClass::Normalization,
            Self::Negative => WeightClass::Negative,
            Self::Unknown => WeightClass::Other,
        }
    }

    /// Expected ratio of a normalization control.
    pub fn ratio(&self) -> Option<f64> {
        match self {
            Self::Ratio(r) => Some(*r),
            _ => None,
        }
    }
}

/// One logical probe, possibly spotted several times on the array.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSet {
    key: ProbeKey,
    /// Display name of `a`; defaults to `a` itself.
    pub val_a_alias: String,
    ratio_expr: String,
    ratio: RatioExpr,
    /// Display-only marker.
    pub marker: Marker,
    data_indices: Vec<usize>,
}

impl ProbeSet {
    pub fn new(key: ProbeKey) -> Self {
        Self {
            val_a_alias: key.a.clone(),
            key,
            ratio_expr: String::new(),
            ratio: RatioExpr::Unknown,
            marker: Marker::default(),
            data_indices: Vec::new(),
        }
    }

    #[inline]
    pub fn key(&self) -> &ProbeKey {
        &self.key
    }

    #[inline]
    pub fn val_a(&self) -> &str {
        &self.key.a
    }

    #[inline]
    pub fn val_b(&self) -> &str {
        &self.key.b
    }

    /// Spot indices of the replicates, in input order.
    #[inline]
    pub fn data_indices(&self) -> &[usize] {
        &self.data_indices
    }

    pub fn num_spots(&self) -> usize {
        self.data_indices.len()
    }

    pub(crate) fn add_spot(&mut self, idx: usize) {
        self.data_indices.push(idx);
    }

    /// Ratio text as stored: empty, `-`, or the accepted number.
    #[inline]
    pub fn ratio_expr(&self) -> &str {
        &self.ratio_expr
    }

    #[inline]
    pub fn ratio(&self) -> RatioExpr {
        self.ratio
    }

    #[inline]
    pub fn weight_class(&self) -> WeightClass {
        self.ratio.weight_class()
    }

    /// Store a ratio annotation. Returns true when the stored text changed.
    pub(crate) fn set_ratio_expr(&mut self, expr: &str) -> bool {
        let parsed = RatioExpr::parse(expr);
        let text = match parsed {
            RatioExpr::Unknown => String::new(),
            _ => expr.trim().to_string(),
        };
        let changed = text != self.ratio_expr;
        self.ratio_expr = text;
        self.ratio = parsed;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_parse() {
        assert_eq!(RatioExpr::parse("2"), RatioExpr::Ratio(2.0));
        assert_eq!(RatioExpr::parse(" 0.5 "), RatioExpr::Ratio(0.5));
        assert_eq!(RatioExpr::parse("-"), RatioExpr::Negative);
        assert_eq!(RatioExpr::parse(""), RatioExpr::Unknown);
        assert_eq!(RatioExpr::parse("0"), RatioExpr::Unknown);
        assert_eq!(RatioExpr::parse("-3"), RatioExpr::Unknown);
        assert_eq!(RatioExpr::parse("abc"), RatioExpr::Unknown);
        assert_eq!(RatioExpr::parse("inf"), RatioExpr::Unknown);
    }

    #[test]
    fn test_weight_class_follows_ratio() {
        let mut probe = ProbeSet::new(ProbeKey::new("g1", "ctl"));
        assert_eq!(probe.weight_class(), WeightClass::Other);

        assert!(probe.set_ratio_expr("1.5"));
        assert_eq!(probe.weight_class(), WeightClass::Normalization);
        assert_eq!(probe.ratio().ratio(), Some(1.5));
        assert!(!probe.set_ratio_expr("1.5"));

        assert!(probe.set_ratio_expr("-"));
        assert_eq!(probe.weight_class(), WeightClass::Negative);

        assert!(probe.set_ratio_expr("junk"));
        assert_eq!(probe.ratio_expr(), "");
        assert_eq!(probe.weight_class(), WeightClass::Other);
    }

    #[test]
    fn test_key_display_and_alias() {
        let probe = ProbeSet::new(ProbeKey::from_a("g7"));
        assert_eq!(probe.val_a_alias, "g7");
        assert_eq!(probe.key().to_string(), "g7");
        assert_eq!(ProbeKey::new("g7", "spike").to_string(), "g7 / spike");
    }
}
