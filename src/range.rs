//! Range caps.
//!
//! A cap is one end of a range query: a numeric score, a lexicographic
//! string, or unbounded. Both ends are inclusive.

use crate::expression::SortCondition;
use crate::value::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum RangeCap {
    #[default]
    Unbounded,
    Score(f64),
    Lex(String),
}

impl RangeCap {
    /// Score cap. Infinite scores (and NaN) are unbounded.
    pub fn score(score: f64) -> Self {
        if score.is_finite() {
            RangeCap::Score(score)
        } else {
            RangeCap::Unbounded
        }
    }

    /// Lexicographic cap.
    pub fn lex(bound: impl Into<String>) -> Self {
        RangeCap::Lex(bound.into())
    }

    pub fn present(&self) -> bool {
        !matches!(self, RangeCap::Unbounded)
    }

    fn value(&self) -> Option<Value> {
        match self {
            RangeCap::Unbounded => None,
            RangeCap::Score(s) => Some(Value::Float(*s)),
            RangeCap::Lex(s) => Some(Value::String(s.clone())),
        }
    }
}

impl From<f64> for RangeCap {
    fn from(score: f64) -> Self {
        RangeCap::score(score)
    }
}

/// Build the range predicate for a `(lower, upper)` pair.
///
/// Returns `None` when both ends are unbounded.
pub fn condition(lower: &RangeCap, upper: &RangeCap) -> Option<SortCondition> {
    match (lower.value(), upper.value()) {
        (Some(lo), Some(hi)) => Some(SortCondition::Between(lo, hi)),
        (Some(lo), None) => Some(SortCondition::AtLeast(lo)),
        (None, Some(hi)) => Some(SortCondition::AtMost(hi)),
        (None, None) => None,
    }
}

/// True when the pair can never match anything (`lower > upper`).
pub fn is_empty(lower: &RangeCap, upper: &RangeCap) -> bool {
    match (lower, upper) {
        (RangeCap::Score(lo), RangeCap::Score(hi)) => lo > hi,
        (RangeCap::Lex(lo), RangeCap::Lex(hi)) => lo > hi,
        _ => false,
    }
}
