//! Criteria - single flag comparisons - and the condition sets built from them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::flags::{FlagId, FlagResolver};

/// How a flag's value is compared against a criterion's bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonKind {
    Equals,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    /// a < x < b
    RangeOpen,
    /// a <= x <= b
    RangeClosed,
    /// a < x <= b
    RangeOpenClosed,
    /// a <= x < b
    RangeClosedOpen,
}

impl ComparisonKind {
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            ComparisonKind::RangeOpen
                | ComparisonKind::RangeClosed
                | ComparisonKind::RangeOpenClosed
                | ComparisonKind::RangeClosedOpen
        )
    }
}

/// A single comparison gating a candidate on one flag.
///
/// For ranges `a` is the lower bound and `b` the upper bound; every other
/// comparison only reads `a`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub flag_id: FlagId,
    pub comparison: ComparisonKind,
    pub a: f32,
    #[serde(default)]
    pub b: f32,
}

impl Criterion {
    pub fn new(flag_id: FlagId, comparison: ComparisonKind, a: f32, b: f32) -> Self {
        Self {
            flag_id,
            comparison,
            a,
            b,
        }
    }

    pub fn equals(flag_id: FlagId, value: f32) -> Self {
        Self::new(flag_id, ComparisonKind::Equals, value, 0.0)
    }

    /// Boolean flag must be set.
    pub fn is_true(flag_id: FlagId) -> Self {
        Self::equals(flag_id, 1.0)
    }

    /// Boolean flag must be clear.
    pub fn is_false(flag_id: FlagId) -> Self {
        Self::equals(flag_id, 0.0)
    }

    /// Symbol flag must hold the given symbol index.
    pub fn is_symbol(flag_id: FlagId, symbol: i32) -> Self {
        Self::equals(flag_id, symbol as f32)
    }

    pub fn less(flag_id: FlagId, value: f32) -> Self {
        Self::new(flag_id, ComparisonKind::Less, value, 0.0)
    }

    pub fn less_equal(flag_id: FlagId, value: f32) -> Self {
        Self::new(flag_id, ComparisonKind::LessEqual, value, 0.0)
    }

    pub fn greater(flag_id: FlagId, value: f32) -> Self {
        Self::new(flag_id, ComparisonKind::Greater, value, 0.0)
    }

    pub fn greater_equal(flag_id: FlagId, value: f32) -> Self {
        Self::new(flag_id, ComparisonKind::GreaterEqual, value, 0.0)
    }

    /// Range comparison. Bounds are swapped if given out of order.
    pub fn range(flag_id: FlagId, kind: ComparisonKind, lower: f32, upper: f32) -> Self {
        let (a, b) = if lower <= upper {
            (lower, upper)
        } else {
            (upper, lower)
        };
        Self::new(flag_id, kind, a, b)
    }

    /// Check a resolved value against this criterion.
    pub fn is_met_by(&self, value: f32) -> bool {
        let (a, b) = (self.a, self.b);
        match self.comparison {
            ComparisonKind::Equals => value == a,
            ComparisonKind::Less => value < a,
            ComparisonKind::LessEqual => value <= a,
            ComparisonKind::Greater => value > a,
            ComparisonKind::GreaterEqual => value >= a,
            ComparisonKind::RangeOpen => a < value && value < b,
            ComparisonKind::RangeClosed => a <= value && value <= b,
            ComparisonKind::RangeOpenClosed => a < value && value <= b,
            ComparisonKind::RangeClosedOpen => a <= value && value < b,
        }
    }
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flag = self.flag_id;
        match self.comparison {
            ComparisonKind::Equals => write!(f, "{} = {}", flag, self.a),
            ComparisonKind::Less => write!(f, "{} < {}", flag, self.a),
            ComparisonKind::LessEqual => write!(f, "{} <= {}", flag, self.a),
            ComparisonKind::Greater => write!(f, "{} > {}", flag, self.a),
            ComparisonKind::GreaterEqual => write!(f, "{} >= {}", flag, self.a),
            ComparisonKind::RangeOpen => write!(f, "{} < {} < {}", self.a, flag, self.b),
            ComparisonKind::RangeClosed => write!(f, "{} <= {} <= {}", self.a, flag, self.b),
            ComparisonKind::RangeOpenClosed => write!(f, "{} < {} <= {}", self.a, flag, self.b),
            ComparisonKind::RangeClosedOpen => write!(f, "{} <= {} < {}", self.a, flag, self.b),
        }
    }
}

/// All criteria a candidate must satisfy, at most one per flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Criterion>", into = "Vec<Criterion>")]
pub struct Conditions {
    criteria: BTreeMap<FlagId, Criterion>,
}

impl From<Vec<Criterion>> for Conditions {
    fn from(list: Vec<Criterion>) -> Self {
        let mut conditions = Conditions::new();
        for criterion in list {
            conditions.insert(criterion);
        }
        conditions
    }
}

impl From<Conditions> for Vec<Criterion> {
    fn from(conditions: Conditions) -> Self {
        conditions.criteria.into_values().collect()
    }
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Conditions::insert`].
    pub fn with(mut self, criterion: Criterion) -> Self {
        self.insert(criterion);
        self
    }

    /// Add a criterion, replacing any existing one on the same flag.
    pub fn insert(&mut self, criterion: Criterion) -> Option<Criterion> {
        self.criteria.insert(criterion.flag_id, criterion)
    }

    pub fn get(&self, flag_id: FlagId) -> Option<&Criterion> {
        self.criteria.get(&flag_id)
    }

    /// The bound of an `Equals` criterion on the flag, if there is one.
    pub fn equals_value(&self, flag_id: FlagId) -> Option<f32> {
        self.criteria
            .get(&flag_id)
            .filter(|c| c.comparison == ComparisonKind::Equals)
            .map(|c| c.a)
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Criterion> {
        self.criteria.values()
    }

    /// Evaluate every criterion.
    ///
    /// Criteria on flags listed in `all` always pass. A criterion whose flag
    /// no bundle resolves fails.
    pub fn is_met(&self, resolver: &FlagResolver<'_>, all: &[FlagId]) -> bool {
        self.criteria.values().all(|criterion| {
            if all.contains(&criterion.flag_id) {
                return true;
            }
            resolver
                .resolve(criterion.flag_id)
                .map(|value| criterion.is_met_by(value))
                .unwrap_or(false)
        })
    }
}
