//! Query filters over concepts.

use std::cmp::Ordering;

use fedtab_types::{compare_values, values_equal, Value};

use super::ConceptId;

/// A filter condition on one concept.
///
/// The two kinds are a closed set, matched exhaustively at every call
/// site (seeding, residual evaluation, subsumption, serialization), so a
/// third kind is a compile-time-visible change.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Restrict a concept to an enumerated value set.
    Values {
        /// Filtered concept.
        concept: ConceptId,
        /// Allowed values.
        values: Vec<Value>,
    },
    /// Restrict a concept to an inclusive interval.
    ///
    /// Intervals support range pushdown and row-level evaluation but
    /// cannot enumerate a concrete domain.
    Interval {
        /// Filtered concept.
        concept: ConceptId,
        /// Inclusive lower bound, if any.
        lower: Option<Value>,
        /// Inclusive upper bound, if any.
        upper: Option<Value>,
    },
}

impl Filter {
    /// Build a values filter.
    pub fn values(concept: ConceptId, values: Vec<Value>) -> Self {
        Filter::Values { concept, values }
    }

    /// Build an interval filter.
    pub fn interval(concept: ConceptId, lower: Option<Value>, upper: Option<Value>) -> Self {
        Filter::Interval {
            concept,
            lower,
            upper,
        }
    }

    /// The concept this filter constrains.
    pub fn concept(&self) -> ConceptId {
        match self {
            Filter::Values { concept, .. } | Filter::Interval { concept, .. } => *concept,
        }
    }

    /// The concrete domain this filter enumerates, if it has one.
    ///
    /// Values filters yield their value set, which can seed an execution
    /// node with no natural backing data. Interval filters cannot be
    /// enumerated in memory and yield `None`.
    pub fn enumerated(&self) -> Option<&[Value]> {
        match self {
            Filter::Values { values, .. } => Some(values),
            Filter::Interval { .. } => None,
        }
    }

    /// Row-level predicate: does `value` satisfy this filter?
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Filter::Values { values, .. } => values.iter().any(|v| values_equal(v, value)),
            Filter::Interval { lower, upper, .. } => {
                let above_lower = match lower {
                    Some(lo) => matches!(
                        compare_values(value, lo),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                    None => true,
                };
                let below_upper = match upper {
                    Some(hi) => matches!(
                        compare_values(value, hi),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                    None => true,
                };
                above_lower && below_upper
            }
        }
    }
}
