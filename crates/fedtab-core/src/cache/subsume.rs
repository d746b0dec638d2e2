//! Filter subsumption: can a cached result answer a narrower request?
//!
//! A cached entry subsumes a request when every filter the entry was
//! built with is at least as broad as the corresponding requested
//! filter. The caller then applies the surviving requested filters as a
//! residual against the cached rows.

use std::collections::HashSet;

use fedtab_types::{compare_values, Value};

use crate::codec::value_key;
use crate::model::Filter;

/// Compute the residual filters a request still needs against a cached
/// entry, or `None` when the entry cannot answer the request.
///
/// Per requested filter:
/// - identical to the cached filter on that concept: already satisfied,
///   dropped from the residual;
/// - narrower than the cached filter (values subset, interval inside
///   the cached bounds): kept as a residual row-level filter;
/// - broader than the cached filter, or of a different kind: the
///   candidate is rejected.
///
/// Requested filters on concepts the entry never filtered survive
/// unconditionally; the caller must check they land on cached columns.
pub fn residual(cached: &[Filter], requested: &[Filter]) -> Option<Vec<Filter>> {
    // Precondition (mask precheck): every cached filter's concept also
    // appears in the request. A cached constraint with no requested
    // counterpart would make the entry narrower than the request.
    for old in cached {
        if !requested.iter().any(|f| f.concept() == old.concept()) {
            return None;
        }
    }

    let mut out = Vec::new();
    for filter in requested {
        match cached.iter().find(|f| f.concept() == filter.concept()) {
            None => out.push(filter.clone()),
            Some(old) if old == filter => {}
            Some(old) => {
                if !narrows(old, filter) {
                    return None;
                }
                out.push(filter.clone());
            }
        }
    }
    Some(out)
}

/// Whether `requested` selects a subset of what `cached` selects.
/// Kind mismatches never narrow.
fn narrows(cached: &Filter, requested: &Filter) -> bool {
    match (cached, requested) {
        (Filter::Values { values: old, .. }, Filter::Values { values: new, .. }) => {
            let old_keys: HashSet<Vec<u8>> = old.iter().map(value_key).collect();
            new.iter().all(|v| old_keys.contains(&value_key(v)))
        }
        (
            Filter::Interval {
                lower: old_lo,
                upper: old_hi,
                ..
            },
            Filter::Interval {
                lower: new_lo,
                upper: new_hi,
                ..
            },
        ) => bound_inside(old_lo, new_lo, false) && bound_inside(old_hi, new_hi, true),
        _ => false,
    }
}

/// Whether a requested bound stays inside the cached bound on one side.
/// `upper` selects the comparison direction. Incomparable values reject.
fn bound_inside(cached: &Option<Value>, requested: &Option<Value>, upper: bool) -> bool {
    match (cached, requested) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(old), Some(new)) => match compare_values(new, old) {
            Some(ord) => {
                if upper {
                    ord.is_le()
                } else {
                    ord.is_ge()
                }
            }
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConceptId;

    fn values(concept: u32, vals: &[i64]) -> Filter {
        Filter::values(
            ConceptId(concept),
            vals.iter().map(|&v| Value::Int64(v)).collect(),
        )
    }

    #[test]
    fn test_identical_filters_drop_from_residual() {
        let cached = vec![values(0, &[1, 2, 3])];
        let requested = vec![values(0, &[1, 2, 3])];
        assert_eq!(residual(&cached, &requested), Some(vec![]));
    }

    #[test]
    fn test_values_subset_survives_as_residual() {
        let cached = vec![values(0, &[1, 2, 3])];
        let requested = vec![values(0, &[1, 2])];
        assert_eq!(residual(&cached, &requested), Some(requested.clone()));
    }

    #[test]
    fn test_uncovered_value_rejects() {
        let cached = vec![values(0, &[1, 2, 3])];
        let requested = vec![values(0, &[1, 2, 4])];
        assert_eq!(residual(&cached, &requested), None);
    }

    #[test]
    fn test_unrequested_cached_filter_rejects() {
        // The entry is narrower than the request: its rows were already
        // constrained on a concept the request leaves open.
        let cached = vec![values(0, &[1])];
        let requested = vec![values(1, &[5])];
        assert_eq!(residual(&cached, &requested), None);
    }

    #[test]
    fn test_unfiltered_concept_passes_through() {
        let cached = vec![values(0, &[1, 2])];
        let requested = vec![values(0, &[1]), values(1, &[9])];
        assert_eq!(residual(&cached, &requested), Some(requested.clone()));
    }

    #[test]
    fn test_interval_inside_cached_bounds() {
        let cached = vec![Filter::interval(
            ConceptId(0),
            Some(Value::Int64(0)),
            Some(Value::Int64(10)),
        )];
        let narrower = vec![Filter::interval(
            ConceptId(0),
            Some(Value::Int64(2)),
            Some(Value::Int64(8)),
        )];
        let wider = vec![Filter::interval(
            ConceptId(0),
            Some(Value::Int64(-1)),
            Some(Value::Int64(8)),
        )];
        let unbounded = vec![Filter::interval(ConceptId(0), None, Some(Value::Int64(8)))];

        assert_eq!(residual(&cached, &narrower), Some(narrower.clone()));
        assert_eq!(residual(&cached, &wider), None);
        assert_eq!(residual(&cached, &unbounded), None);
    }

    #[test]
    fn test_kind_mismatch_rejects() {
        let cached = vec![values(0, &[1, 2, 3])];
        let requested = vec![Filter::interval(ConceptId(0), Some(Value::Int64(1)), None)];
        assert_eq!(residual(&cached, &requested), None);
    }

    #[test]
    fn test_int_widening_in_value_subset() {
        let cached = vec![values(0, &[1, 2])];
        let requested = vec![Filter::values(ConceptId(0), vec![Value::Int32(1)])];
        assert_eq!(residual(&cached, &requested), Some(requested.clone()));
    }
}
