//! Query engine entry point.
//!
//! `Engine::get_list` is the single surface collaborators call: it
//! checks the result cache, falls back to route solving and join
//! execution, persists fresh results, and post-processes rows
//! (distinct, sort, offset, limit) into a `RowTable`.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use fedtab_types::{compare_values, Row, RowTable};

use crate::cache::ResultCache;
use crate::codec::encode_row;
use crate::error::Error;
use crate::executor::JoinExecutor;
use crate::model::{ConceptId, DataModel, FieldRef, Filter};
use crate::solver::solve;

/// Sort direction for one sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Per-query options.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Sort keys, applied in order; each concept must be among the
    /// requested fields.
    pub sort: Vec<(ConceptId, SortDirection)>,

    /// Maximum number of rows to return.
    pub limit: Option<usize>,

    /// Rows to skip before the limit applies.
    pub offset: usize,

    /// Deduplicate rows before sorting and pagination.
    pub distinct: bool,

    /// Skip the cache on both lookup and store; the query always runs
    /// against the sources.
    pub bypass_cache: bool,
}

/// The federated query engine.
pub struct Engine {
    model: Arc<DataModel>,
    cache: Option<ResultCache>,
    cache_only: bool,
}

impl Engine {
    /// Engine without a cache: every query runs against the sources.
    pub fn new(model: Arc<DataModel>) -> Self {
        Self {
            model,
            cache: None,
            cache_only: false,
        }
    }

    /// Attach a result cache.
    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Serve from the cache only; a miss is an error instead of a
    /// fallback to the sources.
    pub fn cache_only(mut self) -> Self {
        self.cache_only = true;
        self
    }

    /// The data model this engine queries.
    pub fn model(&self) -> &DataModel {
        &self.model
    }

    /// Answer a query: a table with exactly the requested concepts as
    /// columns, in request order.
    pub fn get_list(
        &self,
        fields: &[ConceptId],
        filters: &[Filter],
        options: &QueryOptions,
    ) -> Result<RowTable, Error> {
        if !options.bypass_cache {
            if let Some(rows) = self.cached_rows(fields, filters, options)? {
                return self.finish(fields, rows, options);
            }
        }
        if self.cache_only {
            return Err(Error::CacheMiss);
        }

        let mut goals: HashSet<FieldRef> =
            fields.iter().map(|&c| FieldRef::Concept(c)).collect();
        goals.extend(filters.iter().map(|f| FieldRef::Concept(f.concept())));

        let route = solve(&self.model, &goals)?;
        debug!(cost = route.cost(), edges = route.mappings().len(), "route solved");
        let table = JoinExecutor::new(&self.model).execute(&route, fields, filters)?;

        let mut rows = table.rows;
        if options.distinct {
            rows = distinct_rows(rows);
        }

        if let (Some(cache), false) = (&self.cache, options.bypass_cache) {
            // A failed store never fails the query.
            if let Err(err) = cache.store(fields, filters, options.distinct, &rows) {
                warn!(%err, "failed to persist cache entry");
            }
        }

        self.finish(fields, rows, options)
    }

    /// Cache lookup with faults downgraded to a miss, unless the engine
    /// is cache-only, where they propagate.
    fn cached_rows(
        &self,
        fields: &[ConceptId],
        filters: &[Filter],
        options: &QueryOptions,
    ) -> Result<Option<Vec<Row>>, Error> {
        let cache = match &self.cache {
            Some(cache) => cache,
            None => return Ok(None),
        };
        match cache.lookup(fields, filters, options.distinct) {
            Ok(hit) => Ok(hit),
            Err(err) if self.cache_only => Err(err),
            Err(err) => {
                warn!(%err, "cache lookup failed, falling back to sources");
                Ok(None)
            }
        }
    }

    /// Sort, paginate, and label the final rows.
    fn finish(
        &self,
        fields: &[ConceptId],
        mut rows: Vec<Row>,
        options: &QueryOptions,
    ) -> Result<RowTable, Error> {
        if !options.sort.is_empty() {
            let mut keys = Vec::with_capacity(options.sort.len());
            for &(concept, direction) in &options.sort {
                let col = fields.iter().position(|&c| c == concept).ok_or_else(|| {
                    Error::InsufficientData(format!(
                        "sort concept {concept:?} not among requested fields"
                    ))
                })?;
                keys.push((col, direction));
            }
            rows.sort_by(|a, b| {
                for &(col, direction) in &keys {
                    // Nulls order first; incomparable values tie.
                    let ord = compare_values(&a[col], &b[col]).unwrap_or(Ordering::Equal);
                    let ord = match direction {
                        SortDirection::Ascending => ord,
                        SortDirection::Descending => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let rows: Vec<Row> = rows
            .into_iter()
            .skip(options.offset)
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();

        let mut columns = Vec::with_capacity(fields.len());
        for &concept in fields {
            columns.push(
                self.model
                    .concept_label(concept)
                    .ok_or_else(|| {
                        Error::InsufficientData(format!("unknown concept {concept:?}"))
                    })?
                    .to_string(),
            );
        }

        Ok(RowTable::with_rows(columns, rows))
    }
}

/// Deduplicate rows on their encoded bytes, keeping first occurrences.
fn distinct_rows(rows: Vec<Row>) -> Vec<Row> {
    let mut seen: HashSet<Vec<u8>> = HashSet::with_capacity(rows.len());
    rows.into_iter()
        .filter(|row| seen.insert(encode_row(row)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedtab_types::Value;

    fn row(a: i64, b: &str) -> Row {
        vec![Value::Int64(a), Value::String(b.into())]
    }

    #[test]
    fn test_distinct_keeps_first_occurrence() {
        let rows = vec![row(1, "x"), row(2, "y"), row(1, "x"), row(1, "z")];
        let out = distinct_rows(rows);
        assert_eq!(out, vec![row(1, "x"), row(2, "y"), row(1, "z")]);
    }

    #[test]
    fn test_distinct_widens_integer_types() {
        let rows = vec![vec![Value::Int32(1)], vec![Value::Int64(1)]];
        // Int32(1) and Int64(1) encode differently and stay distinct
        // rows; widening applies to join keys, not stored rows.
        assert_eq!(distinct_rows(rows).len(), 2);
    }
}
