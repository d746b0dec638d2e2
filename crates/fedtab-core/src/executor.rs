//! Join executor: runs a solved route as pairwise reductions.
//!
//! Execution state is an arena of nodes (column lists plus optional row
//! data) and edges (node pairs plus the connecting mapping), created
//! fresh per query. The loop greedily applies the locally cheapest
//! feasible reduction until one node remains; this is a deliberate
//! non-backtracking simplification, not a globally optimal join order.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use fedtab_types::{Row, RowTable, Value};

use crate::codec::value_key;
use crate::error::Error;
use crate::model::{ConceptId, DataModel, FieldRef, Filter, Mapping};
use crate::solver::Route;

/// An execution-plan vertex: ordered columns plus row data, if known.
struct ExecNode {
    fields: Vec<FieldRef>,
    rows: Option<Vec<Row>>,
}

/// An execution-plan edge: two arena indices plus the mapping that
/// translates between the referenced columns.
struct ExecEdge {
    a: usize,
    b: usize,
    a_ref: FieldRef,
    b_ref: FieldRef,
    mapping: Mapping,
}

/// Executes solved routes against the data model.
pub struct JoinExecutor<'a> {
    model: &'a DataModel,
}

impl<'a> JoinExecutor<'a> {
    /// Create an executor over the given model.
    pub fn new(model: &'a DataModel) -> Self {
        Self { model }
    }

    /// Run a route and return the table projected to `fields`, in order.
    pub fn execute(
        &self,
        route: &Route,
        fields: &[ConceptId],
        filters: &[Filter],
    ) -> Result<RowTable, Error> {
        let mut state = PlanState::build(route, fields, filters);

        let mut reductions = 0usize;
        let mut last = None;
        while !state.edges.is_empty() {
            let (idx, reverse) = match state.select_operation() {
                Some(op) => op,
                None => {
                    // Nothing evaluable: derive data from a source that can
                    // enumerate one endpoint, then retry selection.
                    state.seed_from_domain()?;
                    continue;
                }
            };

            let edge = state.edges.swap_remove(idx);
            if edge.a == edge.b {
                state.reduce_self_edge(&edge)?;
                continue;
            }

            let new_idx = state.combine(&edge, reverse)?;
            state.collapse(&edge, new_idx);
            // Recomputed per reduction: an endpoint only needed by an
            // already-consumed edge must not survive the clean.
            let keep = keep_set(&state, fields, filters);
            state.clean(new_idx, &keep);
            reductions += 1;
            last = Some(new_idx);
        }

        debug!(reductions, "route executed");

        let solution = match last {
            Some(idx) => idx,
            None => state.trivial_solution(fields)?,
        };

        self.finish(&mut state, solution, fields, filters)
    }

    /// Apply residual filters and project down to the requested concepts.
    fn finish(
        &self,
        state: &mut PlanState,
        solution: usize,
        fields: &[ConceptId],
        filters: &[Filter],
    ) -> Result<RowTable, Error> {
        let node = &mut state.nodes[solution];
        let mut rows = node
            .rows
            .take()
            .ok_or_else(|| Error::InsufficientData("solution node has no rows".into()))?;

        // Values filters already constrained the joins via seeding; interval
        // filters (and any filter whose seed was bypassed) are applied here,
        // while the filtered columns are still present.
        for filter in filters {
            let col = column_of(&node.fields, filter.concept()).ok_or_else(|| {
                Error::InsufficientData(format!(
                    "filtered concept {:?} missing from solution",
                    filter.concept()
                ))
            })?;
            rows.retain(|row| filter.accepts(&row[col]));
        }

        let mut projection = Vec::with_capacity(fields.len());
        let mut columns = Vec::with_capacity(fields.len());
        for &concept in fields {
            let col = column_of(&node.fields, concept).ok_or_else(|| {
                Error::InsufficientData(format!(
                    "requested concept {concept:?} missing from solution"
                ))
            })?;
            projection.push(col);
            columns.push(
                self.model
                    .concept_label(concept)
                    .unwrap_or("<unknown>")
                    .to_string(),
            );
        }

        let projected = rows
            .into_iter()
            .map(|row| projection.iter().map(|&c| row[c].clone()).collect())
            .collect();

        Ok(RowTable::with_rows(columns, projected))
    }
}

/// Find the column holding the abstract side of a concept.
fn column_of(fields: &[FieldRef], concept: ConceptId) -> Option<usize> {
    fields
        .iter()
        .position(|f| *f == FieldRef::Concept(concept))
}

/// Columns that must survive cleaning: requested outputs, filtered
/// concepts, and every endpoint a remaining edge still resolves through.
fn keep_set(state: &PlanState, fields: &[ConceptId], filters: &[Filter]) -> HashSet<FieldRef> {
    let mut keep: HashSet<FieldRef> = fields.iter().map(|&c| FieldRef::Concept(c)).collect();
    keep.extend(filters.iter().map(|f| FieldRef::Concept(f.concept())));
    for edge in &state.edges {
        keep.insert(edge.a_ref);
        keep.insert(edge.b_ref);
    }
    keep
}

/// Per-query mutable plan state.
struct PlanState {
    nodes: Vec<ExecNode>,
    edges: Vec<ExecEdge>,
}

impl PlanState {
    /// Build initial nodes and edges from a route, seeding nodes whose
    /// filter enumerates a concrete domain.
    fn build(route: &Route, fields: &[ConceptId], filters: &[Filter]) -> Self {
        let mut nodes: Vec<ExecNode> = Vec::new();
        let mut node_of: HashMap<FieldRef, usize> = HashMap::new();
        let mut intern = |nodes: &mut Vec<ExecNode>, vertex: FieldRef| -> usize {
            *node_of.entry(vertex).or_insert_with(|| {
                nodes.push(ExecNode {
                    fields: vec![vertex],
                    rows: None,
                });
                nodes.len() - 1
            })
        };

        let mut edges = Vec::new();
        for mapping in route.mappings() {
            let a = intern(&mut nodes, mapping.a());
            let b = intern(&mut nodes, mapping.b());
            edges.push(ExecEdge {
                a,
                b,
                a_ref: mapping.a(),
                b_ref: mapping.b(),
                mapping: mapping.clone(),
            });
        }
        // Requested concepts always get a node, even on an empty route.
        for &concept in fields {
            intern(&mut nodes, FieldRef::Concept(concept));
        }

        let by_concept: HashMap<ConceptId, &Filter> =
            filters.iter().map(|f| (f.concept(), f)).collect();

        // Seed abstract concept nodes from enumerable filters.
        for node in &mut nodes {
            if let [FieldRef::Concept(concept)] = node.fields[..] {
                if let Some(values) = by_concept.get(&concept).and_then(|f| f.enumerated()) {
                    node.rows = Some(values.iter().map(|v| vec![v.clone()]).collect());
                }
            }
        }

        // Propagate a seed across a pure identity mapping onto the
        // unfiltered field node, so filtering runs against the source
        // with real backing data instead of an abstract placeholder.
        for edge in &edges {
            if !edge.mapping.is_identity() {
                continue;
            }
            let (field_idx, concept_idx) = if edge.a_ref.is_concept() {
                (edge.b, edge.a)
            } else {
                (edge.a, edge.b)
            };
            if nodes[field_idx].rows.is_none() {
                if let Some(rows) = nodes[concept_idx].rows.clone() {
                    nodes[field_idx].rows = Some(rows);
                }
            }
        }

        Self { nodes, edges }
    }

    /// Pick the cheapest feasible reduction: the edge/direction whose
    /// driving side has data, with the lowest translation cost.
    ///
    /// Returns `(edge index, reverse)` or `None` when no edge is
    /// evaluable yet.
    fn select_operation(&self) -> Option<(usize, bool)> {
        let mut best: Option<(usize, bool, f64)> = None;
        for (idx, edge) in self.edges.iter().enumerate() {
            if edge.a == edge.b {
                // Collapsed cycle: a free in-node consistency filter.
                if self.nodes[edge.a].rows.is_some() {
                    return Some((idx, false));
                }
                continue;
            }
            let a_has = self.nodes[edge.a].rows.is_some();
            let b_has = self.nodes[edge.b].rows.is_some();

            let candidate = match (a_has, b_has) {
                (false, false) => continue,
                (true, false) => Some((false, edge.mapping.cost(false))),
                (false, true) => Some((true, edge.mapping.cost(true))),
                (true, true) => {
                    let forward = edge.mapping.cost(false);
                    let backward = edge.mapping.cost(true);
                    if forward <= backward {
                        Some((false, forward))
                    } else {
                        Some((true, backward))
                    }
                }
            };

            if let Some((reverse, cost)) = candidate {
                let better = match best {
                    Some((_, _, best_cost)) => cost < best_cost,
                    None => true,
                };
                if better {
                    best = Some((idx, reverse, cost));
                }
            }
        }
        best.map(|(idx, reverse, _)| (idx, reverse))
    }

    /// Materialize a node from a source-enumerable domain.
    ///
    /// Called only when no edge is evaluable; failing here means the
    /// query genuinely has no data entry point.
    fn seed_from_domain(&mut self) -> Result<(), Error> {
        let mut candidates: Vec<(usize, bool, f64)> = Vec::new();
        for (idx, edge) in self.edges.iter().enumerate() {
            if edge.mapping.is_identity()
                || self.nodes[edge.a].rows.is_some()
                || self.nodes[edge.b].rows.is_some()
            {
                continue;
            }
            for reverse in [false, true] {
                candidates.push((idx, reverse, edge.mapping.cost(reverse)));
            }
        }
        candidates.sort_by(|a, b| a.2.total_cmp(&b.2));

        // Cheapest-first until one source can enumerate its endpoint.
        for (idx, reverse, _) in candidates {
            let edge = &self.edges[idx];
            if let Some(values) = edge.mapping.domain(reverse)? {
                let node = if reverse { edge.b } else { edge.a };
                debug!(values = values.len(), "seeded node from source domain");
                self.nodes[node].rows = Some(values.into_iter().map(|v| vec![v]).collect());
                return Ok(());
            }
        }

        Err(Error::InsufficientData(
            "no edge has materialized or derivable data".into(),
        ))
    }

    /// Inner-join two nodes through an edge's mapping.
    ///
    /// The driving side's rows are translated value by value; the result
    /// either expands against the other side's rows or, when the other
    /// side has none, synthesizes fresh single-column rows. The combined
    /// node's columns are driver columns followed by the other side's.
    fn combine(&mut self, edge: &ExecEdge, reverse: bool) -> Result<usize, Error> {
        let (driver_idx, other_idx, driver_ref, other_ref) = if reverse {
            (edge.b, edge.a, edge.b_ref, edge.a_ref)
        } else {
            (edge.a, edge.b, edge.a_ref, edge.b_ref)
        };

        let driver = &self.nodes[driver_idx];
        let other = &self.nodes[other_idx];
        let driver_rows = driver
            .rows
            .as_ref()
            .ok_or_else(|| Error::InsufficientData("driving node has no rows".into()))?;
        let dcol = position(&driver.fields, driver_ref)?;

        // Distinct driving values, in first-seen order.
        let mut seen: HashSet<Vec<u8>> = HashSet::new();
        let mut distinct: Vec<Value> = Vec::new();
        for row in driver_rows {
            if seen.insert(value_key(&row[dcol])) {
                distinct.push(row[dcol].clone());
            }
        }

        edge.mapping.prepare(&distinct, reverse)?;

        let mut translated: HashMap<Vec<u8>, Vec<Value>> = HashMap::new();
        for value in &distinct {
            let out = edge.mapping.translate(value, reverse)?;
            translated.insert(value_key(value), out);
        }

        let mut fields = driver.fields.clone();
        fields.extend(other.fields.iter().copied());

        let mut rows: Vec<Row> = Vec::new();
        match other.rows.as_ref() {
            Some(other_rows) => {
                let ocol = position(&other.fields, other_ref)?;
                let mut index: HashMap<Vec<u8>, Vec<usize>> = HashMap::new();
                for (i, row) in other_rows.iter().enumerate() {
                    index.entry(value_key(&row[ocol])).or_default().push(i);
                }
                for drow in driver_rows {
                    let outputs = &translated[&value_key(&drow[dcol])];
                    for out in outputs {
                        if let Some(matches) = index.get(&value_key(out)) {
                            for &oi in matches {
                                let mut row = drow.clone();
                                row.extend(other_rows[oi].iter().cloned());
                                rows.push(row);
                            }
                        }
                    }
                }
            }
            None => {
                // Unseeded nodes are always single-column; generated rows
                // carry the translated value as that column.
                if other.fields.len() != 1 {
                    return Err(Error::InsufficientData(
                        "cannot generate rows for a multi-column node".into(),
                    ));
                }
                for drow in driver_rows {
                    let outputs = &translated[&value_key(&drow[dcol])];
                    for out in outputs {
                        let mut row = drow.clone();
                        row.push(out.clone());
                        rows.push(row);
                    }
                }
            }
        }

        self.nodes.push(ExecNode {
            fields,
            rows: Some(rows),
        });
        Ok(self.nodes.len() - 1)
    }

    /// Rewire remaining edges from the two consumed nodes onto the
    /// combined node. Index rewriting only; old arena slots stay behind
    /// but nothing references them again.
    fn collapse(&mut self, consumed: &ExecEdge, new_idx: usize) {
        for edge in &mut self.edges {
            if edge.a == consumed.a || edge.a == consumed.b {
                edge.a = new_idx;
            }
            if edge.b == consumed.a || edge.b == consumed.b {
                edge.b = new_idx;
            }
        }
    }

    /// Drop columns no longer needed, bounding row width across
    /// multi-hop joins.
    fn clean(&mut self, node_idx: usize, keep: &HashSet<FieldRef>) {
        let node = &mut self.nodes[node_idx];
        let retained: Vec<usize> = node
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| keep.contains(f))
            .map(|(i, _)| i)
            .collect();
        if retained.len() == node.fields.len() {
            return;
        }

        node.fields = retained.iter().map(|&i| node.fields[i]).collect();
        if let Some(rows) = node.rows.as_mut() {
            for row in rows.iter_mut() {
                *row = retained.iter().map(|&i| row[i].clone()).collect();
            }
        }
    }

    /// Resolve an edge whose endpoints collapsed into one node: keep
    /// rows where the mapping maps the left column onto the right.
    fn reduce_self_edge(&mut self, edge: &ExecEdge) -> Result<(), Error> {
        let node = &mut self.nodes[edge.a];
        let fields = node.fields.clone();
        let acol = position(&fields, edge.a_ref)?;
        let bcol = position(&fields, edge.b_ref)?;
        let rows = node
            .rows
            .take()
            .ok_or_else(|| Error::InsufficientData("cycle edge over empty node".into()))?;

        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            let outputs = edge.mapping.translate(&row[acol], false)?;
            let expect = value_key(&row[bcol]);
            if outputs.iter().any(|v| value_key(v) == expect) {
                kept.push(row);
            }
        }
        self.nodes[edge.a].rows = Some(kept);
        Ok(())
    }

    /// Solution for a route with no edges: the lone requested concept's
    /// node, which must have been seeded by a filter.
    fn trivial_solution(&self, fields: &[ConceptId]) -> Result<usize, Error> {
        let concept = fields
            .first()
            .ok_or_else(|| Error::InsufficientData("no fields requested".into()))?;
        self.nodes
            .iter()
            .position(|n| n.fields == [FieldRef::Concept(*concept)] && n.rows.is_some())
            .ok_or_else(|| {
                Error::InsufficientData("empty route with no seeded data".into())
            })
    }
}

fn position(fields: &[FieldRef], vertex: FieldRef) -> Result<usize, Error> {
    fields
        .iter()
        .position(|f| *f == vertex)
        .ok_or_else(|| Error::InsufficientData(format!("column {vertex:?} not in node")))
}
