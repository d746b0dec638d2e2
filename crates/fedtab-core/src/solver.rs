//! Route solver: minimum-cost connector search over the mapping graph.
//!
//! Given the full mapping set and a goal set (requested plus filtered
//! fields), the solver picks a minimal connected edge subset spanning
//! every goal. This is an exhaustive Steiner-tree-style search, viable
//! because concept graphs stay small (tens of vertices).

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::debug;

use crate::error::Error;
use crate::model::{DataModel, FieldRef, Mapping};

/// The mappings chosen to answer one query.
#[derive(Debug, Clone)]
pub struct Route {
    mappings: Vec<Mapping>,
    cost: f64,
}

impl Route {
    /// The chosen mappings (forced leaf attachments plus searched edges).
    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    /// Accumulated search cost. Forced leaf edges count as zero, so
    /// repeated solves over an unchanged graph report identical cost
    /// even when cost ties pick different edges.
    pub fn cost(&self) -> f64 {
        self.cost
    }
}

/// Undirected multigraph view over the model's mappings.
struct Graph<'a> {
    mappings: &'a [Mapping],
    /// Per-vertex incident edge indices.
    incident: HashMap<FieldRef, Vec<usize>>,
    /// Edges still part of the graph (normalization kills pruned ones).
    alive: Vec<bool>,
}

impl<'a> Graph<'a> {
    fn build(mappings: &'a [Mapping]) -> Self {
        let mut incident: HashMap<FieldRef, Vec<usize>> = HashMap::new();
        for (idx, mapping) in mappings.iter().enumerate() {
            if mapping.a() == mapping.b() {
                // Degenerate self-loop, contributes nothing to connectivity.
                continue;
            }
            incident.entry(mapping.a()).or_default().push(idx);
            incident.entry(mapping.b()).or_default().push(idx);
        }
        let alive = vec![true; mappings.len()];
        Self {
            mappings,
            incident,
            alive,
        }
    }

    fn degree(&self, vertex: FieldRef) -> usize {
        self.incident
            .get(&vertex)
            .map(|edges| edges.iter().filter(|&&e| self.alive[e]).count())
            .unwrap_or(0)
    }

    /// Alive incident edges as `(edge index, other endpoint, cost)`.
    fn neighbors(&self, vertex: FieldRef) -> Vec<(usize, FieldRef, f64)> {
        let Some(edges) = self.incident.get(&vertex) else {
            return Vec::new();
        };
        edges
            .iter()
            .filter(|&&e| self.alive[e])
            .filter_map(|&e| {
                let mapping = &self.mappings[e];
                let other = mapping.other(vertex)?;
                // Traversal away from `vertex`: reverse when leaving b.
                let reverse = mapping.b() == vertex;
                Some((e, other, mapping.cost(reverse)))
            })
            .collect()
    }
}

/// Solve for the cheapest edge subset connecting every goal vertex.
///
/// Fails with [`Error::UnreachableConcept`] when some goal has no path;
/// an empty result is never returned for a misconfigured graph.
pub fn solve(model: &DataModel, goals: &HashSet<FieldRef>) -> Result<Route, Error> {
    let mappings = model.mappings();
    let mut graph = Graph::build(mappings);
    let mut goals: HashSet<FieldRef> = goals.clone();

    if goals.is_empty() {
        return Ok(Route {
            mappings: Vec::new(),
            cost: 0.0,
        });
    }

    let forced = normalize(&mut graph, &mut goals);

    debug!(
        goals = goals.len(),
        forced = forced.len(),
        "mapping graph normalized"
    );

    let searched = search(&graph, &goals).ok_or_else(|| unreachable_error(model, &goals))?;

    let mut route: Vec<Mapping> = forced
        .iter()
        .map(|&e| mappings[e].clone())
        .collect();
    route.extend(searched.edges.iter().map(|&e| mappings[e].clone()));

    debug!(edges = route.len(), cost = searched.cost, "route solved");

    Ok(Route {
        mappings: route,
        cost: searched.cost,
    })
}

/// Dead-end pruning: repeatedly remove degree-1 vertices.
///
/// A non-goal leaf is simply dropped. A goal leaf is replaced in the
/// goal set by its sole neighbor and its edge recorded as forced, so
/// singly-connected goals are attached, never searched for.
fn normalize(graph: &mut Graph<'_>, goals: &mut HashSet<FieldRef>) -> Vec<usize> {
    let mut forced = Vec::new();

    loop {
        // A lone surviving goal is the search seed and must stay; every
        // other degree-1 vertex is prunable.
        let leaf = graph
            .incident
            .keys()
            .copied()
            .find(|&v| graph.degree(v) == 1 && !(goals.contains(&v) && goals.len() == 1));

        let Some(vertex) = leaf else { break };
        let Some(&(edge, neighbor, _)) = graph.neighbors(vertex).first() else {
            break;
        };

        graph.alive[edge] = false;
        if goals.remove(&vertex) {
            forced.push(edge);
            goals.insert(neighbor);
        }
    }

    forced
}

/// One branch-and-bound state: a connected partial tree.
struct SearchState {
    cost: f64,
    /// Included edge indices, kept sorted for deduplication.
    edges: Vec<usize>,
    touched: HashSet<FieldRef>,
}

/// Min-heap adapter; `BinaryHeap` is a max-heap, so order is inverted.
struct Frontier(SearchState);

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.0.cost.total_cmp(&other.0.cost) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.cost.total_cmp(&self.0.cost)
    }
}

/// Best-first search over partial trees seeded at one goal.
fn search(graph: &Graph<'_>, goals: &HashSet<FieldRef>) -> Option<SearchState> {
    // Deterministic seed; ties elsewhere are broken arbitrarily.
    let seed = goals.iter().min().copied()?;

    // A second goal with no edges at all can never be connected.
    if goals.len() > 1 {
        for &goal in goals {
            if graph.degree(goal) == 0 {
                return None;
            }
        }
    }

    let mut frontier = BinaryHeap::new();
    let mut seen: HashSet<Vec<usize>> = HashSet::new();
    frontier.push(Frontier(SearchState {
        cost: 0.0,
        edges: Vec::new(),
        touched: HashSet::from([seed]),
    }));

    let mut best: Option<SearchState> = None;

    while let Some(Frontier(state)) = frontier.pop() {
        // Dominance pruning against the best known full solution.
        if let Some(solution) = &best {
            if state.cost >= solution.cost {
                continue;
            }
        }

        if goals.iter().all(|g| state.touched.contains(g)) {
            best = Some(state);
            continue;
        }

        for &vertex in &state.touched {
            for (edge, other, cost) in graph.neighbors(vertex) {
                if state.touched.contains(&other) {
                    continue;
                }
                let mut edges = state.edges.clone();
                match edges.binary_search(&edge) {
                    Ok(_) => continue,
                    Err(pos) => edges.insert(pos, edge),
                }
                if !seen.insert(edges.clone()) {
                    continue;
                }
                let mut touched = state.touched.clone();
                touched.insert(other);
                frontier.push(Frontier(SearchState {
                    cost: state.cost + cost,
                    edges,
                    touched,
                }));
            }
        }
    }

    best
}

fn unreachable_error(model: &DataModel, goals: &HashSet<FieldRef>) -> Error {
    let mut labels: Vec<String> = goals
        .iter()
        .map(|g| describe(model, *g))
        .collect();
    labels.sort();
    Error::UnreachableConcept(labels.join(", "))
}

fn describe(model: &DataModel, vertex: FieldRef) -> String {
    let concept = model
        .concept_label(vertex.concept())
        .unwrap_or("<unknown>")
        .to_string();
    match vertex {
        FieldRef::Concept(_) => concept,
        FieldRef::Field(field) => {
            let source = model
                .source_names()
                .get(field.source.0 as usize)
                .map(String::as_str)
                .unwrap_or("<unknown>");
            format!("{concept}@{source}")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fedtab_types::Value;

    use super::*;
    use crate::model::{ConceptId, DataSource, Field, Mapping, SourceId, Translator};

    struct Echo;

    impl Translator for Echo {
        fn translate(&self, value: &Value, _reverse: bool) -> Result<Vec<Value>, Error> {
            Ok(vec![value.clone()])
        }
    }

    /// Source whose mappings connect concepts directly, each with unit cost
    /// unless overridden.
    struct ConceptPairs(Vec<(&'static str, &'static str, f64)>);

    impl DataSource for ConceptPairs {
        fn name(&self) -> &str {
            "pairs"
        }

        fn mappings(&self, model: &mut DataModel, _id: SourceId) -> Result<Vec<Mapping>, Error> {
            Ok(self
                .0
                .iter()
                .map(|(a, b, cost)| {
                    let a = model.concept(a).id;
                    let b = model.concept(b).id;
                    Mapping::new(a, b, *cost, Arc::new(Echo))
                })
                .collect())
        }
    }

    fn goals(model: &DataModel, labels: &[&str]) -> HashSet<FieldRef> {
        labels
            .iter()
            .map(|l| FieldRef::Concept(model.concept_id(l).unwrap()))
            .collect()
    }

    fn edge_labels(model: &DataModel, route: &Route) -> Vec<(String, String)> {
        let mut edges: Vec<(String, String)> = route
            .mappings()
            .iter()
            .map(|m| {
                let mut pair = [
                    model.concept_label(m.a().concept()).unwrap().to_string(),
                    model.concept_label(m.b().concept()).unwrap().to_string(),
                ];
                pair.sort();
                (pair[0].clone(), pair[1].clone())
            })
            .collect();
        edges.sort();
        edges
    }

    #[test]
    fn test_star_goals_resolved_by_forcing() {
        let mut model = DataModel::new();
        model
            .register(&ConceptPairs(vec![
                ("date", "article", 1.0),
                ("medium", "article", 1.0),
            ]))
            .unwrap();

        let route = solve(&model, &goals(&model, &["date", "medium"])).unwrap();

        assert_eq!(
            edge_labels(&model, &route),
            vec![
                ("article".to_string(), "date".to_string()),
                ("article".to_string(), "medium".to_string()),
            ]
        );
        // Both edges were forced leaf attachments.
        assert_eq!(route.cost(), 0.0);
    }

    #[test]
    fn test_cheapest_path_wins() {
        let mut model = DataModel::new();
        model
            .register(&ConceptPairs(vec![
                ("a", "b", 1.0),
                ("b", "c", 1.0),
                ("a", "d", 5.0),
                ("d", "c", 5.0),
                // Extra edges keep a and c above degree 1 so search runs.
                ("a", "x", 1.0),
                ("c", "x", 50.0),
            ]))
            .unwrap();

        let route = solve(&model, &goals(&model, &["a", "c"])).unwrap();
        assert_eq!(
            edge_labels(&model, &route),
            vec![
                ("a".to_string(), "b".to_string()),
                ("b".to_string(), "c".to_string()),
            ]
        );
        assert_eq!(route.cost(), 2.0);
    }

    #[test]
    fn test_unreachable_goal_is_fatal() {
        let mut model = DataModel::new();
        model
            .register(&ConceptPairs(vec![("a", "b", 1.0), ("x", "y", 1.0)]))
            .unwrap();

        let err = solve(&model, &goals(&model, &["a", "x"])).unwrap_err();
        assert!(matches!(err, Error::UnreachableConcept(_)));
    }

    #[test]
    fn test_singleton_goal_yields_empty_route() {
        let mut model = DataModel::new();
        model
            .register(&ConceptPairs(vec![("a", "b", 1.0)]))
            .unwrap();

        // Degree-1 goal with nothing else requested: nothing to join.
        let route = solve(&model, &goals(&model, &["a"])).unwrap();
        assert!(route.mappings().is_empty());
    }

    #[test]
    fn test_resolve_is_cost_idempotent() {
        let mut model = DataModel::new();
        model
            .register(&ConceptPairs(vec![
                ("a", "b", 1.0),
                ("b", "c", 2.0),
                ("a", "c", 3.0),
                ("a", "x", 1.0),
                ("c", "x", 1.0),
            ]))
            .unwrap();

        let g = goals(&model, &["a", "c"]);
        let first = solve(&model, &g).unwrap().cost();
        for _ in 0..5 {
            assert_eq!(solve(&model, &g).unwrap().cost(), first);
        }
    }

    #[test]
    fn test_route_spans_goals_through_field_identities() {
        // Fields connected inside one source; goals are the abstract
        // concepts, reached through synthesized identity mappings.
        struct FieldSource;

        impl DataSource for FieldSource {
            fn name(&self) -> &str {
                "articles"
            }

            fn mappings(
                &self,
                model: &mut DataModel,
                id: SourceId,
            ) -> Result<Vec<Mapping>, Error> {
                let date = Field::new(id, model.concept("date").id);
                let article = Field::new(id, model.concept("article").id);
                Ok(vec![Mapping::new(date, article, 1.0, Arc::new(Echo))])
            }
        }

        let mut model = DataModel::new();
        model.register(&FieldSource).unwrap();

        let route = solve(&model, &goals(&model, &["date", "article"])).unwrap();
        // date concept -> date field -> article field -> article concept.
        assert_eq!(route.mappings().len(), 3);
        assert_eq!(
            route
                .mappings()
                .iter()
                .filter(|m| m.is_identity())
                .count(),
            2
        );
    }

    #[test]
    fn test_unknown_concept_id_in_goals() {
        let mut model = DataModel::new();
        model
            .register(&ConceptPairs(vec![("a", "b", 1.0)]))
            .unwrap();

        let mut g = goals(&model, &["a"]);
        g.insert(FieldRef::Concept(ConceptId(99)));
        let err = solve(&model, &g).unwrap_err();
        assert!(matches!(err, Error::UnreachableConcept(_)));
    }
}
