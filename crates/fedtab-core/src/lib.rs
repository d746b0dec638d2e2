//! Fedtab Core - Concept graph, route solver, join executor, and
//! result cache.
//!
//! This crate provides the federated query engine: heterogeneous data
//! sources are modeled as a graph of fields connected by cost-weighted
//! translation mappings, queries solve for the cheapest connecting
//! route, and materialized results are cached with subsumption-aware
//! lookup.

pub mod cache;
pub mod codec;
pub mod engine;
pub mod error;
pub mod executor;
pub mod model;
pub mod solver;

pub use cache::{CacheConfig, ConceptMask, ResultCache};
pub use engine::{Engine, QueryOptions, SortDirection};
pub use error::Error;
pub use executor::JoinExecutor;
pub use model::{
    Concept, ConceptId, DataModel, DataSource, Field, FieldRef, Filter, Mapping, SourceId,
    Translator,
};
pub use solver::{solve, Route};

/// Re-export boundary types.
pub use fedtab_types as types;
