//! Core error types.

use thiserror::Error;

/// Engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Cache backing store error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// A requested or filtered concept has no route through the mapping graph.
    #[error("no route to concept: {0}")]
    UnreachableConcept(String),

    /// A required join edge has no materialized or derivable data on either side.
    #[error("insufficient data for query: {0}")]
    InsufficientData(String),

    /// A data source with this name is already registered.
    #[error("duplicate data source: {0}")]
    DuplicateSource(String),

    /// A data source failed while translating values.
    #[error("data source error: {0}")]
    Source(String),

    /// Encoded cache data could not be decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The data model grew after the cache fixed its bitmask width.
    #[error("concept count changed after cache construction: expected {expected}, got {actual}")]
    ConceptCountChanged {
        /// Width the cache was built with.
        expected: usize,
        /// Width the model reports now.
        actual: usize,
    },

    /// Cache-only engine had no subsuming entry for the request.
    #[error("no cached entry subsumes the request")]
    CacheMiss,
}
