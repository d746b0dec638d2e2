//! Materialized-result caching with subsumption-aware lookup.
//!
//! Entries are indexed by concept bitmasks so a broad cached result can
//! answer a narrower follow-up query without touching the sources.

mod mask;
mod store;
mod subsume;

pub use mask::ConceptMask;
pub use store::{CacheConfig, ResultCache};
pub use subsume::residual;
