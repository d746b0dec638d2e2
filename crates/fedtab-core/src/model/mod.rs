//! Static concept-graph configuration.
//!
//! Everything in this module is immutable once registration finishes:
//! a [`DataModel`] is built during setup, then shared read-only across
//! queries. Per-query state lives in the executor, not here.

mod concept;
mod datamodel;
mod field;
mod filter;
mod mapping;
mod source;

pub use concept::{Concept, ConceptId};
pub use datamodel::DataModel;
pub use field::{Field, FieldRef, SourceId};
pub use filter::Filter;
pub use mapping::{Mapping, Translator};
pub use source::DataSource;
