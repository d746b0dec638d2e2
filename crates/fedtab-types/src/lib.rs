//! Boundary data types for the fedtab engine.
//!
//! Collaborating subsystems (web views, serializers, export tooling) only
//! ever exchange plain row tables with the engine. This crate defines the
//! runtime [`Value`] scalar and the column-ordered [`RowTable`] those
//! collaborators consume, without pulling in any engine internals.

mod table;
mod value;

pub use table::{Row, RowTable};
pub use value::{compare_values, values_equal, Value};
