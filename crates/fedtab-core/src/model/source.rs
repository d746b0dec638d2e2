//! Data source registration contract.

use crate::error::Error;

use super::{DataModel, Mapping, SourceId};

/// A heterogeneous data source contributing mappings to the model.
///
/// Sources are registered once during the setup phase; `mappings` is
/// called exactly once at registration and may intern concepts on the
/// model while building its edges.
pub trait DataSource: Send + Sync {
    /// Unique source name; duplicate names are rejected at registration.
    fn name(&self) -> &str;

    /// Produce this source's translation mappings.
    ///
    /// `id` is the source id assigned by the model; field endpoints must
    /// use it so field identity stays per-source.
    fn mappings(&self, model: &mut DataModel, id: SourceId) -> Result<Vec<Mapping>, Error>;
}
