//! The data model: concept interner and mapping registry.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::Error;

use super::{Concept, ConceptId, DataSource, Field, FieldRef, Mapping, SourceId};

/// Registry of data sources, interned concepts, and all mappings.
///
/// One instance is built during setup and then shared read-only (for
/// example behind an `Arc`) with the solver, executor, and cache.
/// Concept ids are assigned in interning order and never reassigned;
/// they fix the cache bitmask bit positions.
#[derive(Debug, Default)]
pub struct DataModel {
    labels: Vec<String>,
    by_label: HashMap<String, ConceptId>,
    source_names: Vec<String>,
    mappings: Vec<Mapping>,
}

impl DataModel {
    /// Create an empty data model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the concept interned under `label`.
    pub fn concept(&mut self, label: &str) -> Concept {
        if let Some(&id) = self.by_label.get(label) {
            return Concept::new(id, label);
        }
        let id = ConceptId(self.labels.len() as u32);
        self.labels.push(label.to_string());
        self.by_label.insert(label.to_string(), id);
        Concept::new(id, label)
    }

    /// Look up an already-interned concept without creating it.
    pub fn concept_id(&self, label: &str) -> Option<ConceptId> {
        self.by_label.get(label).copied()
    }

    /// The label a concept was interned under.
    pub fn concept_label(&self, id: ConceptId) -> Option<&str> {
        self.labels.get(id.bit()).map(String::as_str)
    }

    /// Number of interned concepts; fixes the cache bitmask width.
    pub fn concept_count(&self) -> usize {
        self.labels.len()
    }

    /// Register a data source and collect its mappings.
    ///
    /// Synthesizes an identity mapping from every distinct field endpoint
    /// to its concept, so the solver can always step from a concrete
    /// field to the abstract concept at low cost.
    pub fn register(&mut self, source: &dyn DataSource) -> Result<SourceId, Error> {
        let name = source.name().to_string();
        if self.source_names.iter().any(|n| *n == name) {
            return Err(Error::DuplicateSource(name));
        }

        let id = SourceId(self.source_names.len() as u32);
        self.source_names.push(name.clone());

        let mappings = source.mappings(self, id)?;

        let mut seen_fields: HashSet<Field> = HashSet::new();
        let mut identities = Vec::new();
        for mapping in &mappings {
            for endpoint in [mapping.a(), mapping.b()] {
                if let FieldRef::Field(field) = endpoint {
                    if seen_fields.insert(field) {
                        identities.push(Mapping::identity(field));
                    }
                }
            }
        }

        debug!(
            source = %name,
            mappings = mappings.len(),
            identities = identities.len(),
            "registered data source"
        );

        self.mappings.extend(mappings);
        self.mappings.extend(identities);
        Ok(id)
    }

    /// All mappings: source-provided plus synthesized identities.
    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    /// Names of registered sources, in registration order.
    pub fn source_names(&self) -> &[String] {
        &self.source_names
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fedtab_types::Value;

    use super::*;
    use crate::model::Translator;

    struct Upper;

    impl Translator for Upper {
        fn translate(&self, value: &Value, _reverse: bool) -> Result<Vec<Value>, Error> {
            match value {
                Value::String(s) => Ok(vec![Value::String(s.to_uppercase())]),
                other => Ok(vec![other.clone()]),
            }
        }
    }

    struct PairSource;

    impl DataSource for PairSource {
        fn name(&self) -> &str {
            "pairs"
        }

        fn mappings(&self, model: &mut DataModel, id: SourceId) -> Result<Vec<Mapping>, Error> {
            let left = Field::new(id, model.concept("left").id);
            let right = Field::new(id, model.concept("right").id);
            Ok(vec![Mapping::new(left, right, 1.0, Arc::new(Upper))])
        }
    }

    #[test]
    fn test_concept_interning_is_stable() {
        let mut model = DataModel::new();
        let a = model.concept("date");
        let b = model.concept("medium");
        let a_again = model.concept("date");

        assert_eq!(a.id, a_again.id);
        assert_ne!(a.id, b.id);
        assert_eq!(model.concept_count(), 2);
        assert_eq!(model.concept_label(a.id), Some("date"));
        assert_eq!(model.concept_id("medium"), Some(b.id));
        assert_eq!(model.concept_id("missing"), None);
    }

    #[test]
    fn test_register_synthesizes_identity_mappings() {
        let mut model = DataModel::new();
        model.register(&PairSource).unwrap();

        // One source mapping plus one identity per distinct field endpoint.
        assert_eq!(model.mappings().len(), 3);
        assert_eq!(
            model.mappings().iter().filter(|m| m.is_identity()).count(),
            2
        );
    }

    #[test]
    fn test_duplicate_source_rejected() {
        let mut model = DataModel::new();
        model.register(&PairSource).unwrap();
        let err = model.register(&PairSource).unwrap_err();
        assert!(matches!(err, Error::DuplicateSource(name) if name == "pairs"));
    }
}
