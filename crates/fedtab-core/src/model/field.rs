//! Concrete fields and graph vertices.

use super::ConceptId;

/// Identifier of a registered data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u32);

/// A concrete realization of a concept inside one data source.
///
/// Identity is the `(source, concept)` pair: two fields with the same
/// pair are the same field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Field {
    /// Owning data source.
    pub source: SourceId,
    /// The concept this field realizes.
    pub concept: ConceptId,
}

impl Field {
    /// Create a field for a concept inside a source.
    pub fn new(source: SourceId, concept: ConceptId) -> Self {
        Self { source, concept }
    }
}

/// A vertex of the mapping graph: either a concrete field or an abstract
/// concept. Mapping endpoints, solver goals, and executor node columns
/// all use this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldRef {
    /// A concrete field inside one source.
    Field(Field),
    /// An abstract concept shared across sources.
    Concept(ConceptId),
}

impl FieldRef {
    /// The concept this vertex carries values for.
    pub fn concept(&self) -> ConceptId {
        match self {
            FieldRef::Field(f) => f.concept,
            FieldRef::Concept(c) => *c,
        }
    }

    /// Check if this vertex is the abstract side of a concept.
    pub fn is_concept(&self) -> bool {
        matches!(self, FieldRef::Concept(_))
    }
}

impl From<Field> for FieldRef {
    fn from(f: Field) -> Self {
        FieldRef::Field(f)
    }
}

impl From<ConceptId> for FieldRef {
    fn from(c: ConceptId) -> Self {
        FieldRef::Concept(c)
    }
}
