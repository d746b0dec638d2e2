//! Interned semantic concepts.

/// Identifier of an interned concept.
///
/// The index is assigned at interning time and doubles as the concept's
/// stable bit position in cache bitmasks, so it must never be reassigned
/// for the lifetime of the owning [`DataModel`](super::DataModel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConceptId(pub u32);

impl ConceptId {
    /// The bitmask bit position for this concept.
    pub fn bit(self) -> usize {
        self.0 as usize
    }
}

/// An abstract, named semantic field, unique per data model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Concept {
    /// Interned identifier.
    pub id: ConceptId,
    /// Human-readable label the concept was interned under.
    pub label: String,
}

impl Concept {
    pub(crate) fn new(id: ConceptId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }
}
