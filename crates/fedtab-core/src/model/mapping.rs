//! Cost-weighted translation edges between graph vertices.

use std::fmt;
use std::sync::Arc;

use fedtab_types::Value;

use crate::error::Error;

use super::{Field, FieldRef};

/// Cost assigned to synthesized field-to-concept identity mappings.
///
/// Kept well below typical source mapping costs so the solver attaches a
/// field to its concept before it considers crossing into another source.
pub(crate) const IDENTITY_COST: f64 = 0.1;

/// Translates values across one mapping.
///
/// `translate` is the only place in the engine where source I/O happens;
/// it is an ordinary blocking call. The `prepare` hook is invoked once per
/// join with every distinct driving value, so implementations can batch a
/// source round trip into an interior cache before the per-value calls.
pub trait Translator: Send + Sync {
    /// Translate one value across the mapping.
    ///
    /// With `reverse` set, translation runs from endpoint `b` to `a`.
    /// Returns zero or more corresponding values; an empty result drops
    /// the driving row (inner-join semantics).
    fn translate(&self, value: &Value, reverse: bool) -> Result<Vec<Value>, Error>;

    /// Batch hook called before a run of `translate` calls.
    fn prepare(&self, _values: &[Value], _reverse: bool) -> Result<(), Error> {
        Ok(())
    }

    /// Enumerate every value of endpoint `a` (endpoint `b` when `reverse`)
    /// the backing source holds, if it can.
    ///
    /// The executor falls back to this when a join is required but neither
    /// endpoint has materialized data; a source that cannot enumerate
    /// returns `None` and such a join fails as insufficient data.
    fn domain(&self, _reverse: bool) -> Result<Option<Vec<Value>>, Error> {
        Ok(None)
    }
}

/// Identity translator used by synthesized field-to-concept mappings.
struct IdentityTranslator;

impl Translator for IdentityTranslator {
    fn translate(&self, value: &Value, _reverse: bool) -> Result<Vec<Value>, Error> {
        Ok(vec![value.clone()])
    }
}

/// A directed-cost translation edge between two graph vertices.
#[derive(Clone)]
pub struct Mapping {
    a: FieldRef,
    b: FieldRef,
    cost: f64,
    reverse_cost: f64,
    identity: bool,
    translator: Arc<dyn Translator>,
}

impl Mapping {
    /// Create a mapping with symmetric cost.
    pub fn new(
        a: impl Into<FieldRef>,
        b: impl Into<FieldRef>,
        cost: f64,
        translator: Arc<dyn Translator>,
    ) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
            cost,
            reverse_cost: cost,
            identity: false,
            translator,
        }
    }

    /// Create a mapping with distinct forward and reverse costs.
    pub fn with_costs(
        a: impl Into<FieldRef>,
        b: impl Into<FieldRef>,
        cost: f64,
        reverse_cost: f64,
        translator: Arc<dyn Translator>,
    ) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
            cost,
            reverse_cost,
            identity: false,
            translator,
        }
    }

    /// Synthesize the identity mapping from a field to its concept.
    pub(crate) fn identity(field: Field) -> Self {
        Self {
            a: FieldRef::Field(field),
            b: FieldRef::Concept(field.concept),
            cost: IDENTITY_COST,
            reverse_cost: IDENTITY_COST,
            identity: true,
            translator: Arc::new(IdentityTranslator),
        }
    }

    /// Endpoint `a` (the forward-direction origin).
    pub fn a(&self) -> FieldRef {
        self.a
    }

    /// Endpoint `b` (the forward-direction target).
    pub fn b(&self) -> FieldRef {
        self.b
    }

    /// Cost of traversing in the given direction.
    pub fn cost(&self, reverse: bool) -> f64 {
        if reverse {
            self.reverse_cost
        } else {
            self.cost
        }
    }

    /// Whether this is a synthesized field-to-concept identity mapping.
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Given one endpoint, return the other.
    ///
    /// Returns `None` if `from` is not an endpoint of this mapping.
    pub fn other(&self, from: FieldRef) -> Option<FieldRef> {
        if from == self.a {
            Some(self.b)
        } else if from == self.b {
            Some(self.a)
        } else {
            None
        }
    }

    /// Translate one value across this mapping.
    pub fn translate(&self, value: &Value, reverse: bool) -> Result<Vec<Value>, Error> {
        self.translator.translate(value, reverse)
    }

    /// Run the batch-preparation hook for a set of driving values.
    pub fn prepare(&self, values: &[Value], reverse: bool) -> Result<(), Error> {
        self.translator.prepare(values, reverse)
    }

    /// Enumerate the backing domain of one endpoint, if the source can.
    pub fn domain(&self, reverse: bool) -> Result<Option<Vec<Value>>, Error> {
        self.translator.domain(reverse)
    }
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapping")
            .field("a", &self.a)
            .field("b", &self.b)
            .field("cost", &self.cost)
            .field("reverse_cost", &self.reverse_cost)
            .field("identity", &self.identity)
            .finish()
    }
}
