//! Fixed-width concept bit sets for cache indexing.
//!
//! Every cached entry is indexed by two masks: the concepts it has as
//! columns and the concepts it was filtered on. Bit positions are the
//! interned `ConceptId` values, so the mask width is the model's concept
//! count at cache construction time. A model that grew afterwards is a
//! hard error, never a silent mismatch.

use crate::error::Error;
use crate::model::ConceptId;

/// Bit set over concept ids, fixed to a width in bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptMask {
    bits: u32,
    words: Vec<u64>,
}

impl ConceptMask {
    /// Empty mask of the given width.
    pub fn new(bits: u32) -> Self {
        Self {
            bits,
            words: vec![0; Self::word_count(bits)],
        }
    }

    /// Mask with every listed concept's bit set.
    pub fn from_concepts<I>(bits: u32, concepts: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = ConceptId>,
    {
        let mut mask = Self::new(bits);
        for concept in concepts {
            mask.set(concept)?;
        }
        Ok(mask)
    }

    fn word_count(bits: u32) -> usize {
        (bits as usize).div_ceil(64)
    }

    /// Width in bits this mask was built for.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Set a concept's bit. A concept interned after the cache was
    /// opened falls outside the width and is rejected.
    pub fn set(&mut self, concept: ConceptId) -> Result<(), Error> {
        if concept.0 >= self.bits {
            return Err(Error::ConceptCountChanged {
                expected: self.bits as usize,
                actual: (concept.0 + 1) as usize,
            });
        }
        self.words[(concept.0 / 64) as usize] |= 1u64 << (concept.0 % 64);
        Ok(())
    }

    /// Whether the concept's bit is set.
    pub fn contains(&self, concept: ConceptId) -> bool {
        if concept.0 >= self.bits {
            return false;
        }
        self.words[(concept.0 / 64) as usize] & (1u64 << (concept.0 % 64)) != 0
    }

    /// Whether every bit of `other` is also set here. Masks of different
    /// widths never relate.
    pub fn is_superset_of(&self, other: &Self) -> bool {
        self.bits == other.bits
            && self
                .words
                .iter()
                .zip(&other.words)
                .all(|(a, b)| a & b == *b)
    }

    /// Append the encoded mask: width, then the packed words.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.bits.to_le_bytes());
        for word in &self.words {
            buf.extend_from_slice(&word.to_le_bytes());
        }
    }

    /// Decode a mask; returns the mask and the bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), Error> {
        let bits_bytes: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| Error::Codec("truncated mask width".into()))?;
        let bits = u32::from_le_bytes(bits_bytes);

        let mut words = Vec::with_capacity(Self::word_count(bits));
        let mut cursor = 4;
        for _ in 0..Self::word_count(bits) {
            let word_bytes: [u8; 8] = data
                .get(cursor..cursor + 8)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| Error::Codec("truncated mask word".into()))?;
            words.push(u64::from_le_bytes(word_bytes));
            cursor += 8;
        }

        Ok((Self { bits, words }, cursor))
    }
}
