//! Bit-encoded configuration ids.
//!
//! A subset of tile (or detection-head) indices is addressed by
//! `id = Σ 2^index`. Calibration tables are allocated with exactly
//! `2^count` entries and written/read through this encoding, so
//! [`SubsetId::encode`] and [`SubsetId::decode`] must stay exact inverses.

use crate::error::{AnytimeError, Result};
use serde::{Deserialize, Serialize};

/// Upper bound on indices that can be encoded.
pub const MAX_SUBSET_BITS: usize = 63;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SubsetId(pub u64);

impl SubsetId {
    pub const EMPTY: SubsetId = SubsetId(0);

    /// Encode a set of distinct indices. Repeated indices are counted once.
    ///
    /// Panics on an index of [`MAX_SUBSET_BITS`] or more; use
    /// [`SubsetId::try_encode`] for indices that are not known to be in range.
    pub fn encode<I>(indices: I) -> SubsetId
    where
        I: IntoIterator<Item = usize>,
    {
        match SubsetId::try_encode(indices) {
            Ok(id) => id,
            Err(e) => panic!("{e}"),
        }
    }

    pub fn try_encode<I>(indices: I) -> Result<SubsetId>
    where
        I: IntoIterator<Item = usize>,
    {
        indices
            .into_iter()
            .try_fold(SubsetId::EMPTY, |id, idx| id.with(idx))
    }

    /// Id of the full set `{0, .., count-1}`.
    pub fn full(count: usize) -> SubsetId {
        if count == 0 {
            SubsetId::EMPTY
        } else {
            SubsetId(u64::MAX >> (64 - count))
        }
    }

    /// Ascending indices contained in the id.
    pub fn decode(self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.0.count_ones() as usize);
        let mut bits = self.0;
        while bits != 0 {
            let idx = bits.trailing_zeros() as usize;
            out.push(idx);
            bits &= bits - 1;
        }
        out
    }

    pub fn contains(self, idx: usize) -> bool {
        idx < 64 && (self.0 >> idx) & 1 == 1
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Highest index in the subset.
    pub fn max_index(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(63 - self.0.leading_zeros() as usize)
        }
    }

    /// Table slot for this id; `None` when it does not fit a table of `len` entries.
    pub fn slot(self, len: usize) -> Option<usize> {
        usize::try_from(self.0).ok().filter(|&i| i < len)
    }

    /// Add `idx` to the subset.
    pub fn with(self, idx: usize) -> Result<SubsetId> {
        if idx >= MAX_SUBSET_BITS {
            return Err(AnytimeError::invalid_input(format!(
                "subset index {idx} outside [0, {MAX_SUBSET_BITS})"
            )));
        }
        Ok(SubsetId(self.0 | (1u64 << idx)))
    }
}

/// Number of table entries needed to address every subset of `count` indices.
pub fn table_len(count: usize) -> usize {
    1usize << count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subset_of_small_universe_round_trips() {
        for t in 1..=8usize {
            for raw in 0..(1u64 << t) {
                let indices = SubsetId(raw).decode();
                assert!(indices.windows(2).all(|w| w[0] < w[1]));
                assert!(indices.iter().all(|&i| i < t));
                assert_eq!(SubsetId::encode(indices.iter().copied()), SubsetId(raw));
            }
        }
    }

    #[test]
    fn encode_matches_sum_of_powers() {
        let id = SubsetId::encode([1, 2]);
        assert_eq!(id.0, 0b0110);
        assert_eq!(id.0, 2u64.pow(1) + 2u64.pow(2));
        assert_eq!(SubsetId::encode([0, 3, 5]).0, 1 + 8 + 32);
    }

    #[test]
    fn full_and_max_index() {
        assert_eq!(SubsetId::full(4), SubsetId(15));
        assert_eq!(SubsetId::full(0), SubsetId::EMPTY);
        assert_eq!(SubsetId::full(4).max_index(), Some(3));
        assert_eq!(SubsetId::EMPTY.max_index(), None);
        assert_eq!(SubsetId::full(63).len(), 63);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        assert_eq!(SubsetId(1).with(62).unwrap(), SubsetId(1 | 1 << 62));
        for idx in [MAX_SUBSET_BITS, 64, 70, usize::MAX] {
            assert!(matches!(
                SubsetId::EMPTY.with(idx),
                Err(AnytimeError::InvalidInput(_))
            ));
            assert!(SubsetId::try_encode([3, idx]).is_err());
        }
    }

    #[test]
    fn slot_respects_table_bounds() {
        assert_eq!(SubsetId(15).slot(table_len(4)), Some(15));
        assert_eq!(SubsetId(16).slot(table_len(4)), None);
    }
}
