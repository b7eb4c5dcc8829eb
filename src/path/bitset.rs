//! Dense bitset over path ordinals.
//!
//! Most mappings register well under 128 paths per root type, so two inline
//! words cover the common case without allocating.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::PathOrdinal;

const WORD_BITS: usize = u64::BITS as usize;

/// A set of [`PathOrdinal`]s: one dirtiness state, or the ordinals a filter
/// cares about.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PathBitSet {
    words: SmallVec<[u64; 2]>,
}

impl PathBitSet {
    pub fn new() -> Self {
        Self { words: SmallVec::new() }
    }

    /// A set holding every ordinal in `0..len`.
    pub fn full(len: usize) -> Self {
        let mut set = Self::new();
        for ordinal in 0..len {
            set.insert(PathOrdinal::from_index(ordinal));
        }
        set
    }

    pub fn insert(&mut self, ordinal: PathOrdinal) -> bool {
        let (word, mask) = Self::locate(ordinal);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let was_set = self.words[word] & mask != 0;
        self.words[word] |= mask;
        !was_set
    }

    pub fn remove(&mut self, ordinal: PathOrdinal) -> bool {
        let (word, mask) = Self::locate(ordinal);
        match self.words.get_mut(word) {
            Some(bits) if *bits & mask != 0 => {
                *bits &= !mask;
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, ordinal: PathOrdinal) -> bool {
        let (word, mask) = Self::locate(ordinal);
        self.words.get(word).is_some_and(|bits| bits & mask != 0)
    }

    /// Whether the two sets share at least one ordinal.
    pub fn intersects(&self, other: &PathBitSet) -> bool {
        self.words.iter().zip(other.words.iter()).any(|(a, b)| a & b != 0)
    }

    pub fn intersection(&self, other: &PathBitSet) -> PathBitSet {
        let mut words: SmallVec<[u64; 2]> = self.words
            .iter()
            .zip(other.words.iter())
            .map(|(a, b)| a & b)
            .collect();
        trim(&mut words);
        PathBitSet { words }
    }

    pub fn union_with(&mut self, other: &PathBitSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= b;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Number of ordinals in the set.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Ordinals in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = PathOrdinal> + '_ {
        self.words.iter().enumerate().flat_map(|(idx, &word)| {
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let offset = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(PathOrdinal::from_index(idx * WORD_BITS + offset))
            })
        })
    }

    fn locate(ordinal: PathOrdinal) -> (usize, u64) {
        let index = ordinal.index();
        (index / WORD_BITS, 1u64 << (index % WORD_BITS))
    }
}

fn trim(words: &mut SmallVec<[u64; 2]>) {
    while words.last() == Some(&0) {
        words.pop();
    }
}

impl PartialEq for PathBitSet {
    fn eq(&self, other: &Self) -> bool {
        let (short, long) = if self.words.len() <= other.words.len() {
            (&self.words, &other.words)
        } else {
            (&other.words, &self.words)
        };
        short.iter().zip(long.iter()).all(|(a, b)| a == b)
            && long[short.len()..].iter().all(|w| *w == 0)
    }
}

impl Eq for PathBitSet {}

impl FromIterator<PathOrdinal> for PathBitSet {
    fn from_iter<I: IntoIterator<Item = PathOrdinal>>(iter: I) -> Self {
        let mut set = Self::new();
        for ordinal in iter {
            set.insert(ordinal);
        }
        set
    }
}

impl Extend<PathOrdinal> for PathBitSet {
    fn extend<I: IntoIterator<Item = PathOrdinal>>(&mut self, iter: I) {
        for ordinal in iter {
            self.insert(ordinal);
        }
    }
}

impl fmt::Debug for PathBitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|o| o.index())).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
