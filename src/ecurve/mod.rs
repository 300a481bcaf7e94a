// The compressed ordered k-mer index ("ecurve") and its nearest-neighbour
// lookup.

pub mod storage;

use crate::alphabet::Alphabet;
use crate::word::{Word, PREFIX_MAX};

/// Sentinel `count` value marking a prefix-table entry that lies entirely
/// below or entirely above every indexed word.
const EDGE_MARKER: usize = usize::MAX;

/// An opaque protein family identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Family(pub u16);

#[derive(Clone, Copy, Debug)]
struct PrefixEntry {
    first: usize,
    count: usize,
}

/// Outcome of [`Ecurve::lookup`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupStatus {
    /// The queried word is present in the ecurve.
    Exact,
    /// The queried word is not present, but lies between two indexed
    /// words.
    Inexact,
    /// The queried word's prefix lies entirely below or above every
    /// indexed prefix.
    OutOfBounds,
}

/// The result of a nearest-neighbour lookup: a status plus the indexed
/// word/family pair(s) bracketing the query.
#[derive(Clone, Copy, Debug)]
pub struct LookupResult {
    pub status: LookupStatus,
    pub lower: (Word, Family),
    pub upper: (Word, Family),
}

/// Backing storage for an ecurve's three parallel arrays: either owned
/// `Vec`s (built in memory, or loaded from the plain-text/binary
/// formats), or a read-only memory map (§storage).
///
/// The mmap variant never reinterprets its bytes as a `&[u64]`/`&[u16]`
/// slice in place — `memmap2::Mmap` makes no alignment guarantee strong
/// enough for that cast to be sound at an arbitrary file offset — so both
/// variants are accessed through the same per-element decode methods
/// below.
enum Backing {
    Owned {
        suffixes: Vec<u64>,
        families: Vec<u16>,
    },
    #[cfg(feature = "mmap")]
    Mmap(storage::MmapEcurve),
}

impl Backing {
    fn len(&self) -> usize {
        match self {
            Backing::Owned { suffixes, .. } => suffixes.len(),
            #[cfg(feature = "mmap")]
            Backing::Mmap(m) => m.len(),
        }
    }

    fn suffix_at(&self, idx: usize) -> u64 {
        match self {
            Backing::Owned { suffixes, .. } => suffixes[idx],
            #[cfg(feature = "mmap")]
            Backing::Mmap(m) => m.suffix_at(idx),
        }
    }

    fn family_at(&self, idx: usize) -> u16 {
        match self {
            Backing::Owned { families, .. } => families[idx],
            #[cfg(feature = "mmap")]
            Backing::Mmap(m) => m.family_at(idx),
        }
    }

    /// `(first, count)` for `prefix`, read straight from the mapped file;
    /// `None` for owned ecurves, which keep their table as a plain `Vec`
    /// instead.
    fn prefix_entry_raw(&self, prefix: u32) -> Option<(u64, u64)> {
        match self {
            Backing::Owned { .. } => None,
            #[cfg(feature = "mmap")]
            Backing::Mmap(m) => Some(m.prefix_entry(prefix)),
        }
    }
}

/// The central index: a compressed, ordered map from 18-mer [`Word`]s to
/// [`Family`] identifiers, supporting O(log block size) nearest-neighbour
/// lookup.
pub struct Ecurve {
    alphabet: Alphabet,
    backing: Backing,
    /// One entry per possible prefix value, `0..=PREFIX_MAX`. Only
    /// populated for owned ecurves; mmap-backed ecurves read this
    /// straight out of the mapped file via [`Backing::prefix_entry_raw`].
    prefix_table: Vec<PrefixEntry>,
    /// `(first_index, prefix)` for every non-empty prefix block, sorted
    /// by `first_index`; used to recover a word's prefix from its index
    /// in the flat `suffixes`/`families` arrays.
    block_starts: Vec<(usize, u32)>,
}

impl Ecurve {
    /// Build an ecurve from a set of `(word, family)` entries. Entries
    /// need not be pre-sorted; duplicates (identical words) are kept as
    /// separate array slots sharing the same prefix block, with whichever
    /// was given last winning ties during binary search (should not
    /// normally occur in a well-formed model).
    pub fn build(alphabet: Alphabet, mut entries: Vec<(Word, Family)>) -> Ecurve {
        entries.sort_by_key(|(w, _)| *w);

        let n = entries.len();
        let mut suffixes = Vec::with_capacity(n);
        let mut families = Vec::with_capacity(n);
        let mut block_starts: Vec<(usize, u32)> = Vec::new();

        let mut i = 0;
        while i < n {
            let prefix = entries[i].0.prefix;
            let first = i;
            while i < n && entries[i].0.prefix == prefix {
                suffixes.push(entries[i].0.suffix);
                families.push(entries[i].1 .0);
                i += 1;
            }
            block_starts.push((first, prefix));
        }

        Ecurve::from_blocks(alphabet, block_starts, suffixes, families)
    }

    /// Reconstruct an ecurve from its compact representation: the
    /// non-empty `(first_index, prefix)` blocks plus the flat
    /// `suffixes`/`families` arrays they index into. Used both by
    /// [`Ecurve::build`] and by the plain-text/binary storage loaders,
    /// which already know the block boundaries without needing to
    /// re-sort anything.
    pub(crate) fn from_blocks(
        alphabet: Alphabet,
        block_starts: Vec<(usize, u32)>,
        suffixes: Vec<u64>,
        families: Vec<u16>,
    ) -> Ecurve {
        let n = suffixes.len();
        let mut prefix_table = vec![PrefixEntry { first: 0, count: 0 }; PREFIX_MAX as usize + 1];

        if block_starts.is_empty() {
            // An empty ecurve: every prefix is simultaneously below and
            // above all (zero) entries. There is no valid extreme index,
            // so every lookup will short-circuit before consulting it;
            // we still need a well-defined table to avoid special-casing
            // `lookup` for N == 0.
            for entry in prefix_table.iter_mut() {
                *entry = PrefixEntry {
                    first: 0,
                    count: EDGE_MARKER,
                };
            }
        } else {
            for (k, &(first, prefix)) in block_starts.iter().enumerate() {
                let count = if k + 1 < block_starts.len() {
                    block_starts[k + 1].0 - first
                } else {
                    n - first
                };
                prefix_table[prefix as usize] = PrefixEntry { first, count };
            }

            let lowest_prefix = block_starts[0].1;
            let highest_prefix = block_starts[block_starts.len() - 1].1;

            for p in 0..lowest_prefix {
                prefix_table[p as usize] = PrefixEntry {
                    first: 0,
                    count: EDGE_MARKER,
                };
            }
            for p in (highest_prefix + 1)..=PREFIX_MAX {
                prefix_table[p as usize] = PrefixEntry {
                    first: n - 1,
                    count: EDGE_MARKER,
                };
            }

            for w in block_starts.windows(2) {
                let (_, prefix_lo) = w[0];
                let (first_hi, prefix_hi) = w[1];
                let last_of_lo_block = first_hi - 1;
                for p in (prefix_lo + 1)..prefix_hi {
                    prefix_table[p as usize] = PrefixEntry {
                        first: last_of_lo_block,
                        count: 0,
                    };
                }
            }
        }

        Ecurve {
            alphabet,
            backing: Backing::Owned { suffixes, families },
            prefix_table,
            block_starts,
        }
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn len(&self) -> usize {
        self.backing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prefix_entry(&self, prefix: u32) -> PrefixEntry {
        match self.backing.prefix_entry_raw(prefix) {
            Some((first, count)) => PrefixEntry {
                first: first as usize,
                count: if count == u64::MAX {
                    EDGE_MARKER
                } else {
                    count as usize
                },
            },
            None => self.prefix_table[prefix as usize],
        }
    }

    /// Recover the prefix of the word stored at flat index `idx`, via
    /// binary search over the non-empty block boundaries.
    fn prefix_of_index(&self, idx: usize) -> u32 {
        match self.block_starts.binary_search_by_key(&idx, |&(first, _)| first) {
            Ok(k) => self.block_starts[k].1,
            Err(insert_at) => self.block_starts[insert_at - 1].1,
        }
    }

    fn word_at(&self, idx: usize) -> (Word, Family) {
        let word = Word {
            prefix: self.prefix_of_index(idx),
            suffix: self.backing.suffix_at(idx),
        };
        let family = Family(self.backing.family_at(idx));
        (word, family)
    }

    /// Binary search for `target` within `block` (a range of flat
    /// indices sharing one prefix), without requiring the backing store
    /// to hand out a contiguous `&[u64]` slice.
    fn binary_search_suffix(&self, block: std::ops::Range<usize>, target: u64) -> Result<usize, usize> {
        let mut lo = 0usize;
        let mut hi = block.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let v = self.backing.suffix_at(block.start + mid);
            match v.cmp(&target) {
                std::cmp::Ordering::Equal => return Ok(mid),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        Err(lo)
    }

    /// Nearest-neighbour lookup of `q` in this ecurve.
    ///
    /// See the module-level documentation of the design for the full
    /// case analysis; this follows it step for step.
    pub fn lookup(&self, q: Word) -> LookupResult {
        let entry = self.prefix_entry(q.prefix);

        if entry.count == EDGE_MARKER {
            let (word, family) = self.word_at(entry.first);
            return LookupResult {
                status: LookupStatus::OutOfBounds,
                lower: (word, family),
                upper: (word, family),
            };
        }

        if entry.count == 0 {
            let lower = self.word_at(entry.first);
            let upper = self.word_at(entry.first + 1);
            return LookupResult {
                status: LookupStatus::Inexact,
                lower,
                upper,
            };
        }

        let block = entry.first..entry.first + entry.count;
        match self.binary_search_suffix(block.clone(), q.suffix) {
            Ok(rel) => {
                let idx = entry.first + rel;
                let found = self.word_at(idx);
                LookupResult {
                    status: LookupStatus::Exact,
                    lower: found,
                    upper: found,
                }
            }
            Err(rel) => {
                let n = self.len();
                let lower_idx = if rel == 0 {
                    entry.first.saturating_sub(1)
                } else {
                    entry.first + rel - 1
                };
                let upper_idx = (entry.first + rel).min(n - 1);
                LookupResult {
                    status: LookupStatus::Inexact,
                    lower: self.word_at(lower_idx),
                    upper: self.word_at(upper_idx),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;

    fn alphabet() -> Alphabet {
        Alphabet::new("ARNDCQEGHILKMFPSTWYV").unwrap()
    }

    #[test]
    fn exact_match_single_entry() {
        let alphabet = alphabet();
        let w = Word::from_bytes(b"AAAAAAAAAAAAAAAAAA", &alphabet).unwrap();
        let ecurve = Ecurve::build(alphabet, vec![(w, Family(42))]);
        let result = ecurve.lookup(w);
        assert_eq!(result.status, LookupStatus::Exact);
        assert_eq!(result.lower.0, w);
        assert_eq!(result.lower.1, Family(42));
        assert_eq!(result.upper.1, Family(42));
    }

    #[test]
    fn out_of_bounds_low() {
        let alphabet = alphabet();
        let wb = Word::from_bytes(b"RRRRRRRRRRRRRRRRRR", &alphabet).unwrap();
        let wc = Word::from_bytes(b"NNNNNNNNNNNNNNNNNN", &alphabet).unwrap();
        let (lo, hi) = if wb < wc { (wb, wc) } else { (wc, wb) };
        let ecurve = Ecurve::build(alphabet.clone(), vec![(lo, Family(1)), (hi, Family(2))]);
        let below = Word::from_bytes(b"AAAAAAAAAAAAAAAAAA", &alphabet).unwrap();
        assert!(below < lo);
        let result = ecurve.lookup(below);
        assert_eq!(result.status, LookupStatus::OutOfBounds);
        assert_eq!(result.lower.0, lo);
        assert_eq!(result.upper.0, lo);
    }

    #[test]
    fn inexact_brackets_the_query() {
        let alphabet = alphabet();
        let lo = Word::from_bytes(b"AAAAAAAAAAAAAAAAAA", &alphabet).unwrap();
        let hi = Word::from_bytes(b"VVVVVVVVVVVVVVVVVV", &alphabet).unwrap();
        let ecurve = Ecurve::build(alphabet.clone(), vec![(lo, Family(1)), (hi, Family(2))]);
        let mid = Word::from_bytes(b"MMMMMMMMMMMMMMMMMM", &alphabet).unwrap();
        let result = ecurve.lookup(mid);
        assert_eq!(result.status, LookupStatus::Inexact);
        assert!(result.lower.0 <= mid);
        assert!(mid <= result.upper.0);
        assert_ne!(result.lower.0, mid);
        assert_ne!(result.upper.0, mid);
    }

    #[test]
    fn prefix_table_blocks_are_contiguous() {
        let alphabet = alphabet();
        let a = Word::from_bytes(b"AAAAAAAAAAAAAAAAAA", &alphabet).unwrap();
        let b = Word::from_bytes(b"AAAAAARRRRRRRRRRRR", &alphabet).unwrap();
        let c = Word::from_bytes(b"VVVVVVVVVVVVVVVVVV", &alphabet).unwrap();
        let ecurve = Ecurve::build(alphabet, vec![(a, Family(1)), (b, Family(1)), (c, Family(2))]);
        for w in ecurve.block_starts.windows(2) {
            let (first0, _) = w[0];
            let (first1, _) = w[1];
            assert!(first0 < first1);
        }
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::alphabet::Alphabet;
    use proptest::prelude::*;

    fn alphabet() -> Alphabet {
        Alphabet::new("ARNDCQEGHILKMFPSTWYV").unwrap()
    }

    fn word_bytes() -> impl Strategy<Value = Vec<u8>> {
        let letters = alphabet().as_str().into_bytes();
        prop::collection::vec(prop::sample::select(letters), crate::word::WORD_LEN)
    }

    /// A handful of distinct planted words, each with its own family, plus
    /// an arbitrary query word: enough entries to exercise edge, empty, and
    /// populated prefix blocks without the proptest shrinker taking forever
    /// on a large N.
    fn ecurve_and_query() -> impl Strategy<Value = (Vec<Vec<u8>>, Vec<u8>)> {
        (prop::collection::vec(word_bytes(), 1..8), word_bytes())
    }

    proptest! {
        // Universal invariant 4: Exact lookups return the queried word and
        // its stored family; Inexact lookups bracket the query without
        // touching it.
        #[test]
        fn lookup_brackets_or_matches_the_query((entries, query) in ecurve_and_query()) {
            let alphabet = alphabet();
            let mut seen = std::collections::BTreeSet::new();
            let mut built = Vec::new();
            for (i, bytes) in entries.iter().enumerate() {
                let w = Word::from_bytes(bytes, &alphabet).unwrap();
                if seen.insert(w) {
                    built.push((w, Family(i as u16)));
                }
            }
            prop_assume!(!built.is_empty());
            let ecurve = Ecurve::build(alphabet.clone(), built);
            let q = Word::from_bytes(&query, &alphabet).unwrap();

            let result = ecurve.lookup(q);
            match result.status {
                LookupStatus::Exact => {
                    prop_assert_eq!(result.lower.0, q);
                    prop_assert_eq!(result.upper.0, q);
                }
                LookupStatus::Inexact => {
                    prop_assert!(result.lower.0 <= q);
                    prop_assert!(q <= result.upper.0);
                    prop_assert_ne!(result.lower.0, q);
                    prop_assert_ne!(result.upper.0, q);
                }
                LookupStatus::OutOfBounds => {
                    prop_assert_eq!(result.lower.0, result.upper.0);
                }
            }
        }
    }
}
