// Protein and DNA family classification (§4.H, §4.J).

use std::collections::BTreeMap;

use crate::codon::CodonScores;
use crate::ecurve::{Ecurve, Family, LookupResult, LookupStatus};
use crate::error::{Error, Result};
use crate::orf::{Orf, OrfIter};
use crate::score_map::ScoreMap;
use crate::substmat::SubstMat;
use crate::word::WordIter;

/// A filter over `(query, family, score)` triples, applied after scoring
/// and before a classifier returns its results.
pub type PredFilterFn<'a> = dyn Fn(&[u8], Family, f64) -> bool + Sync + 'a;

/// A filter over `(orf, gc_content)` pairs, applied as each ORF is
/// yielded by [`OrfIter`].
pub type OrfFilterFn = dyn Fn(&Orf, f64) -> bool + Send + Sync;

/// Whether a classifier returns every family that scored, or only the
/// single best one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassifyMode {
    All,
    Max,
}

/// Scores a protein (amino acid) sequence against one or both strands
/// of a k-mer index.
pub struct ProteinClassifier<'a> {
    mode: ClassifyMode,
    fwd_ecurve: Option<&'a Ecurve>,
    rev_ecurve: Option<&'a Ecurve>,
    substmat: &'a SubstMat,
    filter: Option<&'a PredFilterFn<'a>>,
}

/// Builds a [`ProteinClassifier`], requiring a substitution matrix and
/// at least one ecurve, with an optional mode and filter.
#[derive(Default)]
pub struct ProteinClassifierBuilder<'a> {
    mode_set: Option<ClassifyMode>,
    fwd_ecurve: Option<&'a Ecurve>,
    rev_ecurve: Option<&'a Ecurve>,
    substmat: Option<&'a SubstMat>,
    filter: Option<&'a PredFilterFn<'a>>,
}

impl<'a> ProteinClassifierBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: ClassifyMode) -> Self {
        self.mode_set = Some(mode);
        self
    }

    pub fn fwd_ecurve(mut self, ecurve: &'a Ecurve) -> Self {
        self.fwd_ecurve = Some(ecurve);
        self
    }

    pub fn rev_ecurve(mut self, ecurve: &'a Ecurve) -> Self {
        self.rev_ecurve = Some(ecurve);
        self
    }

    pub fn substmat(mut self, substmat: &'a SubstMat) -> Self {
        self.substmat = Some(substmat);
        self
    }

    pub fn filter(mut self, filter: &'a PredFilterFn<'a>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn build(self) -> Result<ProteinClassifier<'a>> {
        let substmat = self
            .substmat
            .ok_or_else(|| Error::InvalidArgument("substitution matrix is required".into()))?;
        if self.fwd_ecurve.is_none() && self.rev_ecurve.is_none() {
            return Err(Error::InvalidArgument(
                "at least one of fwd_ecurve/rev_ecurve is required".into(),
            ));
        }
        Ok(ProteinClassifier {
            mode: self.mode_set.unwrap_or(ClassifyMode::All),
            fwd_ecurve: self.fwd_ecurve,
            rev_ecurve: self.rev_ecurve,
            substmat,
            filter: self.filter,
        })
    }
}

impl<'a> ProteinClassifier<'a> {
    pub fn mode(&self) -> ClassifyMode {
        self.mode
    }

    /// Align the query suffix against `result`'s bracketing neighbour(s)
    /// and upsert their families' scores, regardless of lookup status —
    /// an out-of-bounds result still brackets the query with the extreme
    /// indexed word on both sides, and that word's family still
    /// contributes, matching the original `scores_add_word`.
    fn upsert(&self, scores: &mut ScoreMap, index: usize, result: LookupResult, reverse: bool, query_suffix: u64) {
        let (lo_word, lo_fam) = result.lower;
        let dist = self.substmat.align_suffixes(query_suffix, lo_word.suffix);
        scores.add(lo_fam, index, dist, reverse);

        if result.status == LookupStatus::Inexact {
            let (up_word, up_fam) = result.upper;
            if up_word != lo_word {
                let dist = self.substmat.align_suffixes(query_suffix, up_word.suffix);
                scores.add(up_fam, index, dist, reverse);
            }
        }
    }

    /// Score `seq` against the configured ecurve(s), returning every
    /// family that scored, filtered and (if `mode == Max`) reduced to
    /// the single best entry.
    pub fn classify(&self, seq: &[u8]) -> Result<Vec<(Family, f64)>> {
        let alphabet = self
            .fwd_ecurve
            .or(self.rev_ecurve)
            .expect("builder guarantees at least one ecurve")
            .alphabet();

        let mut scores = ScoreMap::new();
        for (index, fwd, rev) in WordIter::new(seq, alphabet) {
            if let Some(ecurve) = self.fwd_ecurve {
                let result = ecurve.lookup(fwd);
                if result.status == LookupStatus::OutOfBounds {
                    log::trace!("fwd lookup at index {} out of ecurve bounds", index);
                }
                self.upsert(&mut scores, index, result, false, fwd.suffix);
            }
            if let Some(ecurve) = self.rev_ecurve {
                let result = ecurve.lookup(rev);
                if result.status == LookupStatus::OutOfBounds {
                    log::trace!("rev lookup at index {} out of ecurve bounds", index);
                }
                self.upsert(&mut scores, index, result, true, rev.suffix);
            }
        }

        let mut results: Vec<(Family, f64)> = scores
            .into_scores()
            .into_iter()
            .filter(|&(family, score)| self.filter.map_or(true, |f| f(seq, family, score)))
            .collect();

        if self.mode == ClassifyMode::Max {
            keep_max_in_place(&mut results, |&(_, score)| score);
        }
        log::debug!(
            "protein classification of a {}-residue query yielded {} famil{}",
            seq.len(),
            results.len(),
            if results.len() == 1 { "y" } else { "ies" }
        );
        Ok(results)
    }
}

/// Reduce an ascending-family-id-ordered `Vec` to its single
/// highest-scoring entry, keeping the first-seen maximum on ties (i.e.
/// the lowest family id).
fn keep_max_in_place<T: Clone>(entries: &mut Vec<T>, score_of: impl Fn(&T) -> f64) {
    let best = entries.iter().enumerate().fold(None, |best, (i, e)| {
        let s = score_of(e);
        match best {
            Some((_, best_s)) if best_s >= s => best,
            _ => Some((i, s)),
        }
    });
    match best {
        Some((i, _)) => {
            let winner = entries[i].clone();
            entries.clear();
            entries.push(winner);
        }
        None => entries.clear(),
    }
}

/// Scores a nucleotide sequence by translating it to every reading
/// frame and composing with a [`ProteinClassifier`] over the translated
/// ORFs (§4.J).
pub struct DnaClassifier<'a> {
    mode: ClassifyMode,
    pc: &'a ProteinClassifier<'a>,
    codon_scores: Option<CodonScores>,
    orf_filter: Option<Box<OrfFilterFn>>,
}

/// Builds a [`DnaClassifier`] around an existing [`ProteinClassifier`].
pub struct DnaClassifierBuilder<'a> {
    mode_set: Option<ClassifyMode>,
    pc: Option<&'a ProteinClassifier<'a>>,
    codon_scores: Option<CodonScores>,
    orf_filter: Option<Box<OrfFilterFn>>,
}

impl<'a> Default for DnaClassifierBuilder<'a> {
    fn default() -> Self {
        DnaClassifierBuilder {
            mode_set: None,
            pc: None,
            codon_scores: None,
            orf_filter: None,
        }
    }
}

impl<'a> DnaClassifierBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: ClassifyMode) -> Self {
        self.mode_set = Some(mode);
        self
    }

    pub fn protein_classifier(mut self, pc: &'a ProteinClassifier<'a>) -> Self {
        self.pc = Some(pc);
        self
    }

    pub fn codon_scores(mut self, codon_scores: CodonScores) -> Self {
        self.codon_scores = Some(codon_scores);
        self
    }

    pub fn orf_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Orf, f64) -> bool + Send + Sync + 'static,
    {
        self.orf_filter = Some(Box::new(filter));
        self
    }

    pub fn build(self) -> Result<DnaClassifier<'a>> {
        let pc = self
            .pc
            .ok_or_else(|| Error::InvalidArgument("a protein classifier is required".into()))?;
        Ok(DnaClassifier {
            mode: self.mode_set.unwrap_or(ClassifyMode::All),
            pc,
            codon_scores: self.codon_scores,
            orf_filter: self.orf_filter,
        })
    }
}

impl<'a> DnaClassifier<'a> {
    pub fn mode(&self) -> ClassifyMode {
        self.mode
    }

    /// Classify a nucleotide sequence: translate every reading frame's
    /// ORFs, score each against the protein classifier, and keep each
    /// family's best-scoring frame.
    pub fn classify(&self, seq: &[u8]) -> Result<Vec<(Family, f64, u8)>> {
        let mut best: BTreeMap<Family, (f64, u8)> = BTreeMap::new();

        let filter = self.orf_filter.as_deref();
        let orfs = OrfIter::new(seq, self.codon_scores.as_ref(), filter);
        for orf in orfs {
            if orf.data.is_empty() {
                continue;
            }
            let per_family = self.pc.classify(&orf.data)?;
            for (family, score) in per_family {
                let better = match best.get(&family) {
                    Some(&(existing, _)) => score > existing,
                    None => true,
                };
                if better {
                    best.insert(family, (score, orf.frame()));
                }
            }
        }

        let mut results: Vec<(Family, f64, u8)> =
            best.into_iter().map(|(family, (score, frame))| (family, score, frame)).collect();

        if self.mode == ClassifyMode::Max {
            keep_max_in_place(&mut results, |&(_, score, _)| score);
        }
        log::debug!(
            "dna classification of a {}-nt query yielded {} famil{}",
            seq.len(),
            results.len(),
            if results.len() == 1 { "y" } else { "ies" }
        );
        Ok(results)
    }
}

/// Classify a protein sequence against `pc`, per `pc`'s configured mode.
pub fn pc_classify(pc: &ProteinClassifier, seq: &[u8]) -> Result<Vec<(Family, f64)>> {
    pc.classify(seq)
}

/// Classify a nucleotide sequence against `dc`, per `dc`'s configured
/// mode.
pub fn dc_classify(dc: &DnaClassifier, seq: &[u8]) -> Result<Vec<(Family, f64, u8)>> {
    dc.classify(seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::word::Word;

    fn alphabet() -> Alphabet {
        Alphabet::new("ARNDCQEGHILKMFPSTWYV").unwrap()
    }

    fn identity_substmat() -> SubstMat {
        use crate::alphabet::{Amino, ALPHABET_SIZE};
        let mut mat = SubstMat::zeros();
        for pos in 0..crate::word::SUFFIX_LEN {
            for x in 0..ALPHABET_SIZE {
                mat.set(pos, Amino::from_rank(x as u8), Amino::from_rank(x as u8), 1.0);
            }
        }
        mat
    }

    #[test]
    fn exact_match_scores_full_word_length() {
        let alphabet = alphabet();
        let w = Word::from_bytes(b"ARNDCQEGHILKMFPSTWY", &alphabet).unwrap();
        let ecurve = Ecurve::build(alphabet, vec![(w, Family(1))]);
        let substmat = identity_substmat();

        let pc = ProteinClassifierBuilder::new()
            .fwd_ecurve(&ecurve)
            .substmat(&substmat)
            .build()
            .unwrap();

        let seq = w.to_bytes(pc.fwd_ecurve.unwrap().alphabet());
        let results = pc.classify(&seq).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, Family(1));
        assert!(results[0].1 >= crate::word::WORD_LEN as f64);
    }

    #[test]
    fn max_mode_breaks_ties_by_lowest_family_id() {
        let mut v = vec![(Family(5), 3.0), (Family(1), 3.0), (Family(9), 1.0)];
        keep_max_in_place(&mut v, |&(_, s)| s);
        assert_eq!(v, vec![(Family(1), 3.0)]);
    }

    #[test]
    fn builder_requires_substmat_and_an_ecurve() {
        let substmat = identity_substmat();
        assert!(ProteinClassifierBuilder::new().substmat(&substmat).build().is_err());

        let alphabet = alphabet();
        let ecurve = Ecurve::build(alphabet, vec![]);
        assert!(ProteinClassifierBuilder::new().fwd_ecurve(&ecurve).build().is_err());
    }

    /// A query whose word falls entirely below the ecurve's lowest
    /// indexed prefix still brackets against that extreme entry
    /// (`LookupStatus::OutOfBounds`), and that entry's family must still
    /// contribute a score — `upsert` must not skip OOB lookups.
    #[test]
    fn out_of_bounds_lookup_still_contributes_its_family() {
        let alphabet = alphabet();
        // The ecurve's only entry starts with 'V', the alphabet's last
        // letter; a query starting with 'A' sorts below every prefix.
        let w = Word::from_bytes(b"VVVVVVVVVVVVVVVVVV", &alphabet).unwrap();
        let ecurve = Ecurve::build(alphabet, vec![(w, Family(9))]);
        let substmat = identity_substmat();

        let pc = ProteinClassifierBuilder::new()
            .fwd_ecurve(&ecurve)
            .substmat(&substmat)
            .build()
            .unwrap();

        let seq = b"AAAAAAAAAAAAAAAAAA";
        let results = pc.classify(seq).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, Family(9));
    }

    #[test]
    fn dna_classifier_attributes_frame() {
        let alphabet = alphabet();
        // "ARNDCQEGHILKMFPSTWY" forward word, reverse-translated to nt
        // and embedded in frame 0 of a nucleotide query.
        let w = Word::from_bytes(b"ARNDCQEGHILKMFPSTWY", &alphabet).unwrap();
        let ecurve = Ecurve::build(alphabet, vec![(w, Family(7))]);
        let substmat = identity_substmat();
        let pc = ProteinClassifierBuilder::new()
            .fwd_ecurve(&ecurve)
            .substmat(&substmat)
            .build()
            .unwrap();
        let dc = DnaClassifierBuilder::new().protein_classifier(&pc).build().unwrap();

        // GCT(A) CGT(R) AAT(N) GAT(D) TGT(C) CAA(Q) GAA(E) GGT(G) CAT(H)
        // ATT(I) CTT(L) AAA(K) ATG(M) TTT(F) CCT(P) TCT(S) ACT(T) TGG(W)
        // TAT(Y) -- codons chosen to translate to "ARNDCQEGHILKMFPSTWY"
        // in frame 0.
        let seq = b"GCTCGTAATGATTGTCAAGAAGGTCATATTCTTAAAATGTTTCCTTCTACTTGGTAT";
        let results = dc.classify(seq).unwrap();
        assert!(results.iter().any(|&(f, _, frame)| f == Family(7) && frame == 0));
    }
}
