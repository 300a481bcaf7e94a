// Position-specific amino acid substitution scoring.

use ndarray::Array3;

use crate::alphabet::{Amino, ALPHABET_SIZE};
use crate::error::{Error, Result};
use crate::matrix::Matrix;
use crate::word::{Word, SUFFIX_LEN};

/// Twelve position-specific 20x20 amino acid substitution score tables.
///
/// `dists[[pos, x, y]]` is the score contributed by aligning amino acid
/// `x` against amino acid `y` at suffix position `pos`. The tables need
/// not be symmetric.
#[derive(Clone, Debug)]
pub struct SubstMat {
    dists: Array3<f64>,
}

impl SubstMat {
    /// A substitution matrix with every score initialised to zero.
    pub fn zeros() -> Self {
        SubstMat {
            dists: Array3::zeros((SUFFIX_LEN, ALPHABET_SIZE, ALPHABET_SIZE)),
        }
    }

    pub fn get(&self, pos: usize, x: Amino, y: Amino) -> f64 {
        self.dists[[pos, x.rank() as usize, y.rank() as usize]]
    }

    pub fn set(&mut self, pos: usize, x: Amino, y: Amino, dist: f64) {
        self.dists[[pos, x.rank() as usize, y.rank() as usize]] = dist;
    }

    /// Score each of the [`SUFFIX_LEN`] amino acid pairs between two
    /// suffixes.
    ///
    /// Amino acids are read out of `s1`/`s2` most-significant-first, i.e.
    /// `i = 0` is the first amino acid after the prefix in sequence order;
    /// `dist[i]` is that same position's score. `Sc::add` shifts its
    /// accumulator by sequence-index distance, so this array has to stay
    /// in sequence order, not reversed, for the shift to land on the
    /// right positions.
    pub fn align_suffixes(&self, s1: u64, s2: u64) -> [f64; SUFFIX_LEN] {
        let mut dist = [0.0; SUFFIX_LEN];
        for i in 0..SUFFIX_LEN {
            let a1 = Word::suffix_amino_at(s1, i);
            let a2 = Word::suffix_amino_at(s2, i);
            dist[i] = self.get(i, a1, a2);
        }
        dist
    }

    /// Load a substitution matrix from the generic flat matrix format
    /// (§ matrix file format): a `[12 * 20, 20]`-shaped matrix, indexed as
    /// `idx = (pos * 20 + x) * 20 + y` when read row-major.
    pub fn load(reader: impl std::io::BufRead) -> Result<Self> {
        let matrix = Matrix::load(reader)?;
        let (rows, cols) = matrix.dimensions();
        if rows != SUFFIX_LEN * ALPHABET_SIZE || cols != ALPHABET_SIZE {
            return Err(Error::InvalidFile(format!(
                "substitution matrix must be {}x{}, got {}x{}",
                SUFFIX_LEN * ALPHABET_SIZE,
                ALPHABET_SIZE,
                rows,
                cols
            )));
        }
        let mut mat = SubstMat::zeros();
        for pos in 0..SUFFIX_LEN {
            for x in 0..ALPHABET_SIZE {
                for y in 0..ALPHABET_SIZE {
                    let row = pos * ALPHABET_SIZE + x;
                    mat.dists[[pos, x, y]] = matrix.get(row, y);
                }
            }
        }
        Ok(mat)
    }

    /// Store in the same flat format [`SubstMat::load`] reads.
    pub fn store(&self, writer: impl std::io::Write) -> Result<()> {
        let mut matrix = Matrix::zeros(SUFFIX_LEN * ALPHABET_SIZE, ALPHABET_SIZE);
        for pos in 0..SUFFIX_LEN {
            for x in 0..ALPHABET_SIZE {
                for y in 0..ALPHABET_SIZE {
                    let row = pos * ALPHABET_SIZE + x;
                    matrix.set(row, y, self.dists[[pos, x, y]]);
                }
            }
        }
        matrix.store(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::word::Word;

    #[test]
    fn identity_matrix_scores_matches_as_one() {
        let alphabet = Alphabet::new("ARNDCQEGHILKMFPSTWYV").unwrap();
        let mut mat = SubstMat::zeros();
        for pos in 0..SUFFIX_LEN {
            for x in 0..ALPHABET_SIZE {
                mat.set(
                    pos,
                    Amino::from_rank(x as u8),
                    Amino::from_rank(x as u8),
                    1.0,
                );
            }
        }
        let w = Word::from_bytes(b"ARNDCQEGHILKMFPSTWY", &alphabet).unwrap();
        let dist = mat.align_suffixes(w.suffix, w.suffix);
        assert!(dist.iter().all(|&d| d == 1.0));
    }

    #[test]
    fn load_rejects_wrong_shape() {
        let text = b"[1, 1]\n0.0\n";
        assert!(SubstMat::load(&text[..]).is_err());
    }

    /// `align_suffixes` must keep `dist` in sequence order: `dist[0]` is
    /// the score of the *first* suffix amino acid (suffix position 0,
    /// the 7th amino of the word), not the last. A score planted only at
    /// matrix position 0 must show up at `dist[0]`, and nowhere else.
    #[test]
    fn align_suffixes_keeps_sequence_order() {
        let alphabet = Alphabet::new("ARNDCQEGHILKMFPSTWYV").unwrap();
        let mut mat = SubstMat::zeros();
        // "AAAAAA" (prefix) + "RNDCQEGHILKM" (suffix, 12 aminos): the
        // first suffix amino is 'R'.
        let w = Word::from_bytes(b"AAAAAARNDCQEGHILKM", &alphabet).unwrap();
        let r = alphabet.char_to_amino(b'R').unwrap();
        mat.set(0, r, r, 5.0);

        let dist = mat.align_suffixes(w.suffix, w.suffix);
        assert_eq!(dist[0], 5.0);
        assert!(dist[1..].iter().all(|&d| d == 0.0));
    }
}
