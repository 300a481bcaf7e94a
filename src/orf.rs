// Six-frame open reading frame extraction (§4.I).
//
// `OrfIter` walks a nucleotide sequence once, advancing three forward and
// three reverse-complement codon accumulators in lock step (the same
// single-pass forward/reverse trick `word::WordIter` uses at word
// granularity), splitting each frame's translation on stop codons into
// separate `Orf`s.

use std::collections::VecDeque;

use crate::codon::{self, Codon, CodonOutcome, CodonScores};

/// A single open reading frame: its translated amino-acid sequence, its
/// nucleotide start offset and length in the original input, its
/// coding-potential score (0.0 if no [`CodonScores`] table was supplied),
/// and which of the six frames (0-2 forward, 3-5 reverse) it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct Orf {
    pub data: Vec<u8>,
    pub start: usize,
    pub length: usize,
    pub score: f64,
    frame: u8,
    gc: f64,
}

impl Orf {
    pub fn frame(&self) -> u8 {
        self.frame
    }

    /// GC content of the input sequence this ORF was extracted from
    /// (the same value for every ORF from a given [`OrfIter`]).
    pub fn gc_content(&self) -> f64 {
        self.gc
    }
}

#[derive(Default)]
struct FrameState {
    buffer: Vec<u8>,
    start: Option<usize>,
    score: f64,
}

/// Iterator over the open reading frames of a nucleotide sequence,
/// across all six reading frames.
pub struct OrfIter<'a> {
    seq: &'a [u8],
    codon_scores: Option<&'a CodonScores>,
    filter: Option<&'a dyn Fn(&Orf, f64) -> bool>,
    gc: f64,

    pos: usize,
    valid_count: usize,
    recent_raw_pos: [usize; 3],
    last_nt_mask: Option<u8>,
    last_raw_pos: usize,

    fwd_codons: [Codon; 3],
    rev_codons: [Codon; 3],
    frames: [FrameState; 6],

    pending: VecDeque<Orf>,
    done: bool,
}

impl<'a> OrfIter<'a> {
    pub fn new(
        seq: &'a [u8],
        codon_scores: Option<&'a CodonScores>,
        filter: Option<&'a dyn Fn(&Orf, f64) -> bool>,
    ) -> Self {
        OrfIter {
            seq,
            codon_scores,
            filter,
            gc: codon::gc_content(seq),
            pos: 0,
            valid_count: 0,
            recent_raw_pos: [0; 3],
            last_nt_mask: None,
            last_raw_pos: 0,
            fwd_codons: [Codon::ZERO; 3],
            rev_codons: [Codon::ZERO; 3],
            frames: Default::default(),
            pending: VecDeque::new(),
            done: false,
        }
    }

    fn push_raw_pos(&mut self, raw_pos: usize) {
        self.recent_raw_pos[0] = self.recent_raw_pos[1];
        self.recent_raw_pos[1] = self.recent_raw_pos[2];
        self.recent_raw_pos[2] = raw_pos;
    }

    fn process_valid_nt(&mut self, raw_pos: usize, mask: u8) {
        let idx0 = self.valid_count;
        self.valid_count += 1;
        self.push_raw_pos(raw_pos);

        for f in 0..3 {
            if idx0 < f {
                continue;
            }
            self.fwd_codons[f].append(mask);
            if (idx0 - f) % 3 == 2 {
                let codon = self.fwd_codons[f];
                self.observe_codon(f, codon, raw_pos);
            }
        }
        for f in 0..3 {
            if idx0 < f {
                continue;
            }
            self.rev_codons[f].prepend(codon::complement_nt(mask));
            if (idx0 - f) % 3 == 2 {
                let codon = self.rev_codons[f];
                self.observe_codon(3 + f, codon, raw_pos);
            }
        }
    }

    /// A codon just completed in `frame`, ending at `end_raw` (inclusive).
    fn observe_codon(&mut self, frame: usize, codon: Codon, end_raw: usize) {
        match codon::classify(codon) {
            CodonOutcome::Stop => self.flush(frame, end_raw + 1),
            CodonOutcome::Amino(letter) => self.push_residue(frame, letter, codon),
            CodonOutcome::Ambiguous => self.push_residue(frame, b'X', codon),
        }
    }

    fn push_residue(&mut self, frame: usize, letter: u8, codon: Codon) {
        let state = &mut self.frames[frame];
        if letter == b'X' && state.buffer.is_empty() {
            // A leading X never starts an ORF; it's simply dropped.
            return;
        }
        if state.buffer.is_empty() {
            state.start = Some(self.recent_raw_pos[0]);
        }
        state.buffer.push(letter);
        if let Some(scores) = self.codon_scores {
            state.score += scores.get(codon);
        }
    }

    /// Emit the ORF currently accumulating in `frame`, if any, and reset
    /// that frame's state.
    fn flush(&mut self, frame: usize, _end_raw_exclusive: usize) {
        let state = &mut self.frames[frame];
        if state.buffer.is_empty() {
            state.start = None;
            state.score = 0.0;
            return;
        }
        let data = std::mem::take(&mut state.buffer);
        let start = state.start.take().unwrap_or(0);
        let score = std::mem::replace(&mut state.score, 0.0);
        let length = data.len();
        let orf = Orf {
            data,
            start,
            length,
            score,
            frame: frame as u8,
            gc: self.gc,
        };
        let keep = self.filter.map_or(true, |f| f(&orf, self.gc));
        if keep {
            self.pending.push_back(orf);
        }
    }

    /// Pad each frame's trailing partial codon by repeating the last
    /// nucleotide seen, then flush every frame's remaining buffer.
    fn finish(&mut self) {
        if let Some(last_mask) = self.last_nt_mask {
            let rev_mask = codon::complement_nt(last_mask);
            for f in 0..3 {
                if self.valid_count <= f {
                    continue;
                }
                let pending = (3 - (self.valid_count - f) % 3) % 3;
                if pending == 0 {
                    continue;
                }
                for _ in 0..pending {
                    self.fwd_codons[f].append(last_mask);
                }
                let codon = self.fwd_codons[f];
                self.observe_codon(f, codon, self.last_raw_pos);
            }
            for f in 0..3 {
                if self.valid_count <= f {
                    continue;
                }
                let pending = (3 - (self.valid_count - f) % 3) % 3;
                if pending == 0 {
                    continue;
                }
                for _ in 0..pending {
                    self.rev_codons[f].prepend(rev_mask);
                }
                let codon = self.rev_codons[f];
                self.observe_codon(3 + f, codon, self.last_raw_pos);
            }
        }
        for frame in 0..6 {
            self.flush(frame, self.seq.len());
        }
        self.done = true;
    }
}

impl<'a> Iterator for OrfIter<'a> {
    type Item = Orf;

    fn next(&mut self) -> Option<Orf> {
        loop {
            if let Some(orf) = self.pending.pop_front() {
                return Some(orf);
            }
            if self.done {
                return None;
            }
            if self.pos >= self.seq.len() {
                self.finish();
                continue;
            }
            let c = self.seq[self.pos];
            let raw_pos = self.pos;
            self.pos += 1;
            if let Some(mask) = codon::char_to_nt(c) {
                self.last_nt_mask = Some(mask);
                self.last_raw_pos = raw_pos;
                self.process_valid_nt(raw_pos, mask);
            }
        }
    }
}
