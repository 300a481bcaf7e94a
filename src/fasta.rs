// A minimal FASTA reader (§6).
//
// Deliberately small: one record type, one iterator, transparent gzip
// support via the same `flate2` dependency the ecurve storage format
// uses for its own gzip-compressed variants.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::bufread::MultiGzDecoder;

use crate::error::Result;

/// A single FASTA record: the header line (without the leading `>`) and
/// the concatenated sequence lines that follow it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FastaRecord {
    pub header: String,
    pub sequence: Vec<u8>,
}

/// Streams [`FastaRecord`]s out of any buffered reader.
pub struct FastaReader<R> {
    reader: R,
    next_header: Option<String>,
    done: bool,
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        FastaReader {
            reader,
            next_header: None,
            done: false,
        }
    }

    /// Open a FASTA file, transparently decompressing it if its path
    /// ends in `.gz`.
    pub fn open(path: impl AsRef<Path>) -> Result<FastaReader<Box<dyn BufRead>>> {
        let path = path.as_ref();
        let file = BufReader::new(File::open(path)?);
        let reader: Box<dyn BufRead> = if path.extension().map_or(false, |ext| ext == "gz") {
            Box::new(BufReader::new(MultiGzDecoder::new(file)))
        } else {
            Box::new(file)
        };
        Ok(FastaReader::new(reader))
    }
}

impl<R: BufRead> Iterator for FastaReader<R> {
    type Item = Result<FastaRecord>;

    fn next(&mut self) -> Option<Result<FastaRecord>> {
        if self.done {
            return None;
        }

        let header = match self.next_header.take() {
            Some(h) => h,
            None => {
                let mut line = String::new();
                loop {
                    line.clear();
                    match self.reader.read_line(&mut line) {
                        Ok(0) => {
                            self.done = true;
                            return None;
                        }
                        Ok(_) => {
                            let trimmed = line.trim_end_matches(|c| c == '\r' || c == '\n');
                            if trimmed.is_empty() {
                                continue;
                            }
                            if let Some(h) = trimmed.strip_prefix('>') {
                                break h.to_string();
                            }
                            // A non-empty, non-header line before any
                            // record has started: not a FASTA file.
                            self.done = true;
                            return Some(Err(crate::error::Error::InvalidFile(
                                "expected FASTA header line starting with '>'".into(),
                            )));
                        }
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e.into()));
                        }
                    }
                }
            }
        };

        let mut sequence = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => {
                    self.done = true;
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim_end_matches(|c| c == '\r' || c == '\n');
                    if let Some(h) = trimmed.strip_prefix('>') {
                        self.next_header = Some(h.to_string());
                        break;
                    }
                    sequence.extend_from_slice(trimmed.as_bytes());
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
        }

        Some(Ok(FastaRecord { header, sequence }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_multiple_records() {
        let data = b">seq1 description\nACGT\nACGT\n>seq2\nTTTT\n";
        let records: Vec<_> = FastaReader::new(&data[..]).map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].header, "seq1 description");
        assert_eq!(records[0].sequence, b"ACGTACGT");
        assert_eq!(records[1].header, "seq2");
        assert_eq!(records[1].sequence, b"TTTT");
    }

    #[test]
    fn tolerates_blank_lines_between_records() {
        let data = b">seq1\nACGT\n\n>seq2\nTTTT\n";
        let records: Vec<_> = FastaReader::new(&data[..]).map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn empty_input_yields_no_records() {
        let records: Vec<_> = FastaReader::new(&b""[..]).collect();
        assert!(records.is_empty());
    }

    #[test]
    fn rejects_input_not_starting_with_a_header() {
        let data = b"ACGT\n";
        let mut reader = FastaReader::new(&data[..]);
        assert!(reader.next().unwrap().is_err());
    }

    #[test]
    fn record_with_no_sequence_lines_is_empty() {
        let data = b">seq1\n>seq2\nACGT\n";
        let records: Vec<_> = FastaReader::new(&data[..]).map(|r| r.unwrap()).collect();
        assert_eq!(records[0].sequence, b"");
        assert_eq!(records[1].sequence, b"ACGT");
    }
}
