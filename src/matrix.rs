// A generic, flat-file-backed 2D f64 matrix.
//
// Used both as the storage format for substitution matrices (§substmat)
// and for codon-score / threshold tables, matching the plain-text layout
// the original library used for all of its flat numeric tables.

use std::io::{BufRead, Write};

use ndarray::Array2;

use crate::error::{Error, Result};

/// A dense `rows x cols` matrix of `f64` values, with a plain-text
/// load/store format: a `"[<rows>, <cols>]"` header line followed by
/// `rows * cols` values, one per line, in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    values: Array2<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix {
            values: Array2::zeros((rows, cols)),
        }
    }

    pub fn from_vec(rows: usize, cols: usize, values: Vec<f64>) -> Result<Self> {
        let values = Array2::from_shape_vec((rows, cols), values)
            .map_err(|e| Error::InvalidArgument(e.to_string()))?;
        Ok(Matrix { values })
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[[row, col]]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.values[[row, col]] = value;
    }

    pub fn dimensions(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Parse the `"[<rows>, <cols>]"` header followed by `rows * cols`
    /// values, one per line.
    pub fn load(mut reader: impl BufRead) -> Result<Self> {
        let mut header = String::new();
        reader.read_line(&mut header)?;
        let (rows, cols) = parse_header(&header)?;

        let mut values = Vec::with_capacity(rows * cols);
        let mut line = String::new();
        for _ in 0..rows * cols {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                return Err(Error::InvalidFile("matrix truncated before EOF".into()));
            }
            let value: f64 = line
                .trim()
                .parse()
                .map_err(|_| Error::InvalidFile(format!("invalid matrix value: {:?}", line)))?;
            values.push(value);
        }
        Matrix::from_vec(rows, cols, values)
    }

    /// Write in the format [`Matrix::load`] reads.
    pub fn store(&self, mut writer: impl Write) -> Result<()> {
        let (rows, cols) = self.dimensions();
        writeln!(writer, "[{}, {}]", rows, cols)?;
        for row in 0..rows {
            for col in 0..cols {
                writeln!(writer, "{}", self.get(row, col))?;
            }
        }
        Ok(())
    }
}

fn parse_header(line: &str) -> Result<(usize, usize)> {
    let line = line.trim();
    let inner = line
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| Error::InvalidFile(format!("invalid matrix header: {:?}", line)))?;
    let mut parts = inner.split(',').map(|p| p.trim());
    let rows = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| Error::InvalidFile(format!("invalid matrix header: {:?}", line)))?;
    let cols = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| Error::InvalidFile(format!("invalid matrix header: {:?}", line)))?;
    Ok((rows, cols))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let mut m = Matrix::zeros(2, 3);
        for row in 0..2 {
            for col in 0..3 {
                m.set(row, col, (row * 3 + col) as f64);
            }
        }
        let mut buf = Vec::new();
        m.store(&mut buf).unwrap();
        let loaded = Matrix::load(&buf[..]).unwrap();
        assert_eq!(loaded, m);
    }

    #[test]
    fn rejects_bad_header() {
        assert!(Matrix::load(&b"not a header\n"[..]).is_err());
    }

    #[test]
    fn rejects_truncated_body() {
        assert!(Matrix::load(&b"[2, 2]\n1.0\n"[..]).is_err());
    }
}
