// Plain-text, binary, and memory-mapped on-disk formats for [`Ecurve`].
//
// All three formats carry the same logical content — the alphabet
// string, the suffix count, and the non-empty prefix blocks with their
// parallel suffix/family arrays — but trade off human-inspectability,
// portability, and load speed against each other (§4.F).

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::alphabet::{Alphabet, ALPHABET_SIZE};
use crate::error::{Error, Result};
use crate::word::PREFIX_MAX;

use super::Ecurve;

/// Whether a storage path is read/written as a plain byte stream or
/// transparently gzip-compressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoKind {
    Plain,
    Gzip,
}

impl IoKind {
    /// Infer `Gzip` from a `.gz` path suffix, `Plain` otherwise.
    pub fn from_path(path: &Path) -> IoKind {
        match path.extension() {
            Some(ext) if ext == "gz" => IoKind::Gzip,
            _ => IoKind::Plain,
        }
    }
}

fn open_reader(path: &Path, kind: IoKind) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    Ok(match kind {
        IoKind::Plain => Box::new(BufReader::new(file)),
        IoKind::Gzip => Box::new(BufReader::new(flate2::read::MultiGzDecoder::new(file))),
    })
}

fn open_writer(path: &Path, kind: IoKind) -> Result<Box<dyn Write>> {
    let file = File::create(path)?;
    Ok(match kind {
        IoKind::Plain => Box::new(BufWriter::new(file)),
        IoKind::Gzip => Box::new(BufWriter::new(flate2::write::GzEncoder::new(
            file,
            flate2::Compression::default(),
        ))),
    })
}

impl Ecurve {
    // ---- plain text -----------------------------------------------------

    /// Load the human-inspectable plain-text format: a header line
    /// `"<alphabet> <N>"`, then for each non-empty prefix block a header
    /// line `"<prefix> <count>"` followed by `count` lines of
    /// `"<suffix> <family>"`.
    pub fn load_text(mut reader: impl BufRead) -> Result<Ecurve> {
        let mut header = String::new();
        reader.read_line(&mut header)?;
        let mut fields = header.split_whitespace();
        let alphabet_str = fields
            .next()
            .ok_or_else(|| Error::InvalidFile("missing alphabet in ecurve header".into()))?;
        let n: usize = fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::InvalidFile("missing or invalid suffix count in ecurve header".into()))?;
        let alphabet = Alphabet::new(alphabet_str)?;

        let mut suffixes = Vec::with_capacity(n);
        let mut families = Vec::with_capacity(n);
        let mut block_starts = Vec::new();
        let mut line = String::new();

        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            let mut fields = line.split_whitespace();
            let prefix: u32 = fields
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| Error::InvalidFile(format!("invalid block header: {:?}", line)))?;
            let count: usize = fields
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| Error::InvalidFile(format!("invalid block header: {:?}", line)))?;

            block_starts.push((suffixes.len(), prefix));
            let mut entry_line = String::new();
            for _ in 0..count {
                entry_line.clear();
                if reader.read_line(&mut entry_line)? == 0 {
                    return Err(Error::InvalidFile("ecurve truncated before EOF".into()));
                }
                let mut entry_fields = entry_line.split_whitespace();
                let suffix: u64 = entry_fields
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| Error::InvalidFile(format!("invalid suffix entry: {:?}", entry_line)))?;
                let family: u16 = entry_fields
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| Error::InvalidFile(format!("invalid suffix entry: {:?}", entry_line)))?;
                suffixes.push(suffix);
                families.push(family);
            }
        }

        if suffixes.len() != n {
            return Err(Error::InvalidFile(format!(
                "ecurve header declared {} entries, found {}",
                n,
                suffixes.len()
            )));
        }

        Ok(Ecurve::from_blocks(alphabet, block_starts, suffixes, families))
    }

    /// Write the format [`Ecurve::load_text`] reads.
    pub fn store_text(&self, mut writer: impl Write) -> Result<()> {
        writeln!(writer, "{} {}", self.alphabet.as_str(), self.len())?;
        for (k, &(first, prefix)) in self.block_starts.iter().enumerate() {
            let count = if k + 1 < self.block_starts.len() {
                self.block_starts[k + 1].0 - first
            } else {
                self.len() - first
            };
            writeln!(writer, "{} {}", prefix, count)?;
            for i in first..first + count {
                writeln!(writer, "{} {}", self.backing.suffix_at(i), self.backing.family_at(i))?;
            }
        }
        Ok(())
    }

    pub fn load_text_path(path: impl AsRef<Path>) -> Result<Ecurve> {
        let path = path.as_ref();
        Ecurve::load_text(open_reader(path, IoKind::from_path(path))?)
    }

    pub fn store_text_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.store_text(open_writer(path, IoKind::from_path(path))?)
    }

    // ---- binary -----------------------------------------------------

    /// Load the portable binary format: `alphabet (20 bytes)`,
    /// `suffix_count: u64`, `block_count: u64`, then `block_count`
    /// `(prefix: u32, count: u64)` pairs (the blocks' `first` indices are
    /// the running sum of `count`, so they are not stored explicitly),
    /// then `suffix_count` `u64` suffixes, then `suffix_count` `u16`
    /// families. All integers little-endian.
    pub fn load_binary(mut reader: impl Read) -> Result<Ecurve> {
        let mut alphabet_bytes = [0u8; ALPHABET_SIZE];
        reader.read_exact(&mut alphabet_bytes)?;
        let alphabet_str = std::str::from_utf8(&alphabet_bytes)
            .map_err(|e| Error::InvalidFile(format!("alphabet is not valid UTF-8: {}", e)))?;
        let alphabet = Alphabet::new(alphabet_str)?;

        let n = reader.read_u64::<LittleEndian>()? as usize;
        let num_blocks = reader.read_u64::<LittleEndian>()? as usize;

        let mut block_starts = Vec::with_capacity(num_blocks);
        let mut counts = Vec::with_capacity(num_blocks);
        let mut first = 0usize;
        for _ in 0..num_blocks {
            let prefix = reader.read_u32::<LittleEndian>()?;
            let count = reader.read_u64::<LittleEndian>()? as usize;
            block_starts.push((first, prefix));
            counts.push(count);
            first += count;
        }
        if first != n {
            return Err(Error::InvalidFile(format!(
                "ecurve block counts sum to {}, header declares {}",
                first, n
            )));
        }

        let mut suffixes = Vec::with_capacity(n);
        for _ in 0..n {
            suffixes.push(reader.read_u64::<LittleEndian>()?);
        }
        let mut families = Vec::with_capacity(n);
        for _ in 0..n {
            families.push(reader.read_u16::<LittleEndian>()?);
        }

        Ok(Ecurve::from_blocks(alphabet, block_starts, suffixes, families))
    }

    /// Write the format [`Ecurve::load_binary`] reads.
    pub fn store_binary(&self, mut writer: impl Write) -> Result<()> {
        let mut alphabet_bytes = [0u8; ALPHABET_SIZE];
        alphabet_bytes.copy_from_slice(self.alphabet.as_str().as_bytes());
        writer.write_all(&alphabet_bytes)?;
        writer.write_u64::<LittleEndian>(self.len() as u64)?;
        writer.write_u64::<LittleEndian>(self.block_starts.len() as u64)?;
        for (k, &(first, prefix)) in self.block_starts.iter().enumerate() {
            let count = if k + 1 < self.block_starts.len() {
                self.block_starts[k + 1].0 - first
            } else {
                self.len() - first
            };
            writer.write_u32::<LittleEndian>(prefix)?;
            writer.write_u64::<LittleEndian>(count as u64)?;
        }
        for i in 0..self.len() {
            writer.write_u64::<LittleEndian>(self.backing.suffix_at(i))?;
        }
        for i in 0..self.len() {
            writer.write_u16::<LittleEndian>(self.backing.family_at(i))?;
        }
        Ok(())
    }

    pub fn load_binary_path(path: impl AsRef<Path>) -> Result<Ecurve> {
        let path = path.as_ref();
        Ecurve::load_binary(open_reader(path, IoKind::from_path(path))?)
    }

    pub fn store_binary_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.store_binary(open_writer(path, IoKind::from_path(path))?)
    }
}

/// 4-byte magic identifying an uproc-rs mmap ecurve file.
#[cfg(feature = "mmap")]
const MMAP_MAGIC: [u8; 4] = *b"UPMM";
/// Layout version; bumped whenever the byte layout below changes.
#[cfg(feature = "mmap")]
const MMAP_VERSION: u8 = 1;
/// `(first: u64, count: u64)` entries in the mmap'd prefix table.
#[cfg(feature = "mmap")]
const PREFIX_ENTRY_BYTES: usize = 16;
#[cfg(feature = "mmap")]
const SUFFIX_BYTES: usize = 8;
#[cfg(feature = "mmap")]
const FAMILY_BYTES: usize = 2;
/// `magic(4) + version(1) + size_of::<usize>(1) + padding(2) + alphabet(20) + suffix_count(8)`.
#[cfg(feature = "mmap")]
const MMAP_HEADER_BYTES: usize = 4 + 1 + 1 + 2 + ALPHABET_SIZE + 8;

#[cfg(feature = "mmap")]
fn prefix_table_bytes() -> usize {
    (PREFIX_MAX as usize + 1) * PREFIX_ENTRY_BYTES
}

#[cfg(feature = "mmap")]
mod mmap_impl {
    use super::*;
    use crate::ecurve::{Backing, EDGE_MARKER};
    use memmap2::Mmap;

    /// A read-only memory-mapped ecurve: the mapping is the sole owner of
    /// the three parallel arrays, accessed via byte-offset reads rather
    /// than a reinterpreted slice (`memmap2::Mmap` does not guarantee
    /// alignment strong enough for the latter to be sound).
    pub struct MmapEcurve {
        map: Mmap,
        n: usize,
        prefix_table_offset: usize,
        suffixes_offset: usize,
        families_offset: usize,
    }

    impl MmapEcurve {
        pub(super) fn len(&self) -> usize {
            self.n
        }

        pub(super) fn suffix_at(&self, idx: usize) -> u64 {
            let off = self.suffixes_offset + idx * SUFFIX_BYTES;
            LittleEndian::read_u64(&self.map[off..off + SUFFIX_BYTES])
        }

        pub(super) fn family_at(&self, idx: usize) -> u16 {
            let off = self.families_offset + idx * FAMILY_BYTES;
            LittleEndian::read_u16(&self.map[off..off + FAMILY_BYTES])
        }

        pub(super) fn prefix_entry(&self, prefix: u32) -> (u64, u64) {
            let off = self.prefix_table_offset + prefix as usize * PREFIX_ENTRY_BYTES;
            let first = LittleEndian::read_u64(&self.map[off..off + 8]);
            let count = LittleEndian::read_u64(&self.map[off + 8..off + 16]);
            (first, count)
        }
    }

    /// Build the `(first_index, prefix)` list for every non-empty prefix
    /// block by scanning the mapped prefix table once, up front — the
    /// "cached sorted index of non-empty prefixes" the lookup algorithm's
    /// design calls for (§4.E step 5).
    fn scan_block_starts(m: &MmapEcurve) -> Vec<(usize, u32)> {
        let mut block_starts = Vec::new();
        for p in 0..=PREFIX_MAX {
            let (first, count) = m.prefix_entry(p);
            if count != 0 && count != u64::MAX {
                block_starts.push((first as usize, p));
            }
        }
        block_starts
    }

    impl Ecurve {
        /// Memory-map an ecurve file written by [`Ecurve::store_mmap_path`].
        ///
        /// Rejects files whose declared `size_of::<usize>()` does not
        /// match this platform's, or whose length does not match the
        /// layout implied by its own header, with [`Error::InvalidFile`].
        pub fn load_mmap_path(path: impl AsRef<Path>) -> Result<Ecurve> {
            let path = path.as_ref();
            let file = File::open(path)?;
            let map = unsafe { Mmap::map(&file)? };

            if map.len() < MMAP_HEADER_BYTES {
                return Err(Error::InvalidFile("mmap ecurve file too short for header".into()));
            }
            if map[0..4] != MMAP_MAGIC {
                return Err(Error::InvalidFile("not an uproc-rs mmap ecurve file".into()));
            }
            let version = map[4];
            if version != MMAP_VERSION {
                return Err(Error::InvalidFile(format!(
                    "unsupported mmap ecurve layout version {}",
                    version
                )));
            }
            let size_of_usize = map[5];
            if size_of_usize as usize != std::mem::size_of::<usize>() {
                return Err(Error::InvalidFile(format!(
                    "mmap ecurve built for size_of::<usize>() == {}, this platform has {}",
                    size_of_usize,
                    std::mem::size_of::<usize>()
                )));
            }

            let alphabet_offset = 8;
            let alphabet_bytes = &map[alphabet_offset..alphabet_offset + ALPHABET_SIZE];
            let alphabet_str = std::str::from_utf8(alphabet_bytes)
                .map_err(|e| Error::InvalidFile(format!("alphabet is not valid UTF-8: {}", e)))?;
            let alphabet = Alphabet::new(alphabet_str)?;

            let n_offset = alphabet_offset + ALPHABET_SIZE;
            let n = LittleEndian::read_u64(&map[n_offset..n_offset + 8]) as usize;

            let prefix_table_offset = MMAP_HEADER_BYTES;
            let suffixes_offset = prefix_table_offset + prefix_table_bytes();
            let families_offset = suffixes_offset + n * SUFFIX_BYTES;
            let expected_len = families_offset + n * FAMILY_BYTES;
            if map.len() != expected_len {
                return Err(Error::InvalidFile(format!(
                    "mmap ecurve file is {} bytes, layout implies {}",
                    map.len(),
                    expected_len
                )));
            }

            let mmap_ecurve = MmapEcurve {
                map,
                n,
                prefix_table_offset,
                suffixes_offset,
                families_offset,
            };
            let block_starts = scan_block_starts(&mmap_ecurve);

            Ok(Ecurve {
                alphabet,
                backing: Backing::Mmap(mmap_ecurve),
                prefix_table: Vec::new(),
                block_starts,
            })
        }

        /// Write the bit-exact mmap layout [`Ecurve::load_mmap_path`] maps
        /// directly, with no parsing step.
        pub fn store_mmap_path(&self, path: impl AsRef<Path>) -> Result<()> {
            let mut writer = BufWriter::new(File::create(path.as_ref())?);

            writer.write_all(&MMAP_MAGIC)?;
            writer.write_all(&[MMAP_VERSION, std::mem::size_of::<usize>() as u8, 0, 0])?;
            let mut alphabet_bytes = [0u8; ALPHABET_SIZE];
            alphabet_bytes.copy_from_slice(self.alphabet.as_str().as_bytes());
            writer.write_all(&alphabet_bytes)?;
            writer.write_u64::<LittleEndian>(self.len() as u64)?;

            for p in 0..=PREFIX_MAX {
                let entry = self.prefix_entry(p);
                writer.write_u64::<LittleEndian>(entry.first as u64)?;
                let count = if entry.count == EDGE_MARKER {
                    u64::MAX
                } else {
                    entry.count as u64
                };
                writer.write_u64::<LittleEndian>(count)?;
            }
            for i in 0..self.len() {
                writer.write_u64::<LittleEndian>(self.backing.suffix_at(i))?;
            }
            for i in 0..self.len() {
                writer.write_u16::<LittleEndian>(self.backing.family_at(i))?;
            }
            Ok(())
        }
    }
}

#[cfg(feature = "mmap")]
pub use mmap_impl::MmapEcurve;

#[cfg(not(feature = "mmap"))]
impl Ecurve {
    pub fn load_mmap_path(_path: impl AsRef<Path>) -> Result<Ecurve> {
        Err(Error::Unsupported("mmap support was not compiled in (enable the \"mmap\" feature)".into()))
    }

    pub fn store_mmap_path(&self, _path: impl AsRef<Path>) -> Result<()> {
        Err(Error::Unsupported("mmap support was not compiled in (enable the \"mmap\" feature)".into()))
    }
}
