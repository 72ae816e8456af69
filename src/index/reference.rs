// Reference sequence store.
//
// Chromosomes are concatenated into one 2-bit packed text. Ambiguous bases
// are replaced by deterministically seeded random bases so the suffix array
// stays a 4-letter structure; the original N runs are recorded so extension
// can refuse to credit matches inside them.

use flate2::read::MultiGzDecoder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::defaults::AMBIGUOUS_FILL_SEED;

pub type ChromId = u32;

/// ASCII base to 2-bit code; anything outside ACGT (either case) maps to 4.
pub const BASE_CODE: [u8; 256] = {
    let mut table = [4u8; 256];
    table[b'A' as usize] = 0;
    table[b'a' as usize] = 0;
    table[b'C' as usize] = 1;
    table[b'c' as usize] = 1;
    table[b'G' as usize] = 2;
    table[b'g' as usize] = 2;
    table[b'T' as usize] = 3;
    table[b't' as usize] = 3;
    table
};

pub const CODE_BASE: [u8; 5] = *b"ACGTN";

#[inline]
pub fn complement(code: u8) -> u8 {
    if code < 4 {
        3 - code
    } else {
        4
    }
}

pub fn reverse_complement(codes: &[u8]) -> Vec<u8> {
    codes.iter().rev().map(|&c| complement(c)).collect()
}

/// Per-chromosome annotation.
#[derive(Debug, Clone)]
pub struct Annotation {
    /// Name from the FASTA header (up to the first whitespace).
    pub name: String,
    /// Offset in the concatenated text.
    pub offset: u64,
    pub length: u64,
    /// Count of ambiguous bases in this chromosome.
    pub ambiguous_bases: u64,
}

/// A run of ambiguous bases in the concatenated text.
#[derive(Debug, Clone, Copy)]
pub struct AmbRegion {
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug)]
pub struct RefSeq {
    /// Total bases in the concatenated text.
    pub total_len: u64,
    pub annotations: Vec<Annotation>,
    /// Ambiguous runs, ascending by offset, non-overlapping.
    pub amb_regions: Vec<AmbRegion>,
    /// 2-bit packed bases, four per byte, low bits first.
    pac: Vec<u8>,
}

impl RefSeq {
    /// Ingest a FASTA reference (gzip autodetected by extension).
    pub fn from_fasta(path: &Path) -> io::Result<RefSeq> {
        let file = File::open(path)?;
        let reader: Box<dyn Read> = if path.extension().and_then(|s| s.to_str()) == Some("gz") {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        };
        let fasta_reader = bio::io::fasta::Reader::new(BufReader::new(reader));

        let mut refseq = RefSeq {
            total_len: 0,
            annotations: Vec::new(),
            amb_regions: Vec::new(),
            pac: Vec::new(),
        };
        let mut rng = StdRng::seed_from_u64(AMBIGUOUS_FILL_SEED);

        for record in fasta_reader.records() {
            let record = record.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let offset = refseq.total_len;
            let mut ambiguous = 0u64;

            for &b in record.seq() {
                let code = BASE_CODE[b as usize];
                let pos = refseq.total_len;
                let stored = if code < 4 {
                    code
                } else {
                    ambiguous += 1;
                    match refseq.amb_regions.last_mut() {
                        Some(run) if run.offset + run.length == pos => run.length += 1,
                        _ => refseq.amb_regions.push(AmbRegion {
                            offset: pos,
                            length: 1,
                        }),
                    }
                    rng.gen_range(0..4u8)
                };
                refseq.push_base(stored);
            }

            refseq.annotations.push(Annotation {
                name: record.id().to_string(),
                offset,
                length: refseq.total_len - offset,
                ambiguous_bases: ambiguous,
            });
        }

        if refseq.total_len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("no sequence data in {}", path.display()),
            ));
        }

        log::info!(
            "Reference: {} sequences, {} bp, {} ambiguous regions",
            refseq.annotations.len(),
            refseq.total_len,
            refseq.amb_regions.len()
        );
        Ok(refseq)
    }

    fn push_base(&mut self, code: u8) {
        let pos = self.total_len as usize;
        if pos & 3 == 0 {
            self.pac.push(0);
        }
        self.pac[pos >> 2] |= code << ((pos & 3) << 1);
        self.total_len += 1;
    }

    /// Base code at a concatenated-text position. Ambiguous positions return
    /// their deterministic fill, not 4; callers consult `ambiguous_overlap`.
    #[inline]
    pub fn base_at(&self, pos: u64) -> u8 {
        let pos = pos as usize;
        (self.pac[pos >> 2] >> ((pos & 3) << 1)) & 3
    }

    pub fn ident_for(&self, name: &str) -> Option<ChromId> {
        self.annotations
            .iter()
            .position(|a| a.name == name)
            .map(|i| i as ChromId)
    }

    pub fn name_of(&self, id: ChromId) -> &str {
        &self.annotations[id as usize].name
    }

    /// Chromosome containing the text span `[start, start + len)`, plus the
    /// chromosome-local offset of `start`. `None` when the span is out of
    /// bounds or crosses a chromosome boundary.
    pub fn locate(&self, start: u64, len: u64) -> Option<(ChromId, u64)> {
        if start + len > self.total_len || len == 0 {
            return None;
        }
        let idx = self
            .annotations
            .partition_point(|a| a.offset + a.length <= start);
        let ann = self.annotations.get(idx)?;
        if start + len > ann.offset + ann.length {
            return None; // spans into the next chromosome
        }
        Some((idx as ChromId, start - ann.offset))
    }

    pub fn get_base(&self, chrom: ChromId, pos: u64) -> Option<u8> {
        let ann = self.annotations.get(chrom as usize)?;
        if pos >= ann.length {
            return None;
        }
        Some(self.base_at(ann.offset + pos))
    }

    /// Decode `len` bases of a chromosome starting at `pos`.
    pub fn get_seq(&self, chrom: ChromId, pos: u64, len: u64) -> Option<Vec<u8>> {
        let ann = self.annotations.get(chrom as usize)?;
        if pos + len > ann.length {
            return None;
        }
        let start = ann.offset + pos;
        Some((start..start + len).map(|p| self.base_at(p)).collect())
    }

    /// Ambiguous runs clipped to the text span `[start, end)`.
    pub fn ambiguous_overlap(&self, start: u64, end: u64) -> Vec<(u64, u64)> {
        let first = self
            .amb_regions
            .partition_point(|r| r.offset + r.length <= start);
        self.amb_regions[first..]
            .iter()
            .take_while(|r| r.offset < end)
            .map(|r| (r.offset.max(start), (r.offset + r.length).min(end)))
            .collect()
    }

    // --- persistence -------------------------------------------------------

    pub const MAGIC: &'static [u8; 4] = b"LMRF";
    pub const VERSION: u32 = 1;

    pub fn dump(&self, path: &Path) -> io::Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        w.write_all(Self::MAGIC)?;
        w.write_all(&Self::VERSION.to_le_bytes())?;
        w.write_all(&self.total_len.to_le_bytes())?;

        w.write_all(&(self.annotations.len() as u32).to_le_bytes())?;
        for ann in &self.annotations {
            w.write_all(&(ann.name.len() as u32).to_le_bytes())?;
            w.write_all(ann.name.as_bytes())?;
            w.write_all(&ann.offset.to_le_bytes())?;
            w.write_all(&ann.length.to_le_bytes())?;
            w.write_all(&ann.ambiguous_bases.to_le_bytes())?;
        }

        w.write_all(&(self.amb_regions.len() as u32).to_le_bytes())?;
        for r in &self.amb_regions {
            w.write_all(&r.offset.to_le_bytes())?;
            w.write_all(&r.length.to_le_bytes())?;
        }

        w.write_all(&(self.pac.len() as u64).to_le_bytes())?;
        w.write_all(&self.pac)?;
        w.flush()
    }

    pub fn restore(path: &Path) -> io::Result<RefSeq> {
        let mut r = BufReader::new(File::open(path)?);

        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != Self::MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "not a lodemap reference file",
            ));
        }
        let version = read_u32(&mut r)?;
        if version != Self::VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported reference file version {}", version),
            ));
        }

        let total_len = read_u64(&mut r)?;

        let n_chroms = read_u32(&mut r)? as usize;
        let mut annotations = Vec::with_capacity(n_chroms);
        for _ in 0..n_chroms {
            let name_len = read_u32(&mut r)? as usize;
            let mut name = vec![0u8; name_len];
            r.read_exact(&mut name)?;
            let name = String::from_utf8(name)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            annotations.push(Annotation {
                name,
                offset: read_u64(&mut r)?,
                length: read_u64(&mut r)?,
                ambiguous_bases: read_u64(&mut r)?,
            });
        }

        let n_amb = read_u32(&mut r)? as usize;
        let mut amb_regions = Vec::with_capacity(n_amb);
        for _ in 0..n_amb {
            amb_regions.push(AmbRegion {
                offset: read_u64(&mut r)?,
                length: read_u64(&mut r)?,
            });
        }

        let pac_len = read_u64(&mut r)? as usize;
        if pac_len != (total_len as usize + 3) / 4 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "packed sequence length inconsistent with total length",
            ));
        }
        let mut pac = vec![0u8; pac_len];
        r.read_exact(&mut pac)?;

        Ok(RefSeq {
            total_len,
            annotations,
            amb_regions,
            pac,
        })
    }
}

fn read_u32(r: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(r: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
