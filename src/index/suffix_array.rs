// Suffix-array index and the exact seed lookup.
//
// The array is built once over the packed text via the bio crate's suffix
// array construction, persisted as a raw little-endian section, and memory
// mapped back on load.

use memmap2::Mmap;
use std::cmp::Ordering;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::reference::{ChromId, RefSeq, CODE_BASE};
use crate::error::AlignError;
use crate::opts::Sensitivity;

const REF_SUFFIX: &str = ".ref.lm";
const SA_SUFFIX: &str = ".sa.lm";

pub struct SuffixIndex {
    pub reference: RefSeq,
    /// Suffix positions of the concatenated text, lexicographic order.
    sa: Vec<u64>,
    /// Seeds with more occurrences than this are skipped entirely.
    max_iter: usize,
}

impl SuffixIndex {
    /// Build the suffix array over the reference text.
    pub fn build(reference: RefSeq) -> SuffixIndex {
        let n = reference.total_len as usize;
        let mut text = Vec::with_capacity(n + 1);
        for pos in 0..n as u64 {
            text.push(CODE_BASE[reference.base_at(pos) as usize]);
        }
        text.push(b'$');

        let start = std::time::Instant::now();
        let raw = bio::data_structures::suffix_array::suffix_array(&text);
        // Drop the sentinel suffix; real positions only.
        let sa: Vec<u64> = raw
            .into_iter()
            .filter(|&p| p < n)
            .map(|p| p as u64)
            .collect();
        log::info!(
            "Suffix array built: {} positions in {:.3}s",
            sa.len(),
            start.elapsed().as_secs_f64()
        );

        SuffixIndex {
            reference,
            sa,
            max_iter: Sensitivity::Default.max_seed_occ(),
        }
    }

    /// Bound on seed occurrences materialised per query, set from the
    /// sensitivity mode before the index is shared with the worker pool.
    pub fn set_max_iter(&mut self, bound: usize) {
        self.max_iter = bound.max(1);
    }

    /// All exact occurrences of `core` (base codes, no Ns) in the text,
    /// ascending. Empty when absent, and empty when the seed is more
    /// repetitive than the configured bound — the caller slides on.
    ///
    /// Ascending order is part of the contract: downstream tie-breaks depend
    /// on it being reproducible.
    pub fn exact_seed(&self, core: &[u8]) -> Vec<u64> {
        debug_assert!(core.iter().all(|&c| c < 4));
        if core.is_empty() {
            return Vec::new();
        }

        let lo = self
            .sa
            .partition_point(|&p| self.suffix_cmp(p, core) == Ordering::Less);
        let hi = lo
            + self.sa[lo..].partition_point(|&p| self.suffix_cmp(p, core) == Ordering::Equal);

        let count = hi - lo;
        if count == 0 || count > self.max_iter {
            return Vec::new();
        }
        let mut loci = self.sa[lo..hi].to_vec();
        loci.sort_unstable();
        loci
    }

    /// Occurrence count without materialising loci.
    pub fn seed_occurrences(&self, core: &[u8]) -> usize {
        let lo = self
            .sa
            .partition_point(|&p| self.suffix_cmp(p, core) == Ordering::Less);
        self.sa[lo..].partition_point(|&p| self.suffix_cmp(p, core) == Ordering::Equal)
    }

    /// Compare the suffix at `pos` against `core` over the first
    /// `core.len()` bases. A suffix that runs out of text is a strict prefix
    /// of the core and orders before it.
    fn suffix_cmp(&self, pos: u64, core: &[u8]) -> Ordering {
        for (k, &c) in core.iter().enumerate() {
            let p = pos + k as u64;
            if p >= self.reference.total_len {
                return Ordering::Less;
            }
            match self.reference.base_at(p).cmp(&c) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }

    // --- convenience delegates --------------------------------------------

    pub fn ident_for(&self, name: &str) -> Option<ChromId> {
        self.reference.ident_for(name)
    }

    pub fn get_base(&self, chrom: ChromId, pos: u64) -> Option<u8> {
        self.reference.get_base(chrom, pos)
    }

    pub fn get_seq(&self, chrom: ChromId, pos: u64, len: u64) -> Option<Vec<u8>> {
        self.reference.get_seq(chrom, pos, len)
    }

    // --- persistence -------------------------------------------------------

    fn ref_path(prefix: &Path) -> PathBuf {
        PathBuf::from(format!("{}{}", prefix.display(), REF_SUFFIX))
    }

    fn sa_path(prefix: &Path) -> PathBuf {
        PathBuf::from(format!("{}{}", prefix.display(), SA_SUFFIX))
    }

    /// Write both index files next to `prefix`.
    pub fn dump(&self, prefix: &Path) -> io::Result<()> {
        self.reference.dump(&Self::ref_path(prefix))?;

        let mut w = BufWriter::new(File::create(Self::sa_path(prefix))?);
        w.write_all(&self.reference.total_len.to_le_bytes())?;
        w.write_all(&(self.sa.len() as u64).to_le_bytes())?;
        for &p in &self.sa {
            w.write_all(&p.to_le_bytes())?;
        }
        w.flush()
    }

    /// Load an index pair, memory-mapping the suffix-array section.
    pub fn open(prefix: &Path) -> Result<SuffixIndex, AlignError> {
        let start = std::time::Instant::now();
        let reference = RefSeq::restore(&Self::ref_path(prefix))?;

        let file = File::open(Self::sa_path(prefix))?;
        let mmap = unsafe { Mmap::map(&file)? };
        if mmap.len() < 16 {
            return Err(AlignError::IndexFormat(
                "suffix-array file truncated".into(),
            ));
        }

        let seq_len = u64::from_le_bytes(mmap[0..8].try_into().unwrap());
        if seq_len != reference.total_len {
            return Err(AlignError::IndexFormat(format!(
                "suffix array built over {} bases but reference has {}",
                seq_len, reference.total_len
            )));
        }
        let sa_len = u64::from_le_bytes(mmap[8..16].try_into().unwrap()) as usize;
        let expected = 16 + sa_len * std::mem::size_of::<u64>();
        if mmap.len() != expected {
            return Err(AlignError::IndexFormat(format!(
                "suffix-array file is {} bytes, expected {}",
                mmap.len(),
                expected
            )));
        }

        let mut sa: Vec<u64> = Vec::with_capacity(sa_len);
        // SAFETY: the byte length was validated against sa_len above; u64 has
        // no invalid bit patterns and the source is plain little-endian data.
        unsafe {
            let src = mmap[16..].as_ptr() as *const u64;
            sa.set_len(sa_len);
            std::ptr::copy_nonoverlapping(src, sa.as_mut_ptr(), sa_len);
        }

        log::info!(
            "Index loaded in {:.3}s (seq_len={}, sa={})",
            start.elapsed().as_secs_f64(),
            reference.total_len,
            sa_len
        );

        Ok(SuffixIndex {
            reference,
            sa,
            max_iter: Sensitivity::Default.max_seed_occ(),
        })
    }
}

impl std::fmt::Debug for SuffixIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuffixIndex")
            .field("seq_len", &self.reference.total_len)
            .field("sa_len", &self.sa.len())
            .field("max_iter", &self.max_iter)
            .finish()
    }
}
