// Alignment options structure shared by the CLI and the library entry points.

use crate::defaults::*;

/// Seed-search sensitivity. Higher modes slide the core window further along
/// the read and tolerate more repetitive seeds, trading throughput for
/// sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Sensitivity {
    Less,
    Default,
    More,
    Ultra,
}

impl Sensitivity {
    /// Core-window slide budget per strand.
    pub fn max_slides(self) -> usize {
        match self {
            Sensitivity::Less => 4,
            Sensitivity::Default => 5,
            Sensitivity::More => 6,
            Sensitivity::Ultra => 8,
        }
    }

    /// Seed-occurrence bound handed to the index; seeds more repetitive than
    /// this are skipped.
    pub fn max_seed_occ(self) -> usize {
        match self {
            Sensitivity::Less => 128,
            Sensitivity::Default => 512,
            Sensitivity::More => 2048,
            Sensitivity::Ultra => 8192,
        }
    }
}

/// Multi-locus resolution policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ResolvePolicy {
    /// Leave ambiguous reads unresolved.
    Off,
    /// Accept only candidates clustered against uniquely-aligned neighbours.
    NearUnique,
    /// Also accept candidates clustered against other multi-hit reads.
    NearOther,
}

/// Alignment options.
#[derive(Debug, Clone)]
pub struct AlignOpt {
    /// Substitution budget per 100 bp of read length.
    pub max_subs_pct: u32,
    /// Required mismatch gap between best and second-best candidate.
    pub min_edit_dist: u16,
    /// Most candidate loci retained for a read before it is classified
    /// MultiAlign (or clamped, see `clamp_multi_hits`).
    pub max_multi_hits: usize,
    /// Keep the first `max_multi_hits` candidates (ascending loci) instead of
    /// rejecting the read when the bound is exceeded.
    pub clamp_multi_hits: bool,
    /// Most indeterminate bases tolerated per read.
    pub max_ns: usize,
    /// Shortest core window queried against the index.
    pub min_core_len: usize,
    pub sensitivity: Sensitivity,
    /// Align the reverse-complement strand as well as the forward strand.
    pub align_reverse: bool,
    /// Search for one read- or reference-gap when the ungapped tally busts
    /// the budget.
    pub split_indels: bool,
    pub max_indel_len: u64,
    /// Search for a long reference-gap (splice) via a tail-seed lookup.
    pub split_splices: bool,
    pub max_splice_len: u64,
    /// Multi-locus resolution policy.
    pub resolve: ResolvePolicy,
    /// Worker threads; capped by CPU count and the hard cap.
    pub n_threads: usize,
    /// Input is interleaved paired-end; records pair links on load.
    pub interleaved: bool,
}

impl Default for AlignOpt {
    fn default() -> Self {
        AlignOpt {
            max_subs_pct: DEFAULT_MAX_SUBS_PCT,
            min_edit_dist: DEFAULT_MIN_EDIT_DIST,
            max_multi_hits: DEFAULT_MAX_MULTI_HITS,
            clamp_multi_hits: false,
            max_ns: DEFAULT_MAX_NS,
            min_core_len: MIN_CORE_LEN,
            sensitivity: Sensitivity::Default,
            align_reverse: true,
            split_indels: false,
            max_indel_len: DEFAULT_MAX_INDEL_LEN,
            split_splices: false,
            max_splice_len: DEFAULT_MAX_SPLICE_LEN,
            resolve: ResolvePolicy::Off,
            n_threads: 1,
            interleaved: false,
        }
    }
}

impl AlignOpt {
    /// Substitution budget for a read of `len` bases: integer truncation of
    /// the percentage, never below one when a budget is configured at all.
    pub fn max_subs_for(&self, len: usize) -> u16 {
        if self.max_subs_pct == 0 {
            return 0;
        }
        ((len as u64 * self.max_subs_pct as u64) / 100).max(1) as u16
    }

    /// Core window length for a read of `len` bases.
    ///
    /// Pigeonhole: with at most `max_subs` substitutions placed adversarially,
    /// dividing the read into `max_subs + 1` windows leaves at least one
    /// window substitution-free. When a runner-up gap of two or more is
    /// demanded, one extra window guarantees a second clean window.
    pub fn core_len_for(&self, len: usize) -> usize {
        let max_subs = self.max_subs_for(len) as usize;
        let divisor = if self.min_edit_dist <= 1 {
            max_subs + 1
        } else {
            max_subs + 2
        };
        (len / divisor).max(self.min_core_len)
    }

    /// Effective worker count: configured, CPU count, and hard cap.
    pub fn effective_threads(&self) -> usize {
        self.n_threads
            .max(1)
            .min(num_cpus::get())
            .min(HARD_THREAD_CAP)
    }
}
