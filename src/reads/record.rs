// Core data model: read records, hit loci, NAR classifications, and the
// multi-hit candidate records consumed by the resolver.

use crate::index::ChromId;

pub type ReadId = u32;

/// Terminal classification of a read after the alignment phase.
///
/// None of these are errors; every read ends in exactly one class and
/// processing continues for the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nar {
    /// Not yet pulled by a worker.
    Unprocessed,
    /// A single best locus met the budget and the edit-distance gap.
    Accepted,
    /// No candidate locus met the substitution budget.
    NoHit,
    /// Best and second-best candidates are too close to distinguish.
    MmDelta,
    /// More qualifying loci than the retention bound.
    MultiAlign,
    /// Too many indeterminate bases; rejected before any index lookup.
    Ns,
    /// Too short to host a core window.
    Trim,
    /// Ambiguity resolved against a uniquely-aligned neighbour.
    ClusteredUnique,
    /// Ambiguity resolved against another multi-hit neighbour.
    ClusteredMulti,
}

impl Nar {
    pub const COUNT: usize = 9;

    pub fn index(self) -> usize {
        match self {
            Nar::Unprocessed => 0,
            Nar::Accepted => 1,
            Nar::NoHit => 2,
            Nar::MmDelta => 3,
            Nar::MultiAlign => 4,
            Nar::Ns => 5,
            Nar::Trim => 6,
            Nar::ClusteredUnique => 7,
            Nar::ClusteredMulti => 8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Nar::Unprocessed => "Unprocessed",
            Nar::Accepted => "Accepted",
            Nar::NoHit => "NoHit",
            Nar::MmDelta => "MMDelta",
            Nar::MultiAlign => "MultiAlign",
            Nar::Ns => "Ns",
            Nar::Trim => "Trim",
            Nar::ClusteredUnique => "ClusteredNearUnique",
            Nar::ClusteredMulti => "ClusteredNearOther",
        }
    }

    /// True when the read carries a reported locus.
    pub fn is_aligned(self) -> bool {
        matches!(
            self,
            Nar::Accepted | Nar::ClusteredUnique | Nar::ClusteredMulti
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn symbol(self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapKind {
    Insertion,
    Deletion,
    Splice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub kind: GapKind,
    pub len: u64,
}

/// One aligned stretch of a read on the reference.
///
/// `start` is chromosome-local. Trims are counted in oriented-read
/// coordinates (after reverse-complementing for minus-strand hits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub chrom: ChromId,
    pub strand: Strand,
    pub start: u64,
    pub len: u32,
    pub left_trim: u16,
    pub right_trim: u16,
    pub mismatches: u16,
}

impl Segment {
    pub fn end(&self) -> u64 {
        self.start + self.len as u64
    }
}

/// Reported locus of a read: one segment, or two around a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitLoci {
    pub primary: Segment,
    /// Present only when `gap` is set.
    pub secondary: Option<Segment>,
    pub gap: Option<Gap>,
}

impl HitLoci {
    pub fn ungapped(segment: Segment) -> HitLoci {
        HitLoci {
            primary: segment,
            secondary: None,
            gap: None,
        }
    }

    pub fn split(first: Segment, second: Segment, gap: Gap) -> HitLoci {
        HitLoci {
            primary: first,
            secondary: Some(second),
            gap: Some(gap),
        }
    }

    pub fn total_mismatches(&self) -> u16 {
        self.primary.mismatches + self.secondary.map_or(0, |s| s.mismatches)
    }
}

/// Handle into the packed byte arena. Stable for the life of the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeqHandle {
    pub chunk: u32,
    pub offset: u32,
    pub len: u32,
}

/// Sentinel for "no tally recorded".
pub const NO_MISMATCH_COUNT: u16 = u16::MAX;

/// One read. Appended by the loader, mutated by the single worker owning its
/// batch, optionally rewritten by the resolver, immutable afterwards.
#[derive(Debug, Clone)]
pub struct ReadRecord {
    pub id: ReadId,
    /// Partner read and second-in-pair bit for interleaved input.
    pub mate: Option<(ReadId, bool)>,
    /// Packed base+quality bytes.
    pub seq: SeqHandle,
    /// Descriptor bytes (FASTQ id).
    pub desc: SeqHandle,
    pub nar: Nar,
    pub hit: Option<HitLoci>,
    pub low_mismatch: u16,
    pub next_low_mismatch: u16,
}

impl Default for ReadRecord {
    fn default() -> Self {
        ReadRecord {
            id: 0,
            mate: None,
            seq: SeqHandle::default(),
            desc: SeqHandle::default(),
            nar: Nar::Unprocessed,
            hit: None,
            low_mismatch: NO_MISMATCH_COUNT,
            next_low_mismatch: NO_MISMATCH_COUNT,
        }
    }
}

// One byte per base: code in the low three bits, clamped Phred quality above.
#[inline]
pub fn pack_base(code: u8, qual: u8) -> u8 {
    (code & 0x7) | (qual.min(31) << 3)
}

#[inline]
pub fn base_code(packed: u8) -> u8 {
    packed & 0x7
}

#[inline]
pub fn base_qual(packed: u8) -> u8 {
    packed >> 3
}

/// Which neighbour class produced a clustering score. `Unique` evidence
/// outranks `Multi` evidence of any magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScoreClass {
    Multi,
    Unique,
}

/// Saturating clustering score tagged with its evidence class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClusterScore {
    pub class: ScoreClass,
    pub score: u16,
}

impl ClusterScore {
    pub fn zero() -> ClusterScore {
        ClusterScore {
            class: ScoreClass::Multi,
            score: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateState {
    Unresolved,
    AcceptedNearUnique,
    AcceptedNearOther,
    Rejected,
    /// Accepted near-other candidate whose support lost candidacy.
    Orphan,
}

/// One candidate locus of a read with several retained hits. Written by the
/// worker that owned the read; scored and resolved in place by the resolver.
#[derive(Debug, Clone)]
pub struct MultiHitRecord {
    pub read: ReadId,
    pub segment: Segment,
    pub mismatches: u16,
    pub score: ClusterScore,
    pub state: CandidateState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_base_round_trip() {
        for code in 0u8..5 {
            for qual in [0u8, 10, 31] {
                let b = pack_base(code, qual);
                assert_eq!(base_code(b), code);
                assert_eq!(base_qual(b), qual);
            }
        }
        // quality clamps instead of clobbering the code bits
        let b = pack_base(3, 60);
        assert_eq!(base_code(b), 3);
        assert_eq!(base_qual(b), 31);
    }

    #[test]
    fn test_cluster_score_ordering() {
        let unique_small = ClusterScore {
            class: ScoreClass::Unique,
            score: 4,
        };
        let multi_large = ClusterScore {
            class: ScoreClass::Multi,
            score: 400,
        };
        assert!(unique_small > multi_large);
        assert!(
            ClusterScore {
                class: ScoreClass::Unique,
                score: 8
            } > unique_small
        );
    }

    #[test]
    fn test_segment_end() {
        let seg = Segment {
            chrom: 0,
            strand: Strand::Forward,
            start: 100,
            len: 36,
            left_trim: 0,
            right_trim: 0,
            mismatches: 1,
        };
        assert_eq!(seg.end(), 136);
        assert!(seg.start <= seg.end());
    }
}
