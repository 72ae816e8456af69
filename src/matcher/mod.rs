//! Seed-and-extend approximate matching.
//!
//! For one read the matcher queries the suffix array with sliding core
//! windows, extends every seed locus by tallying substitutions against the
//! reference, and classifies the read from the best and second-best tallies.
//! Core-window sizing is pigeonhole-based: with at most `max_subs`
//! substitutions, at least one window of `core_len` bases is clean, so the
//! exact lookup cannot miss a within-budget locus for want of a clean core —
//! only the slide budget trades that guarantee for throughput.

use std::borrow::Cow;

use crate::defaults::{GAP_OPEN_MISMATCH_COST, MAX_READ_LEN};
use crate::index::reference::reverse_complement;
use crate::index::{ChromId, SuffixIndex};
use crate::opts::AlignOpt;
use crate::reads::record::{
    Gap, GapKind, HitLoci, Nar, Segment, Strand, NO_MISMATCH_COUNT,
};

/// Index traffic counters, cumulative over the matcher's lifetime.
#[derive(Debug, Default, Clone, Copy)]
pub struct MatchStats {
    pub seed_lookups: u64,
    pub loci_examined: u64,
}

/// Everything the worker writes back into the read record.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub nar: Nar,
    pub hit: Option<HitLoci>,
    pub low_mismatch: u16,
    pub next_low_mismatch: u16,
    /// Retained candidates for the resolver (ambiguous reads only),
    /// ascending by locus.
    pub candidates: Vec<(HitLoci, u16)>,
}

impl MatchOutcome {
    fn classified(nar: Nar) -> MatchOutcome {
        MatchOutcome {
            nar,
            hit: None,
            low_mismatch: NO_MISMATCH_COUNT,
            next_low_mismatch: NO_MISMATCH_COUNT,
            candidates: Vec::new(),
        }
    }
}

/// One extension result on a diagonal. `hit` is `None` when the tally busted
/// the budget; such candidates still feed the second-best tracking.
struct Candidate {
    strand: Strand,
    text_start: u64,
    tally: u16,
    hit: Option<HitLoci>,
}

pub struct SeedExtendMatcher<'a> {
    index: &'a SuffixIndex,
    opt: AlignOpt,
    /// Identical consecutive raw sequences reuse the prior outcome.
    memo: Option<(Vec<u8>, MatchOutcome)>,
    pub stats: MatchStats,
}

impl<'a> SeedExtendMatcher<'a> {
    pub fn new(index: &'a SuffixIndex, opt: AlignOpt) -> SeedExtendMatcher<'a> {
        SeedExtendMatcher {
            index,
            opt,
            memo: None,
            stats: MatchStats::default(),
        }
    }

    /// Classify one read given its base codes (0..4, 4 = N).
    pub fn match_read(&mut self, codes: &[u8]) -> MatchOutcome {
        if let Some((prev, outcome)) = &self.memo {
            if prev.as_slice() == codes {
                return outcome.clone();
            }
        }
        let outcome = self.match_uncached(codes);
        self.memo = Some((codes.to_vec(), outcome.clone()));
        outcome
    }

    fn match_uncached(&mut self, codes: &[u8]) -> MatchOutcome {
        let len = codes.len().min(MAX_READ_LEN);
        let read = &codes[..len];

        // The N gate runs before any index traffic.
        let n_count = read.iter().filter(|&&c| c >= 4).count();
        if n_count > self.opt.max_ns {
            return MatchOutcome::classified(Nar::Ns);
        }
        if len < self.opt.min_core_len {
            return MatchOutcome::classified(Nar::Trim);
        }

        let core_len = self.opt.core_len_for(len);
        let max_subs = self.opt.max_subs_for(len);
        // Tallies past this ceiling can never influence the delta gate, so
        // extension aborts there.
        let bound = max_subs.saturating_add(self.opt.min_edit_dist.max(1));

        let mut cands: Vec<Candidate> = Vec::new();
        let strands: &[Strand] = if self.opt.align_reverse {
            &[Strand::Forward, Strand::Reverse]
        } else {
            &[Strand::Forward]
        };

        for &strand in strands {
            let oriented: Cow<[u8]> = match strand {
                Strand::Forward => Cow::Borrowed(read),
                Strand::Reverse => Cow::Owned(reverse_complement(read)),
            };
            let oriented = oriented.as_ref();

            for slide in 0..self.opt.sensitivity.max_slides() {
                let off = slide * core_len;
                if off + core_len > len {
                    break;
                }
                let window = &oriented[off..off + core_len];
                if window.iter().any(|&c| c >= 4) {
                    continue; // an N window cannot exact-match
                }
                self.stats.seed_lookups += 1;
                for locus in self.index.exact_seed(window) {
                    self.stats.loci_examined += 1;
                    let Some(text_start) = locus.checked_sub(off as u64) else {
                        continue;
                    };
                    if cands
                        .iter()
                        .any(|c| c.strand == strand && c.text_start == text_start)
                    {
                        continue; // diagonal already extended from an earlier slide
                    }
                    // The seed itself must sit inside one chromosome.
                    let Some((chrom, _)) = self.index.reference.locate(locus, core_len as u64)
                    else {
                        continue;
                    };
                    if let Some(cand) =
                        self.extend(oriented, strand, chrom, text_start, core_len, max_subs, bound)
                    {
                        cands.push(cand);
                    }
                }
            }
        }

        if cands.is_empty() {
            return MatchOutcome::classified(Nar::NoHit);
        }

        // Deterministic ranking: tally, then ascending locus, then strand.
        cands.sort_by(|a, b| {
            (a.tally, a.text_start, a.strand).cmp(&(b.tally, b.text_start, b.strand))
        });
        let low = cands[0].tally;
        let next = cands.get(1).map(|c| c.tally).unwrap_or(NO_MISMATCH_COUNT);

        if low > max_subs {
            let mut out = MatchOutcome::classified(Nar::NoHit);
            out.low_mismatch = low;
            out.next_low_mismatch = next;
            return out;
        }

        if next.saturating_sub(low) >= self.opt.min_edit_dist {
            return MatchOutcome {
                nar: Nar::Accepted,
                hit: cands[0].hit,
                low_mismatch: low,
                next_low_mismatch: next,
                candidates: Vec::new(),
            };
        }

        // Ambiguous: retain every candidate too close to the best.
        let threshold = low + self.opt.min_edit_dist;
        let mut retained: Vec<(u64, HitLoci, u16)> = cands
            .iter()
            .filter(|c| c.tally < threshold)
            .filter_map(|c| c.hit.map(|h| (c.text_start, h, c.tally)))
            .collect();
        retained.sort_by_key(|&(pos, _, _)| pos);

        if retained.len() > self.opt.max_multi_hits {
            if self.opt.clamp_multi_hits {
                retained.truncate(self.opt.max_multi_hits);
            } else {
                let mut out = MatchOutcome::classified(Nar::MultiAlign);
                out.low_mismatch = low;
                out.next_low_mismatch = next;
                return out;
            }
        }

        MatchOutcome {
            nar: Nar::MmDelta,
            hit: None,
            low_mismatch: low,
            next_low_mismatch: next,
            candidates: retained.into_iter().map(|(_, h, t)| (h, t)).collect(),
        }
    }

    /// Extend a seed diagonal across the whole read, tallying substitutions.
    /// Overhang past the chromosome edges is trimmed, not counted.
    #[allow(clippy::too_many_arguments)]
    fn extend(
        &mut self,
        read: &[u8],
        strand: Strand,
        chrom: ChromId,
        text_start: u64,
        core_len: usize,
        max_subs: u16,
        bound: u16,
    ) -> Option<Candidate> {
        let reference = &self.index.reference;
        let ann = &reference.annotations[chrom as usize];
        let len = read.len() as u64;

        let aln_start = text_start.max(ann.offset);
        let aln_end = (text_start + len).min(ann.offset + ann.length);
        if aln_end <= aln_start {
            return None;
        }
        let left_trim = (aln_start - text_start) as u16;
        let right_trim = (text_start + len - aln_end) as u16;
        let match_len = aln_end - aln_start;
        if match_len < core_len as u64 {
            return None;
        }

        let mut tally: u16 = 0;
        for k in left_trim as u64..len - right_trim as u64 {
            let rb = read[k as usize];
            if rb >= 4 || rb != reference.base_at(text_start + k) {
                tally += 1;
                if tally >= bound {
                    break;
                }
            }
        }

        // Matches inside ambiguous reference runs are against the random
        // fill, not real sequence; convert them to mismatches.
        if tally < bound {
            for (s, e) in reference.ambiguous_overlap(aln_start, aln_end) {
                for p in s..e {
                    let rb = read[(p - text_start) as usize];
                    if rb < 4 && rb == reference.base_at(p) {
                        tally = (tally + 1).min(bound);
                    }
                }
            }
        }
        let tally = tally.min(bound);

        if tally <= max_subs {
            let segment = Segment {
                chrom,
                strand,
                start: aln_start - ann.offset,
                len: match_len as u32,
                left_trim,
                right_trim,
                mismatches: tally,
            };
            return Some(Candidate {
                strand,
                text_start,
                tally,
                hit: Some(HitLoci::ungapped(segment)),
            });
        }

        // Over budget ungapped: one gap may explain the tail. Splits are only
        // attempted for candidates fully inside the chromosome.
        if (self.opt.split_indels || self.opt.split_splices)
            && left_trim == 0
            && right_trim == 0
        {
            if let Some((hit, split_tally)) =
                self.try_split(read, strand, chrom, text_start, core_len, max_subs)
            {
                if split_tally <= max_subs && split_tally < tally {
                    return Some(Candidate {
                        strand,
                        text_start,
                        tally: split_tally,
                        hit: Some(hit),
                    });
                }
            }
        }

        Some(Candidate {
            strand,
            text_start,
            tally,
            hit: None,
        })
    }

    /// Search for the best single-gap split of the read anchored at
    /// `text_start`. Short reference gaps come from the configured indel
    /// scan; long ones (splices) are proposed by a tail-seed lookup. The
    /// split point minimises prefix+suffix mismatches with both segments
    /// holding at least a core length.
    fn try_split(
        &mut self,
        read: &[u8],
        strand: Strand,
        chrom: ChromId,
        text_start: u64,
        core_len: usize,
        max_subs: u16,
    ) -> Option<(HitLoci, u16)> {
        let reference = &self.index.reference;
        let ann = &reference.annotations[chrom as usize];
        let chrom_end = ann.offset + ann.length;
        let len = read.len();
        let min_anchor = core_len;
        if len < 2 * min_anchor {
            return None;
        }

        let mut prefix = vec![0u16; len + 1];
        for i in 0..len {
            let m = read[i] >= 4 || read[i] != reference.base_at(text_start + i as u64);
            prefix[i + 1] = prefix[i] + m as u16;
        }

        // (total, kind, gap, split, second_segment_mm)
        let mut best: Option<(u16, GapKind, u64, usize, u16)> = None;

        let mut ref_gaps: Vec<u64> = Vec::new();
        if self.opt.split_indels {
            ref_gaps.extend(1..=self.opt.max_indel_len);
        }
        if self.opt.split_splices {
            let t = len - core_len;
            let window = &read[t..];
            if !window.iter().any(|&c| c >= 4) {
                self.stats.seed_lookups += 1;
                for locus in self.index.exact_seed(window) {
                    let Some(origin2) = locus.checked_sub(t as u64) else {
                        continue;
                    };
                    if origin2 <= text_start {
                        continue;
                    }
                    let g = origin2 - text_start;
                    if g > self.opt.max_splice_len {
                        continue;
                    }
                    if self.opt.split_indels && g <= self.opt.max_indel_len {
                        continue; // already covered by the indel scan
                    }
                    ref_gaps.push(g);
                }
            }
        }
        ref_gaps.sort_unstable();
        ref_gaps.dedup();

        for g in ref_gaps {
            let origin2 = text_start + g;
            if origin2 + len as u64 > chrom_end {
                continue;
            }
            let mut suffix = vec![0u16; len + 1];
            for i in (0..len).rev() {
                let m = read[i] >= 4 || read[i] != reference.base_at(origin2 + i as u64);
                suffix[i] = suffix[i + 1] + m as u16;
            }
            for i in min_anchor..=len - min_anchor {
                let total = prefix[i] + suffix[i];
                if best.map_or(true, |(b, ..)| total < b) {
                    let kind = if self.opt.split_indels && g <= self.opt.max_indel_len {
                        GapKind::Deletion
                    } else {
                        GapKind::Splice
                    };
                    best = Some((total, kind, g, i, suffix[i]));
                }
            }
        }

        // Read gap (insertion): read[i + g ..] aligns at text_start + i.
        if self.opt.split_indels {
            let max_g = self
                .opt
                .max_indel_len
                .min(len.saturating_sub(2 * min_anchor) as u64) as usize;
            for g in 1..=max_g {
                let mut suffix = vec![0u16; len + 1];
                for j in (g..len).rev() {
                    let p = text_start + (j - g) as u64;
                    let m = read[j] >= 4 || read[j] != reference.base_at(p);
                    suffix[j] = suffix[j + 1] + m as u16;
                }
                for i in min_anchor..=len - min_anchor - g {
                    let total = prefix[i] + suffix[i + g];
                    if best.map_or(true, |(b, ..)| total < b) {
                        best = Some((total, GapKind::Insertion, g as u64, i, suffix[i + g]));
                    }
                }
            }
        }

        let (total, kind, g, i, second_mm) = best?;
        let split_tally = total + GAP_OPEN_MISMATCH_COST;
        if split_tally > max_subs {
            return None;
        }

        let first = Segment {
            chrom,
            strand,
            start: text_start - ann.offset,
            len: i as u32,
            left_trim: 0,
            right_trim: 0,
            mismatches: total - second_mm,
        };
        let second = match kind {
            GapKind::Deletion | GapKind::Splice => Segment {
                chrom,
                strand,
                start: text_start + g + i as u64 - ann.offset,
                len: (len - i) as u32,
                left_trim: 0,
                right_trim: 0,
                mismatches: second_mm,
            },
            GapKind::Insertion => Segment {
                chrom,
                strand,
                start: text_start + i as u64 - ann.offset,
                len: (len - i - g as usize) as u32,
                left_trim: 0,
                right_trim: 0,
                mismatches: second_mm,
            },
        };
        Some((
            HitLoci::split(first, second, Gap { kind, len: g }),
            split_tally,
        ))
    }
}
