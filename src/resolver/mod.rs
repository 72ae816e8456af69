//! Multi-locus resolution.
//!
//! Reads whose best alignment is ambiguous across several loci are assigned
//! a single reported locus by proximity-weighted clustering: a candidate
//! scores higher the more confidently-aligned neighbours overlap its
//! clustering window. Uniquely-aligned neighbours carry a higher fixed
//! weight than other multi-hit reads; scores saturate per class. A candidate
//! wins only when its score clears a fixed minimum and dominates the
//! runner-up, and near-other winners are invalidated when their supporting
//! neighbours lost candidacy.

use rayon::slice::ParallelSliceMut;

use crate::defaults::{
    CLUSTER_MIN_SCORE, CLUSTER_MULTI_CAP, CLUSTER_MULTI_WEIGHT, CLUSTER_UNIQUE_CAP,
    CLUSTER_UNIQUE_WEIGHT, CLUSTER_WINDOW,
};
use crate::index::ChromId;
use crate::opts::ResolvePolicy;
use crate::reads::record::{
    CandidateState, ClusterScore, HitLoci, MultiHitRecord, Nar, ScoreClass, Strand,
};
use crate::reads::store::ReadStore;

#[derive(Debug, Default, Clone)]
pub struct ResolveStats {
    pub candidates: usize,
    pub ambiguous_reads: u64,
    pub resolved_unique: u64,
    pub resolved_multi: u64,
    pub orphaned: u64,
    pub unresolved_reads: u64,
}

/// A uniquely-aligned read's locus, the high-weight clustering evidence.
#[derive(Debug, Clone, Copy)]
struct Anchor {
    chrom: ChromId,
    start: u64,
    strand: Strand,
}

/// Resolve every multi-hit read in place and write accepted candidates back
/// into their owning records. Requires the worker pool to be joined; `&mut`
/// access to the store guarantees it.
pub fn resolve(
    store: &mut ReadStore,
    multi: &mut Vec<MultiHitRecord>,
    policy: ResolvePolicy,
) -> ResolveStats {
    let mut stats = ResolveStats {
        candidates: multi.len(),
        ..ResolveStats::default()
    };
    if policy == ResolvePolicy::Off || multi.is_empty() {
        stats.unresolved_reads = distinct_reads(multi);
        return stats;
    }

    // Unique anchors, sorted by (chrom, start) for the window scans.
    let mut anchors: Vec<Anchor> = store
        .iter()
        .filter(|rec| rec.nar == Nar::Accepted)
        .filter_map(|rec| rec.hit.as_ref())
        .map(|hit| Anchor {
            chrom: hit.primary.chrom,
            start: hit.primary.start,
            strand: hit.primary.strand,
        })
        .collect();
    anchors.par_sort_unstable_by_key(|a| (a.chrom, a.start));

    // Candidates sorted the same way; this order is kept for the whole pass
    // so neighbour scans stay local.
    multi.par_sort_unstable_by_key(|r| (r.segment.chrom, r.segment.start));

    // Clustering pass: accumulate per-class saturating scores.
    let scores: Vec<ClusterScore> = (0..multi.len())
        .map(|i| cluster_score(&anchors, multi, i))
        .collect();
    for (rec, score) in multi.iter_mut().zip(scores) {
        rec.score = score;
    }

    // Selection: per read, best first. The locus tie-break keeps the
    // outcome reproducible for equal scores.
    let mut order: Vec<usize> = (0..multi.len()).collect();
    {
        let records: &[MultiHitRecord] = multi;
        order.par_sort_unstable_by_key(|&i| {
            let r = &records[i];
            (
                r.read,
                std::cmp::Reverse(r.score),
                r.segment.chrom,
                r.segment.start,
            )
        });
    }

    let mut g = 0;
    while g < order.len() {
        let read = multi[order[g]].read;
        let end = order[g..]
            .iter()
            .position(|&i| multi[i].read != read)
            .map_or(order.len(), |p| g + p);
        stats.ambiguous_reads += 1;

        let best_idx = order[g];
        let best = multi[best_idx].score;
        let second = order.get(g + 1).filter(|_| g + 1 < end).map(|&i| multi[i].score);

        let dominant = match second {
            Some(sec) if sec.class == best.class => best.score >= 2 * sec.score,
            _ => true,
        };
        let class_allowed = best.class == ScoreClass::Unique || policy == ResolvePolicy::NearOther;

        if best.score >= CLUSTER_MIN_SCORE && dominant && class_allowed {
            for &i in &order[g..end] {
                multi[i].state = if i == best_idx {
                    match best.class {
                        ScoreClass::Unique => CandidateState::AcceptedNearUnique,
                        ScoreClass::Multi => CandidateState::AcceptedNearOther,
                    }
                } else {
                    CandidateState::Rejected
                };
            }
        }
        // otherwise every candidate of the read stays Unresolved
        g = end;
    }

    // Orphan pass: a near-other winner needs at least one neighbouring
    // candidate that itself survived selection.
    let orphans: Vec<usize> = (0..multi.len())
        .filter(|&i| multi[i].state == CandidateState::AcceptedNearOther)
        .filter(|&i| !has_accepted_neighbour(multi, i))
        .collect();
    for i in orphans {
        multi[i].state = CandidateState::Orphan;
        stats.orphaned += 1;
    }

    // Write-back: the accepted candidate becomes the read's sole hit.
    for rec in multi.iter() {
        let nar = match rec.state {
            CandidateState::AcceptedNearUnique => Nar::ClusteredUnique,
            CandidateState::AcceptedNearOther => Nar::ClusteredMulti,
            _ => continue,
        };
        let record = store.record_mut(rec.read);
        record.hit = Some(HitLoci::ungapped(rec.segment));
        record.nar = nar;
        match nar {
            Nar::ClusteredUnique => stats.resolved_unique += 1,
            _ => stats.resolved_multi += 1,
        }
    }
    stats.unresolved_reads =
        stats.ambiguous_reads - stats.resolved_unique - stats.resolved_multi;

    log::info!(
        "Resolver: {} candidates over {} reads; {} near-unique, {} near-other, {} orphaned, {} unresolved",
        stats.candidates,
        stats.ambiguous_reads,
        stats.resolved_unique,
        stats.resolved_multi,
        stats.orphaned,
        stats.unresolved_reads
    );
    stats
}

fn distinct_reads(multi: &[MultiHitRecord]) -> u64 {
    let mut reads: Vec<_> = multi.iter().map(|r| r.read).collect();
    reads.sort_unstable();
    reads.dedup();
    reads.len() as u64
}

/// Score candidate `i` against its clustering window. Saturation at the
/// per-class cap short-circuits the scan.
fn cluster_score(anchors: &[Anchor], multi: &[MultiHitRecord], i: usize) -> ClusterScore {
    let cand = &multi[i];
    let chrom = cand.segment.chrom;
    let start = cand.segment.start;
    let strand = cand.segment.strand;
    let win_lo = start.saturating_sub(CLUSTER_WINDOW);
    let win_hi = start + CLUSTER_WINDOW;

    let mut unique_score: u16 = 0;
    let lo = anchors.partition_point(|a| (a.chrom, a.start) < (chrom, win_lo));
    for a in &anchors[lo..] {
        if a.chrom != chrom || a.start > win_hi {
            break;
        }
        if a.strand == strand {
            unique_score = (unique_score + CLUSTER_UNIQUE_WEIGHT).min(CLUSTER_UNIQUE_CAP);
            if unique_score == CLUSTER_UNIQUE_CAP {
                break;
            }
        }
    }

    let mut multi_score: u16 = 0;
    // left neighbours (start <= ours), then right, in the shared sort order
    for j in (0..i).rev() {
        let n = &multi[j];
        if n.segment.chrom != chrom || n.segment.start < win_lo {
            break;
        }
        if n.read != cand.read && n.segment.strand == strand {
            multi_score = (multi_score + CLUSTER_MULTI_WEIGHT).min(CLUSTER_MULTI_CAP);
            if multi_score == CLUSTER_MULTI_CAP {
                break;
            }
        }
    }
    if multi_score < CLUSTER_MULTI_CAP {
        for n in &multi[i + 1..] {
            if n.segment.chrom != chrom || n.segment.start > win_hi {
                break;
            }
            if n.read != cand.read && n.segment.strand == strand {
                multi_score = (multi_score + CLUSTER_MULTI_WEIGHT).min(CLUSTER_MULTI_CAP);
                if multi_score == CLUSTER_MULTI_CAP {
                    break;
                }
            }
        }
    }

    if unique_score > 0 {
        ClusterScore {
            class: ScoreClass::Unique,
            score: unique_score,
        }
    } else {
        ClusterScore {
            class: ScoreClass::Multi,
            score: multi_score,
        }
    }
}

/// True when some other read's candidate inside the window survived
/// selection.
fn has_accepted_neighbour(multi: &[MultiHitRecord], i: usize) -> bool {
    let cand = &multi[i];
    let chrom = cand.segment.chrom;
    let start = cand.segment.start;
    let win_lo = start.saturating_sub(CLUSTER_WINDOW);
    let win_hi = start + CLUSTER_WINDOW;

    let accepted = |r: &MultiHitRecord| {
        r.read != cand.read
            && matches!(
                r.state,
                CandidateState::AcceptedNearUnique | CandidateState::AcceptedNearOther
            )
    };

    for j in (0..i).rev() {
        let n = &multi[j];
        if n.segment.chrom != chrom || n.segment.start < win_lo {
            break;
        }
        if accepted(n) {
            return true;
        }
    }
    for n in &multi[i + 1..] {
        if n.segment.chrom != chrom || n.segment.start > win_hi {
            break;
        }
        if accepted(n) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reads::record::{pack_base, ReadId, Segment};

    fn segment(chrom: ChromId, start: u64) -> Segment {
        Segment {
            chrom,
            strand: Strand::Forward,
            start,
            len: 100,
            left_trim: 0,
            right_trim: 0,
            mismatches: 0,
        }
    }

    fn candidate(read: ReadId, chrom: ChromId, start: u64) -> MultiHitRecord {
        MultiHitRecord {
            read,
            segment: segment(chrom, start),
            mismatches: 0,
            score: ClusterScore::zero(),
            state: CandidateState::Unresolved,
        }
    }

    /// Store with `n` published reads; callers set outcomes directly.
    fn store_with(n: usize) -> ReadStore {
        let store = ReadStore::new();
        {
            let mut appender = store.appender();
            for i in 0..n {
                appender.append(&[pack_base(0, 30)], format!("r{}", i).as_bytes(), None);
            }
            appender.publish();
        }
        store
    }

    fn mark_unique(store: &mut ReadStore, id: ReadId, chrom: ChromId, start: u64) {
        let rec = store.record_mut(id);
        rec.nar = Nar::Accepted;
        rec.hit = Some(HitLoci::ungapped(segment(chrom, start)));
    }

    fn mark_ambiguous(store: &mut ReadStore, id: ReadId) {
        store.record_mut(id).nar = Nar::MmDelta;
    }

    #[test]
    fn test_near_unique_neighbour_selects_locus() {
        // Read 4 occurs at five loci; only the locus at chr0:5_000 has
        // uniquely-aligned neighbours inside the window.
        let mut store = store_with(8);
        for id in 0..3 {
            mark_unique(&mut store, id, 0, 5_000 + id as u64 * 50);
        }
        mark_ambiguous(&mut store, 4);
        let mut multi = vec![
            candidate(4, 0, 5_020),
            candidate(4, 0, 50_000),
            candidate(4, 0, 100_000),
            candidate(4, 1, 3_000),
            candidate(4, 1, 80_000),
        ];

        let stats = resolve(&mut store, &mut multi, ResolvePolicy::NearUnique);
        assert_eq!(stats.resolved_unique, 1);
        assert_eq!(stats.unresolved_reads, 0);

        let rec = store.get(4);
        assert_eq!(rec.nar, Nar::ClusteredUnique);
        assert_eq!(rec.hit.unwrap().primary.start, 5_020);
    }

    #[test]
    fn test_dominance_within_class() {
        // Both candidate loci have unique neighbours; 3 vs 2 anchors fails
        // the 2x dominance requirement, so the read stays unresolved.
        let mut store = store_with(16);
        for id in 0..3 {
            mark_unique(&mut store, id, 0, 1_000 + id as u64 * 10);
        }
        for id in 3..5 {
            mark_unique(&mut store, id, 0, 200_000 + (id as u64 - 3) * 10);
        }
        mark_ambiguous(&mut store, 10);
        let mut multi = vec![candidate(10, 0, 1_050), candidate(10, 0, 200_050)];

        let stats = resolve(&mut store, &mut multi, ResolvePolicy::NearUnique);
        assert_eq!(stats.resolved_unique, 0);
        assert_eq!(stats.unresolved_reads, 1);
        assert_eq!(store.get(10).nar, Nar::MmDelta);

        // With 6 vs 2 anchors the dominance ratio holds.
        let mut store = store_with(16);
        for id in 0..6 {
            mark_unique(&mut store, id, 0, 1_000 + id as u64 * 10);
        }
        for id in 6..8 {
            mark_unique(&mut store, id, 0, 200_000 + (id as u64 - 6) * 10);
        }
        mark_ambiguous(&mut store, 10);
        let mut multi = vec![candidate(10, 0, 1_050), candidate(10, 0, 200_050)];

        let stats = resolve(&mut store, &mut multi, ResolvePolicy::NearUnique);
        assert_eq!(stats.resolved_unique, 1);
        let hit = store.get(10).hit.unwrap();
        assert_eq!(hit.primary.start, 1_050);
        // dominance invariant: accepted score at least twice the runner-up
        let best = multi.iter().find(|r| r.segment.start == 1_050).unwrap();
        let second = multi.iter().find(|r| r.segment.start == 200_050).unwrap();
        assert!(best.score.score >= 2 * second.score.score);
    }

    #[test]
    fn test_cross_class_preference() {
        // Unique evidence beats a larger amount of multi evidence without
        // a dominance check across classes.
        let mut store = store_with(40);
        mark_unique(&mut store, 0, 0, 1_000);
        mark_unique(&mut store, 1, 0, 1_010);
        for id in 2..30 {
            mark_ambiguous(&mut store, id);
        }
        mark_ambiguous(&mut store, 30);
        let mut multi = vec![candidate(30, 0, 1_020), candidate(30, 0, 500_000)];
        // crowd of other multi-hit reads around the second locus
        for id in 2..30u32 {
            multi.push(candidate(id, 0, 500_000 + id as u64));
        }

        let stats = resolve(&mut store, &mut multi, ResolvePolicy::NearOther);
        assert_eq!(stats.resolved_unique, 1);
        assert_eq!(store.get(30).hit.unwrap().primary.start, 1_020);
    }

    #[test]
    fn test_near_other_policy_gate() {
        // Only multi-hit neighbours support the best locus: accepted under
        // NearOther, left unresolved under NearUnique.
        let build = || {
            let mut store = store_with(32);
            for id in 0..20 {
                mark_ambiguous(&mut store, id);
            }
            let mut multi = Vec::new();
            // reads 0..12 all pile on chr0 around 10_000, mutually supporting
            for id in 0..12u32 {
                multi.push(candidate(id, 0, 10_000 + id as u64 * 8));
                multi.push(candidate(id, 1, 700_000 + id as u64 * 4_000));
            }
            (store, multi)
        };

        let (mut store, mut multi) = build();
        let stats = resolve(&mut store, &mut multi, ResolvePolicy::NearUnique);
        assert_eq!(stats.resolved_multi, 0);
        assert_eq!(store.get(0).nar, Nar::MmDelta);

        let (mut store, mut multi) = build();
        let stats = resolve(&mut store, &mut multi, ResolvePolicy::NearOther);
        assert!(stats.resolved_multi > 0);
        let rec = store.get(0);
        assert_eq!(rec.nar, Nar::ClusteredMulti);
        assert_eq!(rec.hit.unwrap().primary.chrom, 0);
    }

    #[test]
    fn test_orphan_invalidation() {
        // Read 0's near-other winner is supported only by candidates of
        // reads that all fail their own selection (each read ties across
        // two loci in the same window). The winner loses its support and
        // must be orphaned.
        let mut store = store_with(16);
        for id in 0..10 {
            mark_ambiguous(&mut store, id);
        }
        let mut multi = vec![candidate(0, 0, 10_000), candidate(0, 1, 900_000)];
        for k in 1..10u32 {
            multi.push(candidate(k, 0, 10_000 + k as u64 * 3));
            multi.push(candidate(k, 0, 10_500 + k as u64 * 3));
        }

        let stats = resolve(&mut store, &mut multi, ResolvePolicy::NearOther);
        assert_eq!(stats.orphaned, 1);
        assert_eq!(stats.resolved_multi, 0);
        assert_eq!(stats.unresolved_reads, stats.ambiguous_reads);

        let orphan = multi
            .iter()
            .find(|r| r.state == CandidateState::Orphan)
            .expect("read 0's winner must be orphaned");
        assert_eq!(orphan.read, 0);
        assert_eq!(store.get(0).nar, Nar::MmDelta);
        assert!(store.get(0).hit.is_none());
    }

    #[test]
    fn test_no_usable_window_stays_unresolved() {
        let mut store = store_with(4);
        mark_ambiguous(&mut store, 0);
        let mut multi = vec![candidate(0, 0, 10_000), candidate(0, 1, 20_000)];
        let stats = resolve(&mut store, &mut multi, ResolvePolicy::NearOther);
        assert_eq!(stats.unresolved_reads, 1);
        assert_eq!(store.get(0).nar, Nar::MmDelta);
        assert!(multi.iter().all(|r| r.state == CandidateState::Unresolved));
    }

    #[test]
    fn test_policy_off_counts_only() {
        let mut store = store_with(4);
        mark_ambiguous(&mut store, 0);
        let mut multi = vec![candidate(0, 0, 1_000), candidate(0, 0, 2_000)];
        let stats = resolve(&mut store, &mut multi, ResolvePolicy::Off);
        assert_eq!(stats.candidates, 2);
        assert_eq!(stats.unresolved_reads, 1);
        assert_eq!(store.get(0).nar, Nar::MmDelta);
    }
}
