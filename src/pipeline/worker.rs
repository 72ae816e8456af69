// Alignment worker.
//
// Each worker owns a matcher and loops on batch acquisition until the
// session reports the phase over. Records in an acquired range belong to
// this worker alone; the session cursor never hands a read out twice.
// Workers do not unwind across the pool boundary: a panic inside batch
// processing is caught and published as the shared fatal result.

use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::session::{AlignmentSession, BatchOutcome};
use crate::error::AlignError;
use crate::index::SuffixIndex;
use crate::matcher::SeedExtendMatcher;
use crate::opts::AlignOpt;
use crate::reads::record::{base_code, CandidateState, ClusterScore, MultiHitRecord};
use crate::reads::store::ReadStore;

/// Per-worker summary; batch ranges are kept for the partition invariant.
#[derive(Debug, Default)]
pub struct WorkerReport {
    pub worker: usize,
    pub batches: Vec<Range<usize>>,
    pub reads: usize,
}

pub fn worker_loop(
    worker: usize,
    store: &ReadStore,
    index: &SuffixIndex,
    opt: &AlignOpt,
    session: &AlignmentSession,
) -> WorkerReport {
    let mut matcher = SeedExtendMatcher::new(index, opt.clone());
    let mut report = WorkerReport {
        worker,
        ..WorkerReport::default()
    };

    while let Some(range) = session.acquire_batch() {
        let lookups_before = matcher.stats.seed_lookups;
        let result = catch_unwind(AssertUnwindSafe(|| {
            process_batch(store, session, &mut matcher, range.clone())
        }));
        match result {
            Ok(mut outcome) => {
                outcome.seed_lookups = matcher.stats.seed_lookups - lookups_before;
                session.record_batch_done(&outcome);
                report.reads += outcome.reads;
                report.batches.push(range);
            }
            Err(panic) => {
                let msg = panic_message(panic.as_ref());
                log::error!("Worker {} failed in batch {:?}: {}", worker, range, msg);
                session.set_fatal(AlignError::Resource(format!(
                    "worker {} failed: {}",
                    worker, msg
                )));
                break;
            }
        }
    }

    log::debug!(
        "Worker {} done: {} reads in {} batches",
        worker,
        report.reads,
        report.batches.len()
    );
    report
}

fn process_batch(
    store: &ReadStore,
    session: &AlignmentSession,
    matcher: &mut SeedExtendMatcher<'_>,
    range: Range<usize>,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    let mut multi_hits: Vec<MultiHitRecord> = Vec::new();

    // SAFETY: the session cursor carved `range` exclusively for this worker.
    for record in unsafe { store.batch_iter_mut(range) } {
        if session.is_cancelled() {
            break;
        }
        let codes: Vec<u8> = store
            .bytes(record.seq)
            .iter()
            .map(|&b| base_code(b))
            .collect();

        let matched = matcher.match_read(&codes);
        record.nar = matched.nar;
        record.hit = matched.hit;
        record.low_mismatch = matched.low_mismatch;
        record.next_low_mismatch = matched.next_low_mismatch;

        for (hit, mismatches) in matched.candidates {
            multi_hits.push(MultiHitRecord {
                read: record.id,
                segment: hit.primary,
                mismatches,
                score: ClusterScore::zero(),
                state: CandidateState::Unresolved,
            });
        }

        outcome.reads += 1;
        outcome.nar_counts[matched.nar.index()] += 1;
    }

    session.push_multi_hits(&mut multi_hits);
    outcome
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
