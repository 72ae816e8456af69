// Shared alignment-phase state.
//
// Everything the loader, the workers, and the orchestrator exchange goes
// through this session: progress counters and the batch cursor under one
// coarse lock, the multi-hit arena under its own lock, a cooperative
// cancellation flag, and the first-fatal-error slot.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::defaults::{MAX_BATCH_READS, MIN_BATCH_READS, POLL_INTERVAL_MS};
use crate::error::AlignError;
use crate::reads::record::{MultiHitRecord, Nar};

#[derive(Debug, Default)]
pub struct Progress {
    /// Records published by the loader.
    pub loaded: usize,
    pub loader_done: bool,
    /// Next unassigned read; everything below is owned by some batch.
    pub cursor: usize,
    /// Records fully processed by workers.
    pub processed: usize,
    pub nar_counts: [u64; Nar::COUNT],
    pub seed_lookups: u64,
    pub fatal: Option<AlignError>,
}

/// Per-batch outcome a worker merges back under the lock.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub reads: usize,
    pub nar_counts: [u64; Nar::COUNT],
    pub seed_lookups: u64,
}

pub struct AlignmentSession {
    progress: Mutex<Progress>,
    batch_cv: Condvar,
    cancelled: AtomicBool,
    multi_hits: Mutex<Vec<MultiHitRecord>>,
    n_workers: usize,
}

impl AlignmentSession {
    pub fn new(n_workers: usize) -> AlignmentSession {
        AlignmentSession {
            progress: Mutex::new(Progress::default()),
            batch_cv: Condvar::new(),
            cancelled: AtomicBool::new(false),
            multi_hits: Mutex::new(Vec::new()),
            n_workers: n_workers.max(1),
        }
    }

    // --- loader side -------------------------------------------------------

    /// Publish the new total of loaded reads and wake waiting workers.
    pub fn publish_loaded(&self, total: usize) {
        let mut p = self.progress.lock().unwrap();
        debug_assert!(total >= p.loaded);
        p.loaded = total;
        drop(p);
        self.batch_cv.notify_all();
    }

    pub fn finish_loading(&self) {
        let mut p = self.progress.lock().unwrap();
        p.loader_done = true;
        drop(p);
        self.batch_cv.notify_all();
    }

    // --- worker side -------------------------------------------------------

    /// Carve the next batch of unprocessed reads.
    ///
    /// Blocks (condvar, bounded wait) while caught up to the loader. Returns
    /// `None` when the phase is over: everything assigned and the loader
    /// finished, a fatal error was published, or cancellation was requested.
    /// Ranges returned across all workers are pairwise disjoint and cover
    /// every loaded read.
    pub fn acquire_batch(&self) -> Option<Range<usize>> {
        let mut p = self.progress.lock().unwrap();
        loop {
            if p.fatal.is_some() || self.is_cancelled() {
                return None;
            }
            let available = p.loaded - p.cursor;
            if available > 0 {
                // Large batches while the queue is deep, shrinking near the
                // end so every worker stays busy until the phase completes.
                let target =
                    (available / (2 * self.n_workers)).clamp(MIN_BATCH_READS, MAX_BATCH_READS);
                let take = available.min(target);
                let range = p.cursor..p.cursor + take;
                p.cursor += take;
                return Some(range);
            }
            if p.loader_done {
                return None;
            }
            let (guard, _timeout) = self
                .batch_cv
                .wait_timeout(p, Duration::from_millis(POLL_INTERVAL_MS))
                .unwrap();
            p = guard;
        }
    }

    /// Merge a finished batch into the shared counters.
    pub fn record_batch_done(&self, outcome: &BatchOutcome) {
        let mut p = self.progress.lock().unwrap();
        p.processed += outcome.reads;
        p.seed_lookups += outcome.seed_lookups;
        for (total, n) in p.nar_counts.iter_mut().zip(outcome.nar_counts.iter()) {
            *total += n;
        }
    }

    pub fn push_multi_hits(&self, records: &mut Vec<MultiHitRecord>) {
        if records.is_empty() {
            return;
        }
        self.multi_hits.lock().unwrap().append(records);
    }

    pub fn take_multi_hits(&self) -> Vec<MultiHitRecord> {
        std::mem::take(&mut *self.multi_hits.lock().unwrap())
    }

    // --- failure and cancellation -----------------------------------------

    /// Publish a fatal error; the first one wins. Wakes every waiter so
    /// peers observe it and stop.
    pub fn set_fatal(&self, err: AlignError) {
        let mut p = self.progress.lock().unwrap();
        if p.fatal.is_none() {
            p.fatal = Some(err);
        }
        drop(p);
        self.batch_cv.notify_all();
    }

    pub fn fatal(&self) -> Option<AlignError> {
        self.progress.lock().unwrap().fatal.clone()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.batch_cv.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    // --- reporting ---------------------------------------------------------

    /// (loaded, processed, loader_done) for the orchestrator's join loop.
    pub fn snapshot(&self) -> (usize, usize, bool) {
        let p = self.progress.lock().unwrap();
        (p.loaded, p.processed, p.loader_done)
    }

    pub fn nar_counts(&self) -> [u64; Nar::COUNT] {
        self.progress.lock().unwrap().nar_counts
    }

    pub fn seed_lookups(&self) -> u64 {
        self.progress.lock().unwrap().seed_lookups
    }
}
