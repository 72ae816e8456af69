// Alignment-phase orchestration.
//
// Wires the loader, the worker pool, and the resolver: spawn the loader,
// spawn N workers against the shared session, log progress while draining,
// join everything, then resolve multi-hit reads if configured. The
// orchestrator is the single abort-vs-continue decision point; the first
// fatal error published into the session becomes the aggregate status.

use std::ops::Range;
use std::path::Path;
use std::thread;
use std::time::Duration;

use super::session::AlignmentSession;
use super::worker::{worker_loop, WorkerReport};
use crate::defaults::POLL_INTERVAL_MS;
use crate::error::AlignError;
use crate::index::SuffixIndex;
use crate::opts::{AlignOpt, ResolvePolicy};
use crate::reads::record::{MultiHitRecord, Nar, ReadId, ReadRecord, Segment};
use crate::reads::store::ReadStore;
use crate::reads::loader;
use crate::resolver::{self, ResolveStats};
use crate::utils::{cputime, realtime};

#[derive(Debug, Default, Clone)]
pub struct RunStats {
    pub total_reads: usize,
    pub nar_counts: [u64; Nar::COUNT],
    pub seed_lookups: u64,
    /// Batch ranges per worker; disjoint, covering every loaded read.
    pub worker_ranges: Vec<Vec<Range<usize>>>,
    pub resolve: Option<ResolveStats>,
    pub wall_time_secs: f64,
    pub cpu_time_secs: f64,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let aligned: u64 = [Nar::Accepted, Nar::ClusteredUnique, Nar::ClusteredMulti]
            .iter()
            .map(|&n| self.nar_counts[n.index()])
            .sum();
        write!(
            f,
            "{} reads, {} aligned, {} lookups, {:.1}s wall, {:.1}s cpu",
            self.total_reads, aligned, self.seed_lookups, self.wall_time_secs, self.cpu_time_secs
        )
    }
}

/// Finalised per-read outcomes, iterable in load order or sorted by locus.
pub struct AlignmentResults {
    pub store: ReadStore,
    pub stats: RunStats,
    /// Resolver input/outcome records, kept for inspection.
    pub multi_hits: Vec<MultiHitRecord>,
}

impl AlignmentResults {
    /// Records in physical load order.
    pub fn iter(&self) -> impl Iterator<Item = &ReadRecord> + '_ {
        self.store.iter()
    }

    /// Aligned reads sorted by (chrom, start, read id). Scheduling order is
    /// block-granular only; stages that need locus order sort here.
    pub fn sorted_hits(&self) -> Vec<(ReadId, Segment)> {
        let mut hits: Vec<(ReadId, Segment)> = self
            .store
            .iter()
            .filter(|rec| rec.nar.is_aligned())
            .filter_map(|rec| rec.hit.map(|h| (rec.id, h.primary)))
            .collect();
        hits.sort_by_key(|&(id, seg)| (seg.chrom, seg.start, id));
        hits
    }

    pub fn descriptor(&self, id: ReadId) -> String {
        String::from_utf8_lossy(self.store.bytes(self.store.get(id).desc)).into_owned()
    }
}

/// Align every read in `reads_path` against the index.
pub fn align_reads(
    index: &SuffixIndex,
    reads_path: &Path,
    opt: &AlignOpt,
) -> Result<AlignmentResults, AlignError> {
    let n_workers = opt.effective_threads();
    let wall_start = realtime();
    let cpu_start = cputime();

    let mut store = ReadStore::new();
    let session = AlignmentSession::new(n_workers);

    log::info!(
        "Aligning {} with {} worker threads ({:?} sensitivity)",
        reads_path.display(),
        n_workers,
        opt.sensitivity
    );

    let reports: Vec<WorkerReport> = thread::scope(|scope| {
        let store_ref = &store;
        let session_ref = &session;

        let loader_handle = scope.spawn(move || {
            loader::run(store_ref, session_ref, reads_path, opt.interleaved);
        });

        let worker_handles: Vec<_> = (0..n_workers)
            .map(|w| scope.spawn(move || worker_loop(w, store_ref, index, opt, session_ref)))
            .collect();

        // Join loop: periodic re-poll is for progress reporting only.
        let mut last_logged = 0usize;
        let mut polls = 0u64;
        loop {
            let running = worker_handles.iter().any(|h| !h.is_finished())
                || !loader_handle.is_finished();
            if !running {
                break;
            }
            thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
            polls += 1;
            if polls % 20 == 0 {
                let (loaded, processed, loader_done) = session.snapshot();
                if processed > last_logged {
                    log::info!(
                        "Progress: {}/{} reads aligned{}",
                        processed,
                        loaded,
                        if loader_done { "" } else { " (loading)" }
                    );
                    last_logged = processed;
                }
            }
        }

        if loader_handle.join().is_err() {
            session.set_fatal(AlignError::Resource("loader thread panicked".into()));
        }
        worker_handles
            .into_iter()
            .map(|h| {
                h.join().unwrap_or_else(|_| {
                    session.set_fatal(AlignError::Resource("worker thread panicked".into()));
                    WorkerReport::default()
                })
            })
            .collect()
    });

    if let Some(fatal) = session.fatal() {
        return Err(fatal);
    }

    let mut stats = RunStats {
        total_reads: store.len(),
        nar_counts: session.nar_counts(),
        seed_lookups: session.seed_lookups(),
        worker_ranges: reports.into_iter().map(|r| r.batches).collect(),
        resolve: None,
        wall_time_secs: 0.0,
        cpu_time_secs: 0.0,
    };

    let mut multi_hits = session.take_multi_hits();
    if opt.resolve != ResolvePolicy::Off && !multi_hits.is_empty() {
        let resolve_stats = resolver::resolve(&mut store, &mut multi_hits, opt.resolve);
        stats.resolve = Some(resolve_stats);
        // Resolution rewrites NAR codes; recount from the records.
        let mut counts = [0u64; Nar::COUNT];
        for rec in store.iter() {
            counts[rec.nar.index()] += 1;
        }
        stats.nar_counts = counts;
    }

    stats.wall_time_secs = realtime() - wall_start;
    stats.cpu_time_secs = cputime() - cpu_start;
    log::info!("Alignment complete: {}", stats);
    for nar in [
        Nar::Accepted,
        Nar::ClusteredUnique,
        Nar::ClusteredMulti,
        Nar::MmDelta,
        Nar::MultiAlign,
        Nar::NoHit,
        Nar::Ns,
        Nar::Trim,
    ] {
        let n = stats.nar_counts[nar.index()];
        if n > 0 {
            log::info!("  {}: {}", nar.as_str(), n);
        }
    }

    Ok(AlignmentResults {
        store,
        stats,
        multi_hits,
    })
}
