// Append-only read arena.
//
// Records and packed sequence bytes live in chunked backing stores whose
// chunks never move or shrink once allocated, so indices and SeqHandles stay
// valid across growth. Growth takes the chunk-table write lock; every other
// access takes it shared, briefly, to copy a chunk pointer.
//
// Mutation windows, in order, never overlapping:
//   1. the loader writes a record before publishing it via `len`;
//   2. one worker per batch range (ranges carved disjoint by the session
//      cursor) rewrites outcome fields of published records;
//   3. the resolver, behind `&mut self`, rewrites multi-hit reads.
// Readers only touch published records outside windows 1 and 2's ranges.

use std::cell::UnsafeCell;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use super::record::{ReadId, ReadRecord, SeqHandle};
use crate::defaults::{ARENA_BASE_CHUNK, SEQ_ARENA_BASE_CHUNK};

struct RecordChunk {
    slots: Box<[UnsafeCell<ReadRecord>]>,
}

// SAFETY: slot access is serialised by the mutation-window discipline above.
unsafe impl Sync for RecordChunk {}

struct SeqChunk {
    buf: UnsafeCell<Box<[u8]>>,
}

// SAFETY: a chunk's bytes are written once by the loader before the owning
// record is published and are immutable afterwards.
unsafe impl Sync for SeqChunk {}

impl SeqChunk {
    fn with_capacity(cap: usize) -> SeqChunk {
        SeqChunk {
            buf: UnsafeCell::new(vec![0u8; cap].into_boxed_slice()),
        }
    }

    fn capacity(&self) -> usize {
        // SAFETY: the box itself (pointer and length) is never replaced.
        unsafe { (&(*self.buf.get())).len() }
    }
}

pub struct ReadStore {
    record_chunks: RwLock<Vec<Box<RecordChunk>>>,
    seq_chunks: RwLock<Vec<Box<SeqChunk>>>,
    /// Published record count; release-stored after records are fully
    /// written, acquire-loaded by readers.
    len: AtomicUsize,
    appender_taken: AtomicBool,
}

/// Chunk index and slot for a record id under geometric growth: chunk `k`
/// holds `ARENA_BASE_CHUNK << k` slots.
#[inline]
fn chunk_pos(id: usize) -> (usize, usize) {
    let k = ((id / ARENA_BASE_CHUNK) + 1).ilog2() as usize;
    let before = ARENA_BASE_CHUNK * ((1usize << k) - 1);
    (k, id - before)
}

impl ReadStore {
    pub fn new() -> ReadStore {
        ReadStore {
            record_chunks: RwLock::new(Vec::new()),
            seq_chunks: RwLock::new(Vec::new()),
            len: AtomicUsize::new(0),
            appender_taken: AtomicBool::new(false),
        }
    }

    /// Published record count.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The single writer handle. Panics if taken twice; the loader task is
    /// the only producer.
    pub fn appender(&self) -> Appender<'_> {
        assert!(
            !self.appender_taken.swap(true, Ordering::SeqCst),
            "ReadStore appender already taken"
        );
        Appender {
            store: self,
            staged: 0,
            seq_tail_used: 0,
        }
    }

    fn record_ptr(&self, id: usize) -> *mut ReadRecord {
        let (k, slot) = chunk_pos(id);
        let guard = self.record_chunks.read().unwrap();
        let chunk: *const RecordChunk = &*guard[k];
        drop(guard);
        // SAFETY: chunks are heap allocations that never move or drop while
        // `self` lives; the table lock only protects the pointer vector.
        unsafe { (*chunk).slots[slot].get() }
    }

    /// Shared view of a published record.
    pub fn get(&self, id: ReadId) -> &ReadRecord {
        let id = id as usize;
        assert!(id < self.len(), "read {} not published", id);
        // SAFETY: published records are only mutated inside exclusive
        // windows; see the module contract.
        unsafe { &*self.record_ptr(id) }
    }

    /// Exclusive view of a published record.
    ///
    /// # Safety
    /// The caller must own `id` exclusively: either it lies in a batch range
    /// carved for this caller by the session cursor, or all concurrent
    /// access has already been joined.
    pub unsafe fn record_mut_unchecked(&self, id: ReadId) -> &mut ReadRecord {
        let id = id as usize;
        debug_assert!(id < self.len());
        &mut *self.record_ptr(id)
    }

    /// Exclusive view through `&mut self`; used by the resolver after the
    /// worker pool has been joined.
    pub fn record_mut(&mut self, id: ReadId) -> &mut ReadRecord {
        // SAFETY: `&mut self` rules out any other accessor.
        unsafe { self.record_mut_unchecked(id) }
    }

    /// Bytes behind a handle of a published record.
    pub fn bytes(&self, h: SeqHandle) -> &[u8] {
        let guard = self.seq_chunks.read().unwrap();
        let chunk: *const SeqChunk = &*guard[h.chunk as usize];
        drop(guard);
        // SAFETY: chunk storage is stable and the handle's bytes were fully
        // written before the owning record was published.
        unsafe {
            let base = (*(*chunk).buf.get()).as_ptr();
            std::slice::from_raw_parts(base.add(h.offset as usize), h.len as usize)
        }
    }

    /// Iterate published records in load order.
    pub fn iter(&self) -> impl Iterator<Item = &ReadRecord> + '_ {
        (0..self.len()).map(move |id| self.get(id as ReadId))
    }

    /// Iterate a batch range exclusively.
    ///
    /// # Safety
    /// Same contract as [`record_mut_unchecked`](Self::record_mut_unchecked)
    /// for every id in `range`; ranges handed to different workers must be
    /// pairwise disjoint.
    pub unsafe fn batch_iter_mut(
        &self,
        range: Range<usize>,
    ) -> impl Iterator<Item = &mut ReadRecord> + '_ {
        debug_assert!(range.end <= self.len());
        // SAFETY: distinct ids map to distinct slots, and the caller's
        // contract rules out any other accessor for this range.
        range.map(move |id| unsafe { &mut *self.record_ptr(id) })
    }
}

impl Default for ReadStore {
    fn default() -> Self {
        ReadStore::new()
    }
}

/// Single-producer writer over a [`ReadStore`].
pub struct Appender<'a> {
    store: &'a ReadStore,
    /// Records written but not yet published.
    staged: usize,
    /// Used bytes of the tail sequence chunk.
    seq_tail_used: usize,
}

impl<'a> Appender<'a> {
    /// Append one record; returns its id. Not visible to readers until
    /// [`publish`](Self::publish).
    pub fn append(
        &mut self,
        packed_seq: &[u8],
        desc: &[u8],
        mate: Option<(ReadId, bool)>,
    ) -> ReadId {
        let id = self.store.len.load(Ordering::Relaxed) + self.staged;
        let seq = self.write_bytes(packed_seq);
        let desc = self.write_bytes(desc);

        let record = ReadRecord {
            id: id as ReadId,
            mate,
            seq,
            desc,
            ..ReadRecord::default()
        };
        self.write_record(id, record);
        self.staged += 1;
        id as ReadId
    }

    /// Make every staged record visible; returns the published total.
    pub fn publish(&mut self) -> usize {
        let staged = std::mem::take(&mut self.staged);
        self.store.len.fetch_add(staged, Ordering::Release) + staged
    }

    fn write_record(&mut self, id: usize, record: ReadRecord) {
        let (k, slot) = chunk_pos(id);
        {
            let chunks = self.store.record_chunks.read().unwrap();
            if k < chunks.len() {
                // SAFETY: slot `id` is unpublished, so this writer is its
                // only accessor.
                unsafe { *chunks[k].slots[slot].get() = record };
                return;
            }
        }
        let mut chunks = self.store.record_chunks.write().unwrap();
        while chunks.len() <= k {
            let cap = ARENA_BASE_CHUNK << chunks.len();
            let slots: Box<[UnsafeCell<ReadRecord>]> = (0..cap)
                .map(|_| UnsafeCell::new(ReadRecord::default()))
                .collect();
            chunks.push(Box::new(RecordChunk { slots }));
        }
        unsafe { *chunks[k].slots[slot].get() = record };
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> SeqHandle {
        let needed = bytes.len();
        let mut chunk_idx = {
            let chunks = self.store.seq_chunks.read().unwrap();
            match chunks.last() {
                Some(tail) if self.seq_tail_used + needed <= tail.capacity() => {
                    Some(chunks.len() - 1)
                }
                _ => None,
            }
        };

        if chunk_idx.is_none() {
            let mut chunks = self.store.seq_chunks.write().unwrap();
            let cap = (SEQ_ARENA_BASE_CHUNK << chunks.len().min(8)).max(needed);
            chunks.push(Box::new(SeqChunk::with_capacity(cap)));
            self.seq_tail_used = 0;
            chunk_idx = Some(chunks.len() - 1);
        }
        let chunk_idx = chunk_idx.unwrap();

        let offset = self.seq_tail_used;
        {
            let chunks = self.store.seq_chunks.read().unwrap();
            let chunk: *const SeqChunk = &*chunks[chunk_idx];
            drop(chunks);
            // SAFETY: [offset, offset+needed) of the tail chunk is unwritten
            // and unpublished; this writer is the only producer.
            unsafe {
                let base = (*(*chunk).buf.get()).as_mut_ptr();
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), base.add(offset), needed);
            }
        }
        self.seq_tail_used += needed;

        SeqHandle {
            chunk: chunk_idx as u32,
            offset: offset as u32,
            len: needed as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reads::record::{base_code, pack_base, Nar};

    #[test]
    fn test_chunk_pos_geometric() {
        assert_eq!(chunk_pos(0), (0, 0));
        assert_eq!(chunk_pos(ARENA_BASE_CHUNK - 1), (0, ARENA_BASE_CHUNK - 1));
        assert_eq!(chunk_pos(ARENA_BASE_CHUNK), (1, 0));
        assert_eq!(chunk_pos(3 * ARENA_BASE_CHUNK - 1), (1, 2 * ARENA_BASE_CHUNK - 1));
        assert_eq!(chunk_pos(3 * ARENA_BASE_CHUNK), (2, 0));
    }

    #[test]
    fn test_append_publish_read_back() {
        let store = ReadStore::new();
        let mut appender = store.appender();

        let packed: Vec<u8> = [0u8, 1, 2, 3].iter().map(|&c| pack_base(c, 30)).collect();
        let id = appender.append(&packed, b"read-0", None);
        assert_eq!(store.len(), 0); // not yet published
        appender.publish();
        assert_eq!(store.len(), 1);

        let rec = store.get(id);
        assert_eq!(rec.id, 0);
        assert_eq!(rec.nar, Nar::Unprocessed);
        let decoded: Vec<u8> = store.bytes(rec.seq).iter().map(|&b| base_code(b)).collect();
        assert_eq!(decoded, vec![0, 1, 2, 3]);
        assert_eq!(store.bytes(rec.desc), b"read-0");
    }

    #[test]
    fn test_handles_stable_across_growth() {
        let store = ReadStore::new();
        let mut appender = store.appender();
        let first = appender.append(&[pack_base(2, 20)], b"first", None);
        appender.publish();
        let first_bytes = store.bytes(store.get(first).seq).as_ptr();

        // force several record chunks and at least one new seq chunk
        let blob = vec![pack_base(1, 10); 4096];
        for i in 0..(4 * ARENA_BASE_CHUNK) {
            appender.append(&blob, format!("r{}", i).as_bytes(), None);
        }
        let total = appender.publish();
        assert_eq!(store.len(), total);

        // the first record's bytes did not move
        assert_eq!(store.bytes(store.get(first).seq).as_ptr(), first_bytes);
        assert_eq!(store.get(first).id, 0);
        assert_eq!(store.bytes(store.get(1).seq).len(), 4096);
    }

    #[test]
    fn test_batch_iter_mut_disjoint_ranges() {
        let store = ReadStore::new();
        let mut appender = store.appender();
        for i in 0..100u32 {
            appender.append(&[pack_base(0, 1)], format!("r{}", i).as_bytes(), None);
        }
        appender.publish();

        // SAFETY: the two ranges are disjoint and nothing else is running.
        unsafe {
            for rec in store.batch_iter_mut(0..50) {
                rec.nar = Nar::NoHit;
            }
            for rec in store.batch_iter_mut(50..100) {
                rec.nar = Nar::Accepted;
            }
        }
        assert_eq!(store.get(0).nar, Nar::NoHit);
        assert_eq!(store.get(99).nar, Nar::Accepted);
    }

    #[test]
    #[should_panic(expected = "appender already taken")]
    fn test_single_appender() {
        let store = ReadStore::new();
        let _a = store.appender();
        let _b = store.appender();
    }

    #[test]
    fn test_mate_links() {
        let store = ReadStore::new();
        let mut appender = store.appender();
        let a = appender.append(&[pack_base(0, 1)], b"p/1", Some((1, false)));
        let b = appender.append(&[pack_base(1, 1)], b"p/2", Some((0, true)));
        appender.publish();
        assert_eq!(store.get(a).mate, Some((b, false)));
        assert_eq!(store.get(b).mate, Some((a, true)));
    }
}
