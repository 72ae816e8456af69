// Default parameter values and fixed empirical constants.
//
// The clustering constants have no analytical derivation; they are tuned
// values carried as named configuration rather than re-derived.

/// Shortest core window the seed search will query.
pub const MIN_CORE_LEN: usize = 8;

/// Longest read length the matcher will process; longer reads are trimmed
/// from the right before alignment.
pub const MAX_READ_LEN: usize = 512;

/// Substitution budget as a percentage of read length.
pub const DEFAULT_MAX_SUBS_PCT: u32 = 10;

/// Required mismatch-count gap between best and second-best candidate.
pub const DEFAULT_MIN_EDIT_DIST: u16 = 1;

/// Most candidate loci retained for an ambiguous read.
pub const DEFAULT_MAX_MULTI_HITS: usize = 10;

/// Most indeterminate (N) bases tolerated before a read is rejected outright.
pub const DEFAULT_MAX_NS: usize = 4;

/// Longest read-gap or reference-gap searched during indel splitting.
pub const DEFAULT_MAX_INDEL_LEN: u64 = 8;

/// Longest reference-gap searched during splice splitting.
pub const DEFAULT_MAX_SPLICE_LEN: u64 = 20_000;

/// Mismatch-equivalent charge for opening a gap; a split alignment must beat
/// the ungapped tally by at least this much to be preferred.
pub const GAP_OPEN_MISMATCH_COST: u16 = 2;

// Worker-pool sizing. Batches shrink as the queue drains so every thread
// stays busy until the end of the phase.
pub const HARD_THREAD_CAP: usize = 64;
pub const MIN_BATCH_READS: usize = 64;
pub const MAX_BATCH_READS: usize = 4096;

/// Reads appended to the store per loader publish.
pub const LOADER_CHUNK_READS: usize = 4096;

/// First record-arena chunk; subsequent chunks double (geometric growth).
pub const ARENA_BASE_CHUNK: usize = 1024;

/// First byte-arena chunk for packed sequence data.
pub const SEQ_ARENA_BASE_CHUNK: usize = 1 << 20;

// Multi-locus clustering constants.
pub const CLUSTER_WINDOW: u64 = 1024;
pub const CLUSTER_UNIQUE_WEIGHT: u16 = 4;
pub const CLUSTER_MULTI_WEIGHT: u16 = 1;
pub const CLUSTER_UNIQUE_CAP: u16 = 4096;
pub const CLUSTER_MULTI_CAP: u16 = 1024;
pub const CLUSTER_MIN_SCORE: u16 = 8;

/// Bounded wait used at the batch-acquisition condvar and the join loop's
/// diagnostic re-poll.
pub const POLL_INTERVAL_MS: u64 = 100;

/// Seed for the deterministic fill of ambiguous reference bases.
pub const AMBIGUOUS_FILL_SEED: u64 = 11;
