//! Read records, the append-only read arena, and the FASTQ loader task.

pub mod loader;
pub mod record;
pub mod store;

pub use record::{
    ClusterScore, Gap, GapKind, HitLoci, MultiHitRecord, Nar, ReadId, ReadRecord, ScoreClass,
    Segment, Strand,
};
pub use store::ReadStore;
