//! Read-only reference index: sequence store plus suffix array.
//!
//! `RefSeq` holds the 2-bit packed reference with chromosome annotations and
//! ambiguous-base regions. `SuffixIndex` adds the suffix array and the exact
//! seed lookup used by the matcher. Both are built once, persisted in the
//! crate's own binary layout, and shared read-only across the worker pool.

pub mod reference;
pub mod suffix_array;

pub use reference::{ChromId, RefSeq};
pub use suffix_array::SuffixIndex;
