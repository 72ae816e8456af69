pub mod defaults;
pub mod error;
pub mod index; // Suffix-array index over the reference (build, load, exact seed lookup)
pub mod io; // Report output
pub mod matcher; // Seed-and-extend approximate matching
pub mod opts;
pub mod pipeline; // Loader / worker-pool orchestration
pub mod reads; // Read arena, records, FASTQ loader
pub mod resolver; // Multi-locus resolution by proximity clustering
pub mod utils;

pub use error::AlignError;
pub use opts::AlignOpt;
