//! Loader / worker-pool pipeline.
//!
//! One background loader streams reads into the shared arena while a fixed
//! pool of worker threads pulls batches and runs the matcher. All shared
//! mutable state lives in [`session::AlignmentSession`]; the orchestrator
//! wires the phases together and surfaces the first fatal error.

pub mod orchestrator;
pub mod session;
pub mod worker;

pub use orchestrator::{align_reads, AlignmentResults, RunStats};
pub use session::AlignmentSession;
