//! Address resolution for OfficeFinder.
//!
//! This crate ties the research collaborators and the ledger together:
//! - [`classify`]: rate limit versus transient failures
//! - [`pacer`]: fixed delay between records
//! - [`pipeline`]: the per-company state machine
//! - [`batch`]: resume, resolve in order, persist once

pub mod batch;
pub mod classify;
pub mod pacer;
pub mod pipeline;

#[cfg(test)]
mod testing;

pub use batch::{BatchProgress, BatchSummary, SilentProgress, run_batch};
pub use classify::{Failure, classify};
pub use pacer::Pacer;
pub use pipeline::{AddressPipeline, PipelineConfig, PipelineState, StageOutcome};
