//! One run of the offload pipeline: reconcile the card against the remembered
//! state, convert new RAW files on a bounded worker pool, upload the results
//! in batches, and record what was done.
//!
//! The primary entry point is [`Pipeline::run`]. The pieces it is built from
//! ([`reconcile`], [`WorkerPool`], [`Batch`]) are public for callers that
//! want to drive them directly.

mod batch;
pub mod error;
mod pool;
mod reconcile;
mod run;

pub use crate::batch::{Batch, BatchReport, CleanupReport, JPG_ONLY_PROFILE, TAG_CAMERA_ORIGINAL, TAG_PROCESSED, remove_files};
pub use crate::pool::{ConversionJob, ConversionOutcome, DEFAULT_MAX_WORKERS, PoolEvent, WorkerPool, worker_count};
pub use crate::reconcile::{Reconciliation, reconcile};
pub use crate::run::{Pipeline, Summary, Toolbox};
