//! Persistent dedup state: which files from a card have already been handled.

pub mod error;
mod models;
mod store;

pub use crate::models::{FORMAT_VERSION, ProcessedRecord};
pub use crate::store::{Origin, StateStore, Stats};
