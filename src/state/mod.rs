//! Durable progress tracking.
//!
//! The progress record maps each catalog identifier to the file names that
//! have been fetched *and* transformed. It is the only authority on what is
//! already done: local files are never consulted. The pipeline saves it
//! after every completed file, so a crash loses at most the file in flight.

pub mod error;
pub mod store;
pub mod types;

pub use store::{JsonProgressStore, ProgressStore};
pub use types::ProgressRecord;
