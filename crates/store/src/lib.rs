//! Per-item record persistence.
//!
//! One small blob per key, published atomically: a reader sees either the
//! previous record or the complete new one, never a torn write. The
//! [`RecordStore`] trait is the only thing the batch engine depends on, so the
//! directory-of-files layout can be swapped for something else without
//! touching the scheduler.

pub mod backend;
pub mod error;
mod key;

pub use crate::backend::RecordStore;
pub use crate::key::validate as validate_key;
use std::sync::Arc;

pub type StoreHandle = Arc<dyn RecordStore + Send + Sync>;
