#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **sievegate-stream-memory** – In-memory stream and sink drivers.
//!
//! This crate provides fast, non-persistent implementations of every
//! stream-core capability, suitable for tests, development, and single
//! process deployments. All data is lost when the process terminates.
//!
//! The [`MemoryLog`] models a partitioned, offset-addressable log with
//! per-group committed offsets; [`MemoryQuarantineIndex`] and
//! [`MemoryBlobStore`] model the quarantine sinks. The [`faults`] module
//! wraps drivers with injectable failures for exercising retry paths.

mod log;
mod sinks;

pub mod faults;

pub use log::{MemoryConsumer, MemoryLog, MemoryProducer};
pub use sinks::{MemoryBlobStore, MemoryQuarantineIndex};
