//! Content-addressed skill storage, append-only run logs, server
//! registry, and the TTL/mtime skill cache (spec §4.C, §4.D).
//!
//! Every other SkillFlow crate builds on the types in [`model`] and the
//! I/O in [`store::Storage`]; this crate has no knowledge of transports,
//! execution, or recording.

pub mod atomic;
pub mod cache;
pub mod error;
pub mod index;
pub mod model;
pub mod paths;
pub mod registry;
pub mod runlog;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use store::Storage;
