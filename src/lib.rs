//! wsmodel - Versioned workspace model for project structure
//!
//! This crate re-exports all layers of the wsmodel system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: wsmodel_runtime    — Snapshot cache, URL relativization, inspection CLI
//! Layer 2: wsmodel_engine     — Versioned model, commits, orphanage, change bus, flows
//! Layer 1: wsmodel_storage    — Immutable storage, builders, diffs, replace-by-source
//! Layer 0: wsmodel_foundation — Entity kinds, ids, sources, payloads, errors
//! ```

pub use wsmodel_engine as engine;
pub use wsmodel_foundation as foundation;
pub use wsmodel_runtime as runtime;
pub use wsmodel_storage as storage;
