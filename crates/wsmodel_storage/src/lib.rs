//! Immutable entity storage, copy-on-write builders, and diffing for wsmodel.
//!
//! This crate provides:
//! - [`Storage`] - Immutable snapshots with symbolic, source, and referrer indexes
//! - [`Builder`] - Copy-on-write mutation with a compacting change log
//! - [`ChangeSet`] - Structural diffs via [`collect_changes`], replayable onto a base
//! - [`Builder::replace_by_source`] - Source-scoped reconciliation
//! - [`ExternalMappingKey`] - Typed side tables attached to entities
//! - [`schema`] - The hard containment schema

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod builder;
pub mod changelog;
pub mod consistency;
pub mod diff;
pub mod indexes;
pub mod mapping;
pub mod record;
pub mod replace;
pub mod schema;
pub mod storage;
pub mod table;

pub use builder::Builder;
pub use changelog::{ChangeEntry, ChangeLog};
pub use diff::{ChangeSet, ChangeSummary, EntityChange, collect_changes, format_changes};
pub use indexes::StorageIndexes;
pub use mapping::{ExternalMappingKey, ExternalMappings};
pub use record::{EntityRecord, EntityRef};
pub use replace::ReplaceReport;
pub use schema::{Cardinality, ConnectionSchema, OnViolation};
pub use storage::Storage;
pub use table::EntityTable;
