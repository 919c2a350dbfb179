//! Entity kinds, identities, sources, and payloads for wsmodel.
//!
//! This crate provides:
//! - [`EntityId`] and [`EntityKind`] - Dense generational identifiers per entity kind
//! - [`SymbolicId`] - Logical keys that survive storage versions
//! - [`EntitySource`] - Provenance tags driving reconciliation and caching
//! - [`EntityData`] - The closed set of entity payloads, with typed access via [`Entity`]
//! - [`Error`] - Rich error types with context

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod data;
pub mod entity;
pub mod error;
pub mod source;
pub mod symbolic;

pub use data::{
    ContentRootData, DependencyScope, Entity, EntityData, FacetData, InclusionOptions,
    LibraryData, LibraryRoot, LibraryRootType, ModuleData, ModuleDependency, ModuleOptionsData,
    SourceRootData, SourceRootType,
};
pub use entity::{EntityId, EntityKind};
pub use error::{Error, ErrorContext, ErrorKind, Result};
pub use source::EntitySource;
pub use symbolic::{FacetId, LibraryId, LibraryTableId, ModuleId, SymbolicId};
