//! Symbolic identities: logical keys that stay stable across storage versions.
//!
//! A [`SymbolicId`] is unique per entity kind within one snapshot. Soft references
//! embed symbolic ids and are resolved lazily, so they may dangle.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::entity::EntityKind;

/// Identity of a module: its name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModuleId {
    name: String,
}

impl ModuleId {
    /// Creates a module id.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The table a library is registered in.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LibraryTableId {
    /// Project-level library table.
    Project,
    /// Application-wide (global) library table.
    Application,
    /// Module-level library table; a soft reference to the owning module.
    Module(ModuleId),
}

impl LibraryTableId {
    /// Returns the owning module for module-level tables.
    #[must_use]
    pub fn module(&self) -> Option<&ModuleId> {
        match self {
            LibraryTableId::Module(module) => Some(module),
            _ => None,
        }
    }
}

impl fmt::Display for LibraryTableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryTableId::Project => f.write_str("project"),
            LibraryTableId::Application => f.write_str("application"),
            LibraryTableId::Module(module) => write!(f, "module:{module}"),
        }
    }
}

/// Identity of a library: its name within a table.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LibraryId {
    /// Library name, unique within its table.
    pub name: String,
    /// The owning table.
    pub table: LibraryTableId,
}

impl LibraryId {
    /// Creates a library id.
    #[must_use]
    pub fn new(name: impl Into<String>, table: LibraryTableId) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }

    /// Creates a project-level library id.
    #[must_use]
    pub fn project(name: impl Into<String>) -> Self {
        Self::new(name, LibraryTableId::Project)
    }
}

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.table)
    }
}

/// Identity of a facet: module, facet type, and name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FacetId {
    /// The module the facet belongs to.
    pub module: ModuleId,
    /// Facet type identifier.
    pub facet_type: String,
    /// Facet name.
    pub name: String,
}

impl fmt::Display for FacetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.module, self.facet_type, self.name)
    }
}

/// A logical key for a keyed entity kind.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SymbolicId {
    /// A module.
    Module(ModuleId),
    /// A library.
    Library(LibraryId),
    /// A facet.
    Facet(FacetId),
}

impl SymbolicId {
    /// Returns the entity kind this id identifies.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            SymbolicId::Module(_) => EntityKind::Module,
            SymbolicId::Library(_) => EntityKind::Library,
            SymbolicId::Facet(_) => EntityKind::Facet,
        }
    }

    /// Returns the human-readable name of the identified entity.
    #[must_use]
    pub fn presentable_name(&self) -> &str {
        match self {
            SymbolicId::Module(id) => id.name(),
            SymbolicId::Library(id) => &id.name,
            SymbolicId::Facet(id) => &id.name,
        }
    }
}

impl From<ModuleId> for SymbolicId {
    fn from(id: ModuleId) -> Self {
        SymbolicId::Module(id)
    }
}

impl From<LibraryId> for SymbolicId {
    fn from(id: LibraryId) -> Self {
        SymbolicId::Library(id)
    }
}

impl From<FacetId> for SymbolicId {
    fn from(id: FacetId) -> Self {
        SymbolicId::Facet(id)
    }
}

impl fmt::Display for SymbolicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolicId::Module(id) => write!(f, "ModuleId({id})"),
            SymbolicId::Library(id) => write!(f, "LibraryId({id})"),
            SymbolicId::Facet(id) => write!(f, "FacetId({id})"),
        }
    }
}
