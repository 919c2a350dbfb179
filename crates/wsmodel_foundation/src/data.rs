//! Entity payloads.
//!
//! Every entity kind has one payload struct. [`EntityData`] is the closed union of
//! them, and the [`Entity`] trait gives typed access to a payload stored as
//! `EntityData`.

use std::collections::BTreeSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::entity::EntityKind;
use crate::symbolic::{FacetId, LibraryId, LibraryTableId, ModuleId, SymbolicId};

// =============================================================================
// Module
// =============================================================================

/// Scope of a module dependency.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DependencyScope {
    /// Available at compile time and runtime.
    #[default]
    Compile,
    /// Available to tests only.
    Test,
    /// Available at runtime only.
    Runtime,
    /// Provided by the environment.
    Provided,
}

/// One entry of a module's ordered dependency list.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ModuleDependency {
    /// Dependency on another module (soft reference).
    Module {
        /// Target module.
        module: ModuleId,
        /// Dependency scope.
        scope: DependencyScope,
        /// Whether dependents of this module see the target too.
        exported: bool,
    },
    /// Dependency on a library (soft reference).
    Library {
        /// Target library.
        library: LibraryId,
        /// Dependency scope.
        scope: DependencyScope,
        /// Whether dependents of this module see the target too.
        exported: bool,
    },
    /// The module's own sources.
    ModuleSource,
    /// The SDK inherited from the project.
    InheritedSdk,
}

impl ModuleDependency {
    /// Compile-scoped, non-exported dependency on a module.
    #[must_use]
    pub fn module(module: ModuleId) -> Self {
        ModuleDependency::Module {
            module,
            scope: DependencyScope::Compile,
            exported: false,
        }
    }

    /// Compile-scoped, non-exported dependency on a library.
    #[must_use]
    pub fn library(library: LibraryId) -> Self {
        ModuleDependency::Library {
            library,
            scope: DependencyScope::Compile,
            exported: false,
        }
    }

    /// Returns the soft reference held by this entry, if any.
    #[must_use]
    pub fn target(&self) -> Option<SymbolicId> {
        match self {
            ModuleDependency::Module { module, .. } => Some(SymbolicId::Module(module.clone())),
            ModuleDependency::Library { library, .. } => {
                Some(SymbolicId::Library(library.clone()))
            }
            ModuleDependency::ModuleSource | ModuleDependency::InheritedSdk => None,
        }
    }
}

/// A project module.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModuleData {
    /// Module name; the module's symbolic id.
    pub name: String,
    /// Optional module type tag.
    pub module_type: Option<String>,
    /// Ordered dependency list.
    pub dependencies: Vec<ModuleDependency>,
}

impl ModuleData {
    /// Creates a module with no type and no dependencies.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module_type: None,
            dependencies: Vec::new(),
        }
    }

    /// Sets the module type.
    #[must_use]
    pub fn with_type(mut self, module_type: impl Into<String>) -> Self {
        self.module_type = Some(module_type.into());
        self
    }

    /// Appends a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dependency: ModuleDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Returns this module's id.
    #[must_use]
    pub fn module_id(&self) -> ModuleId {
        ModuleId::new(self.name.clone())
    }
}

/// Compiler output options of a module. At most one per module.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModuleOptionsData {
    /// Production output directory.
    pub output_url: Option<String>,
    /// Test output directory.
    pub test_output_url: Option<String>,
    /// Whether output paths are inherited from the project.
    pub inherit_output: bool,
}

impl ModuleOptionsData {
    /// Sets the production output directory.
    #[must_use]
    pub fn with_output_url(mut self, url: impl Into<String>) -> Self {
        self.output_url = Some(url.into());
        self
    }

    /// Sets the test output directory.
    #[must_use]
    pub fn with_test_output_url(mut self, url: impl Into<String>) -> Self {
        self.test_output_url = Some(url.into());
        self
    }
}

// =============================================================================
// Roots
// =============================================================================

/// A content root of a module.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContentRootData {
    /// Root URL.
    pub url: String,
    /// Excluded URLs, in order.
    pub excluded_urls: Vec<String>,
    /// Exclusion glob patterns.
    pub exclude_patterns: BTreeSet<String>,
}

impl ContentRootData {
    /// Creates a content root without exclusions.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            excluded_urls: Vec::new(),
            exclude_patterns: BTreeSet::new(),
        }
    }

    /// Appends an excluded URL.
    #[must_use]
    pub fn with_excluded_url(mut self, url: impl Into<String>) -> Self {
        self.excluded_urls.push(url.into());
        self
    }

    /// Adds an exclusion pattern.
    #[must_use]
    pub fn with_exclude_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.insert(pattern.into());
        self
    }
}

/// Type of a source root.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SourceRootType {
    /// Production sources.
    #[default]
    Source,
    /// Test sources.
    TestSource,
    /// Production resources.
    Resource,
    /// Test resources.
    TestResource,
}

/// A source root inside a content root.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SourceRootData {
    /// Root URL.
    pub url: String,
    /// Root type.
    pub root_type: SourceRootType,
}

impl SourceRootData {
    /// Creates a source root.
    #[must_use]
    pub fn new(url: impl Into<String>, root_type: SourceRootType) -> Self {
        Self {
            url: url.into(),
            root_type,
        }
    }
}

// =============================================================================
// Libraries
// =============================================================================

/// Kind of files a library root provides.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LibraryRootType {
    /// Compiled classes.
    #[default]
    Compiled,
    /// Sources.
    Sources,
    /// Documentation.
    Documentation,
}

/// How archives under a library root are included.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InclusionOptions {
    /// Only the root itself.
    #[default]
    RootItself,
    /// Archives directly under the root.
    ArchivesUnderRoot,
    /// Archives anywhere under the root.
    ArchivesUnderRootRecursively,
}

/// One root of a library.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LibraryRoot {
    /// Root URL.
    pub url: String,
    /// Root type.
    pub root_type: LibraryRootType,
    /// Archive inclusion.
    pub inclusion: InclusionOptions,
}

impl LibraryRoot {
    /// Creates a root that includes only itself.
    #[must_use]
    pub fn new(url: impl Into<String>, root_type: LibraryRootType) -> Self {
        Self {
            url: url.into(),
            root_type,
            inclusion: InclusionOptions::RootItself,
        }
    }
}

/// A library.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LibraryData {
    /// Library name.
    pub name: String,
    /// Owning table.
    pub table: LibraryTableId,
    /// Ordered roots.
    pub roots: Vec<LibraryRoot>,
}

impl LibraryData {
    /// Creates a library without roots.
    #[must_use]
    pub fn new(name: impl Into<String>, table: LibraryTableId) -> Self {
        Self {
            name: name.into(),
            table,
            roots: Vec::new(),
        }
    }

    /// Appends a root.
    #[must_use]
    pub fn with_root(mut self, root: LibraryRoot) -> Self {
        self.roots.push(root);
        self
    }

    /// Returns this library's id.
    #[must_use]
    pub fn library_id(&self) -> LibraryId {
        LibraryId::new(self.name.clone(), self.table.clone())
    }
}

// =============================================================================
// Facets
// =============================================================================

/// A facet attached to a module.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FacetData {
    /// Owning module; must match the facet's hard parent.
    pub module: ModuleId,
    /// Facet type identifier.
    pub facet_type: String,
    /// Facet name.
    pub name: String,
    /// Opaque serialized configuration.
    pub configuration: Option<String>,
}

impl FacetData {
    /// Creates a facet without configuration.
    #[must_use]
    pub fn new(module: ModuleId, facet_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module,
            facet_type: facet_type.into(),
            name: name.into(),
            configuration: None,
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_configuration(mut self, configuration: impl Into<String>) -> Self {
        self.configuration = Some(configuration.into());
        self
    }

    /// Returns this facet's id.
    #[must_use]
    pub fn facet_id(&self) -> FacetId {
        FacetId {
            module: self.module.clone(),
            facet_type: self.facet_type.clone(),
            name: self.name.clone(),
        }
    }
}

// =============================================================================
// EntityData
// =============================================================================

/// The payload of any entity.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EntityData {
    /// A module.
    Module(ModuleData),
    /// Module options.
    ModuleOptions(ModuleOptionsData),
    /// A content root.
    ContentRoot(ContentRootData),
    /// A source root.
    SourceRoot(SourceRootData),
    /// A library.
    Library(LibraryData),
    /// A facet.
    Facet(FacetData),
}

/// Pairing key shared by every module options record; a module has at most one.
const MODULE_OPTIONS_KEY: &str = "module-options";

impl EntityData {
    /// Returns the kind of this payload.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityData::Module(_) => EntityKind::Module,
            EntityData::ModuleOptions(_) => EntityKind::ModuleOptions,
            EntityData::ContentRoot(_) => EntityKind::ContentRoot,
            EntityData::SourceRoot(_) => EntityKind::SourceRoot,
            EntityData::Library(_) => EntityKind::Library,
            EntityData::Facet(_) => EntityKind::Facet,
        }
    }

    /// Returns the symbolic id of keyed payloads.
    #[must_use]
    pub fn symbolic_id(&self) -> Option<SymbolicId> {
        match self {
            EntityData::Module(data) => Some(SymbolicId::Module(data.module_id())),
            EntityData::Library(data) => Some(SymbolicId::Library(data.library_id())),
            EntityData::Facet(data) => Some(SymbolicId::Facet(data.facet_id())),
            EntityData::ModuleOptions(_)
            | EntityData::ContentRoot(_)
            | EntityData::SourceRoot(_) => None,
        }
    }

    /// Returns every soft reference embedded in this payload, in field order.
    #[must_use]
    pub fn soft_links(&self) -> Vec<SymbolicId> {
        match self {
            EntityData::Module(data) => data
                .dependencies
                .iter()
                .filter_map(ModuleDependency::target)
                .collect(),
            EntityData::Library(data) => data
                .table
                .module()
                .map(|module| vec![SymbolicId::Module(module.clone())])
                .unwrap_or_default(),
            EntityData::Facet(data) => vec![SymbolicId::Module(data.module.clone())],
            EntityData::ModuleOptions(_)
            | EntityData::ContentRoot(_)
            | EntityData::SourceRoot(_) => Vec::new(),
        }
    }

    /// Rewrites every soft reference equal to `old` so it points at `new`.
    ///
    /// Returns true if anything changed. References are only rewritten when `old` and
    /// `new` identify the same kind.
    pub fn update_soft_link(&mut self, old: &SymbolicId, new: &SymbolicId) -> bool {
        let mut changed = false;
        match (self, old, new) {
            (EntityData::Module(data), SymbolicId::Module(old), SymbolicId::Module(new)) => {
                for dependency in &mut data.dependencies {
                    if let ModuleDependency::Module { module, .. } = dependency {
                        if module == old {
                            *module = new.clone();
                            changed = true;
                        }
                    }
                }
            }
            (EntityData::Module(data), SymbolicId::Library(old), SymbolicId::Library(new)) => {
                for dependency in &mut data.dependencies {
                    if let ModuleDependency::Library { library, .. } = dependency {
                        if library == old {
                            *library = new.clone();
                            changed = true;
                        }
                    }
                }
            }
            (EntityData::Library(data), SymbolicId::Module(old), SymbolicId::Module(new)) => {
                if data.table.module() == Some(old) {
                    data.table = LibraryTableId::Module(new.clone());
                    changed = true;
                }
            }
            (EntityData::Facet(data), SymbolicId::Module(old), SymbolicId::Module(new)) => {
                if &data.module == old {
                    data.module = new.clone();
                    changed = true;
                }
            }
            _ => {}
        }
        changed
    }

    /// Returns the non-identity content used to pair unkeyed entities under the
    /// same parent during reconciliation. Keyed payloads pair by symbolic id and
    /// return `None`.
    #[must_use]
    pub fn pairing_key(&self) -> Option<&str> {
        match self {
            EntityData::ContentRoot(data) => Some(&data.url),
            EntityData::SourceRoot(data) => Some(&data.url),
            EntityData::ModuleOptions(_) => Some(MODULE_OPTIONS_KEY),
            EntityData::Module(_) | EntityData::Library(_) | EntityData::Facet(_) => None,
        }
    }

    /// Calls `f` on every URL stored in this payload.
    pub fn for_each_url_mut(&mut self, f: &mut dyn FnMut(&mut String)) {
        match self {
            EntityData::Module(_) | EntityData::Facet(_) => {}
            EntityData::ModuleOptions(data) => {
                if let Some(url) = &mut data.output_url {
                    f(url);
                }
                if let Some(url) = &mut data.test_output_url {
                    f(url);
                }
            }
            EntityData::ContentRoot(data) => {
                f(&mut data.url);
                data.excluded_urls.iter_mut().for_each(|url| f(url));
            }
            EntityData::SourceRoot(data) => f(&mut data.url),
            EntityData::Library(data) => {
                data.roots.iter_mut().for_each(|root| f(&mut root.url));
            }
        }
    }
}

/// Typed view of one payload variant.
pub trait Entity: Clone + PartialEq + Send + Sync + 'static {
    /// The kind this payload belongs to.
    const KIND: EntityKind;

    /// Borrows the payload if `data` is of this kind.
    fn from_data(data: &EntityData) -> Option<&Self>;

    /// Mutably borrows the payload if `data` is of this kind.
    fn from_data_mut(data: &mut EntityData) -> Option<&mut Self>;

    /// Wraps the payload.
    fn into_data(self) -> EntityData;
}

macro_rules! impl_entity {
    ($ty:ident, $variant:ident) => {
        impl Entity for $ty {
            const KIND: EntityKind = EntityKind::$variant;

            fn from_data(data: &EntityData) -> Option<&Self> {
                match data {
                    EntityData::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn from_data_mut(data: &mut EntityData) -> Option<&mut Self> {
                match data {
                    EntityData::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn into_data(self) -> EntityData {
                EntityData::$variant(self)
            }
        }

        impl From<$ty> for EntityData {
            fn from(data: $ty) -> Self {
                EntityData::$variant(data)
            }
        }
    };
}

impl_entity!(ModuleData, Module);
impl_entity!(ModuleOptionsData, ModuleOptions);
impl_entity!(ContentRootData, ContentRoot);
impl_entity!(SourceRootData, SourceRoot);
impl_entity!(LibraryData, Library);
impl_entity!(FacetData, Facet);
