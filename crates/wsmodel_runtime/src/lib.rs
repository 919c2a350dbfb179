//! Persistence and tooling for wsmodel.
//!
//! This crate provides:
//! - [`UrlRelativizer`] - Macro-based rewriting of URLs against named base paths
//! - [`CacheSerializer`] - `MessagePack` snapshot cache with format versioning
//! - [`load_cached_model`] - Installing a cached snapshot into a [`WorkspaceModel`]
//! - The `wsmodel` binary for inspecting cache files

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod relativize;

pub use cache::{CACHE_FORMAT_VERSION, CacheConfig, CacheLoad, CacheMiss, CacheSerializer};
pub use relativize::{APPLICATION_HOME_DIR, PROJECT_DIR, USER_HOME, UrlRelativizer};

use std::path::Path;

use wsmodel_engine::WorkspaceModel;
use wsmodel_foundation::Result;

/// Loads the cache at `path` into `model` as a new version.
///
/// Returns the installed version, or `None` on a cache miss (the model is left
/// untouched).
///
/// # Errors
///
/// Returns an error if installing the storage fails.
pub fn load_cached_model<P: AsRef<Path>>(
    model: &WorkspaceModel,
    serializer: &CacheSerializer,
    path: P,
) -> Result<Option<u64>> {
    match serializer.load_from_file(path) {
        CacheLoad::Hit(storage) => model.load_storage("Load cached project model", storage).map(Some),
        CacheLoad::Miss(_) => Ok(None),
    }
}
