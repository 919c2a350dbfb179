//! Snapshot cache using `MessagePack`.
//!
//! A cache blob holds every entity with a cacheable source, parents before
//! children, plus a format version and a flag telling whether URLs were stored
//! relativized. Loading never fails hard: a missing file, a different format
//! version, undecodable bytes, or entities that do not fit together all produce
//! [`CacheLoad::Miss`], and the caller rebuilds the model from scratch.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use wsmodel_foundation::{EntityData, EntitySource, Error, ErrorKind, Result};
use wsmodel_storage::{Builder, EntityRef, Storage};

use crate::relativize::UrlRelativizer;

/// The cache format written by this version.
pub const CACHE_FORMAT_VERSION: &str = "wsmodel-cache-1";

// =============================================================================
// Configuration
// =============================================================================

/// Cache settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Version string written to, and required from, every blob.
    pub format_version: String,
    /// Store URLs relative to the relativizer's bases.
    pub relativize_paths: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            format_version: CACHE_FORMAT_VERSION.to_string(),
            relativize_paths: true,
        }
    }
}

impl CacheConfig {
    /// Sets the format version.
    #[must_use]
    pub fn with_format_version(mut self, version: impl Into<String>) -> Self {
        self.format_version = version.into();
        self
    }

    /// Enables or disables URL relativization.
    #[must_use]
    pub fn with_relativize_paths(mut self, enabled: bool) -> Self {
        self.relativize_paths = enabled;
        self
    }
}

// =============================================================================
// Wire format
// =============================================================================

/// Leading fields of every blob, decoded before the body.
#[derive(Deserialize)]
struct CacheHeader {
    format_version: String,
}

#[derive(Serialize, Deserialize)]
struct CacheBlob {
    format_version: String,
    relativized: bool,
    entities: Vec<CachedEntity>,
}

#[derive(Serialize, Deserialize)]
struct CachedEntity {
    /// Index of the parent in the blob's entity list.
    parent: Option<u32>,
    source: EntitySource,
    data: EntityData,
}

// =============================================================================
// Load results
// =============================================================================

/// Why a cache could not be used.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CacheMiss {
    /// No cache file exists.
    #[error("no cache file")]
    NotFound,
    /// The blob was written by a different format version.
    #[error("format version mismatch: expected '{expected}', found '{found}'")]
    VersionMismatch {
        /// The version this reader accepts.
        expected: String,
        /// The version in the blob.
        found: String,
    },
    /// The bytes could not be read or decoded.
    #[error("corrupted cache: {0}")]
    Corrupted(String),
    /// The entities decoded but do not form a valid storage.
    #[error("inconsistent cache: {0}")]
    Inconsistent(String),
}

/// Outcome of loading a cache.
#[derive(Clone, Debug)]
pub enum CacheLoad {
    /// The cached storage.
    Hit(Storage),
    /// The cache was unusable.
    Miss(CacheMiss),
}

impl CacheLoad {
    /// Returns true for a hit.
    #[must_use]
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLoad::Hit(_))
    }

    /// Returns the storage of a hit.
    #[must_use]
    pub fn into_storage(self) -> Option<Storage> {
        match self {
            CacheLoad::Hit(storage) => Some(storage),
            CacheLoad::Miss(_) => None,
        }
    }

    /// Returns the reason of a miss.
    #[must_use]
    pub fn miss(&self) -> Option<&CacheMiss> {
        match self {
            CacheLoad::Hit(_) => None,
            CacheLoad::Miss(reason) => Some(reason),
        }
    }
}

// =============================================================================
// Serializer
// =============================================================================

/// Writes and reads cache blobs.
#[derive(Clone, Debug, Default)]
pub struct CacheSerializer {
    config: CacheConfig,
    relativizer: UrlRelativizer,
}

impl CacheSerializer {
    /// Creates a serializer with no relativizer bases.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            relativizer: UrlRelativizer::new(),
        }
    }

    /// Sets the bases used to relativize and expand URLs.
    #[must_use]
    pub fn with_relativizer(mut self, relativizer: UrlRelativizer) -> Self {
        self.relativizer = relativizer;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn relativizes(&self) -> bool {
        self.config.relativize_paths && !self.relativizer.is_empty()
    }

    /// Encodes every cacheable entity of `storage`.
    ///
    /// Entities whose source is not cacheable are skipped together with their
    /// descendants. External mappings are never written.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn to_bytes(&self, storage: &Storage) -> Result<Vec<u8>> {
        let relativized = self.relativizes();
        let mut entities = Vec::with_capacity(storage.total_count());
        for root in storage.all_entities().filter(|e| e.parent().is_none()) {
            self.collect(storage, &root, None, relativized, &mut entities)?;
        }

        let blob = CacheBlob {
            format_version: self.config.format_version.clone(),
            relativized,
            entities,
        };
        rmp_serde::to_vec_named(&blob).map_err(|e| Error::new(ErrorKind::Serialization(e.to_string())))
    }

    fn collect(
        &self,
        storage: &Storage,
        entity: &EntityRef,
        parent: Option<u32>,
        relativized: bool,
        out: &mut Vec<CachedEntity>,
    ) -> Result<()> {
        if !entity.source().is_cacheable() {
            return Ok(());
        }
        let index = u32::try_from(out.len())
            .map_err(|_| Error::new(ErrorKind::Serialization("too many entities".to_string())))?;

        let mut cached = CachedEntity {
            parent,
            source: entity.source().clone(),
            data: entity.data().clone(),
        };
        if relativized {
            let relativizer = &self.relativizer;
            rewrite_urls(&mut cached, |url| relativizer.to_relative_url(url));
        }
        out.push(cached);

        for child in entity.children().iter() {
            if let Some(child) = storage.entity(*child) {
                self.collect(storage, &child, Some(index), relativized, out)?;
            }
        }
        Ok(())
    }

    /// Decodes a blob into a storage.
    #[must_use]
    pub fn from_bytes(&self, bytes: &[u8]) -> CacheLoad {
        let load = self.decode(bytes);
        match &load {
            CacheLoad::Hit(storage) => {
                debug!(target: "wsmodel::cache", entities = storage.total_count(), "loaded cache");
            }
            CacheLoad::Miss(reason) => {
                warn!(target: "wsmodel::cache", %reason, "cache miss");
            }
        }
        load
    }

    fn decode(&self, bytes: &[u8]) -> CacheLoad {
        let header: CacheHeader = match rmp_serde::from_slice(bytes) {
            Ok(header) => header,
            Err(e) => return CacheLoad::Miss(CacheMiss::Corrupted(e.to_string())),
        };
        if header.format_version != self.config.format_version {
            return CacheLoad::Miss(CacheMiss::VersionMismatch {
                expected: self.config.format_version.clone(),
                found: header.format_version,
            });
        }

        let blob: CacheBlob = match rmp_serde::from_slice(bytes) {
            Ok(blob) => blob,
            Err(e) => return CacheLoad::Miss(CacheMiss::Corrupted(e.to_string())),
        };
        match self.rebuild(blob) {
            Ok(storage) => CacheLoad::Hit(storage),
            Err(e) => CacheLoad::Miss(CacheMiss::Inconsistent(e.to_string())),
        }
    }

    fn rebuild(&self, blob: CacheBlob) -> Result<Storage> {
        let mut builder = Builder::new();
        let mut ids = Vec::with_capacity(blob.entities.len());
        for (index, mut entity) in blob.entities.into_iter().enumerate() {
            if blob.relativized {
                let relativizer = &self.relativizer;
                rewrite_urls(&mut entity, |url| relativizer.to_absolute_url(url));
            }
            let id = match entity.parent {
                None => builder.add_entity(entity.data, entity.source)?,
                Some(parent) => {
                    let parent = ids.get(parent as usize).copied().ok_or_else(|| {
                        Error::inconsistent(format!("entity {index} precedes its parent {parent}"))
                    })?;
                    builder.add_child(parent, entity.data, entity.source)?
                }
            };
            ids.push(id);
        }

        let storage = builder.to_snapshot();
        storage.check_consistency()?;
        Ok(storage)
    }

    /// Writes the cache for `storage` to `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, storage: &Storage, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes(storage)?;
        let io_error = |e: io::Error| {
            Error::new(ErrorKind::Io(format!("failed to write '{}': {e}", path.display())))
        };

        let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
        writer.write_all(&bytes).map_err(io_error)?;
        writer.flush().map_err(io_error)?;
        debug!(target: "wsmodel::cache", path = %path.display(), bytes = bytes.len(), "saved cache");
        Ok(())
    }

    /// Reads the cache at `path`.
    #[must_use]
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> CacheLoad {
        let path = path.as_ref();
        let mut bytes = Vec::new();
        let read = File::open(path).and_then(|file| BufReader::new(file).read_to_end(&mut bytes));
        match read {
            Ok(_) => self.from_bytes(&bytes),
            Err(e) => {
                let reason = if e.kind() == io::ErrorKind::NotFound {
                    CacheMiss::NotFound
                } else {
                    CacheMiss::Corrupted(format!("failed to read '{}': {e}", path.display()))
                };
                warn!(target: "wsmodel::cache", %reason, path = %path.display(), "cache miss");
                CacheLoad::Miss(reason)
            }
        }
    }
}

fn rewrite_urls(entity: &mut CachedEntity, rewrite: impl Fn(&str) -> String) {
    entity.data.for_each_url_mut(&mut |url| *url = rewrite(url));
    if let Some(url) = entity.source.url_mut() {
        *url = rewrite(url);
    }
}
