//! Local module cache
//!
//! Layout is flat: `<cache_root>/<module>/` holds the module's files. A
//! non-empty entry directory is a cache hit, regardless of age or of the ref
//! it was fetched at. Stale entries are only refreshed by evicting them.

use super::fetcher::{FetchError, TreeFetcher};
use crate::registry::{is_valid_name, ModuleSpec};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A materialized module tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub module_name: String,
    pub local_path: PathBuf,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
#[error("Failed to fetch module '{module}': {cause}")]
pub struct ModuleFetchError {
    pub module: String,
    #[source]
    pub cause: FetchError,
}

/// Resolves modules to local trees under an explicit cache root
#[derive(Debug, Clone)]
pub struct CacheResolver {
    cache_root: PathBuf,
}

impl CacheResolver {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn entry_path(&self, module_name: &str) -> PathBuf {
        self.cache_root.join(module_name)
    }

    /// The cached entry for a module, if present and non-empty
    pub fn lookup(&self, module_name: &str) -> Option<CacheEntry> {
        let path = self.entry_path(module_name);
        if !is_populated(&path) {
            return None;
        }
        let fetched_at = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Some(CacheEntry {
            module_name: module_name.to_string(),
            local_path: path,
            fetched_at,
        })
    }

    /// Return the cached tree for `spec`, fetching it first on a miss
    ///
    /// The fetch lands in a staging directory that is renamed into place only
    /// on success, so a failed fetch never leaves something that looks like a hit.
    pub async fn materialize<F: TreeFetcher>(
        &self,
        fetcher: &F,
        spec: &ModuleSpec,
        branch_override: Option<&str>,
    ) -> Result<CacheEntry, ModuleFetchError> {
        if let Some(entry) = self.lookup(&spec.name) {
            tracing::debug!(module = %spec.name, path = %entry.local_path.display(), "Cache hit");
            return Ok(entry);
        }

        let reference = branch_override.unwrap_or(&spec.branch);
        let locator = spec.locator(reference);
        let candidate = self.entry_path(&spec.name);
        let staging = self.cache_root.join(format!(".{}.partial", spec.name));
        let fail = |cause: FetchError| ModuleFetchError {
            module: spec.name.clone(),
            cause,
        };

        tracing::info!(module = %spec.name, %locator, "Fetching module");

        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| fail(io_error(&staging, e)))?;
        }
        fs::create_dir_all(&staging).map_err(|e| fail(io_error(&staging, e)))?;

        let files = match fetcher.fetch(&locator, &staging).await {
            Ok(files) => files,
            Err(cause) => {
                let _ = fs::remove_dir_all(&staging);
                return Err(fail(cause));
            }
        };

        // Replace wholesale: an empty leftover directory is not merged with the new tree
        if candidate.exists() {
            fs::remove_dir_all(&candidate).map_err(|e| fail(io_error(&candidate, e)))?;
        }
        fs::rename(&staging, &candidate).map_err(|e| fail(io_error(&candidate, e)))?;

        tracing::debug!(module = %spec.name, files = files.len(), "Module cached");
        Ok(CacheEntry {
            module_name: spec.name.clone(),
            local_path: candidate,
            fetched_at: Utc::now(),
        })
    }

    /// All cache entries, sorted by module name
    pub fn entries(&self) -> io::Result<Vec<CacheEntry>> {
        let read_dir = match fs::read_dir(&self.cache_root) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let name = dir_entry?.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            if let Some(entry) = self.lookup(&name) {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| a.module_name.cmp(&b.module_name));
        Ok(entries)
    }

    /// Remove one module from the cache. Returns false if it was not cached.
    ///
    /// Only names that can be cache entries are accepted, so the removal never
    /// leaves the cache root.
    pub fn evict(&self, module_name: &str) -> io::Result<bool> {
        if !is_valid_name(module_name) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{}' is not a module name", module_name),
            ));
        }
        let path = self.entry_path(module_name);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&path)?;
        Ok(true)
    }

    /// Remove every cached module. Returns the number removed.
    pub fn clear(&self) -> io::Result<usize> {
        let entries = self.entries()?;
        for entry in &entries {
            fs::remove_dir_all(&entry.local_path)?;
        }
        Ok(entries.len())
    }
}

fn is_populated(path: &Path) -> bool {
    path.is_dir()
        && fs::read_dir(path)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
}

fn io_error(path: &Path, source: io::Error) -> FetchError {
    FetchError::Io {
        path: path.to_path_buf(),
        source,
    }
}
