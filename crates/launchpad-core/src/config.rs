//! Resolution of per-invocation settings
//!
//! Each setting is taken from an explicit value (a CLI flag) first, then the
//! product's environment variable, then the product default.

use crate::product::ProductConfig;
use crate::registry::SourceRegistry;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Module cache root for this invocation
pub fn cache_root<C: ProductConfig>(config: &C, explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(config.cache_dir_env()).map(PathBuf::from))
        .unwrap_or_else(|| config.default_cache_root())
}

/// Load the source registry, from a file if one is named, else the built-in table
pub fn load_registry<C: ProductConfig>(
    config: &C,
    explicit: Option<&Path>,
) -> Result<SourceRegistry> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(config.registry_env()).map(PathBuf::from));

    match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading registry file");
            SourceRegistry::from_file(&path)
                .with_context(|| format!("Failed to load registry from {}", path.display()))
        }
        None => SourceRegistry::builtin().context("Built-in registry is invalid"),
    }
}
