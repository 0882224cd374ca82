//! Source trees: fetching, caching and merging
//!
//! This module provides:
//! - Registry file types (RegistryManifest)
//! - Source locators and tree fetching from remote archives or local directories
//! - The presence-based module cache
//! - Tree merging with an explicit overwrite policy
//! - The `list` and `cache` commands

pub mod cache;
pub mod fetcher;
pub mod manifest;
pub mod merger;

use crate::product::ProductConfig;
use crate::registry::SourceRegistry;
use anyhow::{Context, Result};
use colored::Colorize;

pub use cache::{CacheEntry, CacheResolver, ModuleFetchError};
pub use fetcher::{FetchError, GithubFetcher, LocalFetcher, SourceLocator, TreeFetcher};
pub use manifest::{FrameworkEntry, ModuleEntry, RegistryManifest};
pub use merger::{MergeError, MergePolicy, TreeMerger};

/// Print every framework and module the registry knows about
pub fn list_sources<C: ProductConfig>(config: &C, registry: &SourceRegistry) -> Result<()> {
    println!(
        "{}",
        format!("{} sources", config.display_name()).cyan().bold()
    );
    println!("{}", config.cli_description().dimmed());
    println!();

    println!("{}", "Frameworks".bold());
    for template in registry.templates() {
        println!(
            "  {} {} {}",
            "->".blue(),
            template.name,
            format!("({}#{})", template.repository, template.default_branch).dimmed()
        );
        if let Some(description) = &template.description {
            println!("     {}", description);
        }
    }
    println!();

    println!("{}", "Modules".bold());
    let mut count = 0;
    for module in registry.modules() {
        println!(
            "  {} {} {}",
            "->".blue(),
            module.name,
            module.locator(&module.branch).to_string().dimmed()
        );
        if let Some(description) = &module.description {
            println!("     {}", description);
        }
        count += 1;
    }
    if count == 0 {
        println!("  {}", "(none)".dimmed());
    }

    Ok(())
}

/// Print the cached modules under the cache root
pub fn list_cache(cache: &CacheResolver) -> Result<()> {
    let entries = cache.entries().with_context(|| {
        format!(
            "Failed to read cache directory {}",
            cache.cache_root().display()
        )
    })?;

    println!(
        "{} {}",
        "Module cache:".cyan().bold(),
        cache.cache_root().display()
    );
    println!();

    if entries.is_empty() {
        println!("  {}", "(empty)".dimmed());
        return Ok(());
    }

    for entry in &entries {
        println!(
            "  {} {} {}",
            "->".blue(),
            entry.module_name,
            format!("fetched {}", entry.fetched_at.format("%Y-%m-%d %H:%M:%S UTC")).dimmed()
        );
    }

    Ok(())
}

/// Evict one module, or every module when `module` is `None`
pub fn clear_cache(cache: &CacheResolver, module: Option<&str>) -> Result<()> {
    match module {
        Some(name) => {
            let removed = cache
                .evict(name)
                .with_context(|| format!("Failed to evict '{}' from the cache", name))?;
            if removed {
                println!("{} {}", "Evicted".green().bold(), name);
            } else {
                eprintln!("{} '{}' is not cached", "Warning:".yellow(), name);
            }
        }
        None => {
            let removed = cache.clear().with_context(|| {
                format!(
                    "Failed to clear cache directory {}",
                    cache.cache_root().display()
                )
            })?;
            println!(
                "{} {} cached module(s) from {}",
                "Removed".green().bold(),
                removed,
                cache.cache_root().display()
            );
        }
    }

    Ok(())
}
