//! Product configuration trait for CLI binaries
//!
//! This trait defines the interface that each product binary implements to
//! configure where sources come from, where modules are cached, and how
//! dependencies are installed.

use std::path::{Path, PathBuf};

/// Configuration trait for different CLI products
///
/// Each product implements this trait to define:
/// - Product identity (name, display name)
/// - Environment variables that override registry, cache and API locations
/// - The dependency manifest and install command
/// - Post-setup instructions
pub trait ProductConfig: Clone + Send + Sync + 'static {
    /// Internal product name (used for the cache directory and user agent)
    fn name(&self) -> &'static str;

    /// Human-readable display name
    fn display_name(&self) -> &'static str;

    /// CLI description shown in help text
    fn cli_description(&self) -> &'static str;

    /// Environment variable naming a registry file to use instead of the built-in one
    fn registry_env(&self) -> &'static str;

    /// Environment variable overriding the module cache root
    fn cache_dir_env(&self) -> &'static str;

    /// Environment variable overriding the archive API base URL
    fn github_api_env(&self) -> &'static str;

    /// Generate the "next steps" instructions after project creation
    fn next_steps(&self, dir: &Path, needs_install: bool) -> Vec<String>;

    /// File whose presence at the project root triggers dependency installation
    fn manifest_file(&self) -> &'static str {
        "package.json"
    }

    /// Program and arguments used to install dependencies
    fn install_command(&self) -> &'static [&'static str] {
        &["npm", "install"]
    }

    /// Module cache root when neither flag nor environment names one
    fn default_cache_root(&self) -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(self.name())
            .join("modules")
    }

    /// User agent string for HTTP requests
    fn user_agent(&self) -> &'static str {
        self.name()
    }
}
