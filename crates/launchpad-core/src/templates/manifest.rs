//! Registry file types and parsing

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Branch used when a registry entry does not name one
pub const DEFAULT_BRANCH: &str = "main";

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

/// Root registry file (registry.yaml)
/// Maps framework names to base templates and module names to module sources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryManifest {
    /// Repository that hosts modules which do not name their own
    #[serde(default)]
    pub module_repository: Option<String>,

    /// Base templates, keyed by framework name
    #[serde(default)]
    pub frameworks: BTreeMap<String, FrameworkEntry>,

    /// Optional feature modules, keyed by module name
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleEntry>,
}

/// A base template entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrameworkEntry {
    /// Repository holding the template, as `owner/repo`
    pub repository: String,

    /// Ref used when the request does not name a template branch
    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// Shown by `list`
    #[serde(default)]
    pub description: Option<String>,
}

/// A feature module entry. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModuleEntry {
    /// Repository holding the module (falls back to the registry's `module_repository`)
    pub repository: Option<String>,

    /// Path of the module inside the repository (defaults to `modules/<name>`)
    pub subpath: Option<String>,

    /// Ref to fetch (defaults to `main`)
    pub branch: Option<String>,

    pub description: Option<String>,
}

impl ModuleEntry {
    /// Subpath inside the source repository, following the `modules/<name>` convention
    pub fn subpath_for(&self, name: &str) -> String {
        self.subpath
            .clone()
            .unwrap_or_else(|| format!("modules/{}", name))
    }

    pub fn branch_or_default(&self) -> String {
        self.branch.clone().unwrap_or_else(default_branch)
    }
}
