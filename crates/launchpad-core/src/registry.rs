//! Name-to-source lookup for base templates and feature modules
//!
//! The registry is loaded once (from the embedded `registry.yaml` or a file
//! named on the command line) and is read-only afterwards.

use crate::templates::fetcher::SourceLocator;
use crate::templates::manifest::RegistryManifest;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Registry compiled into the binary
pub const BUILTIN_REGISTRY: &str = include_str!("../registry.yaml");

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown framework: {name}. Available frameworks: {}", available.join(", "))]
    UnknownFramework { name: String, available: Vec<String> },

    #[error("Unknown module: {name}")]
    UnknownModule { name: String },

    #[error("Invalid registry: {0}")]
    Invalid(String),

    #[error("Failed to read registry {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse registry: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Base template source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSpec {
    pub name: String,
    pub repository: String,
    pub default_branch: String,
    pub description: Option<String>,
}

impl TemplateSpec {
    /// `<repository>#<ref>`, using the default branch when no ref is given
    pub fn locator(&self, branch: Option<&str>) -> SourceLocator {
        SourceLocator::new(&self.repository)
            .with_reference(branch.unwrap_or(&self.default_branch))
    }
}

/// Feature module source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpec {
    pub name: String,
    pub repository: String,
    pub subpath: String,
    pub branch: String,
    pub description: Option<String>,
}

impl ModuleSpec {
    /// `<repository>/<subpath>#<ref>`
    pub fn locator(&self, reference: &str) -> SourceLocator {
        SourceLocator::new(&self.repository)
            .with_subpath(&self.subpath)
            .with_reference(reference)
    }

    /// Same module, fetched from another repository
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = repository.into();
        self
    }
}

/// A name usable as a single directory component (cache entries are keyed by name)
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '#'])
        && !name.chars().any(char::is_whitespace)
}

/// Loaded framework and module table
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    templates: BTreeMap<String, TemplateSpec>,
    modules: BTreeMap<String, ModuleSpec>,
}

impl SourceRegistry {
    /// Load the embedded registry
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_yaml(BUILTIN_REGISTRY)
    }

    pub fn from_file(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path).map_err(|e| RegistryError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, RegistryError> {
        let manifest: RegistryManifest = serde_yaml::from_str(content)?;
        Self::from_manifest(manifest)
    }

    /// Validate names and fill in module defaults
    pub fn from_manifest(manifest: RegistryManifest) -> Result<Self, RegistryError> {
        let mut templates = BTreeMap::new();
        for (name, entry) in manifest.frameworks {
            if !is_valid_name(&name) {
                return Err(RegistryError::Invalid(format!(
                    "invalid framework name '{}'",
                    name
                )));
            }
            check_repository(&name, &entry.repository)?;
            templates.insert(
                name.clone(),
                TemplateSpec {
                    name,
                    repository: entry.repository,
                    default_branch: entry.default_branch,
                    description: entry.description,
                },
            );
        }

        let mut modules = BTreeMap::new();
        for (name, entry) in manifest.modules {
            if !is_valid_name(&name) {
                return Err(RegistryError::Invalid(format!(
                    "invalid module name '{}'",
                    name
                )));
            }
            let repository = entry
                .repository
                .clone()
                .or_else(|| manifest.module_repository.clone())
                .ok_or_else(|| {
                    RegistryError::Invalid(format!(
                        "module '{}' has no repository and no module_repository is set",
                        name
                    ))
                })?;
            check_repository(&name, &repository)?;
            let subpath = entry.subpath_for(&name);
            check_subpath(&name, &subpath)?;

            modules.insert(
                name.clone(),
                ModuleSpec {
                    subpath,
                    branch: entry.branch_or_default(),
                    description: entry.description,
                    repository,
                    name,
                },
            );
        }

        Ok(Self { templates, modules })
    }

    pub fn resolve_template(&self, name: &str) -> Result<&TemplateSpec, RegistryError> {
        self.templates
            .get(name)
            .ok_or_else(|| RegistryError::UnknownFramework {
                name: name.to_string(),
                available: self.framework_names(),
            })
    }

    pub fn resolve_module(&self, name: &str) -> Result<&ModuleSpec, RegistryError> {
        self.modules
            .get(name)
            .ok_or_else(|| RegistryError::UnknownModule {
                name: name.to_string(),
            })
    }

    pub fn framework_names(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }

    pub fn templates(&self) -> impl Iterator<Item = &TemplateSpec> {
        self.templates.values()
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleSpec> {
        self.modules.values()
    }
}

fn check_repository(name: &str, repository: &str) -> Result<(), RegistryError> {
    SourceLocator::new(repository)
        .owner_and_repo()
        .map(|_| ())
        .map_err(|_| {
            RegistryError::Invalid(format!(
                "'{}' names repository '{}', expected owner/repo",
                name, repository
            ))
        })
}

/// A subpath must stay inside its repository: relative, with no `..` or `.` components
fn check_subpath(name: &str, subpath: &str) -> Result<(), RegistryError> {
    let path = Path::new(subpath);
    let contained = !subpath.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if contained {
        Ok(())
    } else {
        Err(RegistryError::Invalid(format!(
            "module '{}' has subpath '{}', expected a relative path inside the repository",
            name, subpath
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY: &str = r#"
module_repository: acme/modules
frameworks:
  react:
    repository: acme/react-template
    default_branch: main
  vue:
    repository: acme/vue-template
    default_branch: develop
modules:
  auth-oauth: {}
  theme:
    repository: acme/themes
    branch: v2
"#;

    #[test]
    fn test_resolve_template() {
        let registry = SourceRegistry::from_yaml(REGISTRY).unwrap();
        let vue = registry.resolve_template("vue").unwrap();
        assert_eq!(vue.repository, "acme/vue-template");
        assert_eq!(vue.locator(None).to_string(), "acme/vue-template#develop");
        assert_eq!(
            vue.locator(Some("hello-world")).to_string(),
            "acme/vue-template#hello-world"
        );
    }

    #[test]
    fn test_unknown_framework_lists_available() {
        let registry = SourceRegistry::from_yaml(REGISTRY).unwrap();
        let err = registry.resolve_template("ghost").unwrap_err();
        match &err {
            RegistryError::UnknownFramework { name, available } => {
                assert_eq!(name, "ghost");
                assert_eq!(available, &vec!["react".to_string(), "vue".to_string()]);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(err.to_string().contains("react, vue"));
    }

    #[test]
    fn test_resolve_module_defaults() {
        let registry = SourceRegistry::from_yaml(REGISTRY).unwrap();
        let auth = registry.resolve_module("auth-oauth").unwrap();
        assert_eq!(auth.repository, "acme/modules");
        assert_eq!(auth.subpath, "modules/auth-oauth");
        assert_eq!(auth.branch, "main");
        assert_eq!(
            auth.locator(&auth.branch).to_string(),
            "acme/modules/modules/auth-oauth#main"
        );

        let theme = registry.resolve_module("theme").unwrap();
        assert_eq!(theme.locator("v2").to_string(), "acme/themes/modules/theme#v2");
    }

    #[test]
    fn test_unknown_module() {
        let registry = SourceRegistry::from_yaml(REGISTRY).unwrap();
        assert!(matches!(
            registry.resolve_module("typo"),
            Err(RegistryError::UnknownModule { .. })
        ));
    }

    #[test]
    fn test_module_without_repository_rejected() {
        let yaml = r#"
modules:
  orphan: {}
"#;
        assert!(matches!(
            SourceRegistry::from_yaml(yaml),
            Err(RegistryError::Invalid(_))
        ));
    }

    #[test]
    fn test_unsafe_names_rejected() {
        let yaml = r#"
module_repository: acme/modules
modules:
  "../escape": {}
"#;
        assert!(matches!(
            SourceRegistry::from_yaml(yaml),
            Err(RegistryError::Invalid(_))
        ));
    }

    #[test]
    fn test_escaping_subpath_rejected() {
        for subpath in ["../outside", "modules/../../outside", "/etc", "./modules/x"] {
            let yaml = format!(
                "module_repository: acme/modules\nmodules:\n  theme:\n    subpath: \"{}\"\n",
                subpath
            );
            assert!(
                matches!(SourceRegistry::from_yaml(&yaml), Err(RegistryError::Invalid(_))),
                "{}",
                subpath
            );
        }

        let yaml = "module_repository: acme/modules\nmodules:\n  theme:\n    subpath: ui/theme\n";
        let registry = SourceRegistry::from_yaml(yaml).unwrap();
        assert_eq!(registry.resolve_module("theme").unwrap().subpath, "ui/theme");
    }

    #[test]
    fn test_is_valid_name() {
        assert!(is_valid_name("auth-oauth"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name(".hidden"));
        assert!(!is_valid_name("a/b"));
        assert!(!is_valid_name("a b"));
    }

    #[test]
    fn test_builtin_registry() {
        let registry = SourceRegistry::builtin().unwrap();
        assert!(registry.resolve_template("react").is_ok());
        let auth = registry.resolve_module("auth-oauth").unwrap();
        assert_eq!(auth.branch, "auth-oauth");
    }
}
