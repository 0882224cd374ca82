//! Project composition: base template plus feature modules
//!
//! [`Composer::compose`] runs a linear sequence of [`Stage`]s:
//!
//! 1. `Init` - resolve the framework. An unknown name aborts before anything is written.
//! 2. `BaseFetch` - fetch the base template straight into the target directory (never cached).
//! 3. `ModuleLoop` - resolve, materialize (through the cache) and merge each module in
//!    request order. Unknown modules are skipped; fetch and merge failures are recorded.
//! 4. `PostCheck` - install dependencies when the target has a dependency manifest.
//!    Install failures are recorded.
//! 5. `Done`
//!
//! Later modules overwrite earlier modules and the base template on overlapping paths.

use crate::registry::{ModuleSpec, RegistryError, SourceRegistry};
use crate::runtime::install::DependencyInstaller;
use crate::templates::cache::{CacheEntry, CacheResolver, ModuleFetchError};
use crate::templates::fetcher::{FetchError, SourceLocator, TreeFetcher};
use crate::templates::merger::{MergePolicy, TreeMerger};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    BaseFetch,
    ModuleLoop,
    PostCheck,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::BaseFetch => "base-fetch",
            Stage::ModuleLoop => "module-loop",
            Stage::PostCheck => "post-check",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Kind of a recoverable failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    FetchFailed,
    MergeFailed,
    InstallFailed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::FetchFailed => "fetch failed",
            ErrorKind::MergeFailed => "merge failed",
            ErrorKind::InstallFailed => "install failed",
        };
        f.write_str(name)
    }
}

/// A recoverable failure: the module (or manifest file) it concerns, its kind and cause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedError {
    pub subject: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of a composition that got past `Init`
#[derive(Debug, Clone, Default)]
pub struct CompositionResult {
    /// Paths written, relative to the target directory
    pub written_paths: BTreeSet<PathBuf>,
    /// Requested modules missing from the registry, in request order
    pub skipped_modules: Vec<String>,
    pub errors: Vec<RecordedError>,
    /// Modules merged into the target, in merge order
    pub merged_modules: Vec<String>,
    /// Whether dependency installation ran and succeeded
    pub installed: bool,
}

impl CompositionResult {
    /// No skipped modules and no recorded errors
    pub fn is_clean(&self) -> bool {
        self.skipped_modules.is_empty() && self.errors.is_empty()
    }

    pub fn has_error(&self, subject: &str, kind: ErrorKind) -> bool {
        self.errors
            .iter()
            .any(|e| e.subject == subject && e.kind == kind)
    }

    fn record(&mut self, subject: &str, kind: ErrorKind, message: String) {
        tracing::warn!(%subject, %kind, "{}", message);
        self.errors.push(RecordedError {
            subject: subject.to_string(),
            kind,
            message,
        });
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("A framework name is required")]
    MissingFramework,

    #[error("Invalid module repository '{0}', expected owner/repo")]
    InvalidRepository(String),
}

/// Split a comma-delimited module list, trimming entries and dropping empty ones
pub fn parse_module_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// A validated composition request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionRequest {
    framework: String,
    template_branch: Option<String>,
    modules: Vec<String>,
    module_branch_override: Option<String>,
    module_repository_override: Option<String>,
    target_directory: PathBuf,
    install_dependencies: bool,
}

impl CompositionRequest {
    pub fn new(
        framework: impl Into<String>,
        target_directory: impl Into<PathBuf>,
    ) -> Result<Self, RequestError> {
        let framework = framework.into().trim().to_string();
        if framework.is_empty() {
            return Err(RequestError::MissingFramework);
        }
        Ok(Self {
            framework,
            template_branch: None,
            modules: Vec::new(),
            module_branch_override: None,
            module_repository_override: None,
            target_directory: target_directory.into(),
            install_dependencies: true,
        })
    }

    /// Modules to merge, in merge order
    ///
    /// Names are not checked here: a name the registry does not know, however
    /// malformed, is skipped at compose time rather than failing the request.
    pub fn with_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules = modules
            .into_iter()
            .map(|module| module.into().trim().to_string())
            .filter(|module| !module.is_empty())
            .collect();
        self
    }

    pub fn with_template_branch(mut self, branch: Option<String>) -> Self {
        self.template_branch = branch;
        self
    }

    /// Ref used for every module instead of the registry's branch
    pub fn with_module_branch(mut self, branch: Option<String>) -> Self {
        self.module_branch_override = branch;
        self
    }

    /// Repository used for every module instead of the registry's repository
    pub fn with_module_repository(
        mut self,
        repository: Option<String>,
    ) -> Result<Self, RequestError> {
        if let Some(repository) = &repository {
            if SourceLocator::new(repository).owner_and_repo().is_err() {
                return Err(RequestError::InvalidRepository(repository.clone()));
            }
        }
        self.module_repository_override = repository;
        Ok(self)
    }

    pub fn without_install(mut self) -> Self {
        self.install_dependencies = false;
        self
    }

    pub fn framework(&self) -> &str {
        &self.framework
    }

    pub fn template_branch(&self) -> Option<&str> {
        self.template_branch.as_deref()
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    pub fn module_branch_override(&self) -> Option<&str> {
        self.module_branch_override.as_deref()
    }

    pub fn module_repository_override(&self) -> Option<&str> {
        self.module_repository_override.as_deref()
    }

    pub fn target_directory(&self) -> &Path {
        &self.target_directory
    }

    pub fn install_dependencies(&self) -> bool {
        self.install_dependencies
    }
}

/// Failures that abort a composition
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("Unknown framework: {name}. Available frameworks: {}", available.join(", "))]
    UnknownFramework { name: String, available: Vec<String> },

    #[error("Failed to fetch base template {locator}: {source}")]
    BaseFetch {
        locator: String,
        #[source]
        source: FetchError,
    },
}

/// Runs the resolve-fetch-merge pipeline
pub struct Composer<F, I> {
    registry: SourceRegistry,
    cache: CacheResolver,
    fetcher: F,
    installer: I,
    merger: TreeMerger,
    manifest_file: String,
    fetch_concurrency: usize,
}

impl<F: TreeFetcher, I: DependencyInstaller> Composer<F, I> {
    pub fn new(registry: SourceRegistry, cache: CacheResolver, fetcher: F, installer: I) -> Self {
        Self {
            registry,
            cache,
            fetcher,
            installer,
            merger: TreeMerger::default(),
            manifest_file: "package.json".to_string(),
            fetch_concurrency: 1,
        }
    }

    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merger = TreeMerger::new(policy);
        self
    }

    /// File whose presence at the target root triggers dependency installation
    pub fn with_manifest_file(mut self, manifest_file: impl Into<String>) -> Self {
        self.manifest_file = manifest_file.into();
        self
    }

    /// How many modules may be fetched at once. Merging is always sequential.
    pub fn with_fetch_concurrency(mut self, limit: usize) -> Self {
        self.fetch_concurrency = limit.max(1);
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &CacheResolver {
        &self.cache
    }

    pub async fn compose(
        &self,
        request: &CompositionRequest,
    ) -> Result<CompositionResult, ComposeError> {
        let target = request.target_directory();
        let mut result = CompositionResult::default();

        tracing::debug!(stage = %Stage::Init, framework = request.framework());
        let template = match self.registry.resolve_template(request.framework()) {
            Ok(template) => template,
            Err(RegistryError::UnknownFramework { name, available }) => {
                return Err(ComposeError::UnknownFramework { name, available })
            }
            Err(_) => {
                return Err(ComposeError::UnknownFramework {
                    name: request.framework().to_string(),
                    available: self.registry.framework_names(),
                })
            }
        };

        let locator = template.locator(request.template_branch());
        tracing::info!(
            stage = %Stage::BaseFetch,
            %locator,
            target = %target.display(),
            "Fetching base template"
        );
        let base_files = self
            .fetcher
            .fetch(&locator, target)
            .await
            .map_err(|source| ComposeError::BaseFetch {
                locator: locator.to_string(),
                source,
            })?;
        result.written_paths.extend(base_files);

        tracing::debug!(stage = %Stage::ModuleLoop, modules = ?request.modules());
        let specs = self.resolve_modules(request, &mut result);
        let materialized = self
            .materialize_all(&specs, request.module_branch_override())
            .await;

        for spec in &specs {
            match materialized.get(&spec.name) {
                Some(Ok(entry)) => match self.merger.merge_into(&entry.local_path, target) {
                    Ok(paths) => {
                        tracing::info!(module = %spec.name, files = paths.len(), "Merged module");
                        result.written_paths.extend(paths);
                        result.merged_modules.push(spec.name.clone());
                    }
                    Err(e) => result.record(&spec.name, ErrorKind::MergeFailed, e.to_string()),
                },
                Some(Err(e)) => {
                    result.record(&spec.name, ErrorKind::FetchFailed, e.cause.to_string())
                }
                None => {}
            }
        }

        tracing::debug!(stage = %Stage::PostCheck);
        self.post_check(request, &mut result).await;

        tracing::debug!(
            stage = %Stage::Done,
            written = result.written_paths.len(),
            skipped = result.skipped_modules.len(),
            errors = result.errors.len()
        );
        Ok(result)
    }

    /// Registry lookups in request order; unknown names go to `skipped_modules`
    fn resolve_modules(
        &self,
        request: &CompositionRequest,
        result: &mut CompositionResult,
    ) -> Vec<ModuleSpec> {
        let mut specs = Vec::new();
        for name in request.modules() {
            match self.registry.resolve_module(name) {
                Ok(spec) => {
                    let spec = match request.module_repository_override() {
                        Some(repository) => spec.clone().with_repository(repository),
                        None => spec.clone(),
                    };
                    specs.push(spec);
                }
                Err(e) => {
                    tracing::warn!(module = %name, "{}, skipping", e);
                    result.skipped_modules.push(name.clone());
                }
            }
        }
        specs
    }

    /// Materialize each distinct module once, up to `fetch_concurrency` at a time
    async fn materialize_all(
        &self,
        specs: &[ModuleSpec],
        branch_override: Option<&str>,
    ) -> HashMap<String, Result<CacheEntry, ModuleFetchError>> {
        let mut seen = HashSet::new();
        let unique: Vec<&ModuleSpec> = specs
            .iter()
            .filter(|spec| seen.insert(spec.name.as_str()))
            .collect();

        stream::iter(unique)
            .map(|spec| async move {
                let outcome = self
                    .cache
                    .materialize(&self.fetcher, spec, branch_override)
                    .await;
                (spec.name.clone(), outcome)
            })
            .buffered(self.fetch_concurrency)
            .collect()
            .await
    }

    async fn post_check(&self, request: &CompositionRequest, result: &mut CompositionResult) {
        let target = request.target_directory();
        if !target.join(&self.manifest_file).is_file() {
            tracing::debug!(manifest = %self.manifest_file, "No dependency manifest, skip install");
            return;
        }
        if !request.install_dependencies() {
            tracing::debug!("Dependency installation disabled");
            return;
        }

        match self.installer.install(target).await {
            Ok(()) => result.installed = true,
            Err(e) => result.record(&self.manifest_file, ErrorKind::InstallFailed, e.to_string()),
        }
    }
}
