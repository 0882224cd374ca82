//! Launchpad Core - Shared library for template composition CLIs
//!
//! This library composes a project directory from a framework's base template
//! plus an ordered list of feature modules. It is designed to be used by CLI
//! binaries that share the same pipeline but have different product
//! configurations.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! - **Layer 1: Core Operations** - Registry lookup, tree fetching, the module cache, tree merging
//! - **Layer 2: Workflow Orchestration** - `Composer` runs the resolve-fetch-merge pipeline
//! - **Layer 3: CLI/TUI Interface** - Optional cliclack-based front end (feature-gated)
//!
//! # Feature Flags
//!
//! - `tui` (default): Enables the cliclack-based `run` entry point
//!
//! # Example Usage (without TUI)
//!
//! ```ignore
//! use launchpad_core::{CacheResolver, CommandInstaller, Composer, CompositionRequest};
//! use launchpad_core::{GithubFetcher, SourceRegistry};
//!
//! let composer = Composer::new(
//!     SourceRegistry::builtin()?,
//!     CacheResolver::new("/tmp/launchpad-cache"),
//!     GithubFetcher::from_config(&MyConfig)?,
//!     CommandInstaller::npm(),
//! );
//! let request = CompositionRequest::new("react", "my-app")?.with_modules(["auth-oauth"]);
//! let result = composer.compose(&request).await?;
//! ```

pub mod compose;
pub mod config;
pub mod product;
pub mod registry;
pub mod runtime;
pub mod templates;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export main types for convenience
pub use compose::{
    parse_module_list, ComposeError, Composer, CompositionRequest, CompositionResult, ErrorKind,
    RecordedError, RequestError, Stage,
};
pub use product::ProductConfig;
pub use registry::{ModuleSpec, RegistryError, SourceRegistry, TemplateSpec};
pub use runtime::{CommandInstaller, DependencyInstaller, InstallError};
pub use templates::{
    CacheEntry, CacheResolver, FetchError, GithubFetcher, LocalFetcher, MergePolicy,
    SourceLocator, TreeFetcher, TreeMerger,
};

#[cfg(feature = "tui")]
pub use tui::run;
