//! External process integration
//!
//! This module provides:
//! - Dependency installation after a project has been composed

pub mod install;

pub use install::{CommandInstaller, DependencyInstaller, InstallError};
