//! Merging a materialized source tree into the target directory
//!
//! The default policy overwrites silently: whatever merges last wins, with
//! no diffing and no backup of the replaced content. [`MergePolicy::FailOnConflict`]
//! is the opt-in alternative for callers that must not clobber files.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// What to do when a file already exists at the destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergePolicy {
    /// Replace existing files; the last merge wins
    #[default]
    Overwrite,
    /// Refuse the whole merge, writing nothing, if any file already exists
    FailOnConflict,
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Failed to read {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} file(s) already exist in the target: {}", paths.len(), display_paths(paths))]
    Conflict { paths: Vec<PathBuf> },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Copies file trees into a target directory under a [`MergePolicy`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeMerger {
    policy: MergePolicy,
}

impl TreeMerger {
    pub fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Copy every file under `source` to the same relative path under `target`
    ///
    /// Returns the relative paths written. A missing `source` is not an error
    /// and writes nothing; callers check materialization before merging.
    pub fn merge_into(
        &self,
        source: &Path,
        target: &Path,
    ) -> Result<BTreeSet<PathBuf>, MergeError> {
        if !source.exists() {
            return Ok(BTreeSet::new());
        }

        let files = collect_files(source)?;

        if self.policy == MergePolicy::FailOnConflict {
            let conflicts: Vec<PathBuf> = files
                .iter()
                .filter(|relative| target.join(relative).exists())
                .cloned()
                .collect();
            if !conflicts.is_empty() {
                return Err(MergeError::Conflict { paths: conflicts });
            }
        }

        fs::create_dir_all(target).map_err(|e| MergeError::Io {
            path: target.to_path_buf(),
            source: e,
        })?;

        let mut written = BTreeSet::new();
        for relative in files {
            let target_path = target.join(&relative);
            if let Some(parent) = target_path.parent() {
                fs::create_dir_all(parent).map_err(|e| MergeError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }

            fs::copy(source.join(&relative), &target_path).map_err(|e| MergeError::Io {
                path: target_path.clone(),
                source: e,
            })?;
            written.insert(relative);
        }

        Ok(written)
    }
}

/// Relative paths of all files under `root`, skipping `.git`
fn collect_files(root: &Path) -> Result<Vec<PathBuf>, MergeError> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git");

    for entry in walker {
        let entry = entry.map_err(|e| MergeError::Walk {
            path: root.to_path_buf(),
            source: e,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(relative.to_path_buf());
        }
    }

    Ok(files)
}
